use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_orm::{
    record, DynamicRecord, ExecContext, Executor, Orm, OrmError, Record, SqliteConnection,
    StatementKind, Value, ValueKind,
};

record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct TestUser {
        pub id: i64,
        pub name: String,
        pub email: Option<String>,
    }
}

fn user(id: i64, name: &str) -> TestUser {
    TestUser {
        id,
        name: name.to_string(),
        email: None,
    }
}

// In-memory database with the TestUser table in place.
async fn create_test_orm() -> Result<Orm<SqliteConnection>> {
    let orm = Orm::new(SqliteConnection::open_in_memory()?);
    orm.executor()
        .execute_batch(
            &ExecContext::background(),
            r#"
            CREATE TABLE IF NOT EXISTS TestUser (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT
            );
            "#,
        )
        .await?;
    Ok(orm)
}

#[tokio::test]
async fn insert_then_find_round_trips() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    let alice = TestUser {
        id: 1,
        name: "Alice".to_string(),
        email: Some("alice@example.com".to_string()),
    };
    orm.insert(&ctx, &alice).await?;

    let found = orm.find(&ctx, &TestUser::default(), 1).await?;
    assert_eq!(found, Some(alice.clone()));

    // The id may also arrive in its external string form.
    let by_text = orm.find(&ctx, &TestUser::default(), "1").await?;
    assert_eq!(by_text, Some(alice));
    Ok(())
}

#[tokio::test]
async fn update_then_find_reflects_new_fields() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    let mut bob = user(2, "Bob");
    orm.insert(&ctx, &bob).await?;

    bob.name = "Robert".to_string();
    bob.email = Some("rob@example.com".to_string());
    orm.update(&ctx, &bob).await?;

    let found = orm
        .find(&ctx, &TestUser::default(), 2)
        .await?
        .expect("row should still exist");
    assert_eq!(found.id, 2);
    assert_eq!(found.name, "Robert");
    assert_eq!(found.email.as_deref(), Some("rob@example.com"));
    Ok(())
}

#[tokio::test]
async fn remove_then_find_is_absent_not_an_error() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    orm.insert(&ctx, &user(3, "Carol")).await?;
    orm.remove(&ctx, &TestUser::default(), 3).await?;

    assert_eq!(orm.find(&ctx, &TestUser::default(), 3).await?, None);
    Ok(())
}

#[tokio::test]
async fn removing_a_missing_row_is_not_found() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    let err = orm.remove(&ctx, &TestUser::default(), 42).await.unwrap_err();
    match err {
        OrmError::NotFound { table, id } => {
            assert_eq!(table, "TestUser");
            assert_eq!(id, "42");
        }
        other => panic!("expected NotFound, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn filter_returns_exactly_the_matching_rows() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    for u in [user(1, "Alice"), user(2, "Bob"), user(3, "Alice")] {
        orm.insert(&ctx, &u).await?;
    }

    let alices = orm
        .filter(&ctx, &TestUser::default(), "name = ?", vec!["Alice".into()])
        .await?;
    let ids: HashSet<i64> = alices.iter().map(|u| u.id).collect();
    assert_eq!(ids, HashSet::from([1, 3]));
    assert!(alices.iter().all(|u| u.name == "Alice"));

    let none = orm
        .filter(&ctx, &TestUser::default(), "name = ?1 AND id > ?2", vec!["Bob".into(), 5.into()])
        .await?;
    assert!(none.is_empty());
    Ok(())
}

#[tokio::test]
async fn all_returns_every_row() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    assert!(orm.all(&ctx, &TestUser::default()).await?.is_empty());
    for u in [user(1, "Alice"), user(2, "Bob")] {
        orm.insert(&ctx, &u).await?;
    }
    let mut rows = orm.all(&ctx, &TestUser::default()).await?;
    rows.sort_by_key(|u| u.id);
    assert_eq!(rows, vec![user(1, "Alice"), user(2, "Bob")]);
    Ok(())
}

#[tokio::test]
async fn duplicate_insert_surfaces_exec_failure() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    orm.insert(&ctx, &user(1, "Alice")).await?;
    let err = orm.insert(&ctx, &user(1, "Again")).await.unwrap_err();
    assert!(matches!(
        err,
        OrmError::ExecFailed {
            kind: StatementKind::Insert,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_table_surfaces_query_failure() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    let ghost = DynamicRecord::new("Ghost").with_field("id", ValueKind::Integer);
    let err = orm.all(&ctx, &ghost).await.unwrap_err();
    assert!(matches!(
        err,
        OrmError::QueryFailed {
            kind: StatementKind::SelectAll,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn shape_errors_are_reported_before_any_sql() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    let shapeless = DynamicRecord::new("TestUser");
    assert!(matches!(
        orm.insert(&ctx, &shapeless).await,
        Err(OrmError::NotARecord(_))
    ));

    let no_id = DynamicRecord::new("TestUser").with_value("name", "x");
    assert!(matches!(
        orm.update(&ctx, &no_id).await,
        Err(OrmError::MissingIdField(_))
    ));
    assert!(matches!(
        orm.remove(&ctx, &no_id, 1).await,
        Err(OrmError::MissingIdField(_))
    ));
    Ok(())
}

#[tokio::test]
async fn dynamic_records_map_like_static_ones() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();

    let row = DynamicRecord::new("TestUser")
        .with_value("id", 9)
        .with_value("name", "Dora")
        .with_field("email", ValueKind::Text);
    orm.insert(&ctx, &row).await?;

    let sample = row.blank();
    let found = orm.find(&ctx, &sample, 9).await?.expect("inserted row");
    assert_eq!(found.get("name"), Some(&Value::from("Dora")));
    assert_eq!(found.get("email"), Some(&Value::from("")));

    let typed = orm.find(&ctx, &TestUser::default(), 9).await?;
    assert_eq!(typed.map(|u| u.name), Some("Dora".to_string()));
    Ok(())
}

#[tokio::test]
async fn schema_out_of_field_order_is_a_scan_failure() -> Result<()> {
    let orm = Orm::new(SqliteConnection::open_in_memory()?);
    let ctx = ExecContext::background();
    orm.executor()
        .execute_batch(&ctx, "CREATE TABLE TestUser (name TEXT, id INTEGER PRIMARY KEY, email TEXT);")
        .await?;
    orm.insert(&ctx, &user(1, "Alice")).await?;

    let err = orm.all(&ctx, &TestUser::default()).await.unwrap_err();
    assert!(matches!(err, OrmError::ScanFailed { .. }));
    Ok(())
}

#[tokio::test]
async fn swapped_text_columns_are_rejected_not_scrambled() -> Result<()> {
    let orm = Orm::new(SqliteConnection::open_in_memory()?);
    let ctx = ExecContext::background();
    orm.executor()
        .execute_batch(&ctx, "CREATE TABLE TestUser (id INTEGER PRIMARY KEY, email TEXT, name TEXT);")
        .await?;
    let alice = TestUser {
        id: 1,
        name: "Alice".to_string(),
        email: Some("a@x".to_string()),
    };
    orm.insert(&ctx, &alice).await?;

    let err = orm.all(&ctx, &TestUser::default()).await.unwrap_err();
    assert!(matches!(
        err,
        OrmError::ScanFailed {
            kind: StatementKind::SelectAll,
            ..
        }
    ));

    let err = orm.find(&ctx, &TestUser::default(), 1).await.unwrap_err();
    assert!(matches!(
        err,
        OrmError::ScanFailed {
            kind: StatementKind::SelectById,
            ..
        }
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_with_distinct_ids_do_not_interfere() -> Result<()> {
    let orm = Arc::new(create_test_orm().await?);

    let tasks = (1..=24_i64).map(|id| {
        let orm = Arc::clone(&orm);
        tokio::spawn(async move {
            let ctx = ExecContext::background();
            let mut u = user(id, &format!("user-{id}"));
            orm.insert(&ctx, &u).await?;
            u.email = Some(format!("{id}@example.com"));
            orm.update(&ctx, &u).await?;
            let found = orm.find(&ctx, &TestUser::default(), id).await?;
            anyhow::ensure!(found.as_ref() == Some(&u), "row {id} was corrupted: {found:?}");
            Ok::<_, anyhow::Error>(())
        })
    });
    for outcome in futures::future::try_join_all(tasks).await? {
        outcome?;
    }

    assert_eq!(orm.all(&ExecContext::background(), &TestUser::default()).await?.len(), 24);
    Ok(())
}

#[tokio::test]
async fn cancelled_context_runs_nothing() -> Result<()> {
    let orm = create_test_orm().await?;
    let ctx = ExecContext::background();
    let cancelled = ctx.child();
    cancelled.cancel();

    let err = orm.insert(&cancelled, &user(1, "Alice")).await.unwrap_err();
    assert!(err.is_cancellation());
    assert!(matches!(
        err,
        OrmError::Cancelled {
            kind: StatementKind::Insert,
            ..
        }
    ));

    assert!(!ctx.is_cancelled());
    assert_eq!(orm.find(&ctx, &TestUser::default(), 1).await?, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_interrupts_a_running_statement() -> Result<()> {
    let conn = SqliteConnection::open_in_memory()?;
    let runaway = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT count(*) FROM c";

    let ctx = ExecContext::with_timeout(Duration::from_millis(100));
    let err = conn.query(&ctx, runaway, &[]).await.unwrap_err();
    assert!(matches!(err, rust_orm::DbError::DeadlineExceeded));

    // The interrupted statement released the connection.
    let ctx = ExecContext::with_timeout(Duration::from_secs(10));
    conn.ping(&ctx).await?;
    Ok(())
}
