//! The CRUD façade: introspect, build, execute, materialize.

use std::path::Path;

use tracing::{debug, info};

use crate::connection::Executor;
use crate::context::ExecContext;
use crate::error::{OrmError, Result};
use crate::materialize::bind_rows;
use crate::migrate::{FileSystem, MigrationReport, Migrator, OsFileSystem};
use crate::record::{EntityShape, Record};
use crate::sqlite::{SqliteConfig, SqliteConnection};
use crate::statement::{self, SqlQuery};
use crate::value::Value;

/// Maps records onto tables through an [`Executor`].
///
/// Holds no per-call state, so one instance can serve concurrent callers as
/// long as the executor can.
#[derive(Debug, Clone)]
pub struct Orm<E> {
    executor: E,
    config: SqliteConfig,
}

impl Orm<SqliteConnection> {
    /// Open the configured database and verify it answers.
    pub async fn connect(ctx: &ExecContext, config: SqliteConfig) -> Result<Self> {
        let connection = SqliteConnection::open(&config).map_err(OrmError::ConnectFailed)?;
        connection.ping(ctx).await.map_err(OrmError::ConnectFailed)?;
        info!(db_path = %config.db_path, "connected");
        Ok(Self::with_config(connection, config))
    }
}

impl<E: Executor> Orm<E> {
    pub fn new(executor: E) -> Self {
        Self::with_config(executor, SqliteConfig::default())
    }

    pub fn with_config(executor: E, config: SqliteConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    async fn fetch_all<R: Record>(&self, ctx: &ExecContext, sample: &R, query: SqlQuery) -> Result<Vec<R>> {
        debug!(kind = %query.kind, table = %query.table, params = query.params.len(), "fetching rows");
        let rows = self
            .executor
            .query(ctx, &query.statement, &query.params)
            .await
            .map_err(|err| OrmError::query(query.kind, &query.table, err))?;
        bind_rows(sample, query.kind, rows)
    }

    // Goes through `query` so the column names are checked like any other fetch.
    async fn fetch_one<R: Record>(&self, ctx: &ExecContext, sample: &R, query: SqlQuery) -> Result<Option<R>> {
        debug!(kind = %query.kind, table = %query.table, "fetching row");
        let rows = self
            .executor
            .query(ctx, &query.statement, &query.params)
            .await
            .map_err(|err| OrmError::query(query.kind, &query.table, err))?;
        Ok(bind_rows(sample, query.kind, rows)?.into_iter().next())
    }

    async fn exec(&self, ctx: &ExecContext, query: &SqlQuery) -> Result<usize> {
        debug!(kind = %query.kind, table = %query.table, params = query.params.len(), "executing");
        self.executor
            .execute(ctx, &query.statement, &query.params)
            .await
            .map_err(|err| OrmError::exec(query.kind, &query.table, err))
    }

    /// Every row of the sample's table, in result-set order.
    pub async fn all<R: Record>(&self, ctx: &ExecContext, sample: &R) -> Result<Vec<R>> {
        let shape = EntityShape::of(sample)?;
        self.fetch_all(ctx, sample, statement::select_all(&shape)).await
    }

    /// The row whose id equals `id`, or `None` when there is none.
    pub async fn find<R: Record>(
        &self,
        ctx: &ExecContext,
        sample: &R,
        id: impl Into<Value>,
    ) -> Result<Option<R>> {
        let shape = EntityShape::of(sample)?;
        let query = statement::select_by_id(&shape, id.into())?;
        self.fetch_one(ctx, sample, query).await
    }

    /// Rows matching `predicate`, a trusted SQL condition without the `WHERE`
    /// keyword whose placeholders are bound from `args` unchanged.
    pub async fn filter<R: Record>(
        &self,
        ctx: &ExecContext,
        sample: &R,
        predicate: &str,
        args: Vec<Value>,
    ) -> Result<Vec<R>> {
        let shape = EntityShape::of(sample)?;
        self.fetch_all(ctx, sample, statement::select_where(&shape, predicate, args))
            .await
    }

    pub async fn insert<R: Record>(&self, ctx: &ExecContext, record: &R) -> Result<()> {
        let shape = EntityShape::of(record)?;
        self.exec(ctx, &statement::insert(&shape)).await?;
        Ok(())
    }

    /// Write every non-id field of `record` to the row with its id.
    pub async fn update<R: Record>(&self, ctx: &ExecContext, record: &R) -> Result<()> {
        let shape = EntityShape::of(record)?;
        self.exec(ctx, &statement::update(&shape)?).await?;
        Ok(())
    }

    /// Delete the row with `id`; [`OrmError::NotFound`] when nothing was deleted.
    pub async fn remove<R: Record>(&self, ctx: &ExecContext, sample: &R, id: impl Into<Value>) -> Result<()> {
        let shape = EntityShape::of(sample)?;
        let id = id.into();
        let query = statement::delete(&shape, id.clone())?;
        if self.exec(ctx, &query).await? == 0 {
            return Err(OrmError::NotFound {
                table: query.table,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Apply the migrations under `root` from the host filesystem.
    pub async fn migrate(&self, ctx: &ExecContext, root: impl AsRef<Path>) -> Result<MigrationReport> {
        self.migrate_with(ctx, &OsFileSystem, root).await
    }

    pub async fn migrate_with<F: FileSystem + ?Sized>(
        &self,
        ctx: &ExecContext,
        fs: &F,
        root: impl AsRef<Path>,
    ) -> Result<MigrationReport> {
        Migrator::new(fs)
            .with_extension(self.config.migration_extension())
            .run(ctx, &self.executor, root.as_ref())
            .await
    }
}
