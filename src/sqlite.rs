use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection, InterruptHandle, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::{Executor, RowSet};
use crate::context::ExecContext;
use crate::error::DbError;
use crate::value::Value;

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// File extension that marks a migration file
    pub migration_extension: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            busy_timeout_ms: 5_000,
            migration_extension: "sql".to_string(),
        }
    }
}

impl SqliteConfig {
    /// Create a new SQLite config for the given path
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_migration_extension(mut self, extension: impl Into<String>) -> Self {
        self.migration_extension = extension.into();
        self
    }

    /// The migration extension without any leading dot.
    pub fn migration_extension(&self) -> &str {
        self.migration_extension.trim_start_matches('.')
    }
}

/// [`Executor`] over a single SQLite connection.
///
/// Calls are serialized on the connection and run on tokio's blocking pool.
/// Clones share the same connection.
#[derive(Clone)]
pub struct SqliteConnection {
    conn: Arc<Mutex<Connection>>,
    // Ticket of the call currently holding the connection, 0 when idle.
    // Interrupts are only issued while this lock is held.
    active: Arc<Mutex<ActiveCall>>,
    next_ticket: Arc<AtomicU64>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("next_ticket", &self.next_ticket.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> Result<Self, DbError> {
        let connection = Connection::open(&config.db_path)?;
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self::from_connection(connection))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(connection: Connection) -> Self {
        let interrupt = connection.get_interrupt_handle();
        Self {
            conn: Arc::new(Mutex::new(connection)),
            active: Arc::new(Mutex::new(ActiveCall { ticket: 0, interrupt })),
            next_ticket: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Round-trip a trivial query to prove the connection is usable.
    pub async fn ping(&self, ctx: &ExecContext) -> Result<(), DbError> {
        self.query_row(ctx, "SELECT 1", &[]).await.map(|_| ())
    }

    /// Run `op` against the connection on the blocking pool.
    ///
    /// If `ctx` fires first, a call still waiting for the connection is
    /// abandoned before it starts and a running one is interrupted. A
    /// progress handler also polls the abandoned flag so a statement that
    /// starts just after the interrupt still stops.
    async fn run<T, F>(&self, ctx: &ExecContext, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        ctx.check()?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let abandoned = Arc::new(AtomicBool::new(false));

        let conn = Arc::clone(&self.conn);
        let active = Arc::clone(&self.active);
        let gave_up = Arc::clone(&abandoned);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| DbError::Poisoned)?;
            {
                let mut call = active.lock().map_err(|_| DbError::Poisoned)?;
                if gave_up.load(Ordering::SeqCst) {
                    return Err(DbError::Cancelled);
                }
                call.ticket = ticket;
            }

            let flag = Arc::clone(&gave_up);
            guard.progress_handler(PROGRESS_OPS, Some(move || flag.load(Ordering::SeqCst)));
            let out = op(&guard).map_err(DbError::from);
            guard.progress_handler(0, None::<fn() -> bool>);

            active.lock().map_err(|_| DbError::Poisoned)?.ticket = 0;
            out
        });

        match ctx.run(task).await {
            Ok(joined) => joined.map_err(|err| DbError::TaskFailed(err.to_string()))?,
            Err(err) => {
                abandoned.store(true, Ordering::SeqCst);
                let call = self.active.lock().map_err(|_| DbError::Poisoned)?;
                if call.ticket == ticket {
                    warn!(ticket, "interrupting in-flight statement");
                    call.interrupt.interrupt();
                }
                Err(err)
            }
        }
    }
}

// Virtual machine steps between checks of the abandoned flag.
const PROGRESS_OPS: std::os::raw::c_int = 100;

struct ActiveCall {
    ticket: u64,
    interrupt: InterruptHandle,
}

fn read_row(row: &rusqlite::Row<'_>, width: usize) -> rusqlite::Result<Vec<Value>> {
    (0..width).map(|idx| row.get::<_, Value>(idx)).collect()
}

#[async_trait]
impl Executor for SqliteConnection {
    async fn execute(&self, ctx: &ExecContext, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        debug!(sql, params = params.len(), "execute");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(ctx, move |conn| conn.execute(&sql, params_from_iter(params.iter())))
            .await
    }

    async fn execute_batch(&self, ctx: &ExecContext, sql: &str) -> Result<(), DbError> {
        debug!(bytes = sql.len(), "execute batch");
        let sql = sql.to_string();
        self.run(ctx, move |conn| conn.execute_batch(&sql)).await
    }

    async fn query(&self, ctx: &ExecContext, sql: &str, params: &[Value]) -> Result<RowSet, DbError> {
        debug!(sql, params = params.len(), "query");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(ctx, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(read_row(row, width)?);
            }
            Ok(RowSet { columns, rows: out })
        })
        .await
    }

    async fn query_row(
        &self,
        ctx: &ExecContext,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Vec<Value>>, DbError> {
        debug!(sql, params = params.len(), "query row");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(ctx, move |conn| {
            conn.query_row(&sql, params_from_iter(params.iter()), |row| {
                let width = row.as_ref().column_count();
                read_row(row, width)
            })
            .optional()
        })
        .await
    }
}
