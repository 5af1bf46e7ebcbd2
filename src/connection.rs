//! The connection collaborator seam.
//!
//! The mapping layer never talks to a driver directly; it goes through
//! [`Executor`], which [`SqliteConnection`](crate::SqliteConnection) implements.

use async_trait::async_trait;

use crate::context::ExecContext;
use crate::error::DbError;
use crate::value::Value;

/// Rows produced by a query, in result-set order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes parameterized statements with `?N` placeholders.
///
/// Implementations must release any cursor before returning, honour the
/// context's cancellation and deadline, and be safe to share across tasks.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and return the affected-row count.
    async fn execute(&self, ctx: &ExecContext, sql: &str, params: &[Value]) -> Result<usize, DbError>;

    /// Run a parameterless batch of one or more statements.
    async fn execute_batch(&self, ctx: &ExecContext, sql: &str) -> Result<(), DbError>;

    async fn query(&self, ctx: &ExecContext, sql: &str, params: &[Value]) -> Result<RowSet, DbError>;

    /// First row of a query, or `None` when nothing matched.
    async fn query_row(
        &self,
        ctx: &ExecContext,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Vec<Value>>, DbError>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    async fn execute(&self, ctx: &ExecContext, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        (**self).execute(ctx, sql, params).await
    }

    async fn execute_batch(&self, ctx: &ExecContext, sql: &str) -> Result<(), DbError> {
        (**self).execute_batch(ctx, sql).await
    }

    async fn query(&self, ctx: &ExecContext, sql: &str, params: &[Value]) -> Result<RowSet, DbError> {
        (**self).query(ctx, sql, params).await
    }

    async fn query_row(
        &self,
        ctx: &ExecContext,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Vec<Value>>, DbError> {
        (**self).query_row(ctx, sql, params).await
    }
}
