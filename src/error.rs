//! Typed error types for the mapping layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::statement::StatementKind;
use crate::value::ValueKind;

/// Crate-wide result alias.
pub type Result<T, E = OrmError> = std::result::Result<T, E>;

/// Errors raised by a connection collaborator.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("statement cancelled")]
    Cancelled,

    #[error("statement deadline exceeded")]
    DeadlineExceeded,

    /// A previous holder of the connection panicked.
    #[error("connection lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    TaskFailed(String),
}

/// Errors surfaced by the introspector, the CRUD façade and the migration runner.
#[derive(Debug, Error)]
pub enum OrmError {
    /// The value has no usable shape (empty name, no fields, or names that are
    /// not plain SQL identifiers).
    #[error("not a record: {0}")]
    NotARecord(String),

    #[error("{record} has no field named {field}")]
    NoSuchField { record: String, field: String },

    #[error("field {field} of {record} is not mutable")]
    NotMutable { record: String, field: String },

    #[error("type mismatch on {record}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        record: String,
        field: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{0} has no id field")]
    MissingIdField(String),

    #[error("no row in {table} with id {id}")]
    NotFound { table: String, id: String },

    #[error("{kind} query on {table} failed: {source}")]
    QueryFailed {
        kind: StatementKind,
        table: String,
        #[source]
        source: DbError,
    },

    #[error("{kind} statement on {table} failed: {source}")]
    ExecFailed {
        kind: StatementKind,
        table: String,
        #[source]
        source: DbError,
    },

    #[error("failed scanning {kind} row of {table}: {message}")]
    ScanFailed {
        kind: StatementKind,
        table: String,
        message: String,
    },

    #[error("{kind} on {table} cancelled")]
    Cancelled { kind: StatementKind, table: String },

    #[error("{kind} on {table} exceeded its deadline")]
    DeadlineExceeded { kind: StatementKind, table: String },

    #[error("failed to connect to database: {0}")]
    ConnectFailed(#[source] DbError),

    #[error("failed to walk migration directory {}: {source}", .root.display())]
    MigrationDiscovery {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read migration {}: {source}", .path.display())]
    MigrationRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed executing migration {}: {source}", .path.display())]
    MigrationFailed {
        path: PathBuf,
        #[source]
        source: DbError,
    },
}

impl OrmError {
    /// Wrap a failed query, routing cancellation to its own variants.
    pub fn query(kind: StatementKind, table: impl Into<String>, source: DbError) -> Self {
        let table = table.into();
        match source {
            DbError::Cancelled => OrmError::Cancelled { kind, table },
            DbError::DeadlineExceeded => OrmError::DeadlineExceeded { kind, table },
            source => OrmError::QueryFailed {
                kind,
                table,
                source,
            },
        }
    }

    /// Wrap a failed statement execution, routing cancellation to its own variants.
    pub fn exec(kind: StatementKind, table: impl Into<String>, source: DbError) -> Self {
        let table = table.into();
        match source {
            DbError::Cancelled => OrmError::Cancelled { kind, table },
            DbError::DeadlineExceeded => OrmError::DeadlineExceeded { kind, table },
            source => OrmError::ExecFailed {
                kind,
                table,
                source,
            },
        }
    }

    /// True when the failure came from cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        match self {
            OrmError::Cancelled { .. } | OrmError::DeadlineExceeded { .. } => true,
            OrmError::MigrationFailed { source, .. } | OrmError::ConnectFailed(source) => {
                matches!(source, DbError::Cancelled | DbError::DeadlineExceeded)
            }
            _ => false,
        }
    }
}
