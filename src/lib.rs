//! Generic mapping between record types and SQLite tables.
//!
//! # Intention
//!
//! - Derive CRUD statements from a record's shape instead of per-type SQL.
//! - Rebuild records from result rows by binding columns positionally.
//! - Apply raw SQL migration files in filename order.
//!
//! # Architectural Boundaries
//!
//! - Only mapping, statement and migration code belongs here.
//! - Connection pooling, transactions and relationship loading are left to callers.
//!
//! # Naming
//!
//! Table name = record type name, column name = field name, both verbatim.
//! The identity column is the field named `id` (ASCII case ignored). A
//! `SELECT *` must return the table's columns in field declaration order.

pub mod connection;
pub mod context;
pub mod error;
pub mod materialize;
pub mod migrate;
pub mod orm;
pub mod record;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use connection::{Executor, RowSet};
pub use context::ExecContext;
pub use error::{DbError, OrmError, Result};
pub use migrate::{
    find_migrations, read_migration, DirEntry, FileSystem, MigrationReport, MigrationState, Migrator,
    OsFileSystem,
};
pub use orm::Orm;
pub use record::{DynamicRecord, EntityShape, Record, ID_FIELD};
pub use sqlite::{SqliteConfig, SqliteConnection};
pub use statement::{SqlQuery, StatementKind};
pub use value::{ColumnValue, Value, ValueKind};
