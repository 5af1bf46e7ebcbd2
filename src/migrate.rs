//! Ordered application of raw SQL migration files.
//!
//! Every file under the root whose extension matches is collected, the paths
//! are sorted as byte strings, and each file is executed as one batch. The
//! first failure stops the run; files already applied stay applied. Nothing
//! records which files ran, so re-running is only safe for idempotent SQL.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::connection::Executor;
use crate::context::ExecContext;
use crate::error::{OrmError, Result};

pub const DEFAULT_MIGRATION_EXTENSION: &str = "sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Filesystem access the migration runner needs.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Immediate children of `path`, in whatever order the source yields them.
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The host filesystem, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(DirEntry {
                path: entry.path(),
                is_dir,
            });
        }
        Ok(entries)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Every file below `root` with the given extension, sorted ascending.
pub async fn find_migrations<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>> {
    let extension = OsStr::new(extension.trim_start_matches('.'));
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs
            .list_dir(&dir)
            .await
            .map_err(|source| OrmError::MigrationDiscovery {
                root: dir.clone(),
                source,
            })?;
        for entry in entries {
            if entry.is_dir {
                pending.push(entry.path);
            } else if entry.path.extension() == Some(extension) {
                found.push(entry.path);
            }
        }
    }
    found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    Ok(found)
}

pub async fn read_migration<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<String> {
    fs.read_to_string(path)
        .await
        .map_err(|source| OrmError::MigrationRead {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Idle,
    Discovering,
    Applying { index: usize, path: PathBuf },
    Done,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Files executed successfully, in order.
    pub applied: Vec<PathBuf>,
}

/// Runs the migrations found under a root, one file at a time.
pub struct Migrator<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    extension: String,
    state: MigrationState,
}

impl<'a, F: FileSystem + ?Sized> Migrator<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self {
            fs,
            extension: DEFAULT_MIGRATION_EXTENSION.to_string(),
            state: MigrationState::Idle,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub async fn run<E: Executor + ?Sized>(
        &mut self,
        ctx: &ExecContext,
        executor: &E,
        root: &Path,
    ) -> Result<MigrationReport> {
        let outcome = self.apply_all(ctx, executor, root).await;
        self.state = match outcome {
            Ok(_) => MigrationState::Done,
            Err(_) => MigrationState::Failed,
        };
        outcome
    }

    async fn apply_all<E: Executor + ?Sized>(
        &mut self,
        ctx: &ExecContext,
        executor: &E,
        root: &Path,
    ) -> Result<MigrationReport> {
        self.state = MigrationState::Discovering;
        let migrations = find_migrations(self.fs, root, &self.extension).await?;
        debug!(root = %root.display(), count = migrations.len(), "discovered migrations");

        let mut report = MigrationReport::default();
        for (index, path) in migrations.into_iter().enumerate() {
            self.state = MigrationState::Applying {
                index,
                path: path.clone(),
            };
            let sql = read_migration(self.fs, &path).await?;
            if let Err(source) = executor.execute_batch(ctx, &sql).await {
                warn!(path = %path.display(), error = %source, "migration failed");
                return Err(OrmError::MigrationFailed { path, source });
            }
            info!(path = %path.display(), "applied migration");
            report.applied.push(path);
        }
        Ok(report)
    }
}
