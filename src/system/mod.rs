//! Local filesystem collaborator used by transfers
//!
//! Transfers only need a handful of local operations: create directories, tell
//! files from directories, open a file for writing and walk a tree.
//! [`LocalSystem`] provides them over `tokio::fs` and `walkdir`.

mod local;

pub use local::LocalSystem;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWrite;

use crate::backend::BackendResult;

/// Writable local file handle
pub type LocalWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// One entry of a local tree walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// Size in bytes, 0 for directories
    pub size: u64,
}

/// Local operations the transfer manager depends on
#[async_trait]
pub trait LocalFileSystem: Send + Sync {
    /// Create a directory and any missing parents
    async fn create_dir_all(&self, path: &Path) -> BackendResult<()>;

    async fn is_dir(&self, path: &Path) -> BackendResult<bool>;

    async fn file_size(&self, path: &Path) -> BackendResult<u64>;

    /// Create or truncate a file, creating parent directories first
    async fn create_file(&self, path: &Path) -> BackendResult<LocalWriter>;

    /// Every entry below `root`, parents before children, `root` excluded
    async fn walk(&self, root: &Path) -> BackendResult<Vec<LocalEntry>>;
}
