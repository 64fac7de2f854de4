//! `tokio::fs` implementation of [`LocalFileSystem`]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use super::{LocalEntry, LocalFileSystem, LocalWriter};
use crate::backend::{BackendError, BackendResult, ErrorKind};

/// Local filesystem provider
///
/// # Example
///
/// ```rust,no_run
/// use orbit_cloud::system::{LocalFileSystem, LocalSystem};
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let system = LocalSystem;
///     for entry in system.walk(Path::new("./upload")).await? {
///         println!("{} ({} bytes)", entry.path.display(), entry.size);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSystem;

impl LocalSystem {
    pub fn new() -> Self {
        Self
    }
}

fn with_path(err: std::io::Error, path: &Path) -> BackendError {
    BackendError::from(err).context(path.display())
}

#[async_trait]
impl LocalFileSystem for LocalSystem {
    async fn create_dir_all(&self, path: &Path) -> BackendResult<()> {
        fs::create_dir_all(path).await.map_err(|e| with_path(e, path))
    }

    async fn is_dir(&self, path: &Path) -> BackendResult<bool> {
        let meta = fs::metadata(path).await.map_err(|e| with_path(e, path))?;
        Ok(meta.is_dir())
    }

    async fn file_size(&self, path: &Path) -> BackendResult<u64> {
        let meta = fs::metadata(path).await.map_err(|e| with_path(e, path))?;
        Ok(meta.len())
    }

    async fn create_file(&self, path: &Path) -> BackendResult<LocalWriter> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| with_path(e, parent))?;
        }
        let file = fs::File::create(path).await.map_err(|e| with_path(e, path))?;
        Ok(Box::new(file))
    }

    async fn walk(&self, root: &Path) -> BackendResult<Vec<LocalEntry>> {
        let root: PathBuf = root.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|e| BackendError::from(std::io::Error::from(e)))?;
                let meta = entry
                    .metadata()
                    .map_err(|e| BackendError::from(std::io::Error::from(e)))?;
                entries.push(LocalEntry {
                    path: entry.into_path(),
                    is_dir: meta.is_dir(),
                    size: if meta.is_dir() { 0 } else { meta.len() },
                });
            }
            Ok::<_, BackendError>(entries)
        })
        .await
        .map_err(|e| BackendError::new(ErrorKind::Io, "local", format!("walk task failed: {}", e)))?
    }
}
