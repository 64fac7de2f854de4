//! Folder-aware delete, copy, move, clone and rename
//!
//! A folder is a key prefix. Every operation on a folder lists its descendants
//! in one flat walk and applies a single-object primitive to each of them,
//! `batch_size` requests at a time. Batches run strictly one after another and
//! a batch is allowed to settle completely before its first error is returned.
//! Nothing already applied is rolled back.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::listing::list_all_recursive;
use super::path::{ensure_folder_path, replace_from_end};
use crate::backend::{BackendError, BackendResult, ObjectRef, StorageClient};

/// Default number of requests in flight per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Run `op` over `items` in sequential batches of `batch_size` concurrent calls
pub async fn run_batched<T, F, Fut>(items: &[T], batch_size: usize, op: F) -> BackendResult<()>
where
    F: Fn(&T) -> Fut,
    Fut: Future<Output = BackendResult<()>>,
{
    for batch in items.chunks(batch_size.max(1)) {
        let results = join_all(batch.iter().map(&op)).await;
        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }
    }
    Ok(())
}

/// Tree operations over one client
#[derive(Clone)]
pub struct TreeOperations {
    client: Arc<dyn StorageClient>,
    batch_size: usize,
}

impl TreeOperations {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn descendants(&self, folder: &ObjectRef) -> BackendResult<Vec<ObjectRef>> {
        list_all_recursive(self.client.as_ref(), &folder.bucket, &folder.path, None, None).await
    }

    /// Delete an object, or a folder marker together with all descendants
    #[instrument(skip_all, fields(backend = self.client.backend_name(), target = %target))]
    pub async fn delete_tree(&self, target: &ObjectRef) -> BackendResult<()> {
        if !target.is_folder() {
            return self.client.delete_single(target).await;
        }

        let mut targets = self.descendants(target).await?;
        targets.push(target.clone());
        info!(count = targets.len(), "Deleting folder tree");

        match self.client.bulk_delete_limit() {
            Some(limit) => {
                let keys: Vec<String> = targets.iter().map(|t| t.path.clone()).collect();
                let groups: Vec<&[String]> = keys.chunks(limit.max(1)).collect();
                run_batched(&groups, self.batch_size, |group| {
                    let client = Arc::clone(&self.client);
                    let bucket = target.bucket.clone();
                    let group = group.to_vec();
                    async move { client.delete_many(&bucket, &group).await }
                })
                .await
            }
            None => {
                run_batched(&targets, self.batch_size, |t| {
                    let client = Arc::clone(&self.client);
                    let t = t.clone();
                    async move {
                        match client.delete_single(&t).await {
                            Err(e) if e.is_not_found() && t.is_folder() => Ok(()),
                            other => other,
                        }
                    }
                })
                .await
            }
        }
    }

    /// Copy an object, or a folder and all its descendants, to `destination`
    ///
    /// Folder descendants keep their path relative to the source folder. The
    /// folder marker is copied first so an empty folder still appears at the
    /// destination; when the source has no marker one is created.
    #[instrument(skip_all, fields(backend = self.client.backend_name(), source = %source, destination = %destination))]
    pub async fn copy_tree(&self, source: &ObjectRef, destination: &ObjectRef) -> BackendResult<()> {
        if !source.is_folder() {
            return self.client.copy_single(source, destination).await;
        }

        let destination = destination.with_path(ensure_folder_path(&destination.path));
        if destination.bucket == source.bucket && destination.path.starts_with(&source.path) {
            return Err(BackendError::invalid_input(
                self.client.backend_name(),
                format!("cannot copy '{}' into itself ('{}')", source, destination),
            ));
        }

        match self.client.copy_single(source, &destination).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Source folder has no marker, creating one at destination");
                self.client.create_folder_marker(&destination).await?;
            }
            Err(e) => return Err(e),
        }

        let pairs: Vec<(ObjectRef, ObjectRef)> = self
            .descendants(source)
            .await?
            .into_iter()
            .map(|entry| {
                let rest = entry.path[source.path.len()..].to_string();
                let target = destination.with_path(format!("{}{}", destination.path, rest));
                (entry, target)
            })
            .collect();
        info!(count = pairs.len(), "Copying folder tree");

        run_batched(&pairs, self.batch_size, |(from, to)| {
            let client = Arc::clone(&self.client);
            let from = from.clone();
            let to = to.clone();
            async move { client.copy_single(&from, &to).await }
        })
        .await
    }

    /// Copy then delete the source; not atomic
    pub async fn move_tree(&self, source: &ObjectRef, destination: &ObjectRef) -> BackendResult<()> {
        self.copy_tree(source, destination).await?;
        self.delete_tree(source).await
    }

    /// Duplicate within the source bucket at `new_path`
    pub async fn clone_tree(&self, source: &ObjectRef, new_path: &str) -> BackendResult<ObjectRef> {
        let new_path = if source.is_folder() {
            ensure_folder_path(new_path)
        } else {
            new_path.to_string()
        };
        let destination = source.with_path(new_path);
        self.copy_tree(source, &destination).await?;
        Ok(destination)
    }

    /// Replace the last path segment with `new_name`
    pub async fn rename_object(&self, source: &ObjectRef, new_name: &str) -> BackendResult<ObjectRef> {
        let new_name = new_name.trim().trim_end_matches(self.client.delimiter());
        if new_name.is_empty() || new_name.contains(self.client.delimiter()) {
            return Err(BackendError::invalid_input(
                self.client.backend_name(),
                format!("invalid name '{}'", new_name),
            ));
        }
        let new_path = replace_from_end(&source.path, &source.name, new_name);
        if new_path == source.path {
            return Ok(source.clone());
        }
        let renamed = self.clone_tree(source, &new_path).await?;
        self.delete_tree(source).await?;
        Ok(renamed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryClient;
    use std::sync::atomic::Ordering;

    fn tree_client() -> Arc<MemoryClient> {
        let client = MemoryClient::new();
        client.insert("b", "docs/", "");
        client.insert("b", "docs/a.txt", "aaa");
        client.insert("b", "docs/sub/", "");
        client.insert("b", "docs/sub/b.txt", "bb");
        client.insert("b", "other.txt", "o");
        Arc::new(client)
    }

    #[tokio::test]
    async fn test_run_batched_reports_first_error() {
        let items = vec![1, 2, 3, 4, 5];
        let result = run_batched(&items, 2, |i| {
            let i = *i;
            async move {
                if i == 4 {
                    Err(BackendError::service("test", "four"))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(result.unwrap_err().cause, "four");
    }

    #[tokio::test]
    async fn test_delete_folder_tree() {
        let client = tree_client();
        let ops = TreeOperations::new(client.clone());
        let folder = ObjectRef::folder("memory", "b", "docs");

        ops.delete_tree(&folder).await.unwrap();
        assert_eq!(client.keys("b"), vec!["other.txt"]);
        assert_eq!(client.stats().deletes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_delete_uses_bulk_when_available() {
        let client = MemoryClient::new().with_bulk_delete(2);
        for i in 0..5 {
            client.insert("b", &format!("f/{}.txt", i), "x");
        }
        let client = Arc::new(client);
        let ops = TreeOperations::new(client.clone());

        ops.delete_tree(&ObjectRef::folder("memory", "b", "f")).await.unwrap();
        assert!(client.keys("b").is_empty());
        // 5 files plus the marker in groups of 2
        assert_eq!(client.stats().bulk_deletes.load(Ordering::SeqCst), 3);
        assert_eq!(client.stats().deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_copy_folder_preserves_layout() {
        let client = tree_client();
        let ops = TreeOperations::new(client.clone());
        let src = ObjectRef::folder("memory", "b", "docs");
        let dst = ObjectRef::from_key("memory", "b", "backup");

        ops.copy_tree(&src, &dst).await.unwrap();
        let keys = client.keys("b");
        for key in ["backup/", "backup/a.txt", "backup/sub/", "backup/sub/b.txt", "docs/a.txt"] {
            assert!(keys.contains(&key.to_string()), "missing {}", key);
        }
        assert_eq!(client.contents("b", "backup/sub/b.txt").unwrap().as_ref(), b"bb");
    }

    #[tokio::test]
    async fn test_copy_folder_without_marker_creates_one() {
        let client = MemoryClient::new();
        client.insert("b", "photos/cat.png", "png");
        let client = Arc::new(client);
        let ops = TreeOperations::new(client.clone());

        ops.copy_tree(
            &ObjectRef::folder("memory", "b", "photos"),
            &ObjectRef::folder("memory", "b", "pics"),
        )
        .await
        .unwrap();
        assert_eq!(
            client.keys("b"),
            vec!["photos/cat.png", "pics/", "pics/cat.png"]
        );
    }

    #[tokio::test]
    async fn test_copy_into_itself_is_rejected() {
        let ops = TreeOperations::new(tree_client());
        let src = ObjectRef::folder("memory", "b", "docs");
        let err = ops
            .copy_tree(&src, &ObjectRef::folder("memory", "b", "docs/sub/inner"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::backend::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_move_folder() {
        let client = tree_client();
        let ops = TreeOperations::new(client.clone());
        ops.move_tree(
            &ObjectRef::folder("memory", "b", "docs"),
            &ObjectRef::folder("memory", "b", "archive"),
        )
        .await
        .unwrap();
        assert_eq!(
            client.keys("b"),
            vec!["archive/", "archive/a.txt", "archive/sub/", "archive/sub/b.txt", "other.txt"]
        );
    }

    #[tokio::test]
    async fn test_clone_appends_delimiter_for_folders() {
        let client = tree_client();
        let ops = TreeOperations::new(client.clone());
        let cloned = ops
            .clone_tree(&ObjectRef::folder("memory", "b", "docs/sub"), "docs/sub-Copy")
            .await
            .unwrap();
        assert_eq!(cloned.path, "docs/sub-Copy/");
        assert!(client.keys("b").contains(&"docs/sub-Copy/b.txt".to_string()));
        assert!(client.keys("b").contains(&"docs/sub/b.txt".to_string()));
    }

    #[tokio::test]
    async fn test_rename_file_and_folder() {
        let client = tree_client();
        let ops = TreeOperations::new(client.clone());

        let renamed = ops
            .rename_object(&ObjectRef::from_key("memory", "b", "docs/a.txt"), "z.txt")
            .await
            .unwrap();
        assert_eq!(renamed.path, "docs/z.txt");

        let renamed = ops
            .rename_object(&ObjectRef::folder("memory", "b", "docs/sub"), "deep")
            .await
            .unwrap();
        assert_eq!(renamed.path, "docs/deep/");
        assert_eq!(
            client.keys("b"),
            vec!["docs/", "docs/deep/", "docs/deep/b.txt", "docs/z.txt", "other.txt"]
        );
    }

    #[tokio::test]
    async fn test_failure_stops_before_next_batch() {
        let client = MemoryClient::new();
        for i in 0..6 {
            client.insert("b", &format!("d/{}.txt", i), "x");
        }
        client.fail_on("d/1.txt");
        let client = Arc::new(client);
        let ops = TreeOperations::new(client.clone()).with_batch_size(3);

        let err = ops
            .delete_tree(&ObjectRef::folder("memory", "b", "d"))
            .await
            .unwrap_err();
        assert!(err.cause.contains("d/1.txt"));
        // first batch settled, no rollback, second batch never started
        assert_eq!(client.keys("b"), vec!["d/1.txt", "d/3.txt", "d/4.txt", "d/5.txt"]);
    }
}
