//! Chunked, job-tracked uploads and downloads
//!
//! A transfer of a single object is one [`TransferJob`]. A folder transfer is a
//! parent job with one sub-job per file, processed one at a time; the parent's
//! `loaded` is the bytes of finished sub-jobs plus the progress of the running
//! one. Every state change is emitted as a snapshot through [`JobReporter`].
//!
//! The manager never returns an error: failures are recorded on the job
//! (`status = failed`, `error = ...`) and a final snapshot is emitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::JobReporter;
use super::listing::list_all_recursive;
use super::path::{build_cloud_path, ensure_folder_path, relative_key};
use super::progress::Progress;
use crate::backend::{BackendError, BackendResult, ObjectRef, StorageClient, UploadBody};
use crate::system::{LocalFileSystem, LocalWriter};

/// Bytes requested per ranged GET
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

pub const EMPTY_DOWNLOAD_MESSAGE: &str = "The folder is empty, nothing to download";
pub const EMPTY_UPLOAD_MESSAGE: &str = "The folder is empty, nothing to upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Loading,
    /// Only entered through [`TransferJob::pause`]
    Paused,
    Completed,
    Failed,
}

/// What a folder transfer does after a sub-job fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Mark the remaining sub-jobs failed without running them
    #[default]
    StopOnFirstFailure,
    /// Run every sub-job regardless
    Continue,
}

/// One tracked transfer, possibly with sub-jobs (never nested deeper)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: Uuid,
    pub name: String,
    pub object: ObjectRef,
    pub local_path: PathBuf,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_jobs: Vec<TransferJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Informational note on a successful job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransferJob {
    pub fn new(object: ObjectRef, local_path: PathBuf, kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: object.name.clone(),
            progress: Progress::pending(object.size.unwrap_or(0)),
            object,
            local_path,
            kind,
            status: JobStatus::Loading,
            sub_jobs: Vec::new(),
            error: None,
            message: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_folder_job(&self) -> bool {
        !self.sub_jobs.is_empty() || self.object.is_folder()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    /// Mark a running job paused; finished jobs are left alone
    pub fn pause(&mut self) -> bool {
        if self.status == JobStatus::Loading {
            self.status = JobStatus::Paused;
            true
        } else {
            false
        }
    }

    fn fail(&mut self, error: impl ToString) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
    }

    fn complete_with_message(&mut self, message: &str) {
        self.progress = Progress::new(0, 0);
        self.status = JobStatus::Completed;
        self.message = Some(message.to_string());
    }
}

type JobUpdate<'a> = &'a mut (dyn FnMut(&TransferJob) + Send);

/// Local path of `key` below `root`, one path component per key segment
fn local_target(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Runs transfers between one storage client and the local filesystem
#[derive(Clone)]
pub struct TransferManager {
    client: Arc<dyn StorageClient>,
    local: Arc<dyn LocalFileSystem>,
    reporter: JobReporter,
    chunk_size: u64,
    failure_policy: FailurePolicy,
}

impl TransferManager {
    pub fn new(
        client: Arc<dyn StorageClient>,
        local: Arc<dyn LocalFileSystem>,
        reporter: JobReporter,
    ) -> Self {
        Self {
            client,
            local,
            reporter,
            chunk_size: DEFAULT_CHUNK_SIZE,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Download an object or a whole folder to `local_path`
    pub async fn download(&self, object: &ObjectRef, local_path: &Path) -> TransferJob {
        let mut job = TransferJob::new(object.clone(), local_path.to_path_buf(), JobKind::Download);
        info!(job = %job.id, object = %object, local = %local_path.display(), "Starting download");

        if object.is_folder() {
            self.download_folder(&mut job).await;
        } else {
            let reporter = self.reporter.clone();
            self.download_file(&mut job, &mut |j: &TransferJob| reporter.emit(j))
                .await;
        }
        job
    }

    /// Upload a local file or directory to `object`
    pub async fn upload(&self, object: &ObjectRef, local_path: &Path) -> TransferJob {
        let mut job = TransferJob::new(object.clone(), local_path.to_path_buf(), JobKind::Upload);
        info!(job = %job.id, object = %object, local = %local_path.display(), "Starting upload");

        if object.is_folder() {
            self.upload_folder(&mut job).await;
        } else {
            let reporter = self.reporter.clone();
            self.upload_file(&mut job, &mut |j: &TransferJob| reporter.emit(j))
                .await;
        }
        job
    }

    async fn download_folder(&self, job: &mut TransferJob) {
        let folder = job.object.clone();
        let entries =
            match list_all_recursive(self.client.as_ref(), &folder.bucket, &folder.path, None, None)
                .await
            {
                Ok(entries) => entries,
                Err(e) => return self.finish_with_error(job, e),
            };

        let (folders, files): (Vec<ObjectRef>, Vec<ObjectRef>) =
            entries.into_iter().partition(|e| e.is_folder());
        if files.is_empty() {
            job.complete_with_message(EMPTY_DOWNLOAD_MESSAGE);
            self.reporter.emit(job);
            return;
        }

        if let Err(e) = self.local.create_dir_all(&job.local_path).await {
            return self.finish_with_error(job, e);
        }
        for entry in &folders {
            let dir = local_target(&job.local_path, relative_key(&folder.path, &entry.path).unwrap_or(""));
            if let Err(e) = self.local.create_dir_all(&dir).await {
                return self.finish_with_error(job, e);
            }
        }

        let total: u64 = files.iter().filter_map(|f| f.size).sum();
        job.sub_jobs = files
            .into_iter()
            .map(|file| {
                let relative = relative_key(&folder.path, &file.path).unwrap_or(file.name.as_str());
                let local = local_target(&job.local_path, relative);
                TransferJob::new(file, local, JobKind::Download)
            })
            .collect();
        job.progress = Progress::pending(total);
        debug!(job = %job.id, files = job.sub_jobs.len(), total, "Folder enumerated");
        self.reporter.emit(job);

        self.run_sub_jobs(job).await;
    }

    async fn upload_folder(&self, job: &mut TransferJob) {
        let root = job.local_path.clone();
        let entries = match self.local.walk(&root).await {
            Ok(entries) => entries,
            Err(e) => return self.finish_with_error(job, e),
        };
        if entries.is_empty() {
            job.complete_with_message(EMPTY_UPLOAD_MESSAGE);
            self.reporter.emit(job);
            return;
        }

        let mut sub_jobs = Vec::new();
        let mut total = 0u64;
        for entry in entries {
            let relative = entry
                .path
                .strip_prefix(&root)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = build_cloud_path(&job.object.path, &[&relative]);
            if entry.is_dir {
                let marker = job.object.with_path(ensure_folder_path(&key));
                if let Err(e) = self.client.create_folder_marker(&marker).await {
                    return self.finish_with_error(job, e);
                }
            } else {
                total += entry.size;
                let object = job.object.with_path(key).with_size(entry.size);
                sub_jobs.push(TransferJob::new(object, entry.path, JobKind::Upload));
            }
        }

        // Only empty directories below the root: markers exist, no bytes to send
        if sub_jobs.is_empty() {
            job.complete_with_message(EMPTY_UPLOAD_MESSAGE);
            self.reporter.emit(job);
            return;
        }

        job.sub_jobs = sub_jobs;
        job.progress = Progress::pending(total);
        self.reporter.emit(job);

        self.run_sub_jobs(job).await;
    }

    /// Process sub-jobs in order, folding their progress into the parent
    async fn run_sub_jobs(&self, parent: &mut TransferJob) {
        let mut total = parent.progress.total;
        let count = parent.sub_jobs.len();

        for index in 0..count {
            let mut sub = parent.sub_jobs[index].clone();
            let previous = parent.progress.loaded;
            {
                let reporter = &self.reporter;
                let parent_view = &mut *parent;
                let mut on_update = |s: &TransferJob| {
                    parent_view.sub_jobs[index] = s.clone();
                    parent_view.progress.set(previous + s.progress.loaded, total);
                    reporter.emit(&*parent_view);
                };
                match sub.kind {
                    JobKind::Download => self.download_file(&mut sub, &mut on_update).await,
                    JobKind::Upload => self.upload_file(&mut sub, &mut on_update).await,
                }
            }

            let completed = sub.status == JobStatus::Completed;
            let loaded = if completed {
                // The backend's length replaces the listed size
                total = total - sub.object.size.unwrap_or(0).min(total) + sub.progress.total;
                previous + sub.progress.total
            } else {
                parent.progress.loaded
            };
            parent.sub_jobs[index] = sub;
            parent.progress.set(loaded, total);

            if !completed && self.failure_policy == FailurePolicy::StopOnFirstFailure {
                for skipped in parent.sub_jobs.iter_mut().skip(index + 1) {
                    skipped.fail("skipped after an earlier failure");
                }
                self.reporter.emit(parent);
                break;
            }
            self.reporter.emit(parent);
        }

        let failed = parent
            .sub_jobs
            .iter()
            .filter(|s| s.status != JobStatus::Completed)
            .count();
        if failed == 0 && parent.progress.percentage == 100 {
            parent.status = JobStatus::Completed;
            info!(job = %parent.id, files = count, bytes = parent.progress.loaded, "Folder transfer completed");
        } else {
            let first_error = parent.sub_jobs.iter().find_map(|s| s.error.clone());
            parent.fail(format!(
                "{} of {} files failed{}",
                failed,
                count,
                first_error.map(|e| format!(": {}", e)).unwrap_or_default()
            ));
            warn!(job = %parent.id, failed, "Folder transfer failed");
        }
        self.reporter.emit(parent);
    }

    async fn download_file(&self, job: &mut TransferJob, on_update: JobUpdate<'_>) {
        let result = self.download_chunks(job, on_update).await;
        self.settle(job, result);
        on_update(job);
    }

    async fn download_chunks(&self, job: &mut TransferJob, on_update: JobUpdate<'_>) -> BackendResult<()> {
        let mut writer = self.local.create_file(&job.local_path).await?;
        on_update(job);
        let copied = self.copy_chunks(job, &mut writer, on_update).await;
        // The file is closed on every path
        let closed = writer.shutdown().await.map_err(BackendError::from);
        copied.and(closed)
    }

    async fn copy_chunks(
        &self,
        job: &mut TransferJob,
        writer: &mut LocalWriter,
        on_update: JobUpdate<'_>,
    ) -> BackendResult<()> {
        loop {
            let start = job.progress.loaded;
            let end = start + self.chunk_size - 1;
            let chunk = self.client.get_range(&job.object, start, end).await?;

            if chunk.total > 0 && (chunk.data.is_empty() || chunk.end < start) {
                return Err(BackendError::service(
                    self.client.backend_name(),
                    format!("empty range {}-{} returned for {}", start, end, job.object),
                ));
            }
            writer.write_all(&chunk.data).await?;

            let loaded = if chunk.total == 0 { 0 } else { chunk.end + 1 };
            job.progress.set(loaded, chunk.total);
            on_update(job);

            if loaded >= chunk.total {
                return Ok(());
            }
        }
    }

    async fn upload_file(&self, job: &mut TransferJob, on_update: JobUpdate<'_>) {
        let result = self.put_file(job, on_update).await;
        self.settle(job, result);
        on_update(job);
    }

    async fn put_file(&self, job: &mut TransferJob, on_update: JobUpdate<'_>) -> BackendResult<()> {
        let total = self.local.file_size(&job.local_path).await?;
        job.progress = Progress::pending(total);
        on_update(job);

        let target = job.object.clone();
        let body = UploadBody::File(job.local_path.clone());
        {
            let mut report = |loaded: u64, total: u64| {
                job.progress.set(loaded, total);
                on_update(job);
            };
            self.client.put_object(&target, body, Some(&mut report)).await?;
        }
        job.progress.set(total, total);
        Ok(())
    }

    fn settle(&self, job: &mut TransferJob, result: BackendResult<()>) {
        match result {
            Ok(()) => {
                job.status = JobStatus::Completed;
                debug!(job = %job.id, bytes = job.progress.loaded, "Transfer completed");
            }
            Err(e) => {
                warn!(job = %job.id, object = %job.object, error = %e, "Transfer failed");
                job.fail(e);
            }
        }
    }

    fn finish_with_error(&self, job: &mut TransferJob, error: BackendError) {
        self.settle(job, Err(error));
        self.reporter.emit(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryClient;
    use crate::system::LocalSystem;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::super::events::JobEvent;

    fn manager(client: Arc<MemoryClient>) -> (TransferManager, UnboundedReceiver<JobEvent>) {
        let (reporter, rx) = JobReporter::channel();
        (
            TransferManager::new(client, Arc::new(LocalSystem), reporter),
            rx,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<JobEvent>) -> Vec<TransferJob> {
        let mut jobs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            jobs.push(event.job);
        }
        jobs
    }

    #[tokio::test]
    async fn test_chunked_download_progress() {
        let client = MemoryClient::new();
        client.insert("b", "data.bin", vec![7u8; 10]);
        let client = Arc::new(client);
        let dir = TempDir::new().unwrap();
        let (mgr, mut rx) = manager(client.clone());
        let mgr = mgr.with_chunk_size(4);

        let object = ObjectRef::from_key("memory", "b", "data.bin").with_size(10);
        let job = mgr.download(&object, &dir.path().join("data.bin")).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, Progress::new(10, 10));
        assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), vec![7u8; 10]);

        let snapshots = drain(&mut rx);
        let loaded: Vec<u64> = snapshots.iter().map(|j| j.progress.loaded).collect();
        assert_eq!(loaded, vec![0, 4, 8, 10, 10]);
        let pcts: Vec<u8> = snapshots.iter().map(|j| j.progress.percentage).collect();
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*pcts.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_zero_byte_download_completes() {
        let client = MemoryClient::new();
        client.insert("b", "empty.txt", "");
        let dir = TempDir::new().unwrap();
        let (mgr, _rx) = manager(Arc::new(client));

        let job = mgr
            .download(&ObjectRef::from_key("memory", "b", "empty.txt"), &dir.path().join("e"))
            .await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.percentage, 100);
        assert_eq!(job.progress.total, 0);
    }

    #[tokio::test]
    async fn test_missing_object_fails_job() {
        let client = Arc::new(MemoryClient::new());
        client.add_bucket("b");
        let dir = TempDir::new().unwrap();
        let (mgr, mut rx) = manager(client);

        let job = mgr
            .download(&ObjectRef::from_key("memory", "b", "gone.txt"), &dir.path().join("g"))
            .await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("not found"));
        assert_eq!(drain(&mut rx).last().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_single_file_upload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let client = Arc::new(MemoryClient::new());
        client.add_bucket("b");
        let (mgr, mut rx) = manager(client.clone());

        let job = mgr
            .upload(&ObjectRef::from_key("memory", "b", "in/hello.txt"), &path)
            .await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, Progress::new(11, 11));
        assert_eq!(client.contents("b", "in/hello.txt").unwrap().as_ref(), b"hello world");
        assert_eq!(drain(&mut rx).last().unwrap().progress.percentage, 100);
    }

    #[tokio::test]
    async fn test_pause_only_from_loading() {
        let mut job = TransferJob::new(
            ObjectRef::from_key("c", "b", "a"),
            PathBuf::from("a"),
            JobKind::Download,
        );
        assert!(job.pause());
        assert_eq!(job.status, JobStatus::Paused);
        job.status = JobStatus::Completed;
        assert!(!job.pause());
    }

    #[tokio::test]
    async fn test_sub_job_length_corrects_listed_size() {
        let client = MemoryClient::new();
        client.insert("b", "docs/a.txt", vec![1u8; 10]);
        let dir = TempDir::new().unwrap();
        let (mgr, _rx) = manager(Arc::new(client));

        let mut parent = TransferJob::new(
            ObjectRef::folder("memory", "b", "docs"),
            dir.path().join("docs"),
            JobKind::Download,
        );
        std::fs::create_dir_all(&parent.local_path).unwrap();
        // Listing reported a stale size of 20
        parent.sub_jobs = vec![TransferJob::new(
            ObjectRef::from_key("memory", "b", "docs/a.txt").with_size(20),
            parent.local_path.join("a.txt"),
            JobKind::Download,
        )];
        parent.progress = Progress::pending(20);

        mgr.run_sub_jobs(&mut parent).await;
        assert_eq!(parent.status, JobStatus::Completed);
        assert_eq!(parent.progress, Progress::new(10, 10));
    }

    #[test]
    fn test_local_target_splits_key() {
        let path = local_target(Path::new("/tmp/root"), "a/b/c.txt");
        assert_eq!(path, Path::new("/tmp/root").join("a").join("b").join("c.txt"));
    }
}
