//! Transfer manager job tracking over the in-memory backend

use assert_fs::prelude::*;
use assert_fs::TempDir;
use orbit_cloud::backend::{MemoryClient, ObjectRef};
use orbit_cloud::core::events::{JobEvent, JobReporter};
use orbit_cloud::core::transfer::{
    FailurePolicy, JobStatus, TransferManager, EMPTY_DOWNLOAD_MESSAGE, EMPTY_UPLOAD_MESSAGE,
};
use orbit_cloud::system::LocalSystem;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn manager(client: Arc<MemoryClient>, chunk_size: u64) -> (TransferManager, UnboundedReceiver<JobEvent>) {
    let (reporter, events) = JobReporter::channel();
    let manager = TransferManager::new(client, Arc::new(LocalSystem), reporter).with_chunk_size(chunk_size);
    (manager, events)
}

fn drain(events: &mut UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn sized_folder(client: &MemoryClient) {
    client.insert("b", "data/", "");
    client.insert("b", "data/a.bin", vec![1u8; 10]);
    client.insert("b", "data/b.bin", vec![2u8; 20]);
    client.insert("b", "data/c.bin", vec![3u8; 30]);
}

#[tokio::test]
async fn test_chunked_download_percentage_is_monotonic() {
    let client = Arc::new(MemoryClient::new());
    client.insert("b", "big.bin", vec![7u8; 1000]);
    let (manager, mut events) = manager(client, 64);
    let dir = TempDir::new().unwrap();

    let object = ObjectRef::from_key("mem", "b", "big.bin").with_size(1000);
    let job = manager.download(&object, &dir.path().join("big.bin")).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.loaded, 1000);
    assert_eq!(job.progress.percentage, 100);

    let snapshots: Vec<_> = drain(&mut events).into_iter().map(|e| e.job.progress).collect();
    assert!(snapshots.windows(2).all(|w| w[0].percentage <= w[1].percentage));
    assert!(snapshots.windows(2).all(|w| w[0].loaded <= w[1].loaded));
    assert_eq!(snapshots.last().unwrap().percentage, 100);

    let mut loaded: Vec<u64> = snapshots.iter().map(|p| p.loaded).collect();
    loaded.dedup();
    // 15 full chunks of 64 plus one of 40
    assert_eq!(loaded.len(), 17);
    assert_eq!(loaded[1], 64);

    assert_eq!(std::fs::read(dir.child("big.bin").path()).unwrap(), vec![7u8; 1000]);
}

#[tokio::test]
async fn test_folder_download_aggregates_sub_jobs() {
    let client = Arc::new(MemoryClient::new());
    sized_folder(&client);
    let (manager, _events) = manager(client, 8);
    let dir = TempDir::new().unwrap();

    let job = manager
        .download(&ObjectRef::folder("mem", "b", "data"), &dir.path().join("data"))
        .await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.total, 60);
    assert_eq!(job.progress.loaded, 60);
    assert_eq!(job.progress.percentage, 100);
    assert_eq!(job.sub_jobs.len(), 3);
    assert!(job.sub_jobs.iter().all(|s| s.sub_jobs.is_empty()));

    assert_eq!(std::fs::read(dir.child("data/b.bin").path()).unwrap(), vec![2u8; 20]);
}

#[tokio::test]
async fn test_second_sub_job_failure_fails_parent() {
    let client = Arc::new(MemoryClient::new());
    sized_folder(&client);
    client.fail_on("data/b.bin");
    let (manager, _events) = manager(client, 8);
    let dir = TempDir::new().unwrap();

    let job = manager
        .download(&ObjectRef::folder("mem", "b", "data"), &dir.path().join("data"))
        .await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress.loaded, 10);
    assert_ne!(job.progress.percentage, 100);
    assert_eq!(job.sub_jobs[0].status, JobStatus::Completed);
    assert_eq!(job.sub_jobs[1].status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("injected failure"));

    // The first file stays on disk
    assert_eq!(std::fs::read(dir.child("data/a.bin").path()).unwrap(), vec![1u8; 10]);
}

#[tokio::test]
async fn test_continue_policy_runs_remaining_sub_jobs() {
    let client = Arc::new(MemoryClient::new());
    sized_folder(&client);
    client.fail_on("data/b.bin");
    let (manager, _events) = manager(client, 8);
    let manager = manager.with_failure_policy(FailurePolicy::Continue);
    let dir = TempDir::new().unwrap();

    let job = manager
        .download(&ObjectRef::folder("mem", "b", "data"), &dir.path().join("data"))
        .await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress.loaded, 40);
    assert_eq!(job.sub_jobs[2].status, JobStatus::Completed);
}

#[tokio::test]
async fn test_empty_folder_download_completes_with_message() {
    let client = Arc::new(MemoryClient::new());
    client.insert("b", "empty/", "");
    let (manager, mut events) = manager(client, 8);
    let dir = TempDir::new().unwrap();

    let job = manager
        .download(&ObjectRef::folder("mem", "b", "empty"), &dir.path().join("empty"))
        .await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.total, 0);
    assert_eq!(job.message.as_deref(), Some(EMPTY_DOWNLOAD_MESSAGE));
    assert!(drain(&mut events).iter().all(|e| e.job.status != JobStatus::Failed));
}

#[tokio::test]
async fn test_folder_upload_mirrors_local_tree() {
    let client = Arc::new(MemoryClient::new());
    client.add_bucket("b");
    let (manager, _events) = manager(client.clone(), 4);

    let dir = TempDir::new().unwrap();
    dir.child("site/index.html").write_str("<html></html>").unwrap();
    dir.child("site/css/main.css").write_str("body {}").unwrap();
    dir.child("site/empty").create_dir_all().unwrap();

    let job = manager
        .upload(&ObjectRef::folder("mem", "b", "www/site"), &dir.path().join("site"))
        .await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.sub_jobs.len(), 2);
    assert_eq!(job.progress.loaded, 20);

    let keys = client.keys("b");
    assert!(keys.contains(&"www/site/css/".to_string()));
    assert!(keys.contains(&"www/site/empty/".to_string()));
    assert_eq!(client.contents("b", "www/site/css/main.css").unwrap(), "body {}");
    assert_eq!(client.contents("b", "www/site/index.html").unwrap(), "<html></html>");
}

#[tokio::test]
async fn test_empty_local_folder_upload_completes_with_message() {
    let client = Arc::new(MemoryClient::new());
    client.add_bucket("b");
    let (manager, _events) = manager(client, 4);
    let dir = TempDir::new().unwrap();
    dir.child("nothing").create_dir_all().unwrap();

    let job = manager
        .upload(&ObjectRef::folder("mem", "b", "nothing"), &dir.path().join("nothing"))
        .await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.message.as_deref(), Some(EMPTY_UPLOAD_MESSAGE));
}

#[tokio::test]
async fn test_upload_of_only_empty_subdirectories_completes_with_message() {
    let client = Arc::new(MemoryClient::new());
    client.add_bucket("b");
    let (manager, mut events) = manager(client.clone(), 4);
    let dir = TempDir::new().unwrap();
    dir.child("top/sub").create_dir_all().unwrap();

    let job = manager
        .upload(&ObjectRef::folder("mem", "b", "top"), &dir.path().join("top"))
        .await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.error, None);
    assert_eq!(job.message.as_deref(), Some(EMPTY_UPLOAD_MESSAGE));
    assert!(client.keys("b").contains(&"top/sub/".to_string()));
    assert!(drain(&mut events).iter().all(|e| e.job.status != JobStatus::Failed));
}
