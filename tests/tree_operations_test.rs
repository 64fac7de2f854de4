//! Folder tree operations over the in-memory backend

use orbit_cloud::backend::{ErrorKind, MemoryClient, ObjectRef, StorageClient};
use orbit_cloud::core::tree::TreeOperations;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn folder_with(client: &MemoryClient, folder: &str, n: usize) {
    client.insert("b", folder, "");
    for i in 0..n {
        client.insert("b", &format!("{}item-{:03}.dat", folder, i), format!("data-{}", i));
    }
}

#[tokio::test]
async fn test_delete_issues_one_call_per_descendant_plus_marker() {
    let client = Arc::new(MemoryClient::new().with_page_size(7));
    folder_with(&client, "archive/", 23);
    client.insert("b", "keep.txt", "stay");

    let folder = ObjectRef::folder("mem", "b", "archive");
    TreeOperations::new(client.clone())
        .with_batch_size(5)
        .delete_tree(&folder)
        .await
        .unwrap();

    assert_eq!(client.stats().deletes.load(Ordering::SeqCst), 24);
    assert!(!client.exists(&folder).await.unwrap());
    assert_eq!(client.keys("b"), vec!["keep.txt".to_string()]);
}

#[tokio::test]
async fn test_batches_never_exceed_ceiling() {
    let batch = 4;
    let client = Arc::new(MemoryClient::new().with_latency(Duration::from_millis(5)));
    // 2 x batch + 1 operations including the marker
    folder_with(&client, "src/", 2 * batch);

    let tree = TreeOperations::new(client.clone()).with_batch_size(batch);
    tree.copy_tree(
        &ObjectRef::folder("mem", "b", "src"),
        &ObjectRef::folder("mem", "b", "dst"),
    )
    .await
    .unwrap();
    assert!(client.stats().max_in_flight() <= batch);
    assert_eq!(client.stats().copies.load(Ordering::SeqCst), 2 * batch + 1);

    tree.delete_tree(&ObjectRef::folder("mem", "b", "src")).await.unwrap();
    assert!(client.stats().max_in_flight() <= batch);
    assert!(client.stats().max_in_flight() > 1);
}

#[tokio::test]
async fn test_move_leaves_nothing_behind() {
    let client = Arc::new(MemoryClient::new());
    folder_with(&client, "inbox/", 3);
    client.insert("b", "inbox/nested/deep.txt", "deep");

    TreeOperations::new(client.clone())
        .move_tree(
            &ObjectRef::folder("mem", "b", "inbox"),
            &ObjectRef::folder("mem", "b", "done/inbox"),
        )
        .await
        .unwrap();

    let keys = client.keys("b");
    assert!(keys.iter().all(|k| k.starts_with("done/inbox/")), "{:?}", keys);
    assert_eq!(client.contents("b", "done/inbox/nested/deep.txt").unwrap(), "deep");
    assert_eq!(client.contents("b", "done/inbox/item-002.dat").unwrap(), "data-2");
}

#[tokio::test]
async fn test_failed_copy_keeps_completed_descendants() {
    let client = Arc::new(MemoryClient::new());
    folder_with(&client, "src/", 6);
    client.fail_on("src/item-003.dat");

    let err = TreeOperations::new(client.clone())
        .with_batch_size(2)
        .copy_tree(
            &ObjectRef::folder("mem", "b", "src"),
            &ObjectRef::folder("mem", "b", "dst"),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Service);

    // Earlier batches stay copied; later batches never start
    assert!(client.contents("b", "dst/item-000.dat").is_some());
    assert!(client.contents("b", "dst/item-005.dat").is_none());
    assert_eq!(client.keys("b").iter().filter(|k| k.starts_with("src/")).count(), 7);
}
