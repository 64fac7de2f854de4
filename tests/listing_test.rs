//! Listing engine behaviour over the in-memory backend

use orbit_cloud::backend::{MemoryClient, StorageClient};
use orbit_cloud::core::listing::{list_all, list_all_recursive};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

fn fixture(page_size: usize) -> MemoryClient {
    let client = MemoryClient::new().with_page_size(page_size);
    client.insert("media", "photos/", "");
    client.insert("media", "photos/2023/", "");
    client.insert("media", "photos/2023/beach.jpg", "jpg-1");
    client.insert("media", "photos/2023/sunset.jpg", "jpg-22");
    client.insert("media", "photos/2024/city/night.png", "png-333");
    client.insert("media", "photos/index.html", "<html></html>");
    client.insert("media", "photos/notes.txt", "notes");
    client.insert("media", "videos/clip.mp4", "mp4");
    client
}

#[tokio::test]
async fn test_pages_are_concatenated_until_token_runs_out() {
    let client = MemoryClient::new().with_page_size(2);
    for i in 0..5 {
        client.insert("b", &format!("logs/{}.log", i), "x");
    }

    let entries = list_all(&client, "b", "logs/", None, None, None).await.unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["logs/0.log", "logs/1.log", "logs/2.log", "logs/3.log", "logs/4.log"]
    );
    // Pages of 2, 2 and 1; the last one carries no token
    assert_eq!(client.stats().list_pages.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_recursive_matches_flat_walk_of_each_folder() {
    let client = fixture(2);

    let recursive: BTreeSet<String> = list_all_recursive(&client, "media", "photos/", None, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| !e.is_folder())
        .map(|e| e.path)
        .collect();

    let mut walked = BTreeSet::new();
    let level = list_all(&client, "media", "photos/", None, None, None).await.unwrap();
    for entry in level {
        if entry.is_folder() {
            let below = list_all(&client, "media", &entry.path, Some(""), None, None)
                .await
                .unwrap();
            walked.extend(below.into_iter().filter(|e| !e.is_folder()).map(|e| e.path));
        } else {
            walked.insert(entry.path);
        }
    }

    assert_eq!(recursive, walked);
    assert_eq!(recursive.len(), 5);
}

#[tokio::test]
async fn test_folder_refs_end_with_delimiter() {
    let client = fixture(3);
    let delimiter = client.delimiter().to_string();

    let mut all = list_all(&client, "media", "", None, None, None).await.unwrap();
    all.extend(list_all(&client, "media", "photos/", None, None, None).await.unwrap());
    all.extend(list_all_recursive(&client, "media", "", None, None).await.unwrap());

    assert!(all.iter().any(|e| e.is_folder()));
    for entry in &all {
        assert_eq!(
            entry.is_folder(),
            entry.path.ends_with(&delimiter),
            "category and path disagree for {}",
            entry.path
        );
    }
}

#[tokio::test]
async fn test_one_level_listing_collapses_subfolders() {
    let client = fixture(100);
    let entries = list_all(&client, "media", "photos/", None, None, None).await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["2023", "2024", "index.html", "notes.txt"]);
}

#[tokio::test]
async fn test_cancelled_listing_stops_between_pages() {
    let client = fixture(1);
    let cancel = CancellationToken::new();
    let mut seen = Vec::new();
    let mut on_progress = |count: usize| {
        seen.push(count);
        if count >= 2 {
            cancel.cancel();
        }
    };

    let entries = list_all_recursive(&client, "media", "", Some(&cancel), Some(&mut on_progress))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(seen, vec![1, 2]);
}
