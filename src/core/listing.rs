//! Paginated and recursive listing
//!
//! Turns the single-page `list_page` primitive into complete listings. A
//! recursive listing is one flat walk with the delimiter disabled, never one
//! call per sub-folder.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{BackendResult, ObjectRef, StorageClient};

/// Callback receiving the cumulative entry count after each page
pub type ListProgress<'a> = &'a mut (dyn FnMut(usize) + Send);

/// Follow continuation tokens until exhausted or cancelled
///
/// The first page is always requested. `cancel` is checked between pages, so a
/// cancelled walk returns the entries gathered so far. Entries get a 1-based
/// `seq` in the order they were returned.
pub async fn list_all(
    client: &dyn StorageClient,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
    cancel: Option<&CancellationToken>,
    mut on_progress: Option<ListProgress<'_>>,
) -> BackendResult<Vec<ObjectRef>> {
    let mut entries: Vec<ObjectRef> = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client
            .list_page(bucket, prefix, token.as_deref(), delimiter)
            .await?;
        pages += 1;

        for mut entry in page.entries {
            entry.seq = entries.len() + 1;
            entries.push(entry);
        }
        if let Some(report) = on_progress.as_mut() {
            report(entries.len());
        }

        token = page.next_token;
        if token.is_none() {
            break;
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            debug!(bucket, prefix, pages, "Listing cancelled");
            break;
        }
    }

    debug!(bucket, prefix, pages, entries = entries.len(), "Listing finished");
    Ok(entries)
}

/// Every descendant of `prefix`, via one flat walk
pub async fn list_all_recursive(
    client: &dyn StorageClient,
    bucket: &str,
    prefix: &str,
    cancel: Option<&CancellationToken>,
    on_progress: Option<ListProgress<'_>>,
) -> BackendResult<Vec<ObjectRef>> {
    list_all(client, bucket, prefix, Some(""), cancel, on_progress).await
}
