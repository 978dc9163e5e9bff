//! Feeding discovered listing profiles into the queue.

use crate::channel::ServiceHandle;
use crate::error::{Result, ServiceError};
use promtitude_browser::BrowserActions;
use promtitude_db::EnqueueCandidate;
use promtitude_scanner::{DiscoveredProfile, DiscoveryWatcher};
use promtitude_scheduler::RescanSchedule;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub discovered: u32,
    pub added: u32,
    pub skipped: u32,
}

fn candidates(batch: Vec<DiscoveredProfile>) -> Vec<EnqueueCandidate> {
    batch
        .into_iter()
        .map(|p| EnqueueCandidate::new(p.url, p.name))
        .collect()
}

/// Watch the listing loaded in `page` and enqueue every profile it shows.
///
/// Runs until the rescan schedule is exhausted and `content_changed` is
/// closed. Batches go through the service so the queue has a single writer.
pub async fn watch_listing(
    handle: &ServiceHandle,
    page: &dyn BrowserActions,
    schedule: RescanSchedule,
    content_changed: mpsc::Receiver<()>,
) -> Result<DiscoveryReport> {
    let (found_tx, mut found_rx) = mpsc::channel::<Vec<DiscoveredProfile>>(8);
    let watcher = DiscoveryWatcher::new(schedule);

    let watch = watcher.run(page, content_changed, found_tx);
    let enqueue = async {
        let mut report = DiscoveryReport::default();
        while let Some(batch) = found_rx.recv().await {
            report.discovered += u32::try_from(batch.len()).unwrap_or(u32::MAX);
            let response = handle.enqueue(candidates(batch)).await?;
            report.added += response.added_count;
            report.skipped += response.skipped_count;
        }
        Ok::<_, ServiceError>(report)
    };

    let (watched, enqueued) = tokio::join!(watch, enqueue);
    let report = enqueued?;
    if let Err(e) = watched {
        tracing::warn!("Listing discovery stopped early: {}", e);
    }
    tracing::info!(
        "Discovery finished: {} found, {} queued, {} already known",
        report.discovered,
        report.added,
        report.skipped
    );
    Ok(report)
}

/// Navigate to `listing_url` and run [`watch_listing`] on the schedule only.
pub async fn discover_listing(
    handle: &ServiceHandle,
    page: &dyn BrowserActions,
    listing_url: &str,
    schedule: RescanSchedule,
) -> Result<DiscoveryReport> {
    page.navigate(listing_url).await?;
    let (changes_tx, changes_rx) = mpsc::channel(1);
    drop(changes_tx);
    watch_listing(handle, page, schedule, changes_rx).await
}
