//! Promtitude importer entry point.
//!
//! Usage: `promtitude-importer [LISTING_URL]`. With a listing URL the page is
//! scanned for profiles first; then the queue is processed until it is empty,
//! the rate limit is reached, or Ctrl-C pauses the run.

use anyhow::Context;
use promtitude_api::{HttpSubmitter, SessionContext};
use promtitude_browser::BrowserEngine;
use promtitude_core::AppConfig;
use promtitude_db::Database;
use promtitude_importer::discover::discover_listing;
use promtitude_importer::{init_tracing, ImportService, Phase};
use promtitude_scheduler::RescanSchedule;
use std::sync::Arc;
use tracing::{info, warn};

const TOKEN_ENV: &str = "PROMTITUDE_API_TOKEN";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting Promtitude importer v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_with_env().context("failed to load configuration")?;
    let db_path = config.database_path()?;
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let browser = Arc::new(
        BrowserEngine::launch(&config.browser)
            .await
            .context("failed to launch browser")?,
    );
    let submitter = Arc::new(HttpSubmitter::new(&config.api)?);

    let mut service = ImportService::new(db, browser.clone(), submitter).with_config(&config);
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        service = service.with_session(SessionContext::new(token));
    }
    let handle = service.spawn().await?;

    if let Some(listing_url) = std::env::args().nth(1) {
        let schedule = RescanSchedule::from_millis(&config.discovery.rescan_delays_ms);
        let report = discover_listing(&handle, browser.as_ref(), &listing_url, schedule).await?;
        info!("Queued {} new profiles from {}", report.added, listing_url);
    }

    let _progress = handle.on_progress(|snapshot| {
        if let Some(item) = &snapshot.last_item {
            info!(
                "[{}/{}] {} -> {}",
                snapshot.processed, snapshot.total, item.profile_name, item.status
            );
        }
    });

    let started = handle.start().await?;
    if !started.success {
        warn!(
            "Processing not started: {}",
            started.error.unwrap_or_default()
        );
        handle.shutdown().await;
        return Ok(());
    }

    let mut progress = handle.watch_progress();
    while progress.borrow_and_update().phase == Phase::Running {
        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; pausing after the current profile");
                handle.pause().await?;
            }
        }
    }

    let status = handle.status().await?;
    info!(
        "Stopped ({:?}): {} completed, {} failed, {} pending",
        status.stop_reason, status.counts.completed, status.counts.failed, status.counts.pending
    );
    handle.shutdown().await;
    Ok(())
}
