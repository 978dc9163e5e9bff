//! Background processor draining the import queue.
//!
//! One loop runs at a time. Each iteration checks the rate limit, takes the
//! earliest pending item, imports it under a time ceiling and records the
//! outcome before publishing progress. Pause is honored between items and
//! during the inter-item delay; an item already in flight always finishes.

use crate::error::{Result, ServiceError};
use crate::progress::{ItemUpdate, ProgressHub, ProgressSnapshot};
use crate::state::{Phase, StopReason};
use chrono::Utc;
use promtitude_api::{CandidateRecord, ProfileSubmitter, SessionContext, SubmitOutcome, SubmitResponse};
use promtitude_browser::BrowserActions;
use promtitude_core::{AppConfig, FailureKind, ItemStatus};
use promtitude_db::queue::{self, ItemFailure, QueueItem};
use promtitude_db::{rate_counters, Database, DatabaseError};
use promtitude_scanner::ProfileExtractor;
use promtitude_scheduler::RateLimits;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Requested run state, written by the service and read by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunControl {
    Run,
    Pause,
}

/// Timing and limits for one processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    pub item_timeout: Duration,
    pub item_delay: Duration,
    /// Jitter applied to `item_delay`, in percent either way
    pub jitter_pct: u8,
    pub limits: RateLimits,
}

impl ProcessorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            item_timeout: config.processor.item_timeout(),
            item_delay: config.processor.item_delay(),
            jitter_pct: config.processor.delay_jitter_pct,
            limits: RateLimits::from(&config.rate_limits),
        }
    }

    /// Inter-item delay with jitter applied.
    pub fn jittered_delay(&self) -> Duration {
        let base = u64::try_from(self.item_delay.as_millis()).unwrap_or(u64::MAX);
        let spread = base * u64::from(self.jitter_pct.min(100)) / 100;
        if spread == 0 {
            return self.item_delay;
        }
        let millis = rand::thread_rng().gen_range(base - spread..=base.saturating_add(spread));
        Duration::from_millis(millis)
    }
}

/// Result of importing one item, before it is written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Imported,
    Failed(ItemFailure),
}

impl ItemOutcome {
    fn from_response(response: SubmitResponse) -> Self {
        match response.outcome {
            SubmitOutcome::Success => Self::Imported,
            SubmitOutcome::Duplicate => {
                let message = if response.detail.is_empty() {
                    "already imported".to_string()
                } else {
                    response.detail
                };
                Self::Failed(ItemFailure::new(FailureKind::Duplicate, message))
            }
            SubmitOutcome::Error => Self::Failed(ItemFailure::new(FailureKind::Failed, response.detail)),
        }
    }
}

fn describe(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Everything one run of the loop needs. Cheap to clone.
#[derive(Clone)]
pub struct Processor {
    db: Database,
    browser: Arc<dyn BrowserActions>,
    extractor: ProfileExtractor,
    submitter: Arc<dyn ProfileSubmitter>,
    session: watch::Receiver<Option<SessionContext>>,
    settings: ProcessorSettings,
    progress: ProgressHub,
}

impl Processor {
    pub fn new(
        db: Database,
        browser: Arc<dyn BrowserActions>,
        extractor: ProfileExtractor,
        submitter: Arc<dyn ProfileSubmitter>,
        session: watch::Receiver<Option<SessionContext>>,
        settings: ProcessorSettings,
        progress: ProgressHub,
    ) -> Self {
        Self {
            db,
            browser,
            extractor,
            submitter,
            session,
            settings,
            progress,
        }
    }

    /// Drain the queue until it is empty, the rate limit is hit or a pause
    /// is requested. A dropped control sender counts as a pause.
    ///
    /// # Errors
    /// Queue or rate counter storage failures abort the run; everything else
    /// is recorded on the item.
    pub async fn run(
        &self,
        control: &mut watch::Receiver<RunControl>,
    ) -> std::result::Result<StopReason, DatabaseError> {
        let mut first = true;
        loop {
            if *control.borrow_and_update() == RunControl::Pause {
                return Ok(StopReason::Paused);
            }
            if !first && !wait_unless_paused(control, self.settings.jittered_delay()).await {
                tracing::info!("Processor paused between items");
                return Ok(StopReason::Paused);
            }
            first = false;

            if let Some(reason) = self.step(control).await? {
                tracing::info!("Processor stopped: {:?}", reason);
                return Ok(reason);
            }
        }
    }

    /// Process one item; `Some` when the loop has to stop instead.
    async fn step(
        &self,
        control: &watch::Receiver<RunControl>,
    ) -> std::result::Result<Option<StopReason>, DatabaseError> {
        let pool = self.db.pool();
        let now = Utc::now();

        let window = rate_counters::load_rate_window(pool, now).await?;
        if !window.check_ok(self.settings.limits, now) {
            tracing::info!(
                "Rate limit reached; imports resume at {:?}",
                window.resumes_at(self.settings.limits, now)
            );
            return Ok(Some(StopReason::RateLimited));
        }

        let Some(item) = queue::claim_next(pool).await? else {
            return Ok(Some(StopReason::QueueEmpty));
        };
        tracing::info!("Importing {} ({})", item.profile_name, item.profile_url);

        let outcome = self.process_item(&item).await;
        let stored = match outcome {
            ItemOutcome::Imported => {
                let stored = queue::set_status(pool, &item.id, ItemStatus::Completed, None).await?;
                rate_counters::record_success(pool, Utc::now()).await?;
                stored
            }
            ItemOutcome::Failed(failure) => {
                tracing::warn!(
                    "Import of {} failed ({}): {}",
                    item.profile_url,
                    failure.kind,
                    failure.message
                );
                queue::set_status(pool, &item.id, ItemStatus::Failed, Some(failure)).await?
            }
        };

        // A pause requested mid-item must not be reported back as running
        let (phase, reason) = match *control.borrow() {
            RunControl::Run => (Phase::Running, None),
            RunControl::Pause => (Phase::Paused, Some(StopReason::Paused)),
        };
        let counts = queue::counts_by_status(pool).await?;
        self.progress.publish(
            ProgressSnapshot::new(phase, reason, counts).with_item(ItemUpdate {
                id: stored.id,
                profile_name: stored.profile_name,
                status: stored.status,
                error_kind: stored.error_kind,
                error: stored.error,
            }),
        );
        Ok(None)
    }

    /// Import one item under the per-item time ceiling.
    pub async fn process_item(&self, item: &QueueItem) -> ItemOutcome {
        let ceiling = self.settings.item_timeout;
        match tokio::time::timeout(ceiling, self.import(item)).await {
            Ok(Ok(response)) => ItemOutcome::from_response(response),
            Ok(Err(e)) => ItemOutcome::Failed(ItemFailure::new(FailureKind::Failed, e.to_string())),
            Err(_) => ItemOutcome::Failed(ItemFailure::new(
                FailureKind::Timeout,
                format!("timed out after {}", describe(ceiling)),
            )),
        }
    }

    async fn import(&self, item: &QueueItem) -> Result<SubmitResponse> {
        let session = self.session.borrow().clone().ok_or(ServiceError::NotSignedIn)?;

        self.browser.navigate(&item.profile_url).await?;
        let profile = self.extractor.extract(self.browser.as_ref()).await;
        let record = CandidateRecord::from_extracted(&profile, &item.profile_name, &item.profile_url);

        Ok(self.submitter.submit_profile(&session, &record).await?)
    }
}

/// Sleep for `delay`, returning `false` as soon as a pause is requested.
async fn wait_unless_paused(control: &mut watch::Receiver<RunControl>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        if *control.borrow_and_update() == RunControl::Pause {
            return false;
        }
        tokio::select! {
            () = &mut sleep => return true,
            changed = control.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}
