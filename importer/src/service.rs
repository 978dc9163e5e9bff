//! The background context: one task owning queue, rate counters,
//! processor state and session.
//!
//! All mutation funnels through this task, so two clients can never race
//! on the queue. The processor loop is spawned from here and reports back
//! when it stops; a generation counter discards reports from loops that
//! were superseded.

use crate::channel::{
    Ack, ClearConfirm, ClearResponse, Command, EnqueueResponse, ListQueueResponse, PauseResponse,
    RetryResponse, ServiceHandle, SessionResponse, StartResponse, StatusResponse,
};
use crate::error::Result;
use crate::processor::{Processor, ProcessorSettings, RunControl};
use crate::progress::{ProgressHub, ProgressSnapshot};
use crate::state::{Phase, ProcessorState, StopReason};
use chrono::Utc;
use promtitude_api::{ProfileSubmitter, SessionContext};
use promtitude_browser::BrowserActions;
use promtitude_core::{AppConfig, ItemStatus, QueueItemId};
use promtitude_db::{
    queue, rate_counters, settings, ClearOutcome, Database, DatabaseError, EnqueueCandidate,
    StatusCounts,
};
use promtitude_scanner::ProfileExtractor;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 32;

/// Report sent by a processor loop when it stops.
#[derive(Debug)]
struct RunFinished {
    generation: u64,
    result: std::result::Result<StopReason, DatabaseError>,
}

/// Builds and spawns the background service.
pub struct ImportService {
    db: Database,
    browser: Arc<dyn BrowserActions>,
    submitter: Arc<dyn ProfileSubmitter>,
    extractor: ProfileExtractor,
    settings: ProcessorSettings,
    session: Option<SessionContext>,
}

impl ImportService {
    pub fn new(
        db: Database,
        browser: Arc<dyn BrowserActions>,
        submitter: Arc<dyn ProfileSubmitter>,
    ) -> Self {
        Self {
            db,
            browser,
            submitter,
            extractor: ProfileExtractor::default(),
            settings: ProcessorSettings::from_config(&AppConfig::default()),
            session: None,
        }
    }

    /// Take extraction and processor settings from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.extractor = ProfileExtractor::new(&config.extraction);
        self.settings = ProcessorSettings::from_config(config);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ProcessorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: ProfileExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Session to use when none is stored yet.
    #[must_use]
    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    /// Migrate the database, recover interrupted items, load the stored
    /// session and start the service task.
    ///
    /// # Errors
    /// Returns error if migrations fail or the queue or settings cannot be read.
    pub async fn spawn(self) -> Result<ServiceHandle> {
        self.db.run_migrations().await?;
        let pool = self.db.pool();

        let recovered = queue::recover_interrupted(pool).await?;
        if recovered > 0 {
            tracing::warn!("Returned {} interrupted items to pending", recovered);
        }

        let stored: Option<SessionContext> = settings::fetch(pool, SessionContext::SETTINGS_KEY).await?;
        let session = stored.or(self.session);

        let progress = ProgressHub::new();
        let counts = queue::counts_by_status(pool).await?;
        progress.publish(ProgressSnapshot::new(Phase::Idle, None, counts));

        let (control, _) = watch::channel(RunControl::Pause);
        let (session, session_rx) = watch::channel(session);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        let processor = Processor::new(
            self.db.clone(),
            self.browser,
            self.extractor,
            self.submitter,
            session_rx,
            self.settings,
            progress.clone(),
        );

        let context = BackgroundContext {
            db: self.db,
            processor,
            settings: self.settings,
            control,
            session,
            state: ProcessorState::default(),
            badge: 0,
            progress: progress.clone(),
            generation: 0,
            run: None,
            finished: finished_tx,
        };

        tokio::spawn(context.run(commands_rx, finished_rx));
        tracing::info!("Import service started");
        Ok(ServiceHandle::new(commands_tx, progress))
    }
}

struct BackgroundContext {
    db: Database,
    processor: Processor,
    settings: ProcessorSettings,
    control: watch::Sender<RunControl>,
    session: watch::Sender<Option<SessionContext>>,
    state: ProcessorState,
    badge: u32,
    progress: ProgressHub,
    generation: u64,
    run: Option<JoinHandle<()>>,
    finished: mpsc::UnboundedSender<RunFinished>,
}

impl BackgroundContext {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut finished: mpsc::UnboundedReceiver<RunFinished>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                Some(report) = finished.recv() => self.on_run_finished(report).await,
            }
        }

        drop(commands);
        self.control.send_replace(RunControl::Pause);
        if let Some(run) = self.run.take() {
            if let Err(e) = run.await {
                tracing::warn!("Processor task ended abnormally: {}", e);
            }
        }
        tracing::info!("Import service stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue(profiles, reply) => {
                let _ = reply.send(self.enqueue(profiles).await);
            }
            Command::Start(reply) => {
                let _ = reply.send(self.start().await);
            }
            Command::Pause(reply) => {
                let _ = reply.send(Ok(self.pause().await));
            }
            Command::GetStatus(reply) => {
                let _ = reply.send(self.status().await);
            }
            Command::Clear(filter, confirm, reply) => {
                let _ = reply.send(self.clear(filter, confirm).await);
            }
            Command::UpdateBadge(count, reply) => {
                tracing::debug!("Badge count set to {}", count);
                self.badge = count;
                let _ = reply.send(Ok(Ack {}));
            }
            Command::Retry(ids, reply) => {
                let _ = reply.send(self.retry(ids).await);
            }
            Command::ListQueue(reply) => {
                let items = queue::list_all(self.db.pool()).await;
                let _ = reply.send(
                    items
                        .map(|items| ListQueueResponse { items })
                        .map_err(Into::into),
                );
            }
            Command::SetSession(session, reply) => {
                let _ = reply.send(self.set_session(session).await);
            }
            Command::Shutdown => {}
        }
    }

    async fn enqueue(&mut self, profiles: Vec<EnqueueCandidate>) -> Result<EnqueueResponse> {
        let report = queue::enqueue_many(self.db.pool(), &profiles).await?;
        let counts = queue::counts_by_status(self.db.pool()).await?;
        tracing::info!(
            "Enqueued {} profiles ({} skipped, {} pending)",
            report.added,
            report.skipped,
            counts.pending
        );
        self.publish(counts);
        Ok(EnqueueResponse {
            success: true,
            added_count: report.added,
            skipped_count: report.skipped,
            pending_count: counts.pending,
        })
    }

    async fn start(&mut self) -> Result<StartResponse> {
        if self.state.is_processing() {
            return Ok(StartResponse::started());
        }
        if self.session.borrow().is_none() {
            return Ok(StartResponse::refused("not signed in: set an API session first"));
        }

        let pool = self.db.pool();
        let counts = queue::counts_by_status(pool).await?;
        if counts.pending == 0 {
            return Ok(StartResponse::refused("no pending profiles in queue"));
        }

        let now = Utc::now();
        let window = rate_counters::load_rate_window(pool, now).await?;
        if !window.check_ok(self.settings.limits, now) {
            self.state.stop(StopReason::RateLimited);
            self.publish(counts);
            let message = match window.resumes_at(self.settings.limits, now) {
                Some(at) => format!("rate limit reached; try again after {}", at.to_rfc3339()),
                None => "rate limit reached".to_string(),
            };
            return Ok(StartResponse::refused(message));
        }

        self.state.start(now);
        self.control.send_replace(RunControl::Run);
        let running = self.run.as_ref().is_some_and(|run| !run.is_finished());
        if !running {
            self.spawn_run();
        }
        self.publish(counts);
        Ok(StartResponse::started())
    }

    async fn pause(&mut self) -> PauseResponse {
        self.control.send_replace(RunControl::Pause);
        if self.state.is_processing() {
            tracing::info!("Pause requested");
            self.state.stop(StopReason::Paused);
            if let Ok(counts) = queue::counts_by_status(self.db.pool()).await {
                self.publish(counts);
            }
        }
        PauseResponse { success: true }
    }

    async fn status(&self) -> Result<StatusResponse> {
        let pool = self.db.pool();
        let now = Utc::now();
        let counts = queue::counts_by_status(pool).await?;
        let window = rate_counters::load_rate_window(pool, now).await?;

        Ok(StatusResponse {
            is_processing: self.state.is_processing(),
            phase: self.state.phase,
            stop_reason: self.state.stop_reason,
            counts,
            rate_budget: window.remaining(self.settings.limits, now),
            resumes_at: window.resumes_at(self.settings.limits, now),
            badge: self.badge,
            signed_in: self.session.borrow().is_some(),
            last_error: self.state.last_error.clone(),
        })
    }

    async fn clear(&mut self, filter: Option<ItemStatus>, confirm: ClearConfirm) -> Result<ClearResponse> {
        let response = match queue::clear(self.db.pool(), filter, confirm).await {
            Ok(ClearOutcome::Removed(removed)) => {
                tracing::info!("Cleared {} queue items (filter: {:?})", removed, filter);
                ClearResponse {
                    success: true,
                    removed_count: removed,
                    error: None,
                }
            }
            Ok(ClearOutcome::Declined) => ClearResponse {
                success: false,
                removed_count: 0,
                error: Some("clear was not confirmed".to_string()),
            },
            Err(DatabaseError::ClearRefused(message)) => ClearResponse {
                success: false,
                removed_count: 0,
                error: Some(message),
            },
            Err(e) => return Err(e.into()),
        };

        let counts = queue::counts_by_status(self.db.pool()).await?;
        self.publish(counts);
        Ok(response)
    }

    async fn retry(&mut self, ids: Option<Vec<QueueItemId>>) -> Result<RetryResponse> {
        let retried = queue::retry_failed(self.db.pool(), ids.as_deref()).await?;
        let counts = queue::counts_by_status(self.db.pool()).await?;
        self.publish(counts);
        Ok(RetryResponse {
            success: true,
            retried_count: retried,
        })
    }

    async fn set_session(&mut self, session: SessionContext) -> Result<SessionResponse> {
        settings::put(self.db.pool(), SessionContext::SETTINGS_KEY, &session).await?;
        tracing::info!("API session updated");
        self.session.send_replace(Some(session));
        Ok(SessionResponse { success: true })
    }

    fn spawn_run(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let processor = self.processor.clone();
        let mut control = self.control.subscribe();
        let finished = self.finished.clone();

        tracing::info!("Starting processor run {}", generation);
        self.run = Some(tokio::spawn(async move {
            let result = processor.run(&mut control).await;
            let _ = finished.send(RunFinished { generation, result });
        }));
    }

    async fn on_run_finished(&mut self, report: RunFinished) {
        if report.generation != self.generation {
            return;
        }

        match report.result {
            // Resumed while the previous loop was winding down after a pause.
            Ok(StopReason::Paused) if *self.control.borrow() == RunControl::Run => {
                self.spawn_run();
                return;
            }
            Ok(reason) => self.state.stop(reason),
            Err(e) => {
                tracing::error!("Processor run aborted by storage failure: {}", e);
                self.control.send_replace(RunControl::Pause);
                self.state.fail(e.to_string());
            }
        }

        match queue::counts_by_status(self.db.pool()).await {
            Ok(counts) => self.publish(counts),
            Err(e) => tracing::warn!("Failed to read queue counts: {}", e),
        }
    }

    fn publish(&self, counts: StatusCounts) {
        self.progress.publish(ProgressSnapshot::new(
            self.state.phase,
            self.state.stop_reason,
            counts,
        ));
    }
}
