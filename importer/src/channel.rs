//! Message protocol between clients and the background service.
//!
//! Clients never touch the queue directly. They hold a cloneable
//! [`ServiceHandle`] and exchange [`Request`]/[`Response`] messages with the
//! single service task, either typed or as JSON tagged by `action`.

use crate::error::{ErrorResponse, Result, ServiceError};
use crate::progress::{ProgressHub, ProgressSnapshot, Subscription};
use crate::state::{Phase, StopReason};
use chrono::{DateTime, Utc};
use promtitude_api::SessionContext;
use promtitude_core::{ItemStatus, QueueItemId};
use promtitude_db::{ClearPlan, EnqueueCandidate, QueueItem, StatusCounts};
use promtitude_scheduler::RateBudget;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Confirmation capability handed to the queue store by a clear request.
pub type ClearConfirm = Box<dyn FnOnce(&ClearPlan) -> bool + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    Enqueue {
        profiles: Vec<EnqueueCandidate>,
    },
    Start,
    Pause,
    GetStatus,
    Clear {
        #[serde(default)]
        status_filter: Option<ItemStatus>,
    },
    UpdateBadge {
        count: u32,
    },
    Retry {
        #[serde(default)]
        item_ids: Option<Vec<QueueItemId>>,
    },
    ListQueue,
    SetSession {
        #[serde(default)]
        api_base_url: Option<String>,
        token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub success: bool,
    pub added_count: u32,
    pub skipped_count: u32,
    pub pending_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartResponse {
    pub fn started() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn refused(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PauseResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_processing: bool,
    pub phase: Phase,
    pub stop_reason: Option<StopReason>,
    pub counts: StatusCounts,
    pub rate_budget: RateBudget,
    /// When a rate-limited run can start again
    pub resumes_at: Option<DateTime<Utc>>,
    pub badge: u32,
    pub signed_in: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
    pub removed_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Empty acknowledgement for fire-and-forget hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub success: bool,
    pub retried_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListQueueResponse {
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Enqueue(EnqueueResponse),
    Start(StartResponse),
    Pause(PauseResponse),
    Status(StatusResponse),
    Clear(ClearResponse),
    Ack(Ack),
    Retry(RetryResponse),
    ListQueue(ListQueueResponse),
    Session(SessionResponse),
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Work items for the service task.
pub(crate) enum Command {
    Enqueue(Vec<EnqueueCandidate>, Reply<EnqueueResponse>),
    Start(Reply<StartResponse>),
    Pause(Reply<PauseResponse>),
    GetStatus(Reply<StatusResponse>),
    Clear(Option<ItemStatus>, ClearConfirm, Reply<ClearResponse>),
    UpdateBadge(u32, Reply<Ack>),
    Retry(Option<Vec<QueueItemId>>, Reply<RetryResponse>),
    ListQueue(Reply<ListQueueResponse>),
    SetSession(SessionContext, Reply<SessionResponse>),
    Shutdown,
}

/// Client side of the status channel.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
    progress: ProgressHub,
}

impl ServiceHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, progress: ProgressHub) -> Self {
        Self { commands, progress }
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ServiceError::ContextInvalidated)?;
        response.await.map_err(|_| ServiceError::ContextInvalidated)?
    }

    pub async fn enqueue(&self, profiles: Vec<EnqueueCandidate>) -> Result<EnqueueResponse> {
        self.call(|reply| Command::Enqueue(profiles, reply)).await
    }

    /// Start or resume processing. A no-op success while already running.
    pub async fn start(&self) -> Result<StartResponse> {
        self.call(Command::Start).await
    }

    /// Stop dequeuing after the in-flight item. Safe to repeat.
    pub async fn pause(&self) -> Result<PauseResponse> {
        self.call(Command::Pause).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.call(Command::GetStatus).await
    }

    /// Clear with the caller's prior confirmation.
    pub async fn clear(&self, status_filter: Option<ItemStatus>) -> Result<ClearResponse> {
        self.clear_with(status_filter, |_| true).await
    }

    /// Clear, asking `confirm` once the number of matching items is known.
    pub async fn clear_with<F>(&self, status_filter: Option<ItemStatus>, confirm: F) -> Result<ClearResponse>
    where
        F: FnOnce(&ClearPlan) -> bool + Send + 'static,
    {
        self.call(|reply| Command::Clear(status_filter, Box::new(confirm), reply))
            .await
    }

    pub async fn update_badge(&self, count: u32) -> Result<Ack> {
        self.call(|reply| Command::UpdateBadge(count, reply)).await
    }

    /// Move failed items (all, or the given ones) back to pending.
    pub async fn retry(&self, item_ids: Option<Vec<QueueItemId>>) -> Result<RetryResponse> {
        self.call(|reply| Command::Retry(item_ids, reply)).await
    }

    pub async fn list_queue(&self) -> Result<ListQueueResponse> {
        self.call(Command::ListQueue).await
    }

    pub async fn set_session(&self, session: SessionContext) -> Result<SessionResponse> {
        self.call(|reply| Command::SetSession(session, reply)).await
    }

    /// Stop the service task. Later requests fail with `ContextInvalidated`.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        self.commands.closed().await;
    }

    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        Ok(match request {
            Request::Enqueue { profiles } => Response::Enqueue(self.enqueue(profiles).await?),
            Request::Start => Response::Start(self.start().await?),
            Request::Pause => Response::Pause(self.pause().await?),
            Request::GetStatus => Response::Status(self.status().await?),
            Request::Clear { status_filter } => Response::Clear(self.clear(status_filter).await?),
            Request::UpdateBadge { count } => Response::Ack(self.update_badge(count).await?),
            Request::Retry { item_ids } => Response::Retry(self.retry(item_ids).await?),
            Request::ListQueue => Response::ListQueue(self.list_queue().await?),
            Request::SetSession {
                api_base_url,
                token,
            } => {
                let session = SessionContext {
                    api_base_url,
                    token,
                };
                Response::Session(self.set_session(session).await?)
            }
        })
    }

    /// JSON entry point: parse a request, dispatch it and render the answer
    /// or an [`ErrorResponse`].
    pub async fn handle_json(&self, message: serde_json::Value) -> serde_json::Value {
        let result = match serde_json::from_value::<Request>(message) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Err(ServiceError::InvalidRequest(e.to_string())),
        };
        let rendered = match &result {
            Ok(response) => serde_json::to_value(response),
            Err(e) => serde_json::to_value(ErrorResponse::from(e)),
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "success": false, "error": e.to_string() }))
    }

    /// Register a progress callback; it stops when the subscription drops.
    pub fn on_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProgressSnapshot) + Send + 'static,
    {
        self.progress.on_progress(callback)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.latest()
    }

    pub fn watch_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }
}
