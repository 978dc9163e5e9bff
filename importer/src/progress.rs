//! Progress fan-out to connected clients.
//!
//! Every change is broadcast to subscribers, and the latest snapshot is kept
//! in a watch channel so a client that connects mid-run can render at once.

use crate::state::{Phase, StopReason};
use promtitude_core::{FailureKind, ItemStatus, QueueItemId};
use promtitude_db::StatusCounts;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 64;

/// Terminal state reached by one queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub id: QueueItemId,
    pub profile_name: String,
    pub status: ItemStatus,
    pub error_kind: Option<FailureKind>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub stop_reason: Option<StopReason>,
    /// Items that reached `completed` or `failed`
    pub processed: u32,
    pub total: u32,
    pub counts: StatusCounts,
    pub last_item: Option<ItemUpdate>,
}

impl ProgressSnapshot {
    pub fn new(phase: Phase, stop_reason: Option<StopReason>, counts: StatusCounts) -> Self {
        Self {
            phase,
            stop_reason,
            processed: counts.completed + counts.failed,
            total: counts.total(),
            counts,
            last_item: None,
        }
    }

    #[must_use]
    pub fn with_item(mut self, item: ItemUpdate) -> Self {
        self.last_item = Some(item);
        self
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::new(Phase::Idle, None, StatusCounts::default())
    }
}

/// Cloneable publisher and subscription point for progress.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    events: broadcast::Sender<ProgressSnapshot>,
    latest: watch::Sender<ProgressSnapshot>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (latest, _) = watch::channel(ProgressSnapshot::default());
        Self { events, latest }
    }

    /// Publish a snapshot. No-op for the broadcast side if nobody listens.
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        self.latest.send_replace(snapshot.clone());
        let _ = self.events.send(snapshot);
    }

    pub fn latest(&self) -> ProgressSnapshot {
        self.latest.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ProgressSnapshot> {
        self.latest.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.events.subscribe()
    }

    /// Call `callback` for every published snapshot until the returned
    /// [`Subscription`] is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProgressSnapshot) + Send + 'static,
    {
        let mut events = self.events.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(snapshot) => callback(&snapshot),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!("Progress subscriber skipped {} updates", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { task }
    }
}

/// Live progress callback registration; unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
