//! Processor state owned by the background service.
//!
//! Nothing here is persisted. After a restart the state starts idle and
//! everything else is read back from the queue and the rate counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Paused,
}

/// Why the processor is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QueueEmpty,
    RateLimited,
    Paused,
    StorageError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorState {
    pub phase: Phase,
    pub stop_reason: Option<StopReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            stop_reason: None,
            started_at: None,
            last_error: None,
        }
    }
}

impl ProcessorState {
    pub fn is_processing(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.phase = Phase::Running;
        self.stop_reason = None;
        self.last_error = None;
        self.started_at = Some(now);
    }

    /// Mark a stop. A pause keeps the run resumable; every other reason
    /// returns to idle.
    pub fn stop(&mut self, reason: StopReason) {
        self.phase = match reason {
            StopReason::Paused => Phase::Paused,
            _ => Phase::Idle,
        };
        self.stop_reason = Some(reason);
        if self.phase == Phase::Idle {
            self.started_at = None;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.stop(StopReason::StorageError);
        self.last_error = Some(message.into());
    }
}
