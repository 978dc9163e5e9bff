//! Delayed re-scan schedule for lazily loaded listings.

use std::time::Duration;

/// Offsets after the initial scan at which a listing is scanned again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanSchedule {
    offsets: Vec<Duration>,
}

impl RescanSchedule {
    /// Build a schedule from millisecond offsets; duplicates are collapsed
    /// and offsets are sorted.
    pub fn from_millis(offsets_ms: &[u64]) -> Self {
        let mut offsets: Vec<Duration> = offsets_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect();
        offsets.sort();
        offsets.dedup();
        Self { offsets }
    }

    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    /// Sleep durations between consecutive scans, starting from the initial scan.
    pub fn waits(&self) -> Vec<Duration> {
        let mut previous = Duration::ZERO;
        self.offsets
            .iter()
            .map(|offset| {
                let wait = offset.saturating_sub(previous);
                previous = *offset;
                wait
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
