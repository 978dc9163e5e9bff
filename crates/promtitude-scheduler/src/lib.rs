//! Time logic for the importer: rate windows and listing re-scan schedules.

pub mod rate;
pub mod rescan;

pub use rate::{RateBudget, RateLimits, RateWindow, WindowCounter, WindowSpan};
pub use rescan::RescanSchedule;
