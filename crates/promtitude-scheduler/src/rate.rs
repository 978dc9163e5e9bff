//! Fixed-window import counters.
//!
//! Each window is a trailing bucket that starts at its first recorded import
//! and resets entirely once `now` crosses `window_start + span`. Only
//! successful imports are recorded.

use chrono::{DateTime, Duration, Utc};
use promtitude_core::RateLimitConfig;
use serde::{Deserialize, Serialize};

/// Which bucket a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowSpan {
    Hourly,
    Daily,
}

impl WindowSpan {
    pub fn duration(self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::hours(24),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

/// Count of successful imports inside one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl WindowCounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Returns true if `now` has crossed the end of this window.
    pub fn is_elapsed(&self, span: WindowSpan, now: DateTime<Utc>) -> bool {
        now >= self.window_start + span.duration()
    }

    /// Count as seen at `now`; an elapsed window counts as empty.
    pub fn effective_count(&self, span: WindowSpan, now: DateTime<Utc>) -> u32 {
        if self.is_elapsed(span, now) {
            0
        } else {
            self.count
        }
    }

    fn record(&mut self, span: WindowSpan, now: DateTime<Utc>) {
        if self.is_elapsed(span, now) {
            self.count = 0;
            self.window_start = now;
        }
        self.count = self.count.saturating_add(1);
    }
}

/// Limits applied to the two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub hourly: u32,
    pub daily: u32,
}

impl From<&RateLimitConfig> for RateLimits {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            hourly: config.hourly,
            daily: config.daily,
        }
    }
}

/// Imports still allowed in each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBudget {
    pub hourly: u32,
    pub daily: u32,
}

/// Hourly and daily counters of successful imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    pub hourly: WindowCounter,
    pub daily: WindowCounter,
}

impl RateWindow {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            hourly: WindowCounter::new(now),
            daily: WindowCounter::new(now),
        }
    }

    /// True only if both windows are below their limits at `now`.
    pub fn check_ok(&self, limits: RateLimits, now: DateTime<Utc>) -> bool {
        self.hourly.effective_count(WindowSpan::Hourly, now) < limits.hourly
            && self.daily.effective_count(WindowSpan::Daily, now) < limits.daily
    }

    /// Count one successful import, rolling elapsed windows forward first.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.hourly.record(WindowSpan::Hourly, now);
        self.daily.record(WindowSpan::Daily, now);
    }

    pub fn remaining(&self, limits: RateLimits, now: DateTime<Utc>) -> RateBudget {
        RateBudget {
            hourly: limits
                .hourly
                .saturating_sub(self.hourly.effective_count(WindowSpan::Hourly, now)),
            daily: limits
                .daily
                .saturating_sub(self.daily.effective_count(WindowSpan::Daily, now)),
        }
    }

    /// When imports become possible again, or `None` if they already are.
    pub fn resumes_at(&self, limits: RateLimits, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let hourly_block = (self.hourly.effective_count(WindowSpan::Hourly, now) >= limits.hourly)
            .then(|| self.hourly.window_start + WindowSpan::Hourly.duration());
        let daily_block = (self.daily.effective_count(WindowSpan::Daily, now) >= limits.daily)
            .then(|| self.daily.window_start + WindowSpan::Daily.duration());

        match (hourly_block, daily_block) {
            (Some(h), Some(d)) => Some(h.max(d)),
            (h, d) => h.or(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    const LIMITS: RateLimits = RateLimits {
        hourly: 3,
        daily: 5,
    };

    #[test]
    fn test_hourly_limit_blocks_until_boundary() {
        let start = at("2026-02-17T12:00:00Z");
        let mut window = RateWindow::fresh(start);

        for minute in 0..3 {
            assert!(window.check_ok(LIMITS, start + Duration::minutes(minute)));
            window.record_success(start + Duration::minutes(minute));
        }

        assert!(!window.check_ok(LIMITS, at("2026-02-17T12:30:00Z")));
        assert!(!window.check_ok(LIMITS, at("2026-02-17T12:59:59Z")));
        assert!(window.check_ok(LIMITS, at("2026-02-17T13:00:00Z")));
    }

    #[test]
    fn test_window_resets_entirely_at_boundary() {
        let start = at("2026-02-17T12:00:00Z");
        let mut window = RateWindow::fresh(start);
        window.record_success(start);
        window.record_success(start + Duration::minutes(50));

        let after = at("2026-02-17T13:10:00Z");
        window.record_success(after);

        assert_eq!(window.hourly.count, 1);
        assert_eq!(window.hourly.window_start, after);
        // Daily window has not elapsed and keeps accumulating
        assert_eq!(window.daily.count, 3);
        assert_eq!(window.daily.window_start, start);
    }

    #[test]
    fn test_daily_limit_blocks_across_hours() {
        let start = at("2026-02-17T08:00:00Z");
        let mut window = RateWindow::fresh(start);

        for hour in 0..5 {
            window.record_success(start + Duration::hours(hour));
        }

        let later = at("2026-02-17T20:00:00Z");
        assert_eq!(window.hourly.effective_count(WindowSpan::Hourly, later), 0);
        assert!(!window.check_ok(LIMITS, later));
        assert!(window.check_ok(LIMITS, at("2026-02-18T08:00:00Z")));
    }

    #[test]
    fn test_remaining_budget() {
        let start = at("2026-02-17T12:00:00Z");
        let mut window = RateWindow::fresh(start);
        window.record_success(start);

        let budget = window.remaining(LIMITS, start);
        assert_eq!(budget, RateBudget { hourly: 2, daily: 4 });

        let budget = window.remaining(LIMITS, at("2026-02-19T00:00:00Z"));
        assert_eq!(budget, RateBudget { hourly: 3, daily: 5 });
    }

    #[test]
    fn test_resumes_at() {
        let start = at("2026-02-17T12:00:00Z");
        let mut window = RateWindow::fresh(start);
        assert_eq!(window.resumes_at(LIMITS, start), None);

        for _ in 0..3 {
            window.record_success(start);
        }
        assert_eq!(
            window.resumes_at(LIMITS, start),
            Some(at("2026-02-17T13:00:00Z"))
        );
    }

    #[test]
    fn test_serialization_shape() {
        let window = RateWindow::fresh(at("2026-02-17T12:00:00Z"));
        let json = serde_json::to_value(window).expect("serialize window");
        assert_eq!(json["hourly"]["count"], 0);
        assert!(json["daily"]["windowStart"].is_string());
    }
}
