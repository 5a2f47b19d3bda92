use chrono::{DateTime, Duration, Utc};

use crate::scoring::models::CardHealthScore;

pub const DEFAULT_STALENESS_HOURS: i64 = 24;

/// Decides when a stored score has aged out and must be recomputed.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_STALENESS_HOURS))
    }
}

impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Stale only when strictly older than the threshold; a score exactly
    /// `threshold` old is still fresh.
    pub fn is_stale(&self, score: &CardHealthScore, now: DateTime<Utc>) -> bool {
        now - score.last_calculated_at > self.threshold
    }
}
