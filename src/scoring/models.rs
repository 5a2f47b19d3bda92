use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::recommend::models::Recommendation;

pub const MAX_UTILIZATION_SCORE: u8 = 30;
pub const MAX_PAYMENT_HISTORY_SCORE: u8 = 30;
pub const MAX_ACCOUNT_AGE_SCORE: u8 = 15;
pub const MAX_CREDIT_MIX_SCORE: u8 = 10;
pub const MAX_RECENT_ACTIVITY_SCORE: u8 = 15;

/// Raw inputs to the calculator. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSignals {
    /// `None` when utilization does not apply (debit, prepaid).
    pub utilization_percent: Option<Decimal>,
    pub on_time_payment_percent: Decimal,
    pub account_age_months: u32,
    pub has_multiple_card_types: bool,
    pub recent_transaction_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScoreFactors {
    pub utilization_score: u8,
    pub payment_history_score: u8,
    pub account_age_score: u8,
    pub credit_mix_score: u8,
    pub recent_activity_score: u8,
}

impl HealthScoreFactors {
    /// Sum of all factors; bounded to 0..=100 by the per-factor maxima.
    pub fn overall_score(&self) -> u8 {
        self.utilization_score
            + self.payment_history_score
            + self.account_age_score
            + self.credit_mix_score
            + self.recent_activity_score
    }

    pub fn within_bounds(&self) -> bool {
        self.utilization_score <= MAX_UTILIZATION_SCORE
            && self.payment_history_score <= MAX_PAYMENT_HISTORY_SCORE
            && self.account_age_score <= MAX_ACCOUNT_AGE_SCORE
            && matches!(self.credit_mix_score, 5 | 10)
            && self.recent_activity_score <= MAX_RECENT_ACTIVITY_SCORE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn from_delta(delta: i16) -> Self {
        match delta {
            d if d > 0 => Self::Up,
            d if d < 0 => Self::Down,
            _ => Self::Stable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }
}

impl std::str::FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "stable" => Ok(Self::Stable),
            other => Err(format!("unknown trend '{other}'")),
        }
    }
}

/// Latest computed score for one card. Replaced wholesale on every recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardHealthScore {
    pub card_id: String,
    pub user_id: String,
    pub overall_score: u8,
    pub factors: HealthScoreFactors,
    /// Utilization the factors were computed from; `None` when it does not apply.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub utilization_percent: Option<Decimal>,
    pub trend: Trend,
    pub trend_value: i16,
    pub recommendations: Vec<Recommendation>,
    pub last_calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateHealth {
    pub overall: u8,
    pub trend: Trend,
    pub trend_value: i16,
    pub per_card_scores: Vec<CardHealthScore>,
}
