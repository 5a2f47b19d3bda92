//! Card health score calculator.
//!
//! Maps raw card signals to five banded sub-scores. The bands follow
//! credit-bureau style risk thresholds rather than linear curves, so
//! crossing 30% or 70% utilization costs disproportionately more.
//!
//! ```text
//! utilization     0–30   (≤10→30, ≤30→25, ≤50→20, ≤70→10, ≤90→5, else 0)
//! payment history 0–30   round_half_up(on_time% / 100 × 30)
//! account age     0–15   (≥60mo→15, ≥36→12, ≥24→10, ≥12→7, else 3)
//! credit mix      5|10   (10 with more than one card type)
//! recent activity 0–15   (≥10 txns→15, ≥5→10, ≥1→5, else 0)
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::config::ScoringConfig;
use crate::scoring::models::{
    CardSignals, HealthScoreFactors, MAX_PAYMENT_HISTORY_SCORE, MAX_UTILIZATION_SCORE,
};

/// Utilization bands as (inclusive upper bound, score), checked in order.
const UTILIZATION_BANDS: [(Decimal, u8); 5] = [
    (dec!(10), 30),
    (dec!(30), 25),
    (dec!(50), 20),
    (dec!(70), 10),
    (dec!(90), 5),
];

/// Account age bands as (minimum months, score), checked in order.
const ACCOUNT_AGE_BANDS: [(u32, u8); 4] = [(60, 15), (36, 12), (24, 10), (12, 7)];
const MIN_ACCOUNT_AGE_SCORE: u8 = 3;

/// Recent activity bands as (minimum transactions, score), checked in order.
const ACTIVITY_BANDS: [(u32, u8); 3] = [(10, 15), (5, 10), (1, 5)];

#[derive(Debug, Clone, Copy)]
pub struct ScoreCalculator {
    non_revolving_utilization_score: u8,
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl ScoreCalculator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            non_revolving_utilization_score: config
                .non_revolving_utilization_score
                .min(MAX_UTILIZATION_SCORE),
        }
    }

    /// Compute all five factors. Pure and deterministic.
    pub fn compute(&self, signals: &CardSignals) -> HealthScoreFactors {
        let utilization_score = match signals.utilization_percent {
            Some(pct) => utilization_score(pct),
            None => self.non_revolving_utilization_score,
        };

        HealthScoreFactors {
            utilization_score,
            payment_history_score: payment_history_score(signals.on_time_payment_percent),
            account_age_score: account_age_score(signals.account_age_months),
            credit_mix_score: credit_mix_score(signals.has_multiple_card_types),
            recent_activity_score: recent_activity_score(signals.recent_transaction_count),
        }
    }
}

/// Non-increasing step function with breakpoints at 10, 30, 50, 70, 90.
pub fn utilization_score(utilization_percent: Decimal) -> u8 {
    UTILIZATION_BANDS
        .iter()
        .find(|(upper, _)| utilization_percent <= *upper)
        .map(|(_, score)| *score)
        .unwrap_or(0)
}

/// Linear in the on-time rate, rounded half-up to a whole point.
pub fn payment_history_score(on_time_payment_percent: Decimal) -> u8 {
    let pct = on_time_payment_percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    let raw = pct / Decimal::ONE_HUNDRED * Decimal::from(MAX_PAYMENT_HISTORY_SCORE);
    // Inputs are non-negative, so away-from-zero is round-half-up.
    let rounded = raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_u8().unwrap_or(MAX_PAYMENT_HISTORY_SCORE)
}

pub fn account_age_score(account_age_months: u32) -> u8 {
    ACCOUNT_AGE_BANDS
        .iter()
        .find(|(min, _)| account_age_months >= *min)
        .map(|(_, score)| *score)
        .unwrap_or(MIN_ACCOUNT_AGE_SCORE)
}

pub fn credit_mix_score(has_multiple_card_types: bool) -> u8 {
    if has_multiple_card_types {
        10
    } else {
        5
    }
}

pub fn recent_activity_score(recent_transaction_count: u32) -> u8 {
    ACTIVITY_BANDS
        .iter()
        .find(|(min, _)| recent_transaction_count >= *min)
        .map(|(_, score)| *score)
        .unwrap_or(0)
}
