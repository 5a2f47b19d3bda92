use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{HealthError, HealthResult};
use crate::scoring::models::{AggregateHealth, CardHealthScore, Trend};

/// Combine per-card scores into a portfolio view.
///
/// `overall` is the half-up rounded mean of the card scores. Trend stays
/// `stable`/0: no history of aggregate snapshots is kept to compare against.
pub fn aggregate(user_id: &str, scores: Vec<CardHealthScore>) -> HealthResult<AggregateHealth> {
    if scores.is_empty() {
        return Err(HealthError::no_cards(user_id));
    }

    let total: u32 = scores.iter().map(|s| u32::from(s.overall_score)).sum();
    let mean = Decimal::from(total) / Decimal::from(scores.len() as u64);
    let overall = mean
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u8()
        .unwrap_or(100)
        .min(100);

    Ok(AggregateHealth {
        overall,
        trend: Trend::Stable,
        trend_value: 0,
        per_card_scores: scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::models::HealthScoreFactors;
    use chrono::Utc;

    fn score(card_id: &str, overall: u8) -> CardHealthScore {
        CardHealthScore {
            card_id: card_id.to_string(),
            user_id: "u1".to_string(),
            overall_score: overall,
            factors: HealthScoreFactors {
                utilization_score: 0,
                payment_history_score: 0,
                account_age_score: 0,
                credit_mix_score: 5,
                recent_activity_score: 0,
            },
            utilization_percent: None,
            trend: Trend::Up,
            trend_value: 2,
            recommendations: Vec::new(),
            last_calculated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_is_no_cards_found() {
        let err = aggregate("u1", Vec::new()).unwrap_err();
        assert!(matches!(err, HealthError::NoCardsFound { .. }));
    }

    #[test]
    fn test_mean_of_two_cards() {
        let agg = aggregate("u1", vec![score("a", 84), score("b", 60)]).unwrap();
        assert_eq!(agg.overall, 72);
        assert_eq!(agg.per_card_scores.len(), 2);
        assert_eq!(agg.trend, Trend::Stable);
        assert_eq!(agg.trend_value, 0);
    }

    #[test]
    fn test_mean_rounds_half_up() {
        let agg = aggregate("u1", vec![score("a", 71), score("b", 72)]).unwrap();
        assert_eq!(agg.overall, 72);
        let agg = aggregate("u1", vec![score("a", 70), score("b", 70), score("c", 71)]).unwrap();
        assert_eq!(agg.overall, 70);
    }

    #[test]
    fn test_single_card_and_extremes() {
        assert_eq!(aggregate("u1", vec![score("a", 100)]).unwrap().overall, 100);
        assert_eq!(aggregate("u1", vec![score("a", 0), score("b", 0)]).unwrap().overall, 0);
    }
}
