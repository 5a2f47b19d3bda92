//! Deterministic recommendations derived from a card's own factors.
//!
//! Two triggers today, both HIGH impact. Further MEDIUM/LOW bands slot in
//! as additional entries in [`rule_based_recommendations`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::cards::Card;
use crate::recommend::models::{Impact, Recommendation, RecommendationType};
use crate::scoring::models::HealthScoreFactors;

pub const LOWER_UTILIZATION_ID: &str = "lower-utilization";
pub const PAYMENT_REMINDER_ID: &str = "payment-reminder";

/// Utilization above this percentage triggers `lower-utilization`.
const UTILIZATION_WARNING_PERCENT: Decimal = dec!(30);
/// Payment history scores below this (on-time rate under ~83%) trigger `payment-reminder`.
const PAYMENT_HISTORY_WARNING_SCORE: u8 = 25;

/// Rule-based recommendations for one card, in a fixed order.
///
/// `utilization_percent` is the value the factors were scored from, not the
/// card's current balance, so the rules always agree with the score.
pub fn rule_based_recommendations(
    card: &Card,
    utilization_percent: Option<Decimal>,
    factors: &HealthScoreFactors,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if let Some(utilization) = utilization_percent {
        if utilization > UTILIZATION_WARNING_PERCENT {
            recommendations.push(Recommendation {
                id: LOWER_UTILIZATION_ID.to_string(),
                kind: RecommendationType::Warning,
                title: "Lower your credit utilization".to_string(),
                description: format!(
                    "{} is at {}% of its limit. Keeping balances under 30% of the limit \
                     is one of the fastest ways to improve your score.",
                    card.name,
                    utilization.round_dp(1).normalize()
                ),
                impact: Impact::High,
                potential_savings: None,
                action_required: Some("Pay down the balance below 30% of the limit".to_string()),
            });
        }
    }

    if factors.payment_history_score < PAYMENT_HISTORY_WARNING_SCORE {
        recommendations.push(Recommendation {
            id: PAYMENT_REMINDER_ID.to_string(),
            kind: RecommendationType::Warning,
            title: "Set up payment reminders".to_string(),
            description: format!(
                "Missed payments on {} are weighing on your score. Automatic payments \
                 or reminders keep every due date covered.",
                card.name
            ),
            impact: Impact::High,
            potential_savings: None,
            action_required: Some("Enable autopay or due-date reminders".to_string()),
        });
    }

    recommendations
}
