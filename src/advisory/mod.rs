//! External advisory service contract.
//!
//! The engine only depends on [`AdvisoryGateway`]; how an implementation
//! reasons about a card is opaque to it.

pub mod claude;
pub mod gateway;
pub mod parse;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::recommend::models::Recommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// What the advisory service is told about one card.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryContext {
    pub card: Card,
    pub recent_transaction_count: u32,
    pub average_monthly_spending: Decimal,
    pub on_time_payment_percent: Decimal,
    pub account_age_months: u32,
}

/// Advisory output for one card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardAdvice {
    pub recommendations: Vec<Recommendation>,
    pub suggested_actions: Vec<String>,
    pub potential_savings: Decimal,
    pub risk_level: RiskLevel,
    pub summary: String,
}

#[async_trait]
pub trait AdvisoryGateway: Send + Sync {
    async fn get_card_recommendations(&self, context: &AdvisoryContext) -> Result<CardAdvice>;

    /// Portfolio-level narrative across all of a user's cards.
    async fn generate_summary(&self, cards: &[Card]) -> Result<String>;
}

/// Gateway used when no advisory credentials are configured: contributes
/// no recommendations and a locally generated summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAdvisoryGateway;

#[async_trait]
impl AdvisoryGateway for OfflineAdvisoryGateway {
    async fn get_card_recommendations(&self, _context: &AdvisoryContext) -> Result<CardAdvice> {
        Ok(CardAdvice {
            recommendations: Vec::new(),
            suggested_actions: Vec::new(),
            potential_savings: Decimal::ZERO,
            risk_level: RiskLevel::Low,
            summary: String::new(),
        })
    }

    async fn generate_summary(&self, cards: &[Card]) -> Result<String> {
        Ok(local_summary(cards))
    }
}

/// Plain-text portfolio summary that needs no external call.
pub fn local_summary(cards: &[Card]) -> String {
    match cards.len() {
        0 => "No cards to analyze.".to_string(),
        1 => format!("Analyzed 1 card: {}.", cards[0].name),
        n => {
            let names: Vec<&str> = cards.iter().map(|c| c.name.as_str()).collect();
            format!("Analyzed {n} cards: {}.", names.join(", "))
        }
    }
}
