use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::advisory::claude::ClaudeClient;
use crate::advisory::parse::{
    card_system_prompt, card_user_prompt, parse_card_advice, sanitize_text, summary_system_prompt,
    summary_user_prompt,
};
use crate::advisory::{AdvisoryContext, AdvisoryGateway, CardAdvice};
use crate::cards::Card;

/// Advisory gateway backed by the Claude Messages API.
pub struct ClaudeAdvisoryGateway {
    claude: ClaudeClient,
}

impl ClaudeAdvisoryGateway {
    pub fn new(claude: ClaudeClient) -> Self {
        Self { claude }
    }
}

#[async_trait]
impl AdvisoryGateway for ClaudeAdvisoryGateway {
    #[instrument(skip(self, context), fields(card_id = %context.card.id))]
    async fn get_card_recommendations(&self, context: &AdvisoryContext) -> Result<CardAdvice> {
        let text = self
            .claude
            .complete(&card_system_prompt(), &card_user_prompt(context))
            .await
            .context("Claude card advice call failed")?;

        let advice = parse_card_advice(&text, &context.card.id)
            .context("Failed to parse Claude card advice")?;

        info!(
            recommendations = advice.recommendations.len(),
            potential_savings = %advice.potential_savings,
            risk_level = ?advice.risk_level,
            "Card advice received"
        );

        Ok(advice)
    }

    #[instrument(skip(self, cards), fields(cards = cards.len()))]
    async fn generate_summary(&self, cards: &[Card]) -> Result<String> {
        let text = self
            .claude
            .complete(&summary_system_prompt(), &summary_user_prompt(cards))
            .await
            .context("Claude summary call failed")?;

        let summary = sanitize_text(&text);
        if summary.is_empty() {
            bail!("Claude returned an empty portfolio summary");
        }
        Ok(summary)
    }
}
