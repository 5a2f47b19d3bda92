//! Inbound query surface: the health-score and recommendations queries,
//! answered with a `{success, data}` / `{success, error, message}` envelope.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, instrument, warn};

use crate::cards::repository::CardRepository;
use crate::cards::{Card, CardFilters};
use crate::error::{HealthError, HealthResult};
use crate::recommend::engine::RecommendationEngine;
use crate::recommend::models::RecommendationsReport;
use crate::scoring::aggregate::aggregate;
use crate::scoring::models::{AggregateHealth, CardHealthScore};
use crate::scoring::service::ScoreService;

/// Response envelope shared by both queries.
#[derive(Debug, Serialize)]
pub struct QueryResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> QueryResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    /// Failure envelope. Only the error's kind and display text are exposed;
    /// the underlying cause is logged here and dropped.
    pub fn failure(err: &HealthError) -> Self {
        match err.cause_chain() {
            Some(cause) => error!(kind = err.kind(), error = %err, cause = %cause, "Query failed"),
            None => warn!(kind = err.kind(), error = %err, "Query rejected"),
        }
        Self {
            success: false,
            data: None,
            error: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }

    pub fn from_result(result: HealthResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }
}

/// Health query answer: one card's score, or the portfolio aggregate.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HealthView {
    Single(CardHealthScore),
    Aggregate(AggregateHealth),
}

pub struct HealthQueries<R> {
    repository: Arc<R>,
    scores: ScoreService,
    engine: RecommendationEngine,
}

impl<R: CardRepository> HealthQueries<R> {
    pub fn new(repository: Arc<R>, scores: ScoreService, engine: RecommendationEngine) -> Self {
        Self {
            repository,
            scores,
            engine,
        }
    }

    /// Score for `card_id`, or the aggregate over the user's active cards.
    #[instrument(skip(self))]
    pub async fn health(&self, user_id: &str, card_id: Option<&str>) -> QueryResponse<HealthView> {
        QueryResponse::from_result(self.try_health(user_id, card_id).await)
    }

    #[instrument(skip(self))]
    pub async fn recommendations(
        &self,
        user_id: &str,
        card_id: Option<&str>,
    ) -> QueryResponse<RecommendationsReport> {
        QueryResponse::from_result(self.try_recommendations(user_id, card_id).await)
    }

    pub async fn try_health(&self, user_id: &str, card_id: Option<&str>) -> HealthResult<HealthView> {
        if let Some(card_id) = card_id {
            let card = self.owned_card(user_id, card_id).await?;
            let score = self.scores.get_or_compute(&card).await?;
            return Ok(HealthView::Single(score));
        }

        let cards = self.active_cards(user_id).await?;
        let scores = self.scores.score_all(&cards).await?;
        Ok(HealthView::Aggregate(aggregate(user_id, scores)?))
    }

    pub async fn try_recommendations(
        &self,
        user_id: &str,
        card_id: Option<&str>,
    ) -> HealthResult<RecommendationsReport> {
        let cards = match card_id {
            Some(card_id) => vec![self.owned_card(user_id, card_id).await?],
            None => self.active_cards(user_id).await?,
        };
        if cards.is_empty() {
            return Err(HealthError::no_cards(user_id));
        }

        let card_scores: BTreeMap<String, CardHealthScore> = self
            .scores
            .score_all(&cards)
            .await?
            .into_iter()
            .map(|score| (score.card_id.clone(), score))
            .collect();

        self.engine.recommend(user_id, &cards, &card_scores).await
    }

    /// A card owned by someone else is reported as not found.
    async fn owned_card(&self, user_id: &str, card_id: &str) -> HealthResult<Card> {
        self.repository
            .find_by_id(card_id)
            .await
            .map_err(HealthError::Storage)?
            .filter(|card| card.user_id == user_id)
            .ok_or_else(|| HealthError::card_not_found(card_id))
    }

    async fn active_cards(&self, user_id: &str) -> HealthResult<Vec<Card>> {
        self.repository
            .find_by_user_id(user_id, &CardFilters::active())
            .await
            .map_err(HealthError::Storage)
    }
}
