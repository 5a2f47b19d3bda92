//! Portfolio recommendation engine.
//!
//! Combines rule-based recommendations with advisory-sourced ones for every
//! card, then prioritizes, deduplicates and truncates the merged list.
//! Advisory calls fan out concurrently, bounded by a semaphore, each under its
//! own timeout and all under one request deadline.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::advisory::{local_summary, AdvisoryContext, AdvisoryGateway, CardAdvice};
use crate::cards::Card;
use crate::config::{FailureMode, RecommendationConfig};
use crate::error::{HealthError, HealthResult};
use crate::recommend::merge::merge_recommendations;
use crate::recommend::models::{CardRecommendationResult, RecommendationsReport};
use crate::recommend::rules::rule_based_recommendations;
use crate::scoring::models::CardHealthScore;
use crate::scoring::signals::SignalProvider;

pub struct RecommendationEngine {
    gateway: Arc<dyn AdvisoryGateway>,
    signals: Arc<dyn SignalProvider>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(
        gateway: Arc<dyn AdvisoryGateway>,
        signals: Arc<dyn SignalProvider>,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            gateway,
            signals,
            config,
        }
    }

    /// Build the merged report for `cards`, which must all have an entry in
    /// `card_scores`. Cards are processed in the order given.
    #[instrument(skip(self, cards, card_scores), fields(cards = cards.len()))]
    pub async fn recommend(
        &self,
        user_id: &str,
        cards: &[Card],
        card_scores: &BTreeMap<String, CardHealthScore>,
    ) -> HealthResult<RecommendationsReport> {
        if cards.is_empty() {
            return Err(HealthError::no_cards(user_id));
        }
        for card in cards {
            if !card_scores.contains_key(&card.id) {
                return Err(HealthError::Signals {
                    card_id: card.id.clone(),
                    source: anyhow!("no health score supplied for card"),
                });
            }
        }

        let deadline = Instant::now() + self.config.request_deadline();
        // The first failure cancels the other branch.
        let (advice, (summary, summary_warning)) = tokio::try_join!(
            self.collect_advice(cards, deadline),
            self.portfolio_summary(cards, deadline),
        )?;

        let mut warnings = Vec::new();
        let mut combined = Vec::new();
        let mut per_card_result = BTreeMap::new();
        let mut total_potential_savings = Decimal::ZERO;

        for (card, outcome) in cards.iter().zip(advice) {
            let score = &card_scores[&card.id];
            let mut recommendations =
                rule_based_recommendations(card, score.utilization_percent, &score.factors);

            let result = match outcome {
                Ok(advice) => {
                    recommendations.extend(advice.recommendations);
                    // Summed per card as reported; the same saving on two cards counts twice.
                    total_potential_savings += advice.potential_savings;
                    CardRecommendationResult {
                        card_id: card.id.clone(),
                        card_name: card.name.clone(),
                        health_score: score.overall_score,
                        recommendations: recommendations.clone(),
                        suggested_actions: advice.suggested_actions,
                        potential_savings: advice.potential_savings,
                        risk_level: Some(advice.risk_level),
                        summary: Some(advice.summary),
                    }
                }
                Err(e) => {
                    warnings.push(format!(
                        "Advisory recommendations unavailable for card '{}' ({})",
                        card.id,
                        e.kind()
                    ));
                    CardRecommendationResult {
                        card_id: card.id.clone(),
                        card_name: card.name.clone(),
                        health_score: score.overall_score,
                        recommendations: recommendations.clone(),
                        suggested_actions: Vec::new(),
                        potential_savings: Decimal::ZERO,
                        risk_level: None,
                        summary: None,
                    }
                }
            };

            combined.extend(recommendations);
            per_card_result.insert(card.id.clone(), result);
        }

        if let Some(warning) = summary_warning {
            warnings.push(warning);
        }

        let candidates = combined.len();
        let recommendations = merge_recommendations(combined, self.config.max_results);

        info!(
            candidates,
            returned = recommendations.len(),
            total_potential_savings = %total_potential_savings,
            warnings = warnings.len(),
            "Recommendations merged"
        );

        Ok(RecommendationsReport {
            recommendations,
            per_card_result,
            summary,
            total_potential_savings,
            warnings,
        })
    }

    /// Advisory outcome per card, in card order. In abort mode the first
    /// failure is returned as the error; in partial mode failures are kept
    /// per card.
    async fn collect_advice(
        &self,
        cards: &[Card],
        deadline: Instant,
    ) -> HealthResult<Vec<HealthResult<CardAdvice>>> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_calls.max(1)));
        let call_timeout = self.config.call_timeout();
        let mut tasks = JoinSet::new();

        for (index, card) in cards.iter().cloned().enumerate() {
            let permits = permits.clone();
            let gateway = self.gateway.clone();
            let signals = self.signals.clone();
            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        let call = advise_card(gateway, signals, &card);
                        match tokio::time::timeout(call_timeout, call).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(HealthError::Advisory {
                                card_id: Some(card.id.clone()),
                                source: anyhow!("advisory call timed out after {call_timeout:?}"),
                            }),
                        }
                    }
                    Err(e) => Err(HealthError::Advisory {
                        card_id: Some(card.id.clone()),
                        source: anyhow!(e),
                    }),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<HealthResult<CardAdvice>>> =
            std::iter::repeat_with(|| None).take(cards.len()).collect();

        loop {
            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = tasks.len(), "Recommendation deadline exceeded");
                    if self.config.failure_mode == FailureMode::Abort {
                        return Err(HealthError::DeadlineExceeded);
                    }
                    tasks.abort_all();
                    break;
                }
            };

            let (index, outcome) = joined.map_err(|e| HealthError::Advisory {
                card_id: None,
                source: anyhow!(e).context("advisory task failed"),
            })?;

            if let Err(e) = &outcome {
                let cause = e.cause_chain().unwrap_or_default();
                warn!(card_id = %cards[index].id, error = %e, cause = %cause, "Card advice failed");
            }
            match outcome {
                Err(e) if self.config.failure_mode == FailureMode::Abort => return Err(e),
                outcome => outcomes[index] = Some(outcome),
            }
        }

        Ok(outcomes
            .into_iter()
            .zip(cards)
            .map(|(outcome, card)| {
                outcome.unwrap_or_else(|| {
                    Err(HealthError::Advisory {
                        card_id: Some(card.id.clone()),
                        source: anyhow!("request deadline exceeded before advice arrived"),
                    })
                })
            })
            .collect())
    }

    /// Portfolio summary plus an optional warning when a fallback was used.
    async fn portfolio_summary(
        &self,
        cards: &[Card],
        deadline: Instant,
    ) -> HealthResult<(String, Option<String>)> {
        let call_deadline = deadline.min(Instant::now() + self.config.call_timeout());
        let call = self.gateway.generate_summary(cards);
        let failure = match tokio::time::timeout_at(call_deadline, call).await {
            Ok(Ok(summary)) => return Ok((summary, None)),
            Ok(Err(e)) => e,
            Err(_) => anyhow!("summary call timed out"),
        };

        let cause = format!("{failure:#}");
        warn!(error = %cause, "Portfolio summary failed");
        match self.config.failure_mode {
            FailureMode::Abort => Err(HealthError::Advisory {
                card_id: None,
                source: failure,
            }),
            FailureMode::Partial => Ok((
                local_summary(cards),
                Some("Advisory summary unavailable; showing a basic summary".to_string()),
            )),
        }
    }
}

async fn advise_card(
    gateway: Arc<dyn AdvisoryGateway>,
    signals: Arc<dyn SignalProvider>,
    card: &Card,
) -> HealthResult<CardAdvice> {
    let now = Utc::now();
    let signal_error = |source| HealthError::Signals {
        card_id: card.id.clone(),
        source,
    };
    let card_signals = signals.signals(card, now).await.map_err(signal_error)?;
    let average_monthly_spending = signals
        .average_monthly_spending(card, now)
        .await
        .map_err(signal_error)?;

    let context = AdvisoryContext {
        card: card.clone(),
        recent_transaction_count: card_signals.recent_transaction_count,
        average_monthly_spending,
        on_time_payment_percent: card_signals.on_time_payment_percent,
        account_age_months: card_signals.account_age_months,
    };

    gateway
        .get_card_recommendations(&context)
        .await
        .map_err(|source| HealthError::Advisory {
            card_id: Some(card.id.clone()),
            source,
        })
}
