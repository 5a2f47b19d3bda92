//! Get-or-compute orchestration for card health scores.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::cards::repository::ScoreStore;
use crate::cards::Card;
use crate::error::{HealthError, HealthResult};
use crate::recommend::rules::rule_based_recommendations;
use crate::scoring::calculator::ScoreCalculator;
use crate::scoring::models::{CardHealthScore, Trend};
use crate::scoring::signals::SignalProvider;
use crate::scoring::staleness::StalenessPolicy;

pub struct ScoreService {
    store: Arc<dyn ScoreStore>,
    signals: Arc<dyn SignalProvider>,
    calculator: ScoreCalculator,
    policy: StalenessPolicy,
    /// One lock per card id currently being scored.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScoreService {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        signals: Arc<dyn SignalProvider>,
        calculator: ScoreCalculator,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            store,
            signals,
            calculator,
            policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_compute(&self, card: &Card) -> HealthResult<CardHealthScore> {
        self.get_or_compute_at(card, Utc::now()).await
    }

    /// Return the stored score for `card` unless it is missing or stale, in
    /// which case recompute, store and return a fresh one.
    ///
    /// Concurrent calls for the same card are serialized; the later caller
    /// sees the score the earlier one wrote.
    #[instrument(skip(self, card), fields(card_id = %card.id))]
    pub async fn get_or_compute_at(
        &self,
        card: &Card,
        now: DateTime<Utc>,
    ) -> HealthResult<CardHealthScore> {
        let lock = self.card_lock(&card.id).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_if_needed(card, now).await
        };
        self.release_card_lock(&card.id, lock).await;
        result
    }

    /// Scores for several cards, in the order given.
    pub async fn score_all(&self, cards: &[Card]) -> HealthResult<Vec<CardHealthScore>> {
        let now = Utc::now();
        let mut scores = Vec::with_capacity(cards.len());
        for card in cards {
            scores.push(self.get_or_compute_at(card, now).await?);
        }
        Ok(scores)
    }

    async fn refresh_if_needed(
        &self,
        card: &Card,
        now: DateTime<Utc>,
    ) -> HealthResult<CardHealthScore> {
        let existing = self
            .store
            .get_health_score(&card.id)
            .await
            .map_err(HealthError::Storage)?;

        if let Some(score) = &existing {
            if !self.policy.is_stale(score, now) {
                debug!("Using cached health score");
                return Ok(score.clone());
            }
        }

        let signals = self
            .signals
            .signals(card, now)
            .await
            .map_err(|source| HealthError::Signals {
                card_id: card.id.clone(),
                source,
            })?;
        let factors = self.calculator.compute(&signals);
        let overall_score = factors.overall_score();

        let trend_value = existing
            .as_ref()
            .map(|previous| i16::from(overall_score) - i16::from(previous.overall_score))
            .unwrap_or(0);

        let score = CardHealthScore {
            card_id: card.id.clone(),
            user_id: card.user_id.clone(),
            overall_score,
            factors,
            utilization_percent: signals.utilization_percent,
            trend: Trend::from_delta(trend_value),
            trend_value,
            recommendations: rule_based_recommendations(card, signals.utilization_percent, &factors),
            last_calculated_at: now,
        };

        self.store
            .save_health_score(&score)
            .await
            .map_err(HealthError::Storage)?;

        info!(
            overall_score,
            trend_value,
            replaced = existing.is_some(),
            "Health score recomputed"
        );

        Ok(score)
    }

    async fn card_lock(&self, card_id: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(card_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_card_lock(&self, card_id: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // The map and `lock` hold the only references when nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(card_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CardType;
    use crate::scoring::models::{CardSignals, HealthScoreFactors};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        scores: Mutex<BTreeMap<String, CardHealthScore>>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl ScoreStore for CountingStore {
        async fn get_health_score(&self, card_id: &str) -> Result<Option<CardHealthScore>> {
            Ok(self.scores.lock().await.get(card_id).cloned())
        }

        async fn save_health_score(&self, score: &CardHealthScore) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.scores
                .lock()
                .await
                .insert(score.card_id.clone(), score.clone());
            Ok(())
        }
    }

    struct FixedSignals {
        signals: CardSignals,
        calls: AtomicUsize,
    }

    impl FixedSignals {
        fn new(on_time: Decimal) -> Self {
            Self {
                signals: CardSignals {
                    utilization_percent: Some(dec!(25)),
                    on_time_payment_percent: on_time,
                    account_age_months: 30,
                    has_multiple_card_types: true,
                    recent_transaction_count: 8,
                },
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SignalProvider for FixedSignals {
        async fn signals(&self, _card: &Card, _now: DateTime<Utc>) -> Result<CardSignals> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(self.signals.clone())
        }

        async fn average_monthly_spending(&self, _card: &Card, _now: DateTime<Utc>) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }
    }

    struct FailingSignals;

    #[async_trait]
    impl SignalProvider for FailingSignals {
        async fn signals(&self, _card: &Card, _now: DateTime<Utc>) -> Result<CardSignals> {
            anyhow::bail!("analytics pipeline offline")
        }

        async fn average_monthly_spending(&self, _card: &Card, _now: DateTime<Utc>) -> Result<Decimal> {
            anyhow::bail!("analytics pipeline offline")
        }
    }

    fn card() -> Card {
        Card {
            id: "card-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Everyday".to_string(),
            issuer: None,
            card_type: CardType::Credit,
            credit_limit: Some(dec!(1000)),
            current_balance: dec!(250),
            opened_at: None,
            is_active: true,
        }
    }

    fn service(store: Arc<CountingStore>, signals: Arc<dyn SignalProvider>) -> ScoreService {
        ScoreService::new(
            store,
            signals,
            ScoreCalculator::default(),
            StalenessPolicy::default(),
        )
    }

    fn stored_score(overall: u8, at: DateTime<Utc>) -> CardHealthScore {
        CardHealthScore {
            card_id: "card-1".to_string(),
            user_id: "user-1".to_string(),
            overall_score: overall,
            factors: HealthScoreFactors {
                utilization_score: 20,
                payment_history_score: 20,
                account_age_score: 10,
                credit_mix_score: 10,
                recent_activity_score: overall.saturating_sub(60),
            },
            utilization_percent: Some(dec!(25)),
            trend: Trend::Stable,
            trend_value: 0,
            recommendations: Vec::new(),
            last_calculated_at: at,
        }
    }

    #[tokio::test]
    async fn test_miss_computes_once_and_writes_once() {
        let store = Arc::new(CountingStore::default());
        let signals = Arc::new(FixedSignals::new(dec!(95)));
        let svc = service(store.clone(), signals.clone());

        let score = svc.get_or_compute(&card()).await.unwrap();
        assert_eq!(score.overall_score, 84);
        assert_eq!(score.trend, Trend::Stable);
        assert_eq!(signals.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_hit_does_not_write() {
        let store = Arc::new(CountingStore::default());
        let now = Utc::now();
        store
            .scores
            .lock()
            .await
            .insert("card-1".to_string(), stored_score(70, now - Duration::hours(24)));
        let signals = Arc::new(FixedSignals::new(dec!(95)));
        let svc = service(store.clone(), signals.clone());

        let score = svc.get_or_compute_at(&card(), now).await.unwrap();
        assert_eq!(score.overall_score, 70);
        assert_eq!(signals.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_score_is_replaced_with_trend() {
        let store = Arc::new(CountingStore::default());
        let now = Utc::now();
        store.scores.lock().await.insert(
            "card-1".to_string(),
            stored_score(70, now - Duration::hours(25)),
        );
        let signals = Arc::new(FixedSignals::new(dec!(95)));
        let svc = service(store.clone(), signals.clone());

        let score = svc.get_or_compute_at(&card(), now).await.unwrap();
        assert_eq!(score.overall_score, 84);
        assert_eq!(score.trend, Trend::Up);
        assert_eq!(score.trend_value, 14);
        assert_eq!(score.last_calculated_at, now);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_compute_once() {
        let store = Arc::new(CountingStore::default());
        let signals = Arc::new(FixedSignals::new(dec!(95)));
        let svc = Arc::new(service(store.clone(), signals.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move { svc.get_or_compute(&card()).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().overall_score, 84);
        }
        assert_eq!(signals.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(svc.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_rule_recommendations_attached() {
        let store = Arc::new(CountingStore::default());
        let signals = Arc::new(FixedSignals::new(dec!(70)));
        let svc = service(store, signals);
        let score = svc.get_or_compute(&card()).await.unwrap();
        let ids: Vec<&str> = score.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["payment-reminder"]);
    }

    #[tokio::test]
    async fn test_rules_follow_scored_utilization() {
        // The card record says 25%; the provider reports 85%.
        let store = Arc::new(CountingStore::default());
        let mut signals = FixedSignals::new(dec!(95));
        signals.signals.utilization_percent = Some(dec!(85));
        let svc = service(store, Arc::new(signals));

        let score = svc.get_or_compute(&card()).await.unwrap();
        assert_eq!(score.utilization_percent, Some(dec!(85)));
        assert_eq!(score.factors.utilization_score, 5);
        let ids: Vec<&str> = score.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["lower-utilization"]);
    }

    #[tokio::test]
    async fn test_signal_failure_is_typed() {
        let store = Arc::new(CountingStore::default());
        let svc = service(store.clone(), Arc::new(FailingSignals));
        let err = svc.get_or_compute(&card()).await.unwrap_err();
        assert_eq!(err.kind(), "signals_unavailable");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }
}
