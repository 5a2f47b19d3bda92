use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::cards::{Card, CardFilters, Transaction};
use crate::scoring::models::CardHealthScore;

/// Latest score per card, keyed by card id.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn get_health_score(&self, card_id: &str) -> Result<Option<CardHealthScore>>;

    /// Overwrites whatever is stored for `score.card_id`.
    async fn save_health_score(&self, score: &CardHealthScore) -> Result<()>;
}

/// Card lookup plus score storage. Implemented by the SQLite store and by
/// [`InMemoryCardRepository`].
#[async_trait]
pub trait CardRepository: ScoreStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Card>>;

    /// Cards in insertion order.
    async fn find_by_user_id(&self, user_id: &str, filters: &CardFilters) -> Result<Vec<Card>>;

    async fn transactions_since(
        &self,
        card_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;

    async fn insert_card(&self, card: &Card) -> Result<()>;

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    cards: Vec<Card>,
    transactions: Vec<Transaction>,
    scores: BTreeMap<String, CardHealthScore>,
}

/// Process-local repository for tests and demos.
#[derive(Default)]
pub struct InMemoryCardRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryCardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: Vec<Card>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                cards,
                ..MemoryState::default()
            }),
        }
    }
}

#[async_trait]
impl ScoreStore for InMemoryCardRepository {
    async fn get_health_score(&self, card_id: &str) -> Result<Option<CardHealthScore>> {
        Ok(self.state.read().await.scores.get(card_id).cloned())
    }

    async fn save_health_score(&self, score: &CardHealthScore) -> Result<()> {
        self.state
            .write()
            .await
            .scores
            .insert(score.card_id.clone(), score.clone());
        Ok(())
    }
}

#[async_trait]
impl CardRepository for InMemoryCardRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Card>> {
        let state = self.state.read().await;
        Ok(state.cards.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_user_id(&self, user_id: &str, filters: &CardFilters) -> Result<Vec<Card>> {
        let state = self.state.read().await;
        Ok(state
            .cards
            .iter()
            .filter(|c| c.user_id == user_id && filters.matches(c))
            .cloned()
            .collect())
    }

    async fn transactions_since(
        &self,
        card_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.card_id == card_id && t.occurred_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_card(&self, card: &Card) -> Result<()> {
        let mut state = self.state.write().await;
        if state.cards.iter().any(|c| c.id == card.id) {
            anyhow::bail!("card '{}' already exists", card.id);
        }
        state.cards.push(card.clone());
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.state
            .write()
            .await
            .transactions
            .push(transaction.clone());
        Ok(())
    }
}
