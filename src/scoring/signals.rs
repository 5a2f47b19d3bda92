//! Sources of the raw signals fed to the calculator.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::cards::repository::CardRepository;
use crate::cards::{Card, CardFilters, Transaction};
use crate::config::SignalsConfig;
use crate::scoring::models::CardSignals;

/// Supplies calculator inputs for a card. Swappable so a real analytics
/// pipeline can replace the repository-backed defaults.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn signals(&self, card: &Card, now: DateTime<Utc>) -> Result<CardSignals>;

    /// Average spend per 30-day month over the provider's spending window.
    async fn average_monthly_spending(&self, card: &Card, now: DateTime<Utc>) -> Result<Decimal>;
}

/// Derives signals from the card record and its stored transactions.
///
/// Payment history is not tracked anywhere, so the on-time rate is the
/// configured default. Account age falls back to the default when the
/// card has no open date.
pub struct RepositorySignalProvider<R> {
    repository: Arc<R>,
    config: SignalsConfig,
}

impl<R: CardRepository> RepositorySignalProvider<R> {
    pub fn new(repository: Arc<R>, config: SignalsConfig) -> Self {
        Self { repository, config }
    }
}

#[async_trait]
impl<R: CardRepository + 'static> SignalProvider for RepositorySignalProvider<R> {
    async fn signals(&self, card: &Card, now: DateTime<Utc>) -> Result<CardSignals> {
        let since = now - Duration::days(self.config.recent_activity_days);
        let recent = self.repository.transactions_since(&card.id, since).await?;

        let user_cards = self
            .repository
            .find_by_user_id(&card.user_id, &CardFilters::default())
            .await?;
        let card_types: BTreeSet<_> = user_cards
            .iter()
            .map(|c| c.card_type)
            .chain(std::iter::once(card.card_type))
            .collect();

        Ok(CardSignals {
            utilization_percent: card.utilization_percent(),
            on_time_payment_percent: self.config.default_on_time_payment_percent,
            account_age_months: card
                .account_age_months(now)
                .unwrap_or(self.config.default_account_age_months),
            has_multiple_card_types: card_types.len() > 1,
            recent_transaction_count: u32::try_from(recent.len()).unwrap_or(u32::MAX),
        })
    }

    async fn average_monthly_spending(&self, card: &Card, now: DateTime<Utc>) -> Result<Decimal> {
        let window_days = self.config.spending_window_days.max(1);
        let since = now - Duration::days(window_days);
        let transactions = self.repository.transactions_since(&card.id, since).await?;
        Ok(monthly_average(&transactions, window_days))
    }
}

/// Total spend scaled to a 30-day month. Refunds (negative amounts) are ignored.
pub fn monthly_average(transactions: &[Transaction], window_days: i64) -> Decimal {
    if window_days <= 0 {
        return Decimal::ZERO;
    }
    let total: Decimal = transactions
        .iter()
        .map(|t| t.amount)
        .filter(|amount| *amount > Decimal::ZERO)
        .sum();
    (total * Decimal::from(30) / Decimal::from(window_days)).round_dp(2)
}
