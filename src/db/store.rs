use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use crate::cards::repository::{CardRepository, ScoreStore};
use crate::cards::{Card, CardFilters, CardType, Transaction};
use crate::scoring::models::{CardHealthScore, HealthScoreFactors, Trend};

/// SQLite-backed card repository and score store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone, FromRow)]
struct CardRecord {
    id: String,
    user_id: String,
    name: String,
    issuer: Option<String>,
    card_type: String,
    credit_limit: Option<String>,
    current_balance: String,
    opened_at: Option<String>,
    is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
struct TransactionRecord {
    id: String,
    card_id: String,
    amount: String,
    occurred_at: String,
}

#[derive(Debug, Clone, FromRow)]
struct ScoreRecord {
    card_id: String,
    user_id: String,
    overall_score: i64,
    factors: String,
    utilization_percent: Option<String>,
    trend: String,
    trend_value: i64,
    recommendations: String,
    last_calculated_at: String,
}

impl Store {
    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every connection to :memory: opens its own database.
        let max_connections = if database_path == ":memory:" { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for Store {
    async fn get_health_score(&self, card_id: &str) -> Result<Option<CardHealthScore>> {
        let record = sqlx::query_as::<_, ScoreRecord>(
            "SELECT card_id, user_id, overall_score, factors, utilization_percent, trend, trend_value,
                    recommendations, last_calculated_at
             FROM card_health_scores WHERE card_id = ?",
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch health score")?;

        record.map(ScoreRecord::into_score).transpose()
    }

    async fn save_health_score(&self, score: &CardHealthScore) -> Result<()> {
        let factors = serde_json::to_string(&score.factors)?;
        let recommendations = serde_json::to_string(&score.recommendations)?;
        sqlx::query(
            "INSERT OR REPLACE INTO card_health_scores
             (card_id, user_id, overall_score, factors, utilization_percent, trend, trend_value,
              recommendations, last_calculated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&score.card_id)
        .bind(&score.user_id)
        .bind(i64::from(score.overall_score))
        .bind(&factors)
        .bind(score.utilization_percent.map(|d| d.to_string()))
        .bind(score.trend.as_str())
        .bind(i64::from(score.trend_value))
        .bind(&recommendations)
        .bind(score.last_calculated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save health score")?;
        Ok(())
    }
}

#[async_trait]
impl CardRepository for Store {
    async fn find_by_id(&self, id: &str) -> Result<Option<Card>> {
        let record = sqlx::query_as::<_, CardRecord>(
            "SELECT id, user_id, name, issuer, card_type, credit_limit, current_balance, opened_at, is_active
             FROM cards WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch card")?;

        record.map(CardRecord::into_card).transpose()
    }

    async fn find_by_user_id(&self, user_id: &str, filters: &CardFilters) -> Result<Vec<Card>> {
        let records = sqlx::query_as::<_, CardRecord>(
            "SELECT id, user_id, name, issuer, card_type, credit_limit, current_balance, opened_at, is_active
             FROM cards WHERE user_id = ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch cards by user")?;

        let mut cards = Vec::with_capacity(records.len());
        for record in records {
            let card = record.into_card()?;
            if filters.matches(&card) {
                cards.push(card);
            }
        }
        Ok(cards)
    }

    async fn transactions_since(
        &self,
        card_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        // Timestamps are always written as UTC RFC 3339, which orders lexically.
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT id, card_id, amount, occurred_at FROM transactions
             WHERE card_id = ? AND occurred_at >= ? ORDER BY occurred_at",
        )
        .bind(card_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch transactions")?;

        records
            .into_iter()
            .map(TransactionRecord::into_transaction)
            .collect()
    }

    async fn insert_card(&self, card: &Card) -> Result<()> {
        sqlx::query(
            "INSERT INTO cards (id, user_id, name, issuer, card_type, credit_limit, current_balance, opened_at, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&card.id)
        .bind(&card.user_id)
        .bind(&card.name)
        .bind(&card.issuer)
        .bind(card.card_type.as_str())
        .bind(card.credit_limit.map(|d| d.to_string()))
        .bind(card.current_balance.to_string())
        .bind(card.opened_at.map(|dt| dt.to_rfc3339()))
        .bind(card.is_active)
        .execute(&self.pool)
        .await
        .context("Failed to insert card")?;
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO transactions (id, card_id, amount, occurred_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&transaction.id)
        .bind(&transaction.card_id)
        .bind(transaction.amount.to_string())
        .bind(transaction.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert transaction")?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {value}"))
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid decimal in database: {value}"))
}

impl CardRecord {
    fn into_card(self) -> Result<Card> {
        Ok(Card {
            card_type: CardType::from_str(&self.card_type).map_err(|e| anyhow!(e))?,
            credit_limit: self.credit_limit.as_deref().map(parse_decimal).transpose()?,
            current_balance: parse_decimal(&self.current_balance)?,
            opened_at: self.opened_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            issuer: self.issuer,
            is_active: self.is_active,
        })
    }
}

impl TransactionRecord {
    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            amount: parse_decimal(&self.amount)?,
            occurred_at: parse_timestamp(&self.occurred_at)?,
            id: self.id,
            card_id: self.card_id,
        })
    }
}

impl ScoreRecord {
    fn into_score(self) -> Result<CardHealthScore> {
        let factors: HealthScoreFactors =
            serde_json::from_str(&self.factors).context("Corrupt factors column")?;
        Ok(CardHealthScore {
            overall_score: u8::try_from(self.overall_score).context("overall_score out of range")?,
            factors,
            utilization_percent: self
                .utilization_percent
                .as_deref()
                .map(parse_decimal)
                .transpose()?,
            trend: Trend::from_str(&self.trend).map_err(|e| anyhow!(e))?,
            trend_value: i16::try_from(self.trend_value).context("trend_value out of range")?,
            recommendations: serde_json::from_str(&self.recommendations)
                .context("Corrupt recommendations column")?,
            last_calculated_at: parse_timestamp(&self.last_calculated_at)?,
            card_id: self.card_id,
            user_id: self.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::models::{Impact, Recommendation, RecommendationType};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_card(id: &str, kind: CardType) -> Card {
        Card {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            name: "Travel Rewards".to_string(),
            issuer: Some("Acme Bank".to_string()),
            card_type: kind,
            credit_limit: Some(dec!(5000.00)),
            current_balance: dec!(1250.50),
            opened_at: Some(Utc::now() - Duration::days(900)),
            is_active: true,
        }
    }

    fn sample_score(card_id: &str) -> CardHealthScore {
        let factors = HealthScoreFactors {
            utilization_score: 25,
            payment_history_score: 29,
            account_age_score: 10,
            credit_mix_score: 10,
            recent_activity_score: 10,
        };
        CardHealthScore {
            card_id: card_id.to_string(),
            user_id: "user-1".to_string(),
            overall_score: factors.overall_score(),
            factors,
            utilization_percent: Some(dec!(25.01)),
            trend: Trend::Up,
            trend_value: 3,
            recommendations: vec![Recommendation {
                id: "payment-reminder".to_string(),
                kind: RecommendationType::Warning,
                title: "Set up payment reminders".to_string(),
                description: "Late payments hurt".to_string(),
                impact: Impact::High,
                potential_savings: Some(dec!(35)),
                action_required: None,
            }],
            last_calculated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_create_and_migrate() {
        let store = Store::new(":memory:").await.expect("should create store");
        let missing = store.find_by_id("nope").await.expect("query should work");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_card_insert_and_query() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.insert_card(&sample_card("c1", CardType::Credit)).await.unwrap();
        store.insert_card(&sample_card("c2", CardType::Debit)).await.unwrap();

        let card = store.find_by_id("c1").await.unwrap().expect("card exists");
        assert_eq!(card.current_balance, dec!(1250.50));
        assert_eq!(card.card_type, CardType::Credit);

        let cards = store
            .find_by_user_id("user-1", &CardFilters::default())
            .await
            .unwrap();
        let ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let debit_only = CardFilters {
            card_type: Some(CardType::Debit),
            active_only: false,
        };
        let debit = store.find_by_user_id("user-1", &debit_only).await.unwrap();
        assert_eq!(debit.len(), 1);
    }

    #[tokio::test]
    async fn test_score_round_trip_and_overwrite() {
        let store = Store::new(":memory:").await.expect("should create store");
        let score = sample_score("c1");
        store.save_health_score(&score).await.unwrap();

        let loaded = store.get_health_score("c1").await.unwrap().expect("stored");
        assert_eq!(loaded.overall_score, 84);
        assert_eq!(loaded.trend, Trend::Up);
        assert_eq!(loaded.recommendations, score.recommendations);
        assert_eq!(loaded.utilization_percent, Some(dec!(25.01)));

        let mut replacement = sample_score("c1");
        replacement.overall_score = 60;
        replacement.utilization_percent = None;
        replacement.recommendations.clear();
        store.save_health_score(&replacement).await.unwrap();
        let loaded = store.get_health_score("c1").await.unwrap().expect("stored");
        assert_eq!(loaded.overall_score, 60);
        assert!(loaded.recommendations.is_empty());
        assert_eq!(loaded.utilization_percent, None);
    }

    #[tokio::test]
    async fn test_transactions_since_filters_by_time() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.insert_card(&sample_card("c1", CardType::Credit)).await.unwrap();
        let now = Utc::now();
        for (i, days_ago) in [2, 20, 60].iter().enumerate() {
            store
                .insert_transaction(&Transaction {
                    id: format!("t{i}"),
                    card_id: "c1".to_string(),
                    amount: dec!(42.10),
                    occurred_at: now - Duration::days(*days_ago),
                })
                .await
                .unwrap();
        }
        let recent = store
            .transactions_since("c1", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].amount, dec!(42.10));
    }

    #[tokio::test]
    async fn test_transactions_since_boundary_and_subsecond_order() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.insert_card(&sample_card("c1", CardType::Credit)).await.unwrap();
        let since = Utc::now() - Duration::days(30);
        let offsets = [
            ("before", Duration::milliseconds(-1)),
            ("exact", Duration::zero()),
            ("just-after", Duration::microseconds(1)),
            ("later", Duration::days(1)),
        ];
        for (id, offset) in offsets {
            store
                .insert_transaction(&Transaction {
                    id: id.to_string(),
                    card_id: "c1".to_string(),
                    amount: dec!(5),
                    occurred_at: since + offset,
                })
                .await
                .unwrap();
        }

        let found = store.transactions_since("c1", since).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "just-after", "later"]);
    }
}
