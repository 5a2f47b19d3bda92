//! Command-line surface: seed cards and transactions, run both queries.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::advisory::claude::ClaudeClient;
use crate::advisory::gateway::ClaudeAdvisoryGateway;
use crate::advisory::{AdvisoryGateway, OfflineAdvisoryGateway};
use crate::cards::repository::CardRepository;
use crate::cards::{Card, CardType, Transaction};
use crate::config::{AppConfig, Secrets};
use crate::db::store::Store;
use crate::error::{HealthError, HealthResult};
use crate::queries::{HealthQueries, QueryResponse};
use crate::recommend::engine::RecommendationEngine;
use crate::scoring::calculator::ScoreCalculator;
use crate::scoring::service::ScoreService;
use crate::scoring::signals::RepositorySignalProvider;
use crate::scoring::staleness::StalenessPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "card-health",
    about = "Score payment cards and recommend how to improve them",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a card for a user
    AddCard(AddCardArgs),
    /// Record a transaction against a card
    AddTransaction(AddTransactionArgs),
    /// Health score for one card, or the aggregate across a user's cards
    Health(QueryArgs),
    /// Merged recommendations for one card or all of a user's cards
    Recommend(QueryArgs),
}

#[derive(Args, Debug)]
pub struct AddCardArgs {
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub name: String,
    #[arg(long = "type")]
    pub card_type: CardType,
    /// Credit limit; only meaningful for credit cards
    #[arg(long)]
    pub limit: Option<Decimal>,
    #[arg(long, default_value = "0")]
    pub balance: Decimal,
    /// Account open date, YYYY-MM-DD
    #[arg(long)]
    pub opened: Option<NaiveDate>,
    #[arg(long)]
    pub issuer: Option<String>,
}

#[derive(Args, Debug)]
pub struct AddTransactionArgs {
    #[arg(long)]
    pub card: String,
    #[arg(long, allow_negative_numbers = true)]
    pub amount: Decimal,
    /// RFC 3339 timestamp; defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub card: Option<String>,
}

/// Execute `cli` against the configured database and return the JSON envelope.
pub async fn run(cli: Cli, config: &AppConfig, secrets: Secrets) -> Result<Value> {
    let store = Arc::new(Store::new(&config.database.path).await?);

    let response = match cli.command {
        Command::AddCard(args) => to_json(add_card(store.as_ref(), args).await)?,
        Command::AddTransaction(args) => to_json(add_transaction(store.as_ref(), args).await)?,
        Command::Health(args) => {
            let queries = build_queries(store, config, secrets)?;
            serde_json::to_value(queries.health(&args.user, args.card.as_deref()).await)?
        }
        Command::Recommend(args) => {
            let queries = build_queries(store, config, secrets)?;
            serde_json::to_value(queries.recommendations(&args.user, args.card.as_deref()).await)?
        }
    };
    Ok(response)
}

/// Wire the query facade over `repository`. The Claude gateway is used
/// when an API key is present, the offline gateway otherwise.
pub fn build_queries<R: CardRepository + 'static>(
    repository: Arc<R>,
    config: &AppConfig,
    secrets: Secrets,
) -> Result<HealthQueries<R>> {
    let gateway: Arc<dyn AdvisoryGateway> = match secrets.anthropic_api_key {
        Some(api_key) => {
            let claude = ClaudeClient::new(
                api_key,
                &config.advisory,
                &config.rate_limit,
                config.recommendations.call_timeout(),
            )
            .context("Failed to create Claude client")?;
            info!(model = %config.advisory.claude_model, "Using Claude advisory gateway");
            Arc::new(ClaudeAdvisoryGateway::new(claude))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set, advisory recommendations disabled");
            Arc::new(OfflineAdvisoryGateway)
        }
    };

    let signals = Arc::new(RepositorySignalProvider::new(
        repository.clone(),
        config.signals.clone(),
    ));
    let scores = ScoreService::new(
        repository.clone(),
        signals.clone(),
        ScoreCalculator::new(&config.scoring),
        StalenessPolicy::new(config.scoring.staleness_threshold()),
    );
    let engine = RecommendationEngine::new(gateway, signals, config.recommendations.clone());

    Ok(HealthQueries::new(repository, scores, engine))
}

async fn add_card<R: CardRepository>(repository: &R, args: AddCardArgs) -> HealthResult<Card> {
    let card = Card {
        id: Uuid::new_v4().to_string(),
        user_id: args.user,
        name: args.name,
        issuer: args.issuer,
        card_type: args.card_type,
        credit_limit: args.limit,
        current_balance: args.balance,
        opened_at: args
            .opened
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
        is_active: true,
    };
    repository
        .insert_card(&card)
        .await
        .map_err(HealthError::Storage)?;
    info!(card_id = %card.id, user_id = %card.user_id, card_type = %card.card_type, "Card added");
    Ok(card)
}

async fn add_transaction<R: CardRepository>(
    repository: &R,
    args: AddTransactionArgs,
) -> HealthResult<Transaction> {
    repository
        .find_by_id(&args.card)
        .await
        .map_err(HealthError::Storage)?
        .ok_or_else(|| HealthError::card_not_found(&args.card))?;

    let transaction = Transaction {
        id: Uuid::new_v4().to_string(),
        card_id: args.card,
        amount: args.amount,
        occurred_at: args.at.unwrap_or_else(Utc::now),
    };
    repository
        .insert_transaction(&transaction)
        .await
        .map_err(HealthError::Storage)?;
    info!(transaction_id = %transaction.id, card_id = %transaction.card_id, "Transaction added");
    Ok(transaction)
}

fn to_json<T: serde::Serialize>(result: HealthResult<T>) -> Result<Value> {
    serde_json::to_value(QueryResponse::from_result(result)).context("Failed to serialize response")
}
