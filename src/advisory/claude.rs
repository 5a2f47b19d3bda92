//! Claude Messages API client.
//!
//! Rate limited with a shared token bucket, retries transient failures with
//! exponential backoff, and logs the dollar cost of every call.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{AdvisoryConfig, RateLimitConfig};

/// Claude API pricing (per token, as of 2025 for claude-sonnet-4-20250514).
const INPUT_PRICE_PER_MILLION: Decimal = dec!(3.00);
const OUTPUT_PRICE_PER_MILLION: Decimal = dec!(15.00);
const MILLION: Decimal = dec!(1_000_000);

const ANTHROPIC_VERSION: &str = "2023-06-01";

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
    limiter: Arc<Limiter>,
    rate_limit: RateLimitConfig,
}

/// Outcome of a single attempt, split by whether retrying could help.
enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl ClaudeClient {
    pub fn new(
        api_key: SecretString,
        advisory: &AdvisoryConfig,
        rate_limit: &RateLimitConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: advisory.base_url.trim_end_matches('/').to_string(),
            model: advisory.claude_model.clone(),
            max_tokens: advisory.max_tokens,
            limiter: create_rate_limiter(rate_limit),
            rate_limit: rate_limit.clone(),
        })
    }

    /// Send a message to Claude and return the concatenated text response.
    #[instrument(skip(self, system_prompt, user_prompt))]
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(system_prompt.to_string()),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: user_prompt.to_string(),
            }],
        };

        let max_retries = self.rate_limit.max_retries;
        let mut attempt = 0u32;

        let api_response = loop {
            self.limiter.until_ready().await;

            match self.send_once(&request).await {
                Ok(response) => break response,
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    attempt += 1;
                    if attempt > max_retries {
                        return Err(e.context(format!("Failed after {max_retries} retries")));
                    }

                    let backoff_ms = backoff_ms(
                        attempt,
                        self.rate_limit.backoff_base_ms,
                        self.rate_limit.backoff_max_ms,
                    );
                    warn!(attempt, backoff_ms, error = %e, "Retrying Claude call after transient failure");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        };

        // Extract text content
        let text = api_response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<&str>>()
            .join("");

        let input_tokens = api_response.usage.input_tokens;
        let output_tokens = api_response.usage.output_tokens;
        let cost = calculate_cost(input_tokens, output_tokens);

        info!(
            input_tokens,
            output_tokens,
            cost = %cost,
            model = %self.model,
            "Claude API call completed"
        );

        Ok(text)
    }

    async fn send_once(&self, request: &ClaudeRequest) -> Result<ClaudeApiResponse, AttemptError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(anyhow!(e).context("Claude API request failed")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let err = anyhow!("Claude API error ({status}): {error_body}");
            return Err(if is_retryable(status) {
                AttemptError::Retryable(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        response
            .json::<ClaudeApiResponse>()
            .await
            .map_err(|e| AttemptError::Fatal(anyhow!(e).context("Failed to parse Claude API response")))
    }
}

/// Throttling and server-side failures are worth another attempt; auth and
/// other client errors are not.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn backoff_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    std::cmp::min(base_ms.saturating_mul(2u64.pow(exponent)), max_ms)
}

fn create_rate_limiter(config: &RateLimitConfig) -> Arc<Limiter> {
    let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(rps);

    let quota = Quota::per_second(rps).allow_burst(burst);
    Arc::new(RateLimiter::direct(quota))
}

/// Calculate the dollar cost of a Claude API call.
pub fn calculate_cost(input_tokens: i64, output_tokens: i64) -> Decimal {
    let input_cost = Decimal::from(input_tokens) * INPUT_PRICE_PER_MILLION / MILLION;
    let output_cost = Decimal::from(output_tokens) * OUTPUT_PRICE_PER_MILLION / MILLION;
    input_cost + output_cost
}

// --- Request/Response Types ---

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: i64,
    output_tokens: i64,
}
