use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;

use crate::recommend::merge::DEFAULT_MAX_RESULTS;
use crate::scoring::staleness::DEFAULT_STALENESS_HOURS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub signals: SignalsConfig,
    pub recommendations: RecommendationConfig,
    pub advisory: AdvisoryConfig,
    pub rate_limit: RateLimitConfig,
    pub monitoring: MonitoringConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub staleness_hours: i64,
    /// Utilization sub-score given to cards where utilization is undefined (debit, prepaid).
    pub non_revolving_utilization_score: u8,
}

impl ScoringConfig {
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.staleness_hours)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            staleness_hours: DEFAULT_STALENESS_HOURS,
            non_revolving_utilization_score: 15,
        }
    }
}

/// Stand-in values for signals that have no real data source yet.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
    pub default_on_time_payment_percent: Decimal,
    pub default_account_age_months: u32,
    pub recent_activity_days: i64,
    pub spending_window_days: i64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            default_on_time_payment_percent: Decimal::from(95),
            default_account_age_months: 24,
            recent_activity_days: 30,
            spending_window_days: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// One failing advisory call fails the whole request.
    Abort,
    /// Failing cards fall back to rule-based recommendations and add a warning.
    Partial,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    pub max_results: usize,
    pub max_concurrent_calls: usize,
    pub call_timeout_seconds: u64,
    pub request_deadline_seconds: u64,
    pub failure_mode: FailureMode,
}

impl RecommendationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_seconds)
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            max_concurrent_calls: 4,
            call_timeout_seconds: 30,
            request_deadline_seconds: 90,
            failure_mode: FailureMode::Abort,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryConfig {
    pub claude_model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
pub struct Secrets {
    pub anthropic_api_key: Option<SecretString>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::from),
        }
    }
}

impl AppConfig {
    /// Load configuration from config/default.toml, overlaying environment variables for secrets.
    pub fn load() -> Result<(Self, Secrets)> {
        Self::load_from(Path::new("config/default.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let secrets = Secrets::from_env();

        Ok((config, secrets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let contents = std::fs::read_to_string("config/default.toml")
            .expect("config/default.toml should exist");
        let config: AppConfig = toml::from_str(&contents).expect("should parse");
        assert_eq!(config.scoring.staleness_hours, 24);
        assert_eq!(config.scoring.non_revolving_utilization_score, 15);
        assert_eq!(config.signals.default_on_time_payment_percent, Decimal::from(95));
        assert_eq!(config.recommendations.max_results, 10);
        assert_eq!(config.recommendations.failure_mode, FailureMode::Abort);
    }

    #[test]
    fn test_partial_failure_mode_parses() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: FailureMode,
        }
        let parsed: Wrapper = toml::from_str(r#"mode = "partial""#).expect("should parse");
        assert_eq!(parsed.mode, FailureMode::Partial);
    }

    #[test]
    fn test_defaults_match_engine_constants() {
        assert_eq!(RecommendationConfig::default().max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(ScoringConfig::default().staleness_hours, DEFAULT_STALENESS_HOURS);
    }

    #[test]
    fn test_staleness_threshold_is_hours() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.staleness_threshold(), chrono::Duration::hours(24));
    }
}
