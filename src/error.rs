use thiserror::Error;

/// Failures surfaced to callers of the scoring and recommendation queries.
///
/// Infrastructure causes are kept as `source` for logging; `Display` never
/// includes them.
#[derive(Error, Debug)]
pub enum HealthError {
    #[error("no cards found for user '{user_id}'")]
    NoCardsFound { user_id: String },

    #[error("card '{card_id}' not found")]
    CardNotFound { card_id: String },

    #[error("score storage unavailable")]
    Storage(#[source] anyhow::Error),

    #[error("card signals unavailable for card '{card_id}'")]
    Signals {
        card_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("advisory service unavailable")]
    Advisory {
        card_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl HealthError {
    /// Stable machine-readable kind for the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCardsFound { .. } => "no_cards_found",
            Self::CardNotFound { .. } => "card_not_found",
            Self::Storage(_) => "storage_unavailable",
            Self::Signals { .. } => "signals_unavailable",
            Self::Advisory { .. } => "advisory_unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Full underlying cause chain, for logs only.
    pub fn cause_chain(&self) -> Option<String> {
        match self {
            Self::Storage(source)
            | Self::Signals { source, .. }
            | Self::Advisory { source, .. } => Some(format!("{source:#}")),
            _ => None,
        }
    }

    pub fn no_cards(user_id: &str) -> Self {
        Self::NoCardsFound {
            user_id: user_id.to_string(),
        }
    }

    pub fn card_not_found(card_id: &str) -> Self {
        Self::CardNotFound {
            card_id: card_id.to_string(),
        }
    }
}

pub type HealthResult<T> = Result<T, HealthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_underlying_cause() {
        let err = HealthError::Storage(anyhow::anyhow!("disk I/O error at /var/db"));
        assert_eq!(err.to_string(), "score storage unavailable");
        assert_eq!(err.kind(), "storage_unavailable");
        let source = std::error::Error::source(&err).expect("cause retained");
        assert!(source.to_string().contains("disk I/O"));
        assert!(err.cause_chain().unwrap().contains("disk I/O"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(HealthError::no_cards("u1").kind(), "no_cards_found");
        assert_eq!(HealthError::card_not_found("c1").kind(), "card_not_found");
        assert_eq!(HealthError::DeadlineExceeded.kind(), "deadline_exceeded");
    }
}
