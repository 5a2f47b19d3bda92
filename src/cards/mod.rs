//! Payment cards and their transaction history.

pub mod repository;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Credit,
    Debit,
    Prepaid,
}

impl CardType {
    /// Only revolving cards carry a balance against a limit.
    pub fn is_revolving(self) -> bool {
        matches!(self, Self::Credit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Prepaid => "prepaid",
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "prepaid" => Ok(Self::Prepaid),
            other => Err(format!("unknown card type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub issuer: Option<String>,
    pub card_type: CardType,
    pub credit_limit: Option<Decimal>,
    pub current_balance: Decimal,
    pub opened_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Card {
    /// Balance as a percentage of the credit limit.
    ///
    /// `None` for non-revolving cards and for credit cards without a usable limit:
    /// utilization is undefined there, not zero.
    pub fn utilization_percent(&self) -> Option<Decimal> {
        if !self.card_type.is_revolving() {
            return None;
        }
        let limit = self.credit_limit.filter(|l| *l > Decimal::ZERO)?;
        let balance = self.current_balance.max(Decimal::ZERO);
        Some(balance / limit * Decimal::ONE_HUNDRED)
    }

    /// Whole months between `opened_at` and `now`, if the open date is known.
    pub fn account_age_months(&self, now: DateTime<Utc>) -> Option<u32> {
        let opened = self.opened_at?;
        if opened > now {
            return Some(0);
        }
        let days = (now - opened).num_days();
        Some((days / 30) as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub card_id: String,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Optional narrowing for `find_by_user_id`.
#[derive(Debug, Clone, Default)]
pub struct CardFilters {
    pub card_type: Option<CardType>,
    pub active_only: bool,
}

impl CardFilters {
    pub fn active() -> Self {
        Self {
            card_type: None,
            active_only: true,
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        if self.active_only && !card.is_active {
            return false;
        }
        match self.card_type {
            Some(kind) => card.card_type == kind,
            None => true,
        }
    }
}
