use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::advisory::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Opportunity,
    Warning,
    Saving,
    Promo,
}

/// Declaration order is the priority order used when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Stable identifier; two recommendations with the same id are the same advice.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub title: String,
    pub description: String,
    pub impact: Impact,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub potential_savings: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_required: Option<String>,
}

/// Everything produced for a single card before the portfolio-wide merge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecommendationResult {
    pub card_id: String,
    pub card_name: String,
    pub health_score: u8,
    pub recommendations: Vec<Recommendation>,
    pub suggested_actions: Vec<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub potential_savings: Decimal,
    pub risk_level: Option<RiskLevel>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsReport {
    pub recommendations: Vec<Recommendation>,
    pub per_card_result: BTreeMap<String, CardRecommendationResult>,
    pub summary: String,
    /// Money amounts go out as JSON numbers.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_potential_savings: Decimal,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn saving(amount: Option<Decimal>) -> Recommendation {
        Recommendation {
            id: "cashback".to_string(),
            kind: RecommendationType::Saving,
            title: "Use the cashback category".to_string(),
            description: "Groceries earn 3%".to_string(),
            impact: Impact::Medium,
            potential_savings: amount,
            action_required: None,
        }
    }

    #[test]
    fn test_savings_serialize_as_numbers() {
        let json = serde_json::to_value(saving(Some(dec!(120.46)))).unwrap();
        assert!(json["potentialSavings"].is_number());
        assert_eq!(json["potentialSavings"].as_f64(), Some(120.46));

        let report = RecommendationsReport {
            recommendations: vec![saving(Some(dec!(25)))],
            per_card_result: BTreeMap::from([(
                "c1".to_string(),
                CardRecommendationResult {
                    card_id: "c1".to_string(),
                    card_name: "Everyday".to_string(),
                    health_score: 80,
                    recommendations: Vec::new(),
                    suggested_actions: Vec::new(),
                    potential_savings: dec!(25),
                    risk_level: None,
                    summary: None,
                },
            )]),
            summary: "1 card reviewed".to_string(),
            total_potential_savings: dec!(25),
            warnings: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["totalPotentialSavings"].is_number());
        assert!(json["perCardResult"]["c1"]["potentialSavings"].is_number());
        assert!(json["recommendations"][0]["potentialSavings"].is_number());
    }

    #[test]
    fn test_missing_savings_is_omitted_and_read_back() {
        let json = serde_json::to_string(&saving(None)).unwrap();
        assert!(!json.contains("potentialSavings"));
        let back: Recommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.potential_savings, None);

        let stored = serde_json::to_string(&saving(Some(dec!(12.5)))).unwrap();
        let back: Recommendation = serde_json::from_str(&stored).unwrap();
        assert_eq!(back.potential_savings, Some(dec!(12.5)));
    }
}
