use std::collections::HashSet;

use crate::recommend::models::Recommendation;

pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Prioritize, deduplicate and truncate a concatenated recommendation list.
///
/// The sort is stable on impact rank, so ties keep their input order
/// (rule-based before advisory per card, cards in repository order).
/// Deduplication runs after the sort and keeps the first occurrence of each id.
pub fn merge_recommendations(
    mut recommendations: Vec<Recommendation>,
    max_results: usize,
) -> Vec<Recommendation> {
    recommendations.sort_by_key(|r| r.impact.rank());

    let mut seen = HashSet::new();
    recommendations.retain(|r| seen.insert(r.id.clone()));
    recommendations.truncate(max_results);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::models::{Impact, RecommendationType};

    fn rec(id: &str, impact: Impact, title: &str) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            kind: RecommendationType::Opportunity,
            title: title.to_string(),
            description: String::new(),
            impact,
            potential_savings: None,
            action_required: None,
        }
    }

    #[test]
    fn test_sorted_by_impact_with_stable_ties() {
        let merged = merge_recommendations(
            vec![
                rec("a", Impact::Low, "a"),
                rec("b", Impact::High, "b"),
                rec("c", Impact::Medium, "c"),
                rec("d", Impact::High, "d"),
            ],
            DEFAULT_MAX_RESULTS,
        );
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_duplicate_id_keeps_first_after_sort() {
        let merged = merge_recommendations(
            vec![
                rec("dup", Impact::Low, "low copy"),
                rec("dup", Impact::High, "high copy"),
            ],
            DEFAULT_MAX_RESULTS,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "high copy");
    }

    #[test]
    fn test_duplicate_same_impact_keeps_earliest() {
        let merged = merge_recommendations(
            vec![
                rec("dup", Impact::Medium, "first"),
                rec("x", Impact::High, "x"),
                rec("dup", Impact::Medium, "second"),
            ],
            DEFAULT_MAX_RESULTS,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].title, "first");
    }

    #[test]
    fn test_truncates_after_dedup() {
        let mut input: Vec<Recommendation> = (0..15)
            .map(|i| rec(&format!("r{i}"), Impact::Medium, "m"))
            .collect();
        input.insert(0, rec("r0", Impact::Medium, "dup"));
        let merged = merge_recommendations(input, DEFAULT_MAX_RESULTS);
        assert_eq!(merged.len(), 10);
        let unique: HashSet<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_recommendations(Vec::new(), DEFAULT_MAX_RESULTS).is_empty());
    }
}
