//! Indicator matching and candidate ranking (no store IO).

use crate::domain::DecisionRecord;
use crate::error::{ControlError, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Relative difference under which two indicator readings agree.
pub const DEFAULT_TOLERANCE: f64 = 0.15;

/// Indicator name to reading, e.g. `{"RSI": 65.0, "ADX": 28.0}`
pub type IndicatorSet = BTreeMap<String, f64>;

/// Numeric entries of the `indicators` object inside a context document.
///
/// Non-numeric entries are skipped. A missing or non-object `indicators`
/// yields an empty set.
pub fn indicators_from_context(context: &Value) -> IndicatorSet {
    context
        .get("indicators")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(name, v)| v.as_f64().map(|x| (name.clone(), x)))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the caller's raw context and extract its indicators.
///
/// Fails with `MalformedData` when the text is not JSON or carries no
/// usable indicators.
pub fn parse_current_indicators(raw: &str) -> Result<IndicatorSet> {
    if raw.trim().is_empty() {
        return Err(ControlError::MalformedData("empty context".to_string()));
    }
    let context: Value = serde_json::from_str(raw)?;
    let indicators = indicators_from_context(&context);
    if indicators.is_empty() {
        return Err(ControlError::MalformedData(
            "context has no numeric indicators".to_string(),
        ));
    }
    Ok(indicators)
}

/// Whether two readings agree within `tolerance`.
///
/// `None` means the pair cannot be compared and counts neither way.
pub fn indicator_matches(current: f64, stored: f64, tolerance: f64) -> Option<bool> {
    if !current.is_finite() || !stored.is_finite() {
        return None;
    }
    if current == 0.0 && stored == 0.0 {
        return Some(true);
    }
    let mean_abs = (current.abs() + stored.abs()) / 2.0;
    if mean_abs == 0.0 {
        return None;
    }
    let relative_diff = (current - stored).abs() / mean_abs;
    Some(relative_diff <= tolerance)
}

/// Number of indicators present on both sides that agree.
///
/// Indicators present on one side only are ignored.
pub fn match_score(current: &IndicatorSet, stored: &IndicatorSet, tolerance: f64) -> f64 {
    current
        .iter()
        .filter_map(|(name, &a)| stored.get(name).map(|&b| (a, b)))
        .filter(|&(a, b)| indicator_matches(a, b, tolerance) == Some(true))
        .count() as f64
}

/// Which retrieval path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalTier {
    /// Scored against the caller's indicators
    Similarity,
    /// Most recent resolved decisions, unscored
    RecentFallback,
}

/// A decision together with how it was selected
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarDecision {
    pub decision: DecisionRecord,
    /// Matching indicator count; 0 for fallback results
    pub score: f64,
    pub tier: RetrievalTier,
}

/// Score every candidate, drop those without a single match
pub fn score_candidates(
    current: &IndicatorSet,
    candidates: Vec<DecisionRecord>,
    tolerance: f64,
) -> Vec<SimilarDecision> {
    candidates
        .into_iter()
        .filter_map(|decision| {
            let stored = decision
                .context
                .as_ref()
                .map(indicators_from_context)
                .unwrap_or_default();
            let score = match_score(current, &stored, tolerance);
            (score > 0.0).then_some(SimilarDecision {
                decision,
                score,
                tier: RetrievalTier::Similarity,
            })
        })
        .collect()
}

/// Higher score first, then SUCCESS before anything else, then newest first
pub fn compare_ranked(a: &SimilarDecision, b: &SimilarDecision) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.decision.is_success().cmp(&a.decision.is_success()))
        .then_with(|| b.decision.created_at.cmp(&a.decision.created_at))
}

pub fn rank(mut scored: Vec<SimilarDecision>, limit: usize) -> Vec<SimilarDecision> {
    scored.sort_by(compare_ranked);
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionOutcome, NewDecision};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn set(pairs: &[(&str, f64)]) -> IndicatorSet {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn decision(id: i64, outcome: DecisionOutcome, age_mins: i64, indicators: Value) -> DecisionRecord {
        let mut record = NewDecision::new("agent-1", "BTC-USD", "ENTRY")
            .with_context(json!({ "indicators": indicators }))
            .into_record(id, Utc::now() - Duration::minutes(age_mins));
        record.outcome = Some(outcome);
        record
    }

    #[test]
    fn test_exact_match_scores_every_indicator() {
        let current = set(&[("RSI", 65.0), ("MACD", 125.0), ("ADX", 28.0)]);
        assert_eq!(match_score(&current, &current.clone(), DEFAULT_TOLERANCE), 3.0);
    }

    #[test]
    fn test_tolerance_boundary() {
        let current = set(&[("RSI", 100.0)]);
        assert_eq!(
            match_score(&current, &set(&[("RSI", 112.0)]), DEFAULT_TOLERANCE),
            1.0
        );
        assert_eq!(
            match_score(&current, &set(&[("RSI", 118.0)]), DEFAULT_TOLERANCE),
            0.0
        );
        // A difference exactly at the tolerance still matches
        assert_eq!(indicator_matches(85.0, 115.0, 0.3), Some(true));
        assert_eq!(indicator_matches(100.0, 100.0, 0.0), Some(true));
    }

    #[test]
    fn test_zero_readings() {
        assert_eq!(indicator_matches(0.0, 0.0, DEFAULT_TOLERANCE), Some(true));
        assert_eq!(indicator_matches(0.0, 5.0, DEFAULT_TOLERANCE), Some(false));
        assert_eq!(indicator_matches(f64::NAN, 1.0, DEFAULT_TOLERANCE), None);
    }

    #[test]
    fn test_one_sided_indicators_are_ignored() {
        let current = set(&[("RSI", 65.0), ("MACD", 125.0), ("ADX", 28.0), ("OBV", 1e6)]);
        let stored = set(&[("RSI", 66.0), ("MACD", 124.0), ("ADX", 40.0), ("VWAP", 3.0)]);
        assert_eq!(match_score(&current, &stored, DEFAULT_TOLERANCE), 2.0);
    }

    #[test]
    fn test_indicator_extraction_skips_non_numeric() {
        let ctx = json!({"indicators": {"RSI": 65, "trend": "up", "MACD": -1.5}, "price": 10});
        assert_eq!(indicators_from_context(&ctx), set(&[("RSI", 65.0), ("MACD", -1.5)]));
        assert!(indicators_from_context(&json!({"indicators": [1, 2]})).is_empty());
    }

    #[test]
    fn test_parse_current_indicators_failures() {
        assert!(matches!(
            parse_current_indicators("not json"),
            Err(ControlError::MalformedData(_))
        ));
        assert!(matches!(
            parse_current_indicators(""),
            Err(ControlError::MalformedData(_))
        ));
        assert!(matches!(
            parse_current_indicators(r#"{"indicators": {}}"#),
            Err(ControlError::MalformedData(_))
        ));
        assert_eq!(
            parse_current_indicators(r#"{"indicators": {"RSI": 40}}"#).unwrap(),
            set(&[("RSI", 40.0)])
        );
    }

    #[test]
    fn test_success_wins_ties_regardless_of_recency() {
        let current = set(&[("RSI", 50.0)]);
        let candidates = vec![
            decision(1, DecisionOutcome::Failure, 1, json!({"RSI": 50.0})),
            decision(2, DecisionOutcome::Success, 600, json!({"RSI": 51.0})),
        ];

        let ranked = rank(score_candidates(&current, candidates, DEFAULT_TOLERANCE), 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].decision.id, 2);
        assert_eq!(ranked[1].decision.id, 1);
    }

    #[test]
    fn test_rank_orders_by_score_then_recency() {
        let current = set(&[("RSI", 50.0), ("ADX", 20.0)]);
        let candidates = vec![
            decision(1, DecisionOutcome::Success, 30, json!({"RSI": 50.0})),
            decision(2, DecisionOutcome::Failure, 60, json!({"RSI": 50.0, "ADX": 20.0})),
            decision(3, DecisionOutcome::Success, 5, json!({"RSI": 50.0})),
            decision(4, DecisionOutcome::Success, 1, json!({"RSI": 90.0})),
        ];

        let ranked = rank(score_candidates(&current, candidates, DEFAULT_TOLERANCE), 2);
        let ids: Vec<i64> = ranked.iter().map(|s| s.decision.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(ranked[0].score, 2.0);
    }
}
