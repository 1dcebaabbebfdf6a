use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tradectl::config::RetrievalConfig;
use tradectl::{
    DecisionOutcome, DecisionRecord, DecisionStore, MemoryStore, NewDecision, RetrievalTier,
    SimilarityRetrieval,
};

const SYMBOL: &str = "ETH-USD";

fn decision(
    id: i64,
    symbol: &str,
    outcome: Option<DecisionOutcome>,
    age: Duration,
    context: Option<Value>,
) -> DecisionRecord {
    let mut new = NewDecision::new("agent-7", symbol, "ENTRY");
    new.context = context;
    let mut record = new.into_record(id, Utc::now() - age);
    record.outcome = outcome;
    record
}

fn indicators(rsi: f64, adx: f64, macd: f64) -> Option<Value> {
    Some(json!({"indicators": {"RSI": rsi, "ADX": adx, "MACD": macd}}))
}

async fn seeded() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let rows = [
        // Three matches, failed
        decision(1, SYMBOL, Some(DecisionOutcome::Failure), Duration::hours(1), indicators(60.0, 25.0, 1.0)),
        // Three matches, succeeded, older
        decision(2, SYMBOL, Some(DecisionOutcome::Success), Duration::hours(5), indicators(61.0, 26.0, 1.05)),
        // One match (RSI only)
        decision(3, SYMBOL, Some(DecisionOutcome::Success), Duration::hours(2), indicators(60.0, 90.0, -4.0)),
        // No match at all
        decision(4, SYMBOL, Some(DecisionOutcome::Success), Duration::hours(3), indicators(5.0, 90.0, -4.0)),
        // Pending: never returned
        decision(5, SYMBOL, None, Duration::minutes(5), indicators(60.0, 25.0, 1.0)),
        // Outside the recency window
        decision(6, SYMBOL, Some(DecisionOutcome::Success), Duration::days(45), indicators(60.0, 25.0, 1.0)),
        // Other symbol
        decision(7, "BTC-USD", Some(DecisionOutcome::Success), Duration::hours(1), indicators(60.0, 25.0, 1.0)),
        // Resolved without context
        decision(8, SYMBOL, Some(DecisionOutcome::Failure), Duration::minutes(30), None),
    ];
    for row in rows {
        store.insert_decision(row).await;
    }
    store
}

fn current_context() -> String {
    json!({"indicators": {"RSI": 60.0, "ADX": 25.0, "MACD": 1.0}, "price": 3150.5}).to_string()
}

#[tokio::test]
async fn similarity_ranks_by_score_then_outcome_then_recency() {
    let retrieval = SimilarityRetrieval::new(seeded().await, RetrievalConfig::default());

    let results = retrieval
        .find_similar_scored(SYMBOL, &current_context(), 10)
        .await
        .unwrap();

    let ids: Vec<i64> = results.iter().map(|r| r.decision.id).collect();
    assert_eq!(ids, vec![2, 1, 3]);
    assert!(results.iter().all(|r| r.tier == RetrievalTier::Similarity));
    assert_eq!(results[0].score, 3.0);
    assert_eq!(results[2].score, 1.0);
}

#[tokio::test]
async fn limit_truncates_ranked_results() {
    let retrieval = SimilarityRetrieval::new(seeded().await, RetrievalConfig::default());

    let results = retrieval
        .find_similar(SYMBOL, &current_context(), 1)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, 2);
}

#[tokio::test]
async fn unparsable_context_returns_most_recent_resolved() {
    let retrieval = SimilarityRetrieval::new(seeded().await, RetrievalConfig::default());

    for context in ["", "not json", r#"{"indicators": {}}"#, r#"{"price": 1}"#] {
        let results = retrieval.find_similar_scored(SYMBOL, context, 3).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.decision.id).collect();
        assert_eq!(ids, vec![8, 1, 3], "context {context:?}");
        assert!(results.iter().all(|r| r.tier == RetrievalTier::RecentFallback));
    }
}

#[tokio::test]
async fn no_overlap_falls_back_to_recent() {
    let retrieval = SimilarityRetrieval::new(seeded().await, RetrievalConfig::default());
    let context = json!({"indicators": {"VOLUME_Z": 2.5}}).to_string();

    let results = retrieval.find_similar_scored(SYMBOL, &context, 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.tier == RetrievalTier::RecentFallback));
    assert!(results.iter().all(|r| r.decision.is_resolved()));
}

#[tokio::test]
async fn unknown_symbol_yields_empty_list() {
    let retrieval = SimilarityRetrieval::new(seeded().await, RetrievalConfig::default());

    assert!(retrieval
        .find_similar("DOGE-USD", &current_context(), 5)
        .await
        .unwrap()
        .is_empty());
    assert!(retrieval.find_similar("DOGE-USD", "", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_outage_surfaces_from_fallback() {
    let store = seeded().await;
    store.set_unavailable(true);
    let retrieval = SimilarityRetrieval::new(store, RetrievalConfig::default());

    let err = retrieval
        .find_similar(SYMBOL, &current_context(), 5)
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());
}

#[tokio::test]
async fn resolved_outcomes_become_candidates() {
    let store = Arc::new(MemoryStore::new());
    let recorded = store
        .record_decision(
            NewDecision::new("agent-1", SYMBOL, "ENTRY")
                .with_context(json!({"indicators": {"RSI": 40.0}}))
                .with_confidence(0.8),
        )
        .await
        .unwrap();

    let retrieval = SimilarityRetrieval::new(store.clone(), RetrievalConfig::default());
    let context = json!({"indicators": {"RSI": 41.0}}).to_string();
    assert!(retrieval.find_similar(SYMBOL, &context, 5).await.unwrap().is_empty());

    store
        .record_outcome(recorded.id, DecisionOutcome::Success, Some(dec!(42.10)))
        .await
        .unwrap();
    let results = retrieval.find_similar_scored(SYMBOL, &context, 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tier, RetrievalTier::Similarity);
    assert_eq!(results[0].decision.pnl, Some(dec!(42.10)));
}
