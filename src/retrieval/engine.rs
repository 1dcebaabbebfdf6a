//! Best-effort retrieval of past decisions similar to the current market.
//!
//! Similarity scoring ranks recent resolved decisions against the caller's
//! indicators. When that yields nothing, or the store fails, the most recent
//! resolved decisions for the symbol are returned instead. A context without
//! usable indicators goes straight to that fallback. Only a failure of the
//! fallback query itself reaches the caller.

use crate::config::RetrievalConfig;
use crate::coordination::executor::ResilientExecutor;
use crate::domain::DecisionRecord;
use crate::error::{ControlError, Result};
use crate::persistence::DecisionStore;
use crate::retrieval::scoring::{
    parse_current_indicators, rank, score_candidates, IndicatorSet, RetrievalTier,
    SimilarDecision,
};
use chrono::{Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct SimilarityRetrieval<S: ?Sized> {
    store: Arc<S>,
    config: RetrievalConfig,
    executor: Option<Arc<ResilientExecutor>>,
}

impl<S> SimilarityRetrieval<S>
where
    S: DecisionStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: RetrievalConfig) -> Self {
        Self {
            store,
            config,
            executor: None,
        }
    }

    /// Route store queries through `executor`
    pub fn with_executor(mut self, executor: Arc<ResilientExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Past decisions for `symbol` most similar to `current_context`, best first
    pub async fn find_similar(
        &self,
        symbol: &str,
        current_context: &str,
        limit: i64,
    ) -> Result<Vec<DecisionRecord>> {
        Ok(self
            .find_similar_scored(symbol, current_context, limit)
            .await?
            .into_iter()
            .map(|s| s.decision)
            .collect())
    }

    /// Like `find_similar`, keeping each result's score and tier
    #[instrument(skip(self, current_context))]
    pub async fn find_similar_scored(
        &self,
        symbol: &str,
        current_context: &str,
        limit: i64,
    ) -> Result<Vec<SimilarDecision>> {
        if symbol.trim().is_empty() {
            return Err(ControlError::InvalidArgument(
                "symbol must not be empty".to_string(),
            ));
        }
        if limit <= 0 {
            return Err(ControlError::InvalidArgument(format!(
                "limit must be positive, got {limit}"
            )));
        }
        let limit = limit.min(self.config.max_limit);

        let current = match parse_current_indicators(current_context) {
            Ok(indicators) => indicators,
            Err(e) => {
                debug!(symbol, error = %e, "no usable indicators, using recent decisions");
                return self.recent_fallback(symbol, limit).await;
            }
        };

        match self.similarity_tier(symbol, &current, limit).await {
            Ok(ranked) if !ranked.is_empty() => Ok(ranked),
            Ok(_) => {
                debug!(symbol, "no similar decisions, using recent decisions");
                self.recent_fallback(symbol, limit).await
            }
            Err(e) => {
                warn!(symbol, error = %e, "similarity query failed, using recent decisions");
                self.recent_fallback(symbol, limit).await
            }
        }
    }

    async fn similarity_tier(
        &self,
        symbol: &str,
        current: &IndicatorSet,
        limit: i64,
    ) -> Result<Vec<SimilarDecision>> {
        let since = Duration::try_days(self.config.recency_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                ControlError::InvalidArgument(format!(
                    "recency window of {} days is out of range",
                    self.config.recency_days
                ))
            })?;
        let fetch = limit.saturating_mul(self.config.overfetch_factor.max(1));
        let candidates = self
            .guarded(|| self.store.similarity_candidates(symbol, since, fetch))
            .await?;

        let fetched = candidates.len();
        let scored = score_candidates(current, candidates, self.config.tolerance);
        debug!(symbol, fetched, matched = scored.len(), "scored similarity candidates");

        Ok(rank(scored, limit as usize))
    }

    async fn recent_fallback(&self, symbol: &str, limit: i64) -> Result<Vec<SimilarDecision>> {
        let recent = self
            .guarded(|| self.store.recent_resolved(symbol, limit))
            .await?;
        Ok(recent
            .into_iter()
            .map(|decision| SimilarDecision {
                decision,
                score: 0.0,
                tier: RetrievalTier::RecentFallback,
            })
            .collect())
    }

    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match &self.executor {
            Some(executor) => executor.execute(op).await,
            None => op().await,
        }
    }
}
