use crate::domain::{DecisionOutcome, DecisionRecord, NewDecision};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Agent decision storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Persist a new, still pending decision
    async fn record_decision(&self, decision: NewDecision) -> Result<DecisionRecord>;

    /// Resolve a pending decision. Fails with `InvalidTransition` if the
    /// outcome was already recorded and `InvalidArgument` for an unknown id.
    async fn record_outcome(
        &self,
        id: i64,
        outcome: DecisionOutcome,
        pnl: Option<Decimal>,
    ) -> Result<DecisionRecord>;

    /// Resolved decisions for `symbol` carrying a context, created at or after
    /// `since`, newest first
    async fn similarity_candidates(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DecisionRecord>>;

    /// Most recent resolved decisions for `symbol`, newest first
    async fn recent_resolved(&self, symbol: &str, limit: i64) -> Result<Vec<DecisionRecord>>;
}
