//! In-process store with the same semantics as the PostgreSQL adapter.
//!
//! A single async mutex plays the role of the row lock: it is held from the
//! read of the log tail until the new record has been appended.

use crate::domain::{ControlStateRecord, DecisionOutcome, DecisionRecord, NewDecision};
use crate::error::{ControlError, Result};
use crate::persistence::{ControlStateStore, DecisionStore, TransitionPlanner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Tables {
    control_state: Vec<ControlStateRecord>,
    decisions: Vec<DecisionRecord>,
    next_decision_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the connection were lost
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a fully formed decision, keeping its id and timestamps
    pub async fn insert_decision(&self, record: DecisionRecord) {
        let mut tables = self.tables.lock().await;
        tables.next_decision_id = tables.next_decision_id.max(record.id);
        tables.decisions.push(record);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ControlError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn newest_first(decisions: &mut [DecisionRecord]) {
    decisions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl ControlStateStore for MemoryStore {
    async fn latest_state(&self) -> Result<Option<ControlStateRecord>> {
        self.check_available()?;
        Ok(self.tables.lock().await.control_state.last().cloned())
    }

    async fn state_history(&self, limit: Option<i64>) -> Result<Vec<ControlStateRecord>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let log = &tables.control_state;
        let skip = match limit {
            Some(n) => log.len().saturating_sub(n.max(0) as usize),
            None => 0,
        };
        Ok(log[skip..].to_vec())
    }

    async fn append_transition(&self, plan: TransitionPlanner) -> Result<ControlStateRecord> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        let next = plan(tables.control_state.last())?;
        let id = tables.control_state.last().map_or(1, |r| r.id + 1);
        let record = next.into_record(id, Utc::now());
        tables.control_state.push(record.clone());

        debug!(id, paused = record.paused, "appended control state");
        Ok(record)
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn record_decision(&self, decision: NewDecision) -> Result<DecisionRecord> {
        self.check_available()?;
        decision.validate().map_err(ControlError::InvalidArgument)?;

        let mut tables = self.tables.lock().await;
        tables.next_decision_id += 1;
        let record = decision.into_record(tables.next_decision_id, Utc::now());
        tables.decisions.push(record.clone());
        Ok(record)
    }

    async fn record_outcome(
        &self,
        id: i64,
        outcome: DecisionOutcome,
        pnl: Option<Decimal>,
    ) -> Result<DecisionRecord> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let record = tables
            .decisions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ControlError::InvalidArgument(format!("unknown decision {id}")))?;

        if let Some(existing) = record.outcome {
            return Err(ControlError::invalid_transition(
                existing,
                outcome,
                "outcome already recorded",
            ));
        }
        record.outcome = Some(outcome);
        record.pnl = pnl;
        Ok(record.clone())
    }

    async fn similarity_candidates(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DecisionRecord>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut found: Vec<DecisionRecord> = tables
            .decisions
            .iter()
            .filter(|d| {
                d.symbol == symbol
                    && d.outcome.is_some()
                    && d.context.is_some()
                    && d.created_at >= since
            })
            .cloned()
            .collect();
        newest_first(&mut found);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn recent_resolved(&self, symbol: &str, limit: i64) -> Result<Vec<DecisionRecord>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut found: Vec<DecisionRecord> = tables
            .decisions
            .iter()
            .filter(|d| d.symbol == symbol && d.outcome.is_some())
            .cloned()
            .collect();
        newest_first(&mut found);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }
}
