//! Pause Coordinator
//!
//! Global trading kill-switch backed by an append-only log of transitions.
//! The latest record is the current state; an empty log means RUNNING.
//!
//! Transitions are serialized by the store: the log tail is locked, the
//! precondition is checked against the locked record and the new record is
//! appended before the lock is released. Of any number of racing pause
//! requests exactly one succeeds, the rest see the new state and fail with
//! `InvalidTransition`.
//!
//! Reads take no locks and are never cached, so a committed pause is visible
//! to `is_paused` on the next call.

use crate::coordination::executor::ResilientExecutor;
use crate::domain::{ControlState, ControlStateRecord, NewControlState};
use crate::error::{ControlError, Result};
use crate::persistence::{ControlStateStore, TransitionPlanner};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct PauseCoordinator<S: ?Sized> {
    store: Arc<S>,
    executor: Option<Arc<ResilientExecutor>>,
}

impl<S> PauseCoordinator<S>
where
    S: ControlStateStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            executor: None,
        }
    }

    /// Route every store call through `executor`
    pub fn with_executor(mut self, executor: Arc<ResilientExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Latest control-state record, or the synthesized RUNNING record when
    /// nothing has been written yet
    pub async fn get_state(&self) -> Result<ControlStateRecord> {
        let latest = self.guarded(|| self.store.latest_state()).await?;
        Ok(latest.unwrap_or_else(ControlStateRecord::initial))
    }

    pub async fn is_paused(&self) -> Result<bool> {
        Ok(self.get_state().await?.paused)
    }

    /// Audit trail in creation order. `limit` keeps only the newest entries.
    pub async fn history(&self, limit: Option<i64>) -> Result<Vec<ControlStateRecord>> {
        if let Some(n) = limit {
            if n <= 0 {
                return Err(ControlError::InvalidArgument(format!(
                    "history limit must be positive, got {n}"
                )));
            }
        }
        self.guarded(|| self.store.state_history(limit)).await
    }

    /// Pause trading. Fails with `InvalidTransition` if already paused.
    #[instrument(skip(self))]
    pub async fn request_pause(
        &self,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<ControlStateRecord> {
        validate_actor(actor)?;
        let planner = pause_planner(actor, reason);
        let record = self
            .guarded(|| self.store.append_transition(planner))
            .await?;

        warn!(
            actor,
            reason = reason.unwrap_or(""),
            record_id = record.id,
            "trading PAUSED"
        );
        Ok(record)
    }

    /// Resume trading. Fails with `InvalidTransition` if not paused.
    #[instrument(skip(self))]
    pub async fn request_resume(&self, actor: &str) -> Result<ControlStateRecord> {
        validate_actor(actor)?;
        let planner = resume_planner(actor);
        let record = self
            .guarded(|| self.store.append_transition(planner))
            .await?;

        info!(actor, record_id = record.id, "trading RESUMED");
        Ok(record)
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

fn validate_actor(actor: &str) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(ControlError::InvalidArgument(
            "actor must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn current_state(current: Option<&ControlStateRecord>) -> ControlState {
    current
        .map(ControlStateRecord::state)
        .unwrap_or(ControlState::Running)
}

fn pause_planner(actor: &str, reason: Option<&str>) -> TransitionPlanner {
    let actor = actor.to_string();
    let reason = reason.map(str::to_string);
    Box::new(move |current: Option<&ControlStateRecord>| -> Result<NewControlState> {
        if current_state(current) == ControlState::Paused {
            return Err(ControlError::invalid_transition(
                ControlState::Paused,
                ControlState::Paused,
                "already paused",
            ));
        }
        Ok(NewControlState::pause(&actor, reason.as_deref(), Utc::now()))
    })
}

fn resume_planner(actor: &str) -> TransitionPlanner {
    let actor = actor.to_string();
    Box::new(move |current: Option<&ControlStateRecord>| -> Result<NewControlState> {
        if current_state(current) != ControlState::Paused {
            return Err(ControlError::invalid_transition(
                ControlState::Running,
                ControlState::Running,
                "not paused",
            ));
        }
        Ok(NewControlState::resume(&actor, Utc::now()))
    })
}
