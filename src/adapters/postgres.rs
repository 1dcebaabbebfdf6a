use crate::adapters::transaction_manager::{
    ManagedTransaction, TransactionManager, TransactionScope,
};
use crate::config::DatabaseConfig;
use crate::domain::{
    ControlStateRecord, DecisionOutcome, DecisionRecord, NewControlState, NewDecision,
};
use crate::error::{ControlError, Result};
use crate::persistence::{ControlStateStore, DecisionStore, TransitionPlanner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Advisory lock key serializing control-state transitions across processes.
///
/// The row lock on the log tail cannot cover an empty log, and a locking
/// read that waited on another writer would still not see that writer's
/// new row. Taking this lock first makes the following read start after the
/// previous transition committed.
const CONTROL_STATE_LOCK_KEY: i64 = 0x7472_6164_6563_746c;

const CONTROL_STATE_COLUMNS: &str =
    "id, paused, paused_at, resumed_at, paused_by, pause_reason, created_at";

const DECISION_COLUMNS: &str = "id, session_id, decision_type, symbol, prompt, response, model, \
     tokens_used, latency_ms, outcome, pnl, context, agent_id, confidence, created_at";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    transactions: TransactionManager,
    lock_timeout_ms: u64,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self::from_pool(pool, config.lock_timeout_ms))
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            transactions: TransactionManager::new(pool.clone()),
            pool,
            lock_timeout_ms,
        }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Roll back a refused transaction. The caller gets the refusal; a failed
/// rollback is only logged.
async fn abandon(tx: ManagedTransaction<'_>) {
    let scope = tx.scope();
    if let Err(e) = tx.rollback().await {
        warn!(%scope, error = %e, "rollback of refused transaction failed");
    }
}

fn control_state_from_row(row: &PgRow) -> ControlStateRecord {
    ControlStateRecord {
        id: row.get("id"),
        paused: row.get("paused"),
        paused_at: row.get("paused_at"),
        resumed_at: row.get("resumed_at"),
        paused_by: row.get("paused_by"),
        pause_reason: row.get("pause_reason"),
        created_at: row.get("created_at"),
    }
}

fn decision_from_row(row: &PgRow) -> Result<DecisionRecord> {
    let outcome = row
        .get::<Option<String>, _>("outcome")
        .map(|s| DecisionOutcome::try_from(s.as_str()))
        .transpose()
        .map_err(ControlError::MalformedData)?;

    Ok(DecisionRecord {
        id: row.get("id"),
        session_id: row.get("session_id"),
        decision_type: row.get("decision_type"),
        symbol: row.get("symbol"),
        prompt: row.get("prompt"),
        response: row.get("response"),
        model: row.get("model"),
        tokens_used: row.get("tokens_used"),
        latency_ms: row.get("latency_ms"),
        outcome,
        pnl: row.get("pnl"),
        context: row.get("context"),
        agent_id: row.get("agent_id"),
        confidence: row.get("confidence"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ControlStateStore for PostgresStore {
    async fn latest_state(&self) -> Result<Option<ControlStateRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTROL_STATE_COLUMNS} FROM control_state ORDER BY id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(control_state_from_row))
    }

    async fn state_history(&self, limit: Option<i64>) -> Result<Vec<ControlStateRecord>> {
        let rows = match limit {
            Some(n) => {
                sqlx::query(&format!(
                    r#"
                    SELECT {CONTROL_STATE_COLUMNS} FROM (
                        SELECT {CONTROL_STATE_COLUMNS} FROM control_state
                        ORDER BY id DESC
                        LIMIT $1
                    ) tail
                    ORDER BY id ASC
                    "#
                ))
                .bind(n)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {CONTROL_STATE_COLUMNS} FROM control_state ORDER BY id ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(control_state_from_row).collect())
    }

    #[instrument(skip(self, plan))]
    async fn append_transition(&self, plan: TransitionPlanner) -> Result<ControlStateRecord> {
        let mut tx = self
            .transactions
            .begin(TransactionScope::ControlTransition)
            .await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(tx.executor()?)
            .await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CONTROL_STATE_LOCK_KEY)
            .execute(tx.executor()?)
            .await?;

        let current = sqlx::query(&format!(
            "SELECT {CONTROL_STATE_COLUMNS} FROM control_state ORDER BY id DESC LIMIT 1 FOR UPDATE"
        ))
        .fetch_optional(tx.executor()?)
        .await?
        .as_ref()
        .map(control_state_from_row);

        let next: NewControlState = match plan(current.as_ref()) {
            Ok(next) => next,
            Err(e) => {
                abandon(tx).await;
                return Err(e);
            }
        };

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO control_state (paused, paused_at, resumed_at, paused_by, pause_reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CONTROL_STATE_COLUMNS}
            "#
        ))
        .bind(next.paused)
        .bind(next.paused_at)
        .bind(next.resumed_at)
        .bind(&next.paused_by)
        .bind(&next.pause_reason)
        .fetch_one(tx.executor()?)
        .await?;

        tx.commit().await?;

        let record = control_state_from_row(&row);
        debug!(id = record.id, paused = record.paused, "appended control state");
        Ok(record)
    }
}

#[async_trait]
impl DecisionStore for PostgresStore {
    #[instrument(skip(self, decision), fields(symbol = %decision.symbol))]
    async fn record_decision(&self, decision: NewDecision) -> Result<DecisionRecord> {
        decision.validate().map_err(ControlError::InvalidArgument)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO agent_decisions (
                session_id, decision_type, symbol, prompt, response, model,
                tokens_used, latency_ms, context, agent_id, confidence
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {DECISION_COLUMNS}
            "#
        ))
        .bind(decision.session_id)
        .bind(&decision.decision_type)
        .bind(&decision.symbol)
        .bind(&decision.prompt)
        .bind(&decision.response)
        .bind(&decision.model)
        .bind(decision.tokens_used)
        .bind(decision.latency_ms)
        .bind(&decision.context)
        .bind(&decision.agent_id)
        .bind(decision.confidence)
        .fetch_one(&self.pool)
        .await?;

        decision_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn record_outcome(
        &self,
        id: i64,
        outcome: DecisionOutcome,
        pnl: Option<Decimal>,
    ) -> Result<DecisionRecord> {
        let mut tx = self
            .transactions
            .begin(TransactionScope::DecisionOutcome)
            .await?;

        let existing = sqlx::query("SELECT outcome FROM agent_decisions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(tx.executor()?)
            .await?;

        let Some(existing) = existing else {
            abandon(tx).await;
            return Err(ControlError::InvalidArgument(format!("unknown decision {id}")));
        };
        if let Some(previous) = existing.get::<Option<String>, _>("outcome") {
            abandon(tx).await;
            return Err(ControlError::invalid_transition(
                previous,
                outcome,
                "outcome already recorded",
            ));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE agent_decisions SET outcome = $2, pnl = $3
            WHERE id = $1
            RETURNING {DECISION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(outcome.as_str())
        .bind(pnl)
        .fetch_one(tx.executor()?)
        .await?;

        tx.commit().await?;
        decision_from_row(&row)
    }

    async fn similarity_candidates(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DECISION_COLUMNS}
            FROM agent_decisions
            WHERE symbol = $1
              AND outcome IS NOT NULL
              AND context IS NOT NULL
              AND created_at >= $2
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(symbol)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decision_from_row).collect()
    }

    async fn recent_resolved(&self, symbol: &str, limit: i64) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DECISION_COLUMNS}
            FROM agent_decisions
            WHERE symbol = $1 AND outcome IS NOT NULL
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decision_from_row).collect()
    }
}
