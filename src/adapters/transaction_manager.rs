//! Transaction Manager for atomic control-plane writes
//!
//! Wraps sqlx transactions with a scope tag so that every begin, commit and
//! rollback shows up in the logs with what it was for.

use crate::error::{ControlError, Result};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, instrument, warn};

/// Transaction scope identifier for tracking and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionScope {
    /// Pause/resume append on the control-state log
    ControlTransition,
    /// One-time outcome resolution of a decision
    DecisionOutcome,
}

impl std::fmt::Display for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControlTransition => write!(f, "control_transition"),
            Self::DecisionOutcome => write!(f, "decision_outcome"),
        }
    }
}

/// Transaction Manager for atomic database operations
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a new transaction with scope tracking
    #[instrument(skip(self))]
    pub async fn begin(&self, scope: TransactionScope) -> Result<ManagedTransaction<'static>> {
        let tx = self.pool.begin().await?;
        debug!("Started transaction for scope: {}", scope);
        Ok(ManagedTransaction {
            tx: Some(tx),
            scope,
            committed: false,
        })
    }
}

/// A managed transaction with automatic rollback on drop
pub struct ManagedTransaction<'a> {
    tx: Option<Transaction<'a, Postgres>>,
    scope: TransactionScope,
    committed: bool,
}

impl<'a> ManagedTransaction<'a> {
    pub fn scope(&self) -> TransactionScope {
        self.scope
    }

    /// Connection for executing queries inside the transaction.
    /// Use as: `.execute(tx.executor()?).await`
    pub fn executor(&mut self) -> Result<&mut sqlx::PgConnection> {
        let scope = self.scope;
        self.tx
            .as_deref_mut()
            .ok_or_else(|| ControlError::Internal(format!("transaction {scope} already finished")))
    }

    /// Commit the transaction
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            self.committed = true;
            debug!("Committed transaction for scope: {}", self.scope);
        }
        Ok(())
    }

    /// Rollback the transaction explicitly
    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("Rolled back transaction for scope: {}", self.scope);
        }
        Ok(())
    }
}

impl<'a> Drop for ManagedTransaction<'a> {
    fn drop(&mut self) {
        if self.tx.is_some() && !self.committed {
            // Transaction will be rolled back automatically by sqlx
            warn!(
                "Transaction for scope {} was dropped without commit - rolling back",
                self.scope
            );
        }
    }
}
