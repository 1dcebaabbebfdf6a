//! Wiring from configuration to the pause coordinator and retrieval engine.

use crate::adapters::PostgresStore;
use crate::config::AppConfig;
use crate::coordination::{
    CircuitBreakerConfig, PauseCoordinator, ResilientExecutor, StoreCircuitBreaker,
};
use crate::error::{ControlError, Result};
use crate::persistence::{ControlStateStore, DecisionStore};
use crate::retrieval::SimilarityRetrieval;
use crate::services::StoreMetrics;
use std::sync::Arc;
use tracing::info;

pub const CONTROL_STATE_RESOURCE: &str = "control_state";
pub const DECISIONS_RESOURCE: &str = "agent_decisions";

pub struct ControlPlane<S> {
    coordinator: PauseCoordinator<S>,
    retrieval: SimilarityRetrieval<S>,
    metrics: Arc<StoreMetrics>,
    breaker: Option<Arc<StoreCircuitBreaker>>,
}

impl ControlPlane<PostgresStore> {
    /// Connect to PostgreSQL, apply migrations and wire both components
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        validate(config)?;
        let store = PostgresStore::new(&config.database).await?;
        store.migrate().await?;
        Self::with_store(Arc::new(store), config)
    }
}

impl<S> ControlPlane<S>
where
    S: ControlStateStore + DecisionStore + 'static,
{
    pub fn with_store(store: Arc<S>, config: &AppConfig) -> Result<Self> {
        validate(config)?;

        let metrics = Arc::new(StoreMetrics::new());
        let breaker = config.circuit_breaker.enabled.then(|| {
            Arc::new(StoreCircuitBreaker::new(CircuitBreakerConfig::from(
                &config.circuit_breaker,
            )))
        });

        let control_executor = Arc::new(ResilientExecutor::new(
            CONTROL_STATE_RESOURCE,
            breaker.clone(),
            metrics.clone(),
        ));
        let decisions_executor = Arc::new(ResilientExecutor::new(
            DECISIONS_RESOURCE,
            breaker.clone(),
            metrics.clone(),
        ));

        info!(
            circuit_breaker = breaker.is_some(),
            max_limit = config.retrieval.max_limit,
            "control plane ready"
        );

        Ok(Self {
            coordinator: PauseCoordinator::new(store.clone()).with_executor(control_executor),
            retrieval: SimilarityRetrieval::new(store, config.retrieval.clone())
                .with_executor(decisions_executor),
            metrics,
            breaker,
        })
    }

    pub fn coordinator(&self) -> &PauseCoordinator<S> {
        &self.coordinator
    }

    pub fn retrieval(&self) -> &SimilarityRetrieval<S> {
        &self.retrieval
    }

    pub fn metrics(&self) -> &Arc<StoreMetrics> {
        &self.metrics
    }

    /// Shared breaker, `None` when disabled in config
    pub fn breaker(&self) -> Option<&Arc<StoreCircuitBreaker>> {
        self.breaker.as_ref()
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| ControlError::InvalidArgument(errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;

    fn config() -> AppConfig {
        AppConfig::default_config("postgres://localhost/tradectl_test")
    }

    #[tokio::test]
    async fn test_metrics_tagged_per_resource() {
        let plane = ControlPlane::with_store(Arc::new(MemoryStore::new()), &config()).unwrap();

        assert!(!plane.coordinator().is_paused().await.unwrap());
        plane
            .retrieval()
            .find_similar("BTC-USD", "{}", 5)
            .await
            .unwrap();

        let control = plane.metrics().snapshot(CONTROL_STATE_RESOURCE).unwrap();
        assert_eq!(control.successes, 1);
        let decisions = plane.metrics().snapshot(DECISIONS_RESOURCE).unwrap();
        assert_eq!(decisions.successes, 1);
    }

    #[tokio::test]
    async fn test_disabled_breaker_is_absent() {
        let mut config = config();
        config.circuit_breaker.enabled = false;
        let plane = ControlPlane::with_store(Arc::new(MemoryStore::new()), &config).unwrap();
        assert!(plane.breaker().is_none());
        assert!(!plane.coordinator().is_paused().await.unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.retrieval.tolerance = 2.0;
        let err = ControlPlane::with_store(Arc::new(MemoryStore::new()), &config)
            .err()
            .unwrap();
        assert!(matches!(err, ControlError::InvalidArgument(_)));
    }
}
