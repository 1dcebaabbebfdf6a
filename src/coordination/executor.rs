//! Resilient Executor
//!
//! Runs a unit of work against the store behind an optional circuit breaker
//! and reports one outcome per call to the metrics sink.

use crate::coordination::circuit_breaker::StoreCircuitBreaker;
use crate::error::{ControlError, Result};
use crate::services::metrics::{MetricsSink, NoopMetrics};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ResilientExecutor {
    resource: String,
    breaker: Option<Arc<StoreCircuitBreaker>>,
    metrics: Arc<dyn MetricsSink>,
}

impl ResilientExecutor {
    pub fn new(
        resource: &str,
        breaker: Option<Arc<StoreCircuitBreaker>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            resource: resource.to_string(),
            breaker,
            metrics,
        }
    }

    /// Executor without a breaker or metrics; every call goes straight through
    pub fn passthrough(resource: &str) -> Self {
        Self::new(resource, None, Arc::new(NoopMetrics))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn breaker(&self) -> Option<&Arc<StoreCircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Run `op` unless the circuit is open.
    ///
    /// Errors from `op` come back unchanged. A refused call returns
    /// `ServiceUnavailable` and `op` is never invoked. If this future is
    /// dropped mid-call, a half-open trial slot is handed back and the trial
    /// counts as failed.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(breaker) = &self.breaker else {
            let result = op().await;
            self.metrics.record_request(&self.resource, result.is_ok());
            return result;
        };

        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => {
                self.metrics.record_request(&self.resource, false);
                debug!(resource = %self.resource, ?rejection, "circuit open, call rejected");
                return Err(ControlError::ServiceUnavailable {
                    resource: self.resource.clone(),
                    retry_after_secs: rejection.retry_after_secs(),
                });
            }
        };

        // Cancelling this future while `op` runs drops the permit unsettled.
        let result = op().await;
        match &result {
            Ok(_) => permit.record_success(),
            Err(e) if e.counts_against_store() => {
                warn!(resource = %self.resource, error = %e, "store call failed");
                permit.record_failure(&e.to_string());
            }
            // The store answered; the operation itself was refused
            Err(_) => permit.record_success(),
        }
        self.metrics.record_request(&self.resource, result.is_ok());
        result
    }
}
