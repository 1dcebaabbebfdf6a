//! Coordination layer for the trading control plane
//!
//! - Circuit breaker guarding the shared store
//! - Resilient executor wrapping store calls with the breaker and metrics
//! - Pause coordinator, the global trading kill-switch

pub mod circuit_breaker;
pub mod executor;
pub mod pause;

pub use circuit_breaker::{
    CallPermit, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Rejection,
    StoreCircuitBreaker, TripReason,
};
pub use executor::ResilientExecutor;
pub use pause::PauseCoordinator;
