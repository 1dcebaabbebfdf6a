pub mod adapters;
pub mod config;
pub mod control_plane;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod retrieval;
pub mod services;

pub use adapters::{MemoryStore, PostgresStore};
pub use config::AppConfig;
pub use control_plane::ControlPlane;
pub use coordination::{
    CircuitState, PauseCoordinator, ResilientExecutor, StoreCircuitBreaker,
};
pub use domain::{
    ControlState, ControlStateRecord, DecisionOutcome, DecisionRecord, NewControlState,
    NewDecision,
};
pub use error::{ControlError, Result};
pub use persistence::{ControlStateStore, DecisionStore};
pub use retrieval::{RetrievalTier, SimilarDecision, SimilarityRetrieval};
pub use services::{MetricsSink, StoreMetrics};
