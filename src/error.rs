use thiserror::Error;

/// Main error type for the control plane
#[derive(Error, Debug)]
pub enum ControlError {
    // Caller errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state transition: from {from} to {to} ({reason})")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    // Store errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The circuit breaker rejected the call before the operation ran.
    #[error("Service unavailable: {resource} is protected by an open circuit, retry in {retry_after_secs}s")]
    ServiceUnavailable {
        resource: String,
        retry_after_secs: u64,
    },

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Data errors
    #[error("Malformed data: {0}")]
    MalformedData(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Shorthand for a transition rejected by the current control state.
    pub fn invalid_transition(from: impl ToString, to: impl ToString, reason: &str) -> Self {
        ControlError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the store could not be reached, either because the call
    /// failed or because the circuit breaker refused it.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            ControlError::StoreUnavailable(_) | ControlError::ServiceUnavailable { .. }
        )
    }

    /// Whether this error says something about store health.
    ///
    /// Caller mistakes and rejected transitions prove the store answered, so
    /// they must not push the circuit towards open.
    pub fn counts_against_store(&self) -> bool {
        matches!(self, ControlError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for ControlError {
    fn from(err: sqlx::Error) -> Self {
        ControlError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        ControlError::MalformedData(err.to_string())
    }
}

/// Result type alias for ControlError
pub type Result<T> = std::result::Result<T, ControlError>;
