use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Lock wait ceiling inside pause/resume transactions
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

/// Circuit breaker protecting store calls
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Disabled means calls pass straight through to the store
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Consecutive failures that trip the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Failure ratio over the trailing window that trips the circuit
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// Number of recent outcomes kept in the trailing window
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// The failure rate is only evaluated once the window holds this many calls
    #[serde(default = "default_min_calls_in_window")]
    pub min_calls_in_window: usize,
    /// Seconds spent open before allowing a trial call
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    /// Concurrent trial calls allowed while half-open
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    /// Trial successes needed to close again
    #[serde(default = "default_half_open_success_threshold")]
    pub half_open_success_threshold: u32,
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_window_size() -> usize {
    20
}

fn default_min_calls_in_window() -> usize {
    10
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

fn default_half_open_max_calls() -> u32 {
    1
}

fn default_half_open_success_threshold() -> u32 {
    1
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            failure_rate_threshold: default_failure_rate_threshold(),
            window_size: default_window_size(),
            min_calls_in_window: default_min_calls_in_window(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            half_open_max_calls: default_half_open_max_calls(),
            half_open_success_threshold: default_half_open_success_threshold(),
        }
    }
}

/// Similarity retrieval tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Hard ceiling applied to any caller supplied limit
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    /// Only decisions newer than this many days are similarity candidates
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
    /// Candidates fetched per requested result
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: i64,
    /// Relative difference under which two indicator values match (0.15 = 15%)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_limit() -> i64 {
    1000
}

/// Longest similarity lookback accepted by `validate`
pub const MAX_RECENCY_DAYS: i64 = 3650;

fn default_recency_days() -> i64 {
    30
}

fn default_overfetch_factor() -> i64 {
    3
}

fn default_tolerance() -> f64 {
    0.15
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
            recency_days: default_recency_days(),
            overfetch_factor: default_overfetch_factor(),
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADECTL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADECTL_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("TRADECTL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration with every default filled in, pointing at a local database
    pub fn default_config(database_url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: default_max_connections(),
                acquire_timeout_secs: default_acquire_timeout_secs(),
                lock_timeout_ms: default_lock_timeout_ms(),
            },
            circuit_breaker: CircuitBreakerSettings::default(),
            retrieval: RetrievalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be positive".to_string());
        }
        if cb.failure_rate_threshold <= 0.0 || cb.failure_rate_threshold > 1.0 {
            errors.push("circuit_breaker.failure_rate_threshold must be in (0, 1]".to_string());
        }
        if cb.min_calls_in_window > cb.window_size {
            errors.push(
                "circuit_breaker.min_calls_in_window must not exceed window_size".to_string(),
            );
        }
        if cb.half_open_success_threshold == 0 {
            errors.push("circuit_breaker.half_open_success_threshold must be positive".to_string());
        }

        let r = &self.retrieval;
        if r.max_limit <= 0 {
            errors.push("retrieval.max_limit must be positive".to_string());
        }
        if r.recency_days <= 0 || r.recency_days > MAX_RECENCY_DAYS {
            errors.push(format!(
                "retrieval.recency_days must be between 1 and {MAX_RECENCY_DAYS}"
            ));
        }
        if r.overfetch_factor < 1 {
            errors.push("retrieval.overfetch_factor must be at least 1".to_string());
        }
        if r.tolerance <= 0.0 || r.tolerance >= 1.0 {
            errors.push("retrieval.tolerance must be between 0 and 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
