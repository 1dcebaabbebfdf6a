//! Store Circuit Breaker
//!
//! Fails store calls fast while the backing store is degraded instead of
//! letting every caller wait out its own timeout. State is process-local;
//! each process detects an outage on its own.
//!
//! Every admitted call holds a [`CallPermit`] stamped with the breaker's
//! epoch, which advances on every trip and close. Outcomes reported through
//! a permit from an older epoch are ignored, and a permit dropped without an
//! outcome (the caller's future was cancelled) hands its trial slot back.
//!
//! The bookkeeping sits behind one `std::sync::Mutex` that is never held
//! across an await, so a permit can settle from `Drop`.

use crate::config::CircuitBreakerSettings;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - all calls allowed
    Closed,
    /// Failure threshold exceeded - calls rejected
    Open,
    /// Recovery period - limited trial calls allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for the store circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures to trip the circuit
    pub failure_threshold: u32,
    /// Failure ratio in the trailing window that trips the circuit
    pub failure_rate_threshold: f64,
    /// Number of outcomes kept in the trailing window
    pub window_size: usize,
    /// Minimum outcomes in the window before the rate is considered
    pub min_calls_in_window: usize,
    /// Time to wait before transitioning from Open to HalfOpen (seconds)
    pub recovery_timeout_secs: u64,
    /// Trial calls allowed in flight while HalfOpen (0 = unlimited)
    pub half_open_max_calls: u32,
    /// Number of successful trial calls in HalfOpen to close circuit
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerSettings::default())
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(s: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: s.failure_threshold,
            failure_rate_threshold: s.failure_rate_threshold,
            window_size: s.window_size,
            min_calls_in_window: s.min_calls_in_window,
            recovery_timeout_secs: s.recovery_timeout_secs,
            half_open_max_calls: s.half_open_max_calls,
            half_open_success_threshold: s.half_open_success_threshold,
        }
    }
}

/// Trip reasons for the circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub enum TripReason {
    ConsecutiveFailures(u32),
    FailureRate(f64),
    TrialFailed(String),
    ManualTrip(String),
}

impl std::fmt::Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripReason::ConsecutiveFailures(n) => write!(f, "{} consecutive failures", n),
            TripReason::FailureRate(rate) => write!(f, "failure rate {:.0}%", rate * 100.0),
            TripReason::TrialFailed(reason) => write!(f, "half-open trial failed: {}", reason),
            TripReason::ManualTrip(reason) => write!(f, "manual: {}", reason),
        }
    }
}

/// Why a call was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Still cooling down
    Open { retry_after_secs: u64 },
    /// Trial slots are taken
    TrialInFlight,
}

impl Rejection {
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Rejection::Open { retry_after_secs } => *retry_after_secs,
            Rejection::TrialInFlight => 0,
        }
    }
}

/// Circuit breaker for store operations
pub struct StoreCircuitBreaker {
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
}

struct BreakerCore {
    state: CircuitState,
    epoch: u64,
    consecutive_failures: u32,
    window: VecDeque<bool>,
    opened_at: Option<DateTime<Utc>>,
    half_open_in_flight: u32,
    half_open_successes: u32,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_trip_reason: Option<TripReason>,
    total_trips: u64,
}

enum Outcome<'a> {
    Success,
    Failure(&'a str),
    Abandoned,
}

impl StoreCircuitBreaker {
    /// Create a new store circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                epoch: 0,
                consecutive_failures: 0,
                window: VecDeque::with_capacity(config.window_size),
                opened_at: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
                last_success: None,
                last_failure: None,
                last_trip_reason: None,
                total_trips: 0,
            }),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    // A panic while holding the lock leaves counters that are still usable.
    fn core(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.core().state
    }

    /// Admission check, called once per attempted operation.
    ///
    /// Moves Open to HalfOpen once the recovery timeout has elapsed and
    /// claims a trial slot while HalfOpen. The outcome is reported through
    /// the returned permit.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, Rejection> {
        let mut core = self.core();

        if core.state == CircuitState::Open {
            let remaining = self.time_until_recovery(&core);
            if remaining > 0 {
                return Err(Rejection::Open {
                    retry_after_secs: remaining,
                });
            }
            core.state = CircuitState::HalfOpen;
            core.half_open_in_flight = 0;
            core.half_open_successes = 0;
            info!("Circuit breaker transitioning to HALF-OPEN");
        }

        if core.state == CircuitState::HalfOpen {
            if self.config.half_open_max_calls > 0
                && core.half_open_in_flight >= self.config.half_open_max_calls
            {
                return Err(Rejection::TrialInFlight);
            }
            core.half_open_in_flight += 1;
        }

        Ok(CallPermit {
            breaker: Arc::clone(self),
            epoch: core.epoch,
            settled: false,
        })
    }

    /// Trip the circuit breaker
    pub fn trip(&self, reason: TripReason) {
        let mut core = self.core();
        self.trip_locked(&mut core, reason);
    }

    /// Manually trip the circuit
    pub fn manual_trip(&self, reason: &str) {
        self.trip(TripReason::ManualTrip(reason.to_string()));
    }

    /// Force close the circuit (manual reset)
    pub fn force_close(&self) {
        let mut core = self.core();
        self.close_locked(&mut core);
        core.last_trip_reason = None;
        warn!("Circuit breaker force-closed");
    }

    /// Get circuit breaker statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        let core = self.core();
        CircuitBreakerStats {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            failure_rate: self.failure_rate(&core),
            last_success: core.last_success,
            last_failure: core.last_failure,
            last_trip_reason: core.last_trip_reason.clone(),
            total_trips: core.total_trips,
        }
    }

    fn settle(&self, epoch: u64, outcome: Outcome<'_>) {
        let mut core = self.core();
        if epoch != core.epoch {
            debug!(
                admitted = epoch,
                current = core.epoch,
                "ignoring outcome from a previous circuit epoch"
            );
            return;
        }

        match outcome {
            Outcome::Success => {
                core.consecutive_failures = 0;
                core.last_success = Some(Utc::now());
                self.push_outcome(&mut core, true);

                if core.state == CircuitState::HalfOpen {
                    core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
                    core.half_open_successes += 1;
                    if core.half_open_successes >= self.config.half_open_success_threshold {
                        self.close_locked(&mut core);
                    }
                }
            }
            Outcome::Failure(reason) => {
                core.consecutive_failures += 1;
                core.last_failure = Some(Utc::now());
                self.push_outcome(&mut core, false);

                let failures = core.consecutive_failures;
                debug!("Store failure #{}: {}", failures, reason);

                let state = core.state;
                match state {
                    CircuitState::HalfOpen => {
                        core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
                        self.trip_locked(&mut core, TripReason::TrialFailed(reason.to_string()));
                    }
                    CircuitState::Closed => {
                        if failures >= self.config.failure_threshold {
                            self.trip_locked(&mut core, TripReason::ConsecutiveFailures(failures));
                        } else if let Some(rate) = self.failure_rate(&core) {
                            if rate >= self.config.failure_rate_threshold {
                                self.trip_locked(&mut core, TripReason::FailureRate(rate));
                            }
                        }
                    }
                    CircuitState::Open => {}
                }
            }
            // A closed-circuit call that never finished says nothing about
            // the store. A trial that never finished did not prove recovery.
            Outcome::Abandoned => {
                if core.state == CircuitState::HalfOpen {
                    core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
                    self.trip_locked(
                        &mut core,
                        TripReason::TrialFailed("trial call abandoned".to_string()),
                    );
                }
            }
        }
    }

    fn trip_locked(&self, core: &mut BreakerCore, reason: TripReason) {
        if core.state == CircuitState::Open {
            return;
        }
        core.state = CircuitState::Open;
        core.epoch += 1;
        core.opened_at = Some(Utc::now());
        core.half_open_in_flight = 0;
        core.half_open_successes = 0;
        core.window.clear();
        core.total_trips += 1;

        warn!("Circuit breaker TRIPPED: {}", reason);
        core.last_trip_reason = Some(reason);
    }

    fn close_locked(&self, core: &mut BreakerCore) {
        core.state = CircuitState::Closed;
        core.epoch += 1;
        core.consecutive_failures = 0;
        core.opened_at = None;
        core.half_open_in_flight = 0;
        core.half_open_successes = 0;
        core.window.clear();

        info!("Circuit breaker CLOSED - store calls resumed");
    }

    fn push_outcome(&self, core: &mut BreakerCore, success: bool) {
        if self.config.window_size == 0 {
            return;
        }
        if core.window.len() == self.config.window_size {
            core.window.pop_front();
        }
        core.window.push_back(success);
    }

    /// Failure ratio of the trailing window, once it holds enough calls
    fn failure_rate(&self, core: &BreakerCore) -> Option<f64> {
        let window = &core.window;
        if window.is_empty() || window.len() < self.config.min_calls_in_window {
            return None;
        }
        let failures = window.iter().filter(|ok| !**ok).count();
        Some(failures as f64 / window.len() as f64)
    }

    fn time_until_recovery(&self, core: &BreakerCore) -> u64 {
        match core.opened_at {
            Some(opened_at) => {
                let elapsed =
                    Utc::now().signed_duration_since(opened_at).num_seconds().max(0) as u64;
                self.config.recovery_timeout_secs.saturating_sub(elapsed)
            }
            None => 0,
        }
    }
}

/// Admission granted by [`StoreCircuitBreaker::try_acquire`].
///
/// Report the outcome with `record_success` or `record_failure`. Dropping
/// the permit without either counts as an abandoned call.
#[must_use = "an unreported permit counts as an abandoned call"]
pub struct CallPermit {
    breaker: Arc<StoreCircuitBreaker>,
    epoch: u64,
    settled: bool,
}

impl CallPermit {
    /// Breaker epoch at admission
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.settle(self.epoch, Outcome::Success);
    }

    pub fn record_failure(mut self, reason: &str) {
        self.settled = true;
        self.breaker.settle(self.epoch, Outcome::Failure(reason));
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.epoch, Outcome::Abandoned);
        }
    }
}

impl fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("epoch", &self.epoch)
            .field("settled", &self.settled)
            .finish()
    }
}

/// Statistics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_rate: Option<f64>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_trip_reason: Option<TripReason>,
    pub total_trips: u64,
}
