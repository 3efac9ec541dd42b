//! Circuit breaking for calls to unreliable external dependencies.
//!
//! Wraps calls to flaky external systems (warehouse queries, banking API
//! calls) with failure counting, an open/closed/half-open state machine,
//! and a cooldown, so repeated slow failures fail fast instead of
//! cascading.
//!
//! # State Machine
//!
//! - `Closed`: calls pass through; consecutive failures are counted and
//!   any success resets the count.
//! - `Open`: calls fail fast with `BreakerError::Open` until the cooldown
//!   elapses, then the next call transitions to `HalfOpen` and runs as a
//!   trial.
//! - `HalfOpen`: trial calls pass through; `success_threshold` consecutive
//!   successes close the circuit, any failure reopens it.
//!
//! The breaker observes failures but does not mask them: an underlying
//! error is recorded and re-surfaced unchanged, except for the fail-fast
//! case when the circuit is already open.
//!
//! Each named dependency gets its own breaker instance with independent,
//! process-local state (one per instance in a multi-instance deployment).
//! Instances live in a `BreakerRegistry` owned by the composition root;
//! there is no module-level singleton.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
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

/// Error returned by `CircuitBreaker::execute`.
///
/// `Open` and `Timeout` are the breaker's own signals, distinguishable
/// from the wrapped dependency's errors so callers can choose fast
/// "service temporarily unavailable" messaging over generic failure
/// handling.
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error + 'static> {
    /// The circuit is open; the wrapped call was not invoked.
    #[error("circuit '{name}' is open, failing fast")]
    Open { name: String },

    /// The wrapped call exceeded the configured call timeout.
    #[error("call through circuit '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The wrapped call failed; the original error, unchanged.
    #[error(transparent)]
    Inner(E),
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Identifies the circuit in logs and health reports.
    pub name: String,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before allowing a trial call.
    pub cooldown: Duration,
    /// Consecutive trial successes that close the circuit.
    pub success_threshold: u32,
    /// Optional upper bound on each wrapped call. When set, an elapsed
    /// call counts as a failure; when `None`, a hung call is not cancelled
    /// and only explicit failures open the circuit.
    pub call_timeout: Option<Duration>,
}

impl CircuitBreakerConfig {
    /// Creates a configuration with defaults for the named dependency.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: None,
        }
    }

    /// Sets the consecutive-failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open-state cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the consecutive-trial-success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Mutable breaker state, guarded by a mutex.
///
/// Mutated only by the owning breaker's `execute`; the lock is never held
/// across an await, so a single instance is safe to share between
/// concurrent callers on a multi-threaded runtime.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Stateful guard around calls to one named external dependency.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Creates a new breaker in the closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// The circuit name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current circuit state. Read-only introspection for health checks.
    pub fn state(&self) -> CircuitState {
        self.state.lock().expect("breaker lock poisoned").state
    }

    /// Current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .expect("breaker lock poisoned")
            .consecutive_failures
    }

    /// Health snapshot of this circuit.
    pub fn health(&self) -> CircuitHealth {
        let state = self.state.lock().expect("breaker lock poisoned");
        CircuitHealth {
            name: self.config.name.clone(),
            state: state.state,
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Executes the operation under the breaker.
    ///
    /// If the circuit is open and the cooldown has not elapsed, fails
    /// immediately with `BreakerError::Open` without invoking `op`.
    /// Otherwise the operation runs (as a trial when half-open); successes
    /// and failures update the state machine, and a failure is re-surfaced
    /// to the caller unchanged.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        E: std::error::Error + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            metrics::counter!("perimeter_circuit_rejected_total").increment(1);
            return Err(BreakerError::Open {
                name: self.config.name.clone(),
            });
        }

        let outcome = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result.map_err(BreakerError::Inner),
                Err(_) => Err(BreakerError::Timeout {
                    name: self.config.name.clone(),
                    timeout: limit,
                }),
            },
            None => op().await.map_err(BreakerError::Inner),
        };

        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Whether a call may proceed, transitioning open→half-open when the
    /// cooldown has elapsed.
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .is_some_and(|opened| opened.elapsed() >= self.config.cooldown);
                if cooled_down {
                    info!(circuit = %self.config.name, "cooldown elapsed, allowing trial call");
                    state.state = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures = 0;
        match state.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.config.success_threshold {
                    info!(circuit = %self.config.name, "trial succeeded, closing circuit");
                    metrics::counter!("perimeter_circuit_closed_total").increment(1);
                    state.state = CircuitState::Closed;
                    state.consecutive_successes = 0;
                    state.opened_at = None;
                }
            }
            // A racing success from a call admitted before the circuit
            // opened; the cooldown still applies.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
        let should_open = match state.state {
            CircuitState::Closed => state.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if should_open {
            warn!(
                circuit = %self.config.name,
                failures = state.consecutive_failures,
                "opening circuit"
            );
            metrics::counter!("perimeter_circuit_opened_total").increment(1);
            state.state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
        }
    }
}

/// Serializable per-circuit health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitHealth {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Container for the process's named circuit breakers.
///
/// One breaker per external dependency, registered once at startup and
/// handed out as `Arc` to the callers that wrap that dependency.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    circuits: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a breaker for the named dependency, or returns the
    /// existing one if already registered.
    pub fn register(&self, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.circuits
            .entry(config.name.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(config)))
            .clone()
    }

    /// Looks up a breaker by name.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Health snapshot of every registered circuit, sorted by name.
    pub fn snapshot(&self) -> Vec<CircuitHealth> {
        let mut circuits: Vec<CircuitHealth> =
            self.circuits.iter().map(|b| b.health()).collect();
        circuits.sort_by(|a, b| a.name.cmp(&b.name));
        circuits
    }
}

/// Registers circuit breaker metric descriptions.
pub fn register_breaker_metrics() {
    metrics::describe_counter!(
        "perimeter_circuit_opened_total",
        "Total number of circuit-open transitions"
    );
    metrics::describe_counter!(
        "perimeter_circuit_closed_total",
        "Total number of circuit-close transitions"
    );
    metrics::describe_counter!(
        "perimeter_circuit_rejected_total",
        "Total number of calls rejected while a circuit was open"
    );
}
