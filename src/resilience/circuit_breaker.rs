//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: one probe request tests whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: first request after cool_down since opened_at
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (opened_at refreshed)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker, created lazily, never removed
//! - Every transition happens under one short mutex; nothing awaits while holding it
//! - Admission hands out a [`CallPermit`]; a permit dropped without an outcome
//!   is a cancellation and is not counted
//! - Single probe in Half-Open (prevents hammering recovering backend)

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::{BreakerSettings, CircuitBreakerConfig};
use crate::observability::metrics;

/// Breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitStatus::Closed => 0.0,
            CircuitStatus::HalfOpen => 1.0,
            CircuitStatus::Open => 2.0,
        }
    }
}

/// Mutable state of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    pub half_open_probe_in_flight: bool,
    /// Bumped each time the circuit opens. Permits carry the value they were issued under.
    pub generation: u64,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_probe_in_flight: false,
            generation: 0,
        }
    }
}

/// Returned when a request is short-circuited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit is {status:?}")]
pub struct CircuitOpen {
    pub status: CircuitStatus,
}

/// Circuit breaker for one logical service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    settings: BreakerSettings,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            service: service.into(),
            settings,
            state: Mutex::new(CircuitState::default()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    /// Copy of the current state.
    pub fn state(&self) -> CircuitState {
        *self.state.lock()
    }

    /// Ask to send one request through.
    ///
    /// In Open state the first caller after the cool-down becomes the probe;
    /// the probe flag is tested and set under the same lock.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, CircuitOpen> {
        let mut state = self.state.lock();
        let status = state.status;
        match status {
            CircuitStatus::Closed => Ok(self.permit(false, state.generation)),
            CircuitStatus::Open => {
                let cooled = state
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.settings.cool_down);
                if !cooled {
                    return Err(CircuitOpen { status });
                }
                state.status = CircuitStatus::HalfOpen;
                state.half_open_probe_in_flight = true;
                let generation = state.generation;
                drop(state);
                tracing::info!(service = %self.service, "Circuit half-open, admitting probe");
                metrics::record_circuit_state(&self.service, CircuitStatus::HalfOpen);
                Ok(self.permit(true, generation))
            }
            CircuitStatus::HalfOpen => {
                if state.half_open_probe_in_flight {
                    return Err(CircuitOpen { status });
                }
                state.half_open_probe_in_flight = true;
                Ok(self.permit(true, state.generation))
            }
        }
    }

    fn permit(self: &Arc<Self>, probe: bool, generation: u64) -> CallPermit {
        CallPermit {
            breaker: Arc::clone(self),
            probe,
            generation,
            settled: false,
        }
    }

    fn on_success(&self, probe: bool, generation: u64) {
        let mut state = self.state.lock();
        match (state.status, probe) {
            (CircuitStatus::HalfOpen, true) => {
                *state = CircuitState {
                    generation: state.generation,
                    ..CircuitState::default()
                };
                drop(state);
                tracing::info!(service = %self.service, "Probe succeeded, circuit closed");
                metrics::record_circuit_state(&self.service, CircuitStatus::Closed);
            }
            (CircuitStatus::Closed, false) if generation == state.generation => {
                state.consecutive_failures = 0
            }
            // Late outcome from a request admitted before the circuit last opened.
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool, generation: u64) {
        let mut state = self.state.lock();
        match (state.status, probe) {
            (CircuitStatus::HalfOpen, true) => {
                state.status = CircuitStatus::Open;
                state.opened_at = Some(Instant::now());
                state.half_open_probe_in_flight = false;
                state.generation += 1;
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                drop(state);
                tracing::warn!(service = %self.service, "Probe failed, circuit re-opened");
                metrics::record_circuit_state(&self.service, CircuitStatus::Open);
            }
            (CircuitStatus::Closed, false) if generation == state.generation => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                if state.consecutive_failures >= self.settings.failure_threshold {
                    state.status = CircuitStatus::Open;
                    state.opened_at = Some(Instant::now());
                    state.generation += 1;
                    let failures = state.consecutive_failures;
                    drop(state);
                    tracing::warn!(
                        service = %self.service,
                        failures,
                        cool_down_ms = self.settings.cool_down.as_millis() as u64,
                        "Circuit opened"
                    );
                    metrics::record_circuit_state(&self.service, CircuitStatus::Open);
                }
            }
            _ => {}
        }
    }

    fn on_cancel(&self, probe: bool) {
        if !probe {
            return;
        }
        let mut state = self.state.lock();
        if state.status == CircuitStatus::HalfOpen {
            state.half_open_probe_in_flight = false;
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state();
        CircuitSnapshot {
            service: self.service.clone(),
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            open_for_ms: state.opened_at.map(|at| at.elapsed().as_millis() as u64),
            half_open_probe_in_flight: state.half_open_probe_in_flight,
            failure_threshold: self.settings.failure_threshold,
            cool_down_ms: self.settings.cool_down.as_millis() as u64,
        }
    }
}

/// Admission ticket for one request.
///
/// Settle it with [`CallPermit::success`] or [`CallPermit::failure`]. Dropping
/// it unsettled releases a held probe slot without touching the counters.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    generation: u64,
    settled: bool,
}

impl CallPermit {
    /// Whether this request is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe, self.generation);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe, self.generation);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_cancel(self.probe);
        }
    }
}

/// Serializable view of a breaker for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub service: String,
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub open_for_ms: Option<u64>,
    pub half_open_probe_in_flight: bool,
    pub failure_threshold: u32,
    pub cool_down_ms: u64,
}

/// Process-wide map of breakers keyed by service name.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or lazily create the breaker for `service`.
    pub fn get_or_create(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(service) {
            return Arc::clone(breaker.value());
        }
        let breaker = self
            .breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(service, self.config.settings_for(service)))
            });
        Arc::clone(breaker.value())
    }

    /// Existing breaker, without creating one.
    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service).map(|b| Arc::clone(b.value()))
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots sorted by service name.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.value().snapshot()).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }
}
