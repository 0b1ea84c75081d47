//! Per-worker circuit breaker registry.
//!
//! Tracks consecutive failures per [`WorkerId`]. Reaching the threshold
//! opens the circuit; after the cooldown the *next query* moves it to
//! half-open (lazy transition, no background timer) and one trial call is
//! allowed. A half-open success closes the circuit, a half-open failure
//! re-opens it and resets the failure timer.
//!
//! The map is owned by this registry and guarded by a single mutex; every
//! state transition happens under the lock, which is the single-writer
//! discipline the engine relies on when independent tasks interleave.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ternary::Ternary;
use crate::worker::WorkerId;

/// Circuit state for a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy — requests allowed.
    Closed,
    /// Tripped — requests blocked until cooldown expires.
    Open,
    /// Cooldown expired — one probe request allowed.
    HalfOpen,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    failures: u32,
    state: CircuitState,
    last_failure_secs: u64,
}

/// Registry of circuit breakers, one entry created lazily per failing worker.
///
/// Entries are never deleted during the process lifetime; state is in-memory
/// only and not persisted across restarts.
#[derive(Debug)]
pub struct CircuitRegistry {
    entries: Mutex<HashMap<WorkerId, BreakerEntry>>,
    /// Consecutive failures before the circuit opens.
    failure_threshold: u32,
    /// Seconds after the last failure before Open → HalfOpen.
    cooldown_secs: u64,
}

impl CircuitRegistry {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            failure_threshold,
            cooldown_secs,
        }
    }

    /// Record a success — clears failures and closes the circuit.
    pub fn record_success(&self, worker: WorkerId) {
        let mut entries = self.entries.lock().expect("circuit map poisoned");
        if let Some(entry) = entries.get_mut(&worker) {
            entry.failures = 0;
            entry.state = CircuitState::Closed;
        }
    }

    /// Record a failure — may trip the circuit to Open.
    pub fn record_failure(&self, worker: WorkerId) {
        let mut entries = self.entries.lock().expect("circuit map poisoned");
        let entry = entries.entry(worker).or_insert(BreakerEntry {
            failures: 0,
            state: CircuitState::Closed,
            last_failure_secs: 0,
        });
        entry.failures += 1;
        entry.last_failure_secs = unix_now();
        if entry.failures >= self.failure_threshold {
            let reopened = entry.state == CircuitState::HalfOpen;
            entry.state = CircuitState::Open;
            tracing::warn!(
                worker = %worker,
                failures = entry.failures,
                reopened,
                "circuit opened"
            );
        }
    }

    /// Current state of the circuit for `worker`.
    ///
    /// Querying an Open circuit whose cooldown has elapsed transitions it to
    /// HalfOpen as a side effect — the trial call is allowed from then on.
    pub fn state(&self, worker: WorkerId) -> CircuitState {
        let mut entries = self.entries.lock().expect("circuit map poisoned");
        let Some(entry) = entries.get_mut(&worker) else {
            return CircuitState::Closed;
        };
        if entry.state == CircuitState::Open
            && unix_now().saturating_sub(entry.last_failure_secs) >= self.cooldown_secs
        {
            entry.state = CircuitState::HalfOpen;
            tracing::info!(worker = %worker, "circuit half-open, allowing trial call");
        }
        entry.state
    }

    /// Consecutive failures recorded for `worker`.
    pub fn failure_count(&self, worker: WorkerId) -> u32 {
        self.entries
            .lock()
            .expect("circuit map poisoned")
            .get(&worker)
            .map(|e| e.failures)
            .unwrap_or(0)
    }

    /// Circuit level for health grids: Open −1, HalfOpen or any recorded
    /// failures 0, Closed 1.
    pub fn circuit_level(&self, worker: WorkerId) -> Ternary {
        match self.state(worker) {
            CircuitState::Open => Ternary::Minus,
            CircuitState::HalfOpen => Ternary::Zero,
            CircuitState::Closed => {
                if self.failure_count(worker) > 0 {
                    Ternary::Zero
                } else {
                    Ternary::Plus
                }
            }
        }
    }

    /// Aggregate health bias across `workers`: the average circuit level
    /// mapped to a ternary (> 0.6 healthy, > −0.2 neutral, else degraded).
    pub fn health_bias(&self, workers: &[WorkerId]) -> Ternary {
        if workers.is_empty() {
            return Ternary::Plus;
        }
        let sum: i32 = workers
            .iter()
            .map(|&w| self.circuit_level(w).as_i8() as i32)
            .sum();
        let average = sum as f64 / workers.len() as f64;
        if average > 0.6 {
            Ternary::Plus
        } else if average > -0.2 {
            Ternary::Zero
        } else {
            Ternary::Minus
        }
    }
}
