//! In-flight computation guard
//!
//! Tracks which fingerprints are currently being explained so duplicate
//! requests never compute the same thing twice. Admission hands out an RAII
//! permit; dropping the permit releases the fingerprint and wakes blocked
//! waiters, which also covers early returns and panics inside the
//! computation. An optional cap bounds how many distinct computations run
//! at once.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::input::Fingerprint;

/// Outcome of asking the guard to start a computation
#[derive(Debug)]
#[must_use]
pub enum Admission<'a> {
    /// The caller owns the computation until the permit drops
    Admitted(InFlightPermit<'a>),
    /// The same fingerprint is already being computed elsewhere
    Duplicate,
    /// The cap on concurrent computations is reached
    AtCapacity,
}

impl Admission<'_> {
    /// Whether this admission carries a permit
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

#[derive(Debug, Default)]
struct GuardState {
    in_flight: HashSet<String>,
}

/// Fingerprint-keyed guard over concurrent explanation runs
#[derive(Debug)]
pub struct ConcurrencyGuard {
    state: Mutex<GuardState>,
    released: Condvar,
    max_in_flight: usize,
}

impl ConcurrencyGuard {
    /// Create a guard capping concurrent computations; 0 means no cap
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            state: Mutex::new(GuardState::default()),
            released: Condvar::new(),
            max_in_flight,
        }
    }

    /// Try to claim `fingerprint` for computation
    pub fn try_begin(&self, fingerprint: &Fingerprint) -> Admission<'_> {
        let mut state = self.lock();
        let key = fingerprint.canonical();
        if state.in_flight.contains(key) {
            return Admission::Duplicate;
        }
        if self.max_in_flight > 0 && state.in_flight.len() >= self.max_in_flight {
            return Admission::AtCapacity;
        }
        state.in_flight.insert(key.to_string());
        Admission::Admitted(InFlightPermit {
            guard: self,
            key: key.to_string(),
        })
    }

    /// Block until `fingerprint` is no longer in flight or `timeout` passes
    ///
    /// Returns true when the fingerprint is clear on wakeup, regardless of
    /// whether the wait ran its full course.
    pub fn wait_until_clear(&self, fingerprint: &Fingerprint, timeout: Duration) -> bool {
        let key = fingerprint.canonical();
        let state = self.lock();
        let (state, _timed_out) = self
            .released
            .wait_timeout_while(state, timeout, |s| s.in_flight.contains(key))
            .unwrap_or_else(PoisonError::into_inner);
        !state.in_flight.contains(key)
    }

    /// Whether `fingerprint` is currently being computed
    pub fn is_in_flight(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().in_flight.contains(fingerprint.canonical())
    }

    /// Number of computations currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // Set mutations are single-step, so a poisoned set is still
        // internally consistent and safe to reuse.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Claim on one fingerprint, released on drop
#[derive(Debug)]
pub struct InFlightPermit<'a> {
    guard: &'a ConcurrencyGuard,
    key: String,
}

impl InFlightPermit<'_> {
    /// Canonical fingerprint this permit holds
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        let mut state = self.guard.lock();
        state.in_flight.remove(&self.key);
        drop(state);
        self.guard.released.notify_all();
    }
}
