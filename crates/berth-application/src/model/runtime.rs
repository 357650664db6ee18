//! Per-port runtime bookkeeping of launched models.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Transient health state of the model published on one host port.
#[derive(Debug, Default)]
pub struct ModelRuntimeState {
    has_checker_running: AtomicBool,
    answering: AtomicBool,
}

impl ModelRuntimeState {
    pub fn has_checker_running(&self) -> bool {
        self.has_checker_running.load(Ordering::SeqCst)
    }

    pub fn is_answering(&self) -> bool {
        self.answering.load(Ordering::SeqCst)
    }

    pub fn set_answering(&self, answering: bool) {
        self.answering.store(answering, Ordering::SeqCst);
    }

    /// Claims the checker slot. Only the caller that gets `true` may start a
    /// health-check loop for this port.
    pub fn try_claim_checker(&self) -> bool {
        self.has_checker_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release_checker(&self) {
        self.has_checker_running.store(false, Ordering::SeqCst);
    }
}

/// Releases the checker slot when the loop that claimed it ends, however it ends.
pub(crate) struct CheckerGuard(pub(crate) Arc<ModelRuntimeState>);

impl Drop for CheckerGuard {
    fn drop(&mut self) {
        self.0.release_checker();
    }
}

/// Runtime states keyed by host port, created on first access.
#[derive(Debug, Default)]
pub struct RuntimeStateTable {
    states: Mutex<HashMap<u16, Arc<ModelRuntimeState>>>,
}

impl RuntimeStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state for `port`, inserting a fresh one atomically.
    pub fn get_or_insert(&self, port: u16) -> Arc<ModelRuntimeState> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(states.entry(port).or_default())
    }

    pub fn get(&self, port: u16) -> Option<Arc<ModelRuntimeState>> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(&port).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert_returns_same_state() {
        let table = RuntimeStateTable::new();
        assert!(table.get(8001).is_none());

        let a = table.get_or_insert(8001);
        a.set_answering(true);
        let b = table.get_or_insert(8001);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(b.is_answering());
    }

    #[test]
    fn test_checker_claim_is_exclusive() {
        let state = Arc::new(ModelRuntimeState::default());
        assert!(state.try_claim_checker());
        assert!(!state.try_claim_checker());

        drop(CheckerGuard(Arc::clone(&state)));
        assert!(!state.has_checker_running());
        assert!(state.try_claim_checker());
    }
}
