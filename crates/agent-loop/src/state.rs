//! The per-process execution session.
//!
//! The driver is the sole actor for the user's browser, so exactly one
//! command may execute at a time. The session owns the single-flight
//! claim, the per-command cancellation token, and the attached-debug-tab
//! registry shared with the executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use tabpilot_action_executor::DebugRegistry;

#[derive(Debug)]
pub struct ExecutionState {
    is_executing: AtomicBool,
    /// Replaced on every command entry; armed only while executing.
    stop: Mutex<CancellationToken>,
    debug: Arc<DebugRegistry>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            is_executing: AtomicBool::new(false),
            stop: Mutex::new(CancellationToken::new()),
            debug: Arc::new(DebugRegistry::new()),
        }
    }
}

impl ExecutionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_executing(&self) -> bool {
        self.is_executing.load(Ordering::SeqCst)
    }

    /// Claim the single-flight slot. On success the previous stop request
    /// is cleared by installing a fresh token.
    pub fn try_claim(&self) -> Option<ClaimGuard<'_>> {
        if self
            .is_executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let token = CancellationToken::new();
        *self.stop.lock() = token.clone();
        Some(ClaimGuard { state: self, token })
    }

    /// Token of the command currently executing (or the last one).
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.lock().clone()
    }

    /// Request cooperative cancellation of the running command. A no-op
    /// when nothing is executing.
    pub fn request_stop(&self) {
        if self.is_executing() {
            self.stop.lock().cancel();
        }
    }

    pub fn debug_registry(&self) -> Arc<DebugRegistry> {
        Arc::clone(&self.debug)
    }
}

/// Releases the single-flight claim on drop.
pub struct ClaimGuard<'a> {
    state: &'a ExecutionState,
    token: CancellationToken,
}

impl ClaimGuard<'_> {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.state.is_executing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let state = ExecutionState::new();
        let guard = state.try_claim().expect("first claim");
        assert!(state.is_executing());
        assert!(state.try_claim().is_none());
        drop(guard);
        assert!(!state.is_executing());
        assert!(state.try_claim().is_some());
    }

    #[test]
    fn claim_clears_previous_stop_request() {
        let state = ExecutionState::new();
        {
            let guard = state.try_claim().unwrap();
            state.request_stop();
            assert!(guard.token().is_cancelled());
        }
        let guard = state.try_claim().unwrap();
        assert!(!guard.token().is_cancelled());
    }

    #[test]
    fn stop_without_execution_is_a_no_op() {
        let state = ExecutionState::new();
        state.request_stop();
        let guard = state.try_claim().unwrap();
        assert!(!guard.token().is_cancelled());
    }
}
