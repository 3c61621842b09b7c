//! Consumer permits for free-run acquisition.
//!
//! Free-running cameras produce frames faster than many consumers can handle.
//! The acquisition worker takes one permit before dispatching each frame and
//! consumers hand permits back with `ready()`. Closing the gate wakes every
//! waiter and makes all further acquires fail, which is how `stop()` breaks a
//! worker out of the permit wait.

use parking_lot::{Condvar, Mutex};
use tracing::trace;

#[derive(Debug)]
struct GateState {
    permits: u64,
    open: bool,
}

/// Counting semaphore with a close-wakes-all contract.
#[derive(Debug)]
pub struct PermitGate {
    state: Mutex<GateState>,
    available: Condvar,
}

impl PermitGate {
    /// An open gate holding `initial` permits.
    pub fn new(initial: u64) -> Self {
        Self {
            state: Mutex::new(GateState {
                permits: initial,
                open: true,
            }),
            available: Condvar::new(),
        }
    }

    /// Reopen the gate with a fresh permit count.
    pub fn reset(&self, initial: u64) {
        let mut state = self.state.lock();
        state.permits = initial;
        state.open = true;
    }

    /// Add one permit and wake one waiter.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits = state.permits.saturating_add(1);
        trace!(permits = state.permits, "Permit released");
        self.available.notify_one();
    }

    /// Block until a permit is available, then take it.
    ///
    /// Returns `false` without taking a permit once the gate is closed.
    pub fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if !state.open {
                return false;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            self.available.wait(&mut state);
        }
    }

    /// Close the gate and wake all waiters.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        self.available.notify_all();
    }

    /// False once the gate has been closed.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Permits currently available.
    pub fn available(&self) -> u64 {
        self.state.lock().permits
    }
}
