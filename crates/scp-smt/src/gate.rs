//! Requester gate
//!
//! A requester channel hands the mailbox to the agent only when the
//! firmware has something to send. The agent-side notification thread
//! waits on this gate; it is armed while the firmware holds the channel and
//! released by `transmit` once a message is in the mailbox.
//!
//! Only agent threads ever wait here. The dispatch loop arms and releases
//! but never blocks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

pub struct RequesterGate {
    /// true while armed
    armed: Mutex<bool>,
    condvar: Condvar,
    waiters: AtomicUsize,
}

impl RequesterGate {
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(false),
            condvar: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn arm(&self) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Open the gate and wake every waiter.
    pub fn release(&self) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.condvar.notify_all();
    }

    pub fn is_armed(&self) -> bool {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the gate is open. Returns false on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = self.armed.lock().unwrap_or_else(PoisonError::into_inner);

        let released = match timeout {
            Some(t) => {
                let (_guard, result) = self
                    .condvar
                    .wait_timeout_while(guard, t, |armed| *armed)
                    .unwrap_or_else(PoisonError::into_inner);
                !result.timed_out()
            }
            None => {
                let _guard = self
                    .condvar
                    .wait_while(guard, |armed| *armed)
                    .unwrap_or_else(PoisonError::into_inner);
                true
            }
        };

        self.waiters.fetch_sub(1, Ordering::SeqCst);
        released
    }

    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }
}

impl Default for RequesterGate {
    fn default() -> Self {
        Self::new()
    }
}
