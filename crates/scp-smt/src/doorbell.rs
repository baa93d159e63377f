//! Doorbells: how the firmware pokes the agent.
//!
//! On real hardware ringing a doorbell writes an MHU register. Hosted
//! builds use an eventfd on Linux so an agent thread can poll it, and a
//! plain counter elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};

use scp_core::FwkResult;

/// Remote interrupt line
pub trait Doorbell: Send + Sync {
    fn ring(&self) -> FwkResult<()>;

    /// Consume pending rings and return how many there were.
    fn take(&self) -> FwkResult<u64>;
}

/// Doorbell that only counts
#[derive(Debug, Default)]
pub struct CountingDoorbell {
    pending: AtomicU64,
}

impl CountingDoorbell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Doorbell for CountingDoorbell {
    fn ring(&self) -> FwkResult<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take(&self) -> FwkResult<u64> {
        Ok(self.pending.swap(0, Ordering::SeqCst))
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod eventfd;
        pub use eventfd::EventFdDoorbell;
        /// Doorbell used by hosted builds on this platform
        pub type HostDoorbell = EventFdDoorbell;
    } else {
        pub type HostDoorbell = CountingDoorbell;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_doorbell() {
        let bell = CountingDoorbell::new();
        bell.ring().unwrap();
        bell.ring().unwrap();
        assert_eq!(bell.take().unwrap(), 2);
        assert_eq!(bell.take().unwrap(), 0);
    }
}
