//! # scp-core
//!
//! Core types shared by every part of the SCP firmware framework.
//!
//! This crate holds no scheduling logic. The dispatch loop lives in
//! `scp-runtime` and the mailbox transport in `scp-smt`.
//!
//! ## Modules
//!
//! - `id` - Entity identifiers (module, element, sub-element, api, event, notification)
//! - `event` - Event record exchanged between modules
//! - `error` - Framework status codes
//! - `irq_lock` - Interrupt-masking critical section
//! - `interrupt` - Interrupt-context query
//! - `log` - Framework log macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod event;
pub mod error;
pub mod irq_lock;
pub mod interrupt;
pub mod log;
pub mod env;

// Re-exports for convenience
pub use id::{EntityId, EntityKind};
pub use event::{Event, EventKind};
pub use error::{FwkError, FwkResult};
pub use irq_lock::{IrqLock, IrqLockGuard};
pub use interrupt::{HostInterrupts, InterruptDriver};
pub use env::{env_get, env_get_bool};

/// Framework-wide constants
pub mod constants {
    /// Size of the inline parameter buffer carried by every event
    pub const EVENT_PARAMETERS_SIZE: usize = 16;

    /// Largest element (or api/event/notification) index
    pub const MAX_ELEMENT_INDEX: u32 = 0xFFF;
}
