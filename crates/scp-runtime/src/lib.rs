//! # scp-runtime
//!
//! The cooperative, interrupt-aware dispatch loop every firmware module
//! runs on.
//!
//! This crate provides:
//! - The event arena and per-thread execution contexts
//! - The signal table, drained ahead of ordinary events
//! - Synchronous-call emulation (`put_event_and_wait`)
//! - Delayed responses and notifications (feature `notification`)
//! - Compile-time and environment configuration

pub mod config;
pub mod module;
pub mod pool;
pub mod context;
pub mod signal;
pub mod scheduler;
pub mod tls;

#[cfg(feature = "notification")]
mod delayed;

// Re-exports
pub use config::{ConfigError, FrameworkConfig};
pub use context::ExecutionContext;
pub use module::{Module, ModuleKind};
pub use pool::{EventHandle, EventPool};
pub use scheduler::{Framework, FrameworkBuilder};
pub use signal::Signal;
