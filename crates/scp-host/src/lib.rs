//! # scp-host
//!
//! A complete hosted firmware image: SMT channels fed by MHU doorbells,
//! routed to SCMI protocol handlers, all on the cooperative dispatch loop.

pub mod firmware;
pub mod protocol;
pub mod router;

// Re-exports
pub use firmware::{module_idx, AgentConfig, HostFirmware};
pub use protocol::{BaseProtocol, Protocol, Reply, Request, BASE_PROTOCOL_ID, BASE_PROTOCOL_VERSION};
pub use router::{Completion, ScmiRouter, EVENT_MESSAGE};
