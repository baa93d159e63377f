//! # scp-smt
//!
//! Shared-memory mailbox transport for SCMI.
//!
//! - [`layout`]: the mailbox wire format
//! - [`Smt`]: the transport module, one channel per element
//! - [`Mhu`]: the doorbell driver feeding the transport
//!
//! A responder exchange looks like this:
//!
//! ```text
//! agent writes mailbox, clears FREE, rings doorbell
//!   -> Mhu::signal_smt_message -> Smt::signal_message (channel LOCKED)
//!   -> ScmiService::signal_message
//!   -> ScmiTransport::respond (channel FREE, FREE bit set, doorbell)
//! ```

pub mod api;
pub mod channel;
pub mod doorbell;
pub mod gate;
pub mod layout;
pub mod memory;
pub mod mhu;
pub mod scmi;
pub mod transport;

// Re-exports
pub use api::{ScmiService, ScmiTransport, SmtDriver};
pub use channel::{Channel, ChannelConfig, ChannelRole, POLICY_NONE, POLICY_SECURE};
pub use doorbell::{CountingDoorbell, Doorbell, HostDoorbell};
pub use layout::MailboxHeader;
pub use memory::{HeapMailbox, MailboxMemory, RawMailbox};
pub use mhu::{Mhu, MhuDeviceConfig};
pub use scmi::{MessageHeader, MessageType};
pub use transport::Smt;
