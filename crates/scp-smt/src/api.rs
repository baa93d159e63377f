//! Interfaces between the transport, the protocol layer and the doorbell
//! driver.

use scp_core::{EntityId, FwkResult};
use scp_runtime::Framework;

/// Implemented by the protocol service bound to a channel.
pub trait ScmiService: Send + Sync {
    /// A message for `service_id` is waiting in its channel.
    ///
    /// Called on the dispatch loop with the channel locked. The service must
    /// eventually call [`ScmiTransport::respond`] exactly once.
    fn signal_message(&self, fwk: &Framework, service_id: EntityId) -> FwkResult<()>;
}

/// Implemented by the doorbell driver underneath a channel.
pub trait SmtDriver: Send + Sync {
    /// Tell the remote side that `slot_id` has something for it.
    fn raise_interrupt(&self, slot_id: EntityId) -> FwkResult<()>;
}

/// Transport operations offered to the protocol layer. Every `channel` is
/// an element id of the transport module.
pub trait ScmiTransport: Send + Sync {
    /// Whether the channel is restricted to the secure world
    fn get_secure(&self, channel: EntityId) -> FwkResult<bool>;

    fn get_max_payload_size(&self, channel: EntityId) -> FwkResult<usize>;

    /// Header word of the message being processed. Access when the channel
    /// holds no message.
    fn get_message_header(&self, channel: EntityId) -> FwkResult<u32>;

    /// Copy the inbound payload into `buf`, returning its length.
    fn get_payload(&self, channel: EntityId, buf: &mut [u8]) -> FwkResult<usize>;

    /// Stage `data` at `offset` in the outbound payload.
    fn write_payload(&self, channel: EntityId, offset: usize, data: &[u8]) -> FwkResult<()>;

    /// Complete the current message. `None` sends the first `size` bytes
    /// already staged with `write_payload`.
    fn respond(&self, channel: EntityId, payload: Option<&[u8]>, size: usize) -> FwkResult<()>;

    /// Send an unsolicited message on a requester channel.
    fn transmit(&self, channel: EntityId, message_header: u32, payload: &[u8]) -> FwkResult<()>;
}
