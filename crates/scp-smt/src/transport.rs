//! SMT transport module
//!
//! Each element of the module is one [`Channel`]. The doorbell driver feeds
//! it through [`Smt::signal_message`]; the protocol layer talks to it
//! through [`ScmiTransport`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use scp_core::{fwk_err, fwk_info};
use scp_core::{EntityId, FwkError, FwkResult};
use scp_runtime::{Framework, Module, ModuleKind};

use crate::api::{ScmiService, ScmiTransport, SmtDriver};
use crate::channel::{Channel, ChannelConfig, ChannelRole};
use crate::memory::MailboxMemory;

pub struct Smt {
    module_idx: u8,
    channels: Vec<Channel>,
}

impl Smt {
    /// One channel per entry of `configs`, as elements of module
    /// `module_idx`.
    pub fn new(module_idx: u8, configs: &[ChannelConfig]) -> FwkResult<Self> {
        let channels = configs
            .iter()
            .enumerate()
            .map(|(idx, cfg)| Channel::new(EntityId::element(module_idx, idx as u16), *cfg))
            .collect::<FwkResult<Vec<_>>>()?;

        Ok(Self { module_idx, channels })
    }

    pub fn id(&self) -> EntityId {
        EntityId::module(self.module_idx)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_id(&self, idx: usize) -> Option<EntityId> {
        self.channels.get(idx).map(Channel::id)
    }

    /// Channel addressed by element id `id`
    pub fn channel(&self, id: EntityId) -> FwkResult<&Channel> {
        match id {
            EntityId::Element { module, element } if module == self.module_idx => {
                self.channels.get(element as usize).ok_or(FwkError::Param)
            }
            _ => Err(FwkError::Param),
        }
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// Attach the doorbell driver serving `channel`.
    pub fn bind_driver(&self, channel: EntityId, driver: Arc<dyn SmtDriver>) -> FwkResult<()> {
        self.channel(channel)?.bind_driver(driver);
        Ok(())
    }

    /// Check that `source` may feed messages into `channel`.
    ///
    /// The driver binds back from a sub-element while the channel was
    /// configured with its element, so only module and element indices
    /// are compared.
    pub fn bind_driver_input(&self, channel: EntityId, source: EntityId) -> FwkResult<()> {
        let driver_id = self.channel(channel)?.config().driver_id;
        if driver_id.module_idx() == source.module_idx()
            && driver_id.element_idx() == source.element_idx()
        {
            Ok(())
        } else {
            fwk_err!("[SMT] {} may not drive channel {}", source, channel);
            Err(FwkError::Access)
        }
    }

    /// Attach the protocol service `service_id` to channel `target`.
    pub fn bind_scmi_transport(
        &self,
        target: EntityId,
        service_id: EntityId,
        service: Weak<dyn ScmiService>,
    ) -> FwkResult<()> {
        if !matches!(target, EntityId::Element { .. }) {
            return Err(FwkError::Param);
        }
        self.channel(target)?.bind_service(service_id, service);
        Ok(())
    }

    /// Open every channel for traffic.
    ///
    /// Each channel needs a driver; responder channels also need a service.
    pub fn start(&self) -> FwkResult<()> {
        for ch in &self.channels {
            if !ch.has_driver() || (ch.role() == ChannelRole::Responder && !ch.has_service()) {
                fwk_err!("[SMT] channel {} is not fully bound", ch.id());
                return Err(FwkError::Init);
            }
        }
        for ch in &self.channels {
            ch.set_ready();
        }
        fwk_info!("[SMT] {} channel(s) ready", self.channels.len());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Driver input
    // ------------------------------------------------------------------

    /// The doorbell for `channel_id` rang with mailbox `memory`.
    pub fn signal_message(
        &self,
        fwk: &Framework,
        channel_id: EntityId,
        memory: Arc<dyn MailboxMemory>,
    ) -> FwkResult<()> {
        self.channel(channel_id)?.signal_message(fwk, memory)
    }

    /// Agent side: wait until the firmware transmits on requester channel
    /// `channel`. Returns false on timeout.
    pub fn wait_for_transmit(&self, channel: EntityId, timeout: Option<Duration>) -> FwkResult<bool> {
        let ch = self.channel(channel)?;
        if ch.role() != ChannelRole::Requester {
            return Err(FwkError::Param);
        }
        Ok(ch.gate().wait(timeout))
    }
}

impl Module for Smt {
    fn name(&self) -> &str {
        "SMT"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Service
    }

    fn element_count(&self) -> usize {
        self.channels.len()
    }
}

impl ScmiTransport for Smt {
    fn get_secure(&self, channel: EntityId) -> FwkResult<bool> {
        Ok(self.channel(channel)?.is_secure())
    }

    fn get_max_payload_size(&self, channel: EntityId) -> FwkResult<usize> {
        Ok(self.channel(channel)?.max_payload_size())
    }

    fn get_message_header(&self, channel: EntityId) -> FwkResult<u32> {
        self.channel(channel)?.message_header()
    }

    fn get_payload(&self, channel: EntityId, buf: &mut [u8]) -> FwkResult<usize> {
        self.channel(channel)?.payload(buf)
    }

    fn write_payload(&self, channel: EntityId, offset: usize, data: &[u8]) -> FwkResult<()> {
        self.channel(channel)?.write_payload(offset, data)
    }

    fn respond(&self, channel: EntityId, payload: Option<&[u8]>, size: usize) -> FwkResult<()> {
        self.channel(channel)?.respond(payload, size)
    }

    fn transmit(&self, channel: EntityId, message_header: u32, payload: &[u8]) -> FwkResult<()> {
        self.channel(channel)?.transmit(message_header, payload)
    }
}
