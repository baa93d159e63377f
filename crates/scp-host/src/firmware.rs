//! Hosted firmware image
//!
//! Wires the transport, the doorbell driver and the SCMI router onto one
//! [`Framework`], one agent per MHU device, and exposes the three entry
//! points a host (or a trusted OS) drives it through: [`devices_count`],
//! [`get_device`] and [`process_message`].
//!
//! [`devices_count`]: HostFirmware::devices_count
//! [`get_device`]: HostFirmware::get_device
//! [`process_message`]: HostFirmware::process_message

use std::sync::{Arc, Weak};

use scp_core::{fwk_info, fwk_trace};
use scp_core::{EntityId, FwkError, FwkResult};
use scp_runtime::{Framework, FrameworkConfig};
use scp_smt::{
    ChannelConfig, ChannelRole, CountingDoorbell, Doorbell, MailboxMemory, Mhu, MhuDeviceConfig,
    ScmiService, Smt,
};

use crate::protocol::BaseProtocol;
use crate::router::ScmiRouter;

/// Module indices of the hosted image
pub mod module_idx {
    pub const SMT: u8 = 0;
    pub const MHU: u8 = 1;
    pub const SCMI: u8 = 2;
}

/// One agent: a channel, the MHU device carrying it and a router service
pub struct AgentConfig {
    pub role: ChannelRole,
    pub mailbox_size: usize,
    pub secure: bool,
    pub doorbell: Arc<dyn Doorbell>,
}

impl AgentConfig {
    /// Responder channel with a counting doorbell
    pub fn responder(mailbox_size: usize) -> Self {
        Self {
            role: ChannelRole::Responder,
            mailbox_size,
            secure: false,
            doorbell: Arc::new(CountingDoorbell::new()),
        }
    }

    pub fn requester(mailbox_size: usize) -> Self {
        Self {
            role: ChannelRole::Requester,
            ..Self::responder(mailbox_size)
        }
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn doorbell(mut self, doorbell: Arc<dyn Doorbell>) -> Self {
        self.doorbell = doorbell;
        self
    }
}

pub struct HostFirmware {
    fwk: Framework,
    smt: Arc<Smt>,
    mhu: Arc<Mhu>,
    router: Arc<ScmiRouter>,
}

impl HostFirmware {
    pub fn new(config: FrameworkConfig, agents: Vec<AgentConfig>) -> FwkResult<Self> {
        scp_core::log::init();
        if agents.is_empty() || agents.len() > u8::MAX as usize {
            return Err(FwkError::Param);
        }

        let channel_cfgs = agents
            .iter()
            .enumerate()
            .map(|(i, agent)| {
                let cfg = ChannelConfig::new(
                    agent.role,
                    agent.mailbox_size,
                    EntityId::sub_element(module_idx::MHU, i as u16, 0),
                );
                if agent.secure {
                    cfg.secure()
                } else {
                    cfg
                }
            })
            .collect::<Vec<_>>();
        let smt = Arc::new(Smt::new(module_idx::SMT, &channel_cfgs)?);

        let channels = (0..agents.len())
            .map(|i| EntityId::element(module_idx::SMT, i as u16))
            .collect::<Vec<_>>();
        let agent_count = agents.len() as u8;

        let device_cfgs = agents
            .into_iter()
            .zip(&channels)
            .map(|(agent, &channel)| MhuDeviceConfig {
                slot_count: 1,
                channel,
                doorbell: agent.doorbell,
            })
            .collect();
        let mhu = Arc::new(Mhu::new(module_idx::MHU, Arc::clone(&smt), device_cfgs)?);

        let mut router = ScmiRouter::new(module_idx::SCMI, smt.clone(), channels.clone());
        router.add_protocol(Arc::new(BaseProtocol::new(agent_count, 0)))?;
        let router = Arc::new(router);

        let mut builder = Framework::builder(config);
        builder.register(module_idx::SMT, smt.clone())?;
        builder.register(module_idx::MHU, mhu.clone())?;
        builder.register(module_idx::SCMI, router.clone())?;
        for i in 0..mhu.devices_count() {
            builder.with_context(EntityId::element(module_idx::MHU, i as u16))?;
        }
        let fwk = builder.build()?;

        let service: Weak<ScmiRouter> = Arc::downgrade(&router);
        for (i, &channel) in channels.iter().enumerate() {
            mhu.connect(EntityId::sub_element(module_idx::MHU, i as u16, 0), channel)?;
            let service_id = router.service_id(i).ok_or(FwkError::Init)?;
            smt.bind_scmi_transport(channel, service_id, service.clone() as Weak<dyn ScmiService>)?;
        }
        smt.start()?;

        fwk_info!("[HOST] firmware up with {} agent(s)", channels.len());
        Ok(Self { fwk, smt, mhu, router })
    }

    pub fn framework(&self) -> &Framework {
        &self.fwk
    }

    pub fn smt(&self) -> &Arc<Smt> {
        &self.smt
    }

    pub fn mhu(&self) -> &Arc<Mhu> {
        &self.mhu
    }

    pub fn router(&self) -> &Arc<ScmiRouter> {
        &self.router
    }

    pub fn devices_count(&self) -> usize {
        self.mhu.devices_count()
    }

    /// Claim the device with packed id `raw`; returns the packed id of its
    /// first slot, the handle later passed to `process_message`.
    pub fn get_device(&self, raw: u32) -> Option<u32> {
        self.mhu.acquire_device(raw).and_then(|id| id.to_raw().ok())
    }

    /// Deliver the message in `memory` for device slot `device` and run
    /// the dispatch loop on that device's context until it is idle.
    pub fn process_message(&self, device: u32, memory: Arc<dyn MailboxMemory>) -> FwkResult<()> {
        let device_id = EntityId::from_raw(device)?;
        fwk_trace!("[HOST] enter {}", device_id);

        self.fwk.set_thread_context(device_id);
        let result = self.mhu.signal_smt_message(&self.fwk, device_id, memory);
        self.fwk.process_events();

        fwk_trace!("[HOST] leave {}", device_id);
        result
    }
}
