//! MHU doorbell driver
//!
//! Each device (element) is one doorbell pair between the firmware and an
//! agent; its slots (sub-elements) each carry one SMT channel. Agents claim
//! a device once with [`Mhu::acquire_device`] and afterwards deliver every
//! message for it through [`Mhu::signal_smt_message`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use scp_core::irq_lock::IrqLock;
use scp_core::{fwk_info, fwk_trace, fwk_warn};
use scp_core::constants::MAX_ELEMENT_INDEX;
use scp_core::{EntityId, FwkError, FwkResult};
use scp_runtime::{Framework, Module, ModuleKind};

use crate::api::SmtDriver;
use crate::doorbell::Doorbell;
use crate::memory::MailboxMemory;
use crate::transport::Smt;

/// Bound slots are tracked in a 32-bit mask
pub const MAX_SLOTS: usize = 32;

pub struct MhuDeviceConfig {
    pub slot_count: usize,
    /// Channel each slot feeds until rebound
    pub channel: EntityId,
    pub doorbell: Arc<dyn Doorbell>,
}

struct DeviceState {
    allocated: bool,
    bound_slots: u32,
    channels: Vec<EntityId>,
}

struct MhuDevice {
    slot_count: usize,
    state: IrqLock<DeviceState>,
    doorbell: Arc<dyn Doorbell>,
    rings: AtomicU64,
}

pub struct Mhu {
    module_idx: u8,
    smt: Arc<Smt>,
    devices: Vec<MhuDevice>,
}

impl Mhu {
    pub fn new(module_idx: u8, smt: Arc<Smt>, configs: Vec<MhuDeviceConfig>) -> FwkResult<Self> {
        // Every device id must survive the packed form agents address it by
        if configs.is_empty() || configs.len() > MAX_ELEMENT_INDEX as usize + 1 {
            return Err(FwkError::Param);
        }

        let mut devices = Vec::with_capacity(configs.len());
        for cfg in configs {
            if cfg.slot_count == 0 || cfg.slot_count > MAX_SLOTS {
                return Err(FwkError::Param);
            }
            devices.push(MhuDevice {
                slot_count: cfg.slot_count,
                state: IrqLock::new(DeviceState {
                    allocated: false,
                    bound_slots: 0,
                    channels: vec![cfg.channel; cfg.slot_count],
                }),
                doorbell: cfg.doorbell,
                rings: AtomicU64::new(0),
            });
        }

        fwk_info!("[MHU] {} device(s)", devices.len());
        Ok(Self { module_idx, smt, devices })
    }

    pub fn devices_count(&self) -> usize {
        self.devices.len()
    }

    pub fn device_id(&self, idx: usize) -> Option<EntityId> {
        (idx < self.devices.len()).then(|| EntityId::element(self.module_idx, idx as u16))
    }

    fn device(&self, id: EntityId) -> FwkResult<&MhuDevice> {
        match id {
            EntityId::Element { module, element } | EntityId::SubElement { module, element, .. }
                if module == self.module_idx =>
            {
                self.devices.get(element as usize).ok_or(FwkError::Param)
            }
            _ => Err(FwkError::Param),
        }
    }

    /// Hand out the device whose packed element id is `raw`.
    ///
    /// Returns its first slot, or `None` when no device matches or the
    /// device was already handed out.
    pub fn acquire_device(&self, raw: u32) -> Option<EntityId> {
        for (idx, device) in self.devices.iter().enumerate() {
            let device_id = EntityId::element(self.module_idx, idx as u16);
            if device_id.to_raw() != Ok(raw) {
                continue;
            }
            let mut st = device.state.lock();
            if st.allocated {
                fwk_warn!("[MHU] device {} already allocated", device_id);
                return None;
            }
            st.allocated = true;
            return Some(EntityId::sub_element(self.module_idx, idx as u16, 0));
        }
        fwk_info!("[MHU] no device found {:08x}", raw);
        None
    }

    pub fn is_allocated(&self, device_id: EntityId) -> bool {
        self.device(device_id).is_ok_and(|d| d.state.lock().allocated)
    }

    /// Route slot `target` to SMT channel `channel`.
    ///
    /// `target` must be a sub-element; a slot binds once.
    pub fn bind_slot(&self, target: EntityId, channel: EntityId) -> FwkResult<()> {
        let slot = match target {
            EntityId::SubElement { sub_element, .. } => sub_element as usize,
            _ => return Err(FwkError::Access),
        };
        let device = self.device(target)?;
        if slot >= device.slot_count {
            return Err(FwkError::Param);
        }

        let mut st = device.state.lock();
        if st.bound_slots & (1 << slot) != 0 {
            return Err(FwkError::Access);
        }
        st.channels[slot] = channel;
        st.bound_slots |= 1 << slot;
        Ok(())
    }

    /// Wire `slot` and `channel` together in both directions.
    pub fn connect(self: &Arc<Self>, slot: EntityId, channel: EntityId) -> FwkResult<()> {
        self.smt.bind_driver(channel, Arc::clone(self) as Arc<dyn SmtDriver>)?;
        self.bind_slot(slot, channel)?;
        self.smt.bind_driver_input(channel, slot)
    }

    /// Forward a message for slot `device_id` to its channel.
    pub fn signal_smt_message(
        &self,
        fwk: &Framework,
        device_id: EntityId,
        memory: Arc<dyn MailboxMemory>,
    ) -> FwkResult<()> {
        let device = self.device(device_id)?;
        let slot = device_id.sub_element_idx().unwrap_or(0) as usize;

        let channel = {
            let st = device.state.lock();
            if slot >= device.slot_count || st.bound_slots & (1 << slot) == 0 {
                fwk_warn!("[MHU] slot {} of {} is not bound", slot, device_id);
                return Err(FwkError::Access);
            }
            st.channels[slot]
        };

        fwk_trace!("[MHU] {} -> {}", device_id, channel);
        self.smt.signal_message(fwk, channel, memory)
    }

    /// Doorbell rings raised on device `device_id` so far
    pub fn rings(&self, device_id: EntityId) -> u64 {
        self.device(device_id)
            .map(|d| d.rings.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl SmtDriver for Mhu {
    fn raise_interrupt(&self, slot_id: EntityId) -> FwkResult<()> {
        let device = self.device(slot_id)?;
        device.rings.fetch_add(1, Ordering::Relaxed);
        device.doorbell.ring()
    }
}

impl Module for Mhu {
    fn name(&self) -> &str {
        "MHU"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Driver
    }

    fn element_count(&self) -> usize {
        self.devices.len()
    }

    fn sub_element_count(&self, element: u16) -> usize {
        self.devices
            .get(element as usize)
            .map(|d| d.slot_count)
            .unwrap_or(0)
    }
}
