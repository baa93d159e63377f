//! One SMT channel and its ownership state machine.
//!
//! A channel is either `FREE` (the agent owns the mailbox) or `LOCKED` (the
//! firmware owns it and owes the agent an answer). Ownership on the wire is
//! carried by the mailbox `status` FREE bit only; nothing here ever polls
//! on it.

use std::sync::{Arc, Weak};

use scp_core::irq_lock::IrqLock;
use scp_core::{fwk_err, fwk_trace, fwk_warn};
use scp_core::{EntityId, FwkError, FwkResult};
use scp_runtime::Framework;

use crate::api::{ScmiService, SmtDriver};
use crate::gate::RequesterGate;
use crate::layout::{
    MailboxHeader, FLAGS_OFFSET, MAILBOX_HEADER_SIZE, MESSAGE_HEADER_OFFSET, MESSAGE_HEADER_SIZE,
    PAYLOAD_OFFSET, STATUS_ERROR, STATUS_FREE,
};
use crate::memory::MailboxMemory;
use crate::scmi::status as scmi_status;

pub const POLICY_NONE: u32 = 0;
/// Channel is reserved to the secure world
pub const POLICY_SECURE: u32 = 1 << 0;

/// Which side starts a message exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// The firmware sends (notifications to the agent)
    Requester,
    /// The agent sends, the firmware answers
    Responder,
}

impl ChannelRole {
    pub fn from_raw(raw: u32) -> FwkResult<Self> {
        match raw {
            0 => Ok(ChannelRole::Requester),
            1 => Ok(ChannelRole::Responder),
            _ => Err(FwkError::Data),
        }
    }
}

/// Static description of a channel
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub role: ChannelRole,
    pub policies: u32,
    /// Bytes of shared memory, header included
    pub mailbox_size: usize,
    /// Doorbell slot carrying this channel's interrupts
    pub driver_id: EntityId,
}

impl ChannelConfig {
    pub fn new(role: ChannelRole, mailbox_size: usize, driver_id: EntityId) -> Self {
        Self {
            role,
            policies: POLICY_NONE,
            mailbox_size,
            driver_id,
        }
    }

    /// Build from board-table values; an unknown role is `Data`.
    pub fn from_raw(role: u32, policies: u32, mailbox_size: usize, driver_id: EntityId) -> FwkResult<Self> {
        Ok(Self {
            role: ChannelRole::from_raw(role)?,
            policies,
            mailbox_size,
            driver_id,
        })
    }

    pub fn secure(mut self) -> Self {
        self.policies |= POLICY_SECURE;
        self
    }
}

struct ChannelState {
    locked: bool,
    ready: bool,
    mailbox: Option<Arc<dyn MailboxMemory>>,
    inbound: MailboxHeader,
    outbound: MailboxHeader,
    in_payload: Vec<u8>,
    in_len: usize,
    out_payload: Vec<u8>,
    driver: Option<Arc<dyn SmtDriver>>,
    service_id: EntityId,
    service: Option<Weak<dyn ScmiService>>,
}

pub struct Channel {
    id: EntityId,
    config: ChannelConfig,
    max_payload_size: usize,
    state: IrqLock<ChannelState>,
    gate: RequesterGate,
}

impl Channel {
    /// Create the channel for element `id`.
    ///
    /// A mailbox too small for its own header is `Data`. Requester channels
    /// start with their gate armed: the agent waits until the firmware has
    /// something to say.
    pub fn new(id: EntityId, config: ChannelConfig) -> FwkResult<Self> {
        let max_payload_size = config
            .mailbox_size
            .checked_sub(MAILBOX_HEADER_SIZE)
            .ok_or(FwkError::Data)?;

        let gate = RequesterGate::new();
        if config.role == ChannelRole::Requester {
            gate.arm();
        }

        Ok(Self {
            id,
            config,
            max_payload_size,
            state: IrqLock::new(ChannelState {
                locked: false,
                ready: false,
                mailbox: None,
                inbound: MailboxHeader::default(),
                outbound: MailboxHeader::default(),
                in_payload: vec![0u8; max_payload_size],
                in_len: 0,
                out_payload: vec![0u8; max_payload_size],
                driver: None,
                service_id: EntityId::None,
                service: None,
            }),
            gate,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn role(&self) -> ChannelRole {
        self.config.role
    }

    pub fn is_secure(&self) -> bool {
        self.config.policies & POLICY_SECURE != 0
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub(crate) fn set_ready(&self) {
        self.state.lock().ready = true;
    }

    pub fn gate(&self) -> &RequesterGate {
        &self.gate
    }

    pub(crate) fn bind_driver(&self, driver: Arc<dyn SmtDriver>) {
        self.state.lock().driver = Some(driver);
    }

    pub(crate) fn has_driver(&self) -> bool {
        self.state.lock().driver.is_some()
    }

    pub(crate) fn bind_service(&self, service_id: EntityId, service: Weak<dyn ScmiService>) {
        let mut st = self.state.lock();
        st.service_id = service_id;
        st.service = Some(service);
    }

    pub(crate) fn has_service(&self) -> bool {
        self.state.lock().service.is_some()
    }

    pub fn service_id(&self) -> EntityId {
        self.state.lock().service_id
    }

    // ------------------------------------------------------------------
    // Driver input
    // ------------------------------------------------------------------

    /// Mailbox `memory` was signalled by the doorbell.
    pub fn signal_message(&self, fwk: &Framework, memory: Arc<dyn MailboxMemory>) -> FwkResult<()> {
        if !self.is_ready() {
            fwk_err!("[SMT] channel {} not ready, message discarded", self.id);
            return Ok(());
        }

        match self.config.role {
            ChannelRole::Requester => self.master_handler(memory),
            ChannelRole::Responder => self.slave_handler(fwk, memory),
        }
    }

    /// A mailbox handed over by the driver must hold the configured size.
    fn check_mailbox(&self, memory: &dyn MailboxMemory) -> FwkResult<()> {
        if memory.size() < self.config.mailbox_size {
            fwk_err!(
                "[SMT] mailbox of {} bytes on channel {} (configured {})",
                memory.size(),
                self.id,
                self.config.mailbox_size
            );
            return Err(FwkError::Data);
        }
        Ok(())
    }

    fn slave_handler(&self, fwk: &Framework, memory: Arc<dyn MailboxMemory>) -> FwkResult<()> {
        let malformed = {
            let mut st = self.state.lock();
            if st.locked {
                return Err(FwkError::State);
            }
            self.check_mailbox(&*memory)?;
            st.mailbox = Some(Arc::clone(&memory));

            let header = memory.header()?;
            if header.is_free() {
                fwk_err!("[SMT] mailbox ownership error on channel {}", self.id);
                return Err(FwkError::State);
            }

            st.locked = true;
            st.inbound = header;
            st.outbound = header;
            st.outbound.status &= !STATUS_ERROR;

            let copied = match header.payload_len() {
                Some(len) if len <= self.max_payload_size => {
                    let state = &mut *st;
                    memory
                        .read(PAYLOAD_OFFSET, &mut state.in_payload[..len])
                        .map(|_| state.in_len = len)
                        .is_ok()
                }
                _ => false,
            };
            if !copied {
                st.outbound.status |= STATUS_ERROR;
            }
            !copied
        };

        if malformed {
            fwk_warn!("[SMT] malformed message length on channel {}", self.id);
            return self.respond(Some(&scmi_status::PROTOCOL_ERROR.to_le_bytes()), 4);
        }

        let (service_id, service) = {
            let st = self.state.lock();
            (st.service_id, st.service.as_ref().and_then(Weak::upgrade))
        };

        match service {
            Some(service) => service
                .signal_message(fwk, service_id)
                .map_err(|_| FwkError::Handler),
            None => {
                fwk_err!("[SMT] no service bound to channel {}", self.id);
                self.respond(Some(&scmi_status::COMM_ERROR.to_le_bytes()), 4)?;
                Err(FwkError::Handler)
            }
        }
    }

    fn master_handler(&self, memory: Arc<dyn MailboxMemory>) -> FwkResult<()> {
        {
            let mut st = self.state.lock();
            if st.locked {
                return Err(FwkError::State);
            }
            self.check_mailbox(&*memory)?;
            st.mailbox = Some(Arc::clone(&memory));

            if memory.status()? & STATUS_FREE == 0 {
                return Err(FwkError::State);
            }
            st.locked = true;
        }

        self.gate.arm();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport operations
    // ------------------------------------------------------------------

    pub fn message_header(&self) -> FwkResult<u32> {
        let st = self.state.lock();
        if !st.locked {
            return Err(FwkError::Access);
        }
        Ok(st.inbound.message_header)
    }

    pub fn payload(&self, buf: &mut [u8]) -> FwkResult<usize> {
        let st = self.state.lock();
        if !st.locked {
            return Err(FwkError::Access);
        }
        let len = st.in_len;
        buf.get_mut(..len)
            .ok_or(FwkError::Param)?
            .copy_from_slice(&st.in_payload[..len]);
        Ok(len)
    }

    pub fn write_payload(&self, offset: usize, data: &[u8]) -> FwkResult<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.max_payload_size)
            .ok_or(FwkError::Param)?;

        let mut st = self.state.lock();
        if !st.locked {
            return Err(FwkError::Access);
        }
        st.out_payload[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Hand the mailbox back to the agent with the response.
    pub fn respond(&self, payload: Option<&[u8]>, size: usize) -> FwkResult<()> {
        let (raise, driver) = {
            let mut st = self.state.lock();
            if !st.locked {
                return Err(FwkError::State);
            }
            if size > self.max_payload_size {
                return Err(FwkError::Param);
            }
            let memory = st.mailbox.clone().ok_or(FwkError::State)?;
            // Nothing is written unless the whole response fits
            if memory.size() < PAYLOAD_OFFSET + size {
                return Err(FwkError::Data);
            }

            let data = match payload {
                Some(p) => p.get(..size).ok_or(FwkError::Param)?,
                None => &st.out_payload[..size],
            };
            memory.set_header(&st.outbound)?;
            memory.write_payload(data)?;

            st.locked = false;
            memory.set_length((MESSAGE_HEADER_SIZE + size) as u32)?;
            memory.set_status(st.outbound.status | STATUS_FREE)?;

            fwk_trace!("[SMT] respond on {} size {}", self.id, size);
            (st.outbound.interrupt_enabled(), st.driver.clone())
        };

        if raise {
            let driver = driver.ok_or(FwkError::State)?;
            driver.raise_interrupt(self.config.driver_id)?;
        }
        Ok(())
    }

    /// Send `payload` to the agent on a requester channel.
    pub fn transmit(&self, message_header: u32, payload: &[u8]) -> FwkResult<()> {
        let driver = {
            let mut st = self.state.lock();
            if !st.locked {
                return Ok(());
            }
            if payload.len() > self.max_payload_size {
                return Err(FwkError::Param);
            }
            let memory = st.mailbox.clone().ok_or(FwkError::State)?;

            let status = memory.status()?;
            if status & STATUS_FREE == 0 {
                return Err(FwkError::Busy);
            }

            memory.write_u32(MESSAGE_HEADER_OFFSET, message_header)?;
            memory.write_u32(FLAGS_OFFSET, 0)?;
            memory.write_payload(payload)?;
            memory.set_length((MESSAGE_HEADER_SIZE + payload.len()) as u32)?;
            memory.set_status(status & !STATUS_FREE)?;

            st.locked = false;
            st.driver.clone()
        };

        let raised = match driver {
            Some(driver) => driver.raise_interrupt(self.config.driver_id),
            None => Err(FwkError::State),
        };
        self.gate.release();
        raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FLAGS_IENABLED, LENGTH_OFFSET, STATUS_OFFSET};
    use crate::memory::HeapMailbox;

    #[test]
    fn test_role_from_raw() {
        assert_eq!(ChannelRole::from_raw(0), Ok(ChannelRole::Requester));
        assert_eq!(ChannelRole::from_raw(1), Ok(ChannelRole::Responder));
        assert_eq!(ChannelRole::from_raw(2), Err(FwkError::Data));
        assert!(ChannelConfig::from_raw(7, 0, 128, EntityId::None).is_err());
    }

    #[test]
    fn test_max_payload_size() {
        let cfg = ChannelConfig::new(ChannelRole::Responder, 128, EntityId::None).secure();
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        assert_eq!(ch.max_payload_size(), 100);
        assert!(ch.is_secure());
        assert!(!ch.gate().is_armed());

        let tiny = ChannelConfig::new(ChannelRole::Responder, 16, EntityId::None);
        assert!(matches!(Channel::new(EntityId::element(0, 1), tiny), Err(FwkError::Data)));
    }

    #[test]
    fn test_requester_starts_armed() {
        let cfg = ChannelConfig::new(ChannelRole::Requester, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        assert!(ch.gate().is_armed());
    }

    #[test]
    fn test_accessors_need_lock() {
        let cfg = ChannelConfig::new(ChannelRole::Responder, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(ch.message_header(), Err(FwkError::Access));
        assert_eq!(ch.payload(&mut buf), Err(FwkError::Access));
        assert_eq!(ch.write_payload(0, &[1]), Err(FwkError::Access));
        assert_eq!(ch.write_payload(36, &[1]), Err(FwkError::Param));
        assert_eq!(ch.respond(None, 0), Err(FwkError::State));
    }

    #[test]
    fn test_master_handler_and_transmit() {
        let cfg = ChannelConfig::new(ChannelRole::Requester, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        let mbx = Arc::new(HeapMailbox::new(64));

        // not locked yet: transmit is a no-op
        assert_eq!(ch.transmit(0x1234, &[1, 2, 3, 4]), Ok(()));
        assert_eq!(mbx.snapshot(), vec![0u8; 64]);

        // agent has not freed the buffer
        assert_eq!(ch.master_handler(mbx.clone()), Err(FwkError::State));
        assert!(!ch.is_locked());

        mbx.set_status(STATUS_FREE).unwrap();
        mbx.write_u32(FLAGS_OFFSET, FLAGS_IENABLED).unwrap();
        ch.master_handler(mbx.clone()).unwrap();
        assert!(ch.is_locked());
        assert_eq!(ch.master_handler(mbx.clone()), Err(FwkError::State));

        // no driver bound: the message still goes out and the gate opens
        assert_eq!(ch.transmit(0x1234, &[1, 2, 3, 4]), Err(FwkError::State));
        assert!(!ch.is_locked());
        assert!(!ch.gate().is_armed());
        let raw = mbx.snapshot();
        assert_eq!(raw[STATUS_OFFSET], 0);
        assert_eq!(raw[FLAGS_OFFSET], 0);
        assert_eq!(raw[LENGTH_OFFSET], 8);
        assert_eq!(&raw[MESSAGE_HEADER_OFFSET..MESSAGE_HEADER_OFFSET + 4], &[0x34, 0x12, 0, 0]);
        assert_eq!(&raw[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_transmit_busy_leaves_buffer() {
        let cfg = ChannelConfig::new(ChannelRole::Requester, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        let mbx = Arc::new(HeapMailbox::new(64));
        mbx.set_status(STATUS_FREE).unwrap();
        ch.master_handler(mbx.clone()).unwrap();

        // agent takes the buffer back before we send
        mbx.set_status(0).unwrap();
        let before = mbx.snapshot();
        assert_eq!(ch.transmit(0x1, &[9, 9, 9, 9]), Err(FwkError::Busy));
        assert_eq!(mbx.snapshot(), before);
        assert!(ch.is_locked());
    }

    #[test]
    fn test_short_mailbox_refused_before_lock() {
        let fwk = Framework::builder(scp_runtime::FrameworkConfig::new().event_count(2))
            .build()
            .unwrap();
        let cfg = ChannelConfig::new(ChannelRole::Responder, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        let short = Arc::new(HeapMailbox::new(32));
        short.set_length(4).unwrap();

        assert_eq!(ch.slave_handler(&fwk, short.clone()), Err(FwkError::Data));
        assert!(!ch.is_locked());

        let req = ChannelConfig::new(ChannelRole::Requester, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 1), req).unwrap();
        short.set_status(STATUS_FREE).unwrap();
        assert_eq!(ch.master_handler(short), Err(FwkError::Data));
        assert!(!ch.is_locked());
    }

    #[test]
    fn test_respond_that_does_not_fit_changes_nothing() {
        let cfg = ChannelConfig::new(ChannelRole::Responder, 64, EntityId::None);
        let ch = Channel::new(EntityId::element(0, 0), cfg).unwrap();
        let short = Arc::new(HeapMailbox::new(32));
        {
            let mut st = ch.state.lock();
            st.locked = true;
            st.mailbox = Some(short.clone());
        }

        let before = short.snapshot();
        assert_eq!(ch.respond(Some(&[0u8; 8]), 8), Err(FwkError::Data));
        assert_eq!(short.snapshot(), before);
        assert!(ch.is_locked());

        // A response that fits still hands the buffer back
        ch.respond(Some(&[0u8; 4]), 4).unwrap();
        assert!(!ch.is_locked());
        assert!(short.header().unwrap().is_free());
    }
}
