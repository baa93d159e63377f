//! SCMI message router
//!
//! One service element per transport channel. When a channel signals a
//! message the router posts an event to the service; the event handler
//! reads the message from the transport, runs the protocol handler and
//! responds. The event asks for a response carrying the SCMI status and
//! header, which comes back to the router and closes the exchange.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use scp_core::irq_lock::IrqLock;
use scp_core::{fwk_err, fwk_trace, fwk_warn};
use scp_core::{EntityId, Event, FwkError, FwkResult};
use scp_runtime::{Framework, Module, ModuleKind};
use scp_smt::scmi::status;
use scp_smt::{MessageHeader, ScmiService, ScmiTransport};

use crate::protocol::{Protocol, Reply, Request};

/// Event index: a message is waiting on the service's channel
pub const EVENT_MESSAGE: u16 = 0;

/// A finished request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub service_id: EntityId,
    pub cookie: u32,
    pub message_header: u32,
    pub status: i32,
    /// The response cookie matched the request in flight
    pub matched: bool,
}

pub struct ScmiRouter {
    module_idx: u8,
    transport: Arc<dyn ScmiTransport>,
    /// channel of each service element
    channels: Vec<EntityId>,
    protocols: Vec<Arc<dyn Protocol>>,
    in_flight: IrqLock<HashMap<EntityId, u32>>,
    last: IrqLock<Option<Completion>>,
    completed: AtomicU64,
}

impl ScmiRouter {
    pub fn new(module_idx: u8, transport: Arc<dyn ScmiTransport>, channels: Vec<EntityId>) -> Self {
        Self {
            module_idx,
            transport,
            channels,
            protocols: Vec::new(),
            in_flight: IrqLock::new(HashMap::new()),
            last: IrqLock::new(None),
            completed: AtomicU64::new(0),
        }
    }

    /// Add a protocol. One handler per protocol id.
    pub fn add_protocol(&mut self, protocol: Arc<dyn Protocol>) -> FwkResult<()> {
        if self.protocols.iter().any(|p| p.id() == protocol.id()) {
            return Err(FwkError::State);
        }
        self.protocols.push(protocol);
        Ok(())
    }

    pub fn service_id(&self, idx: usize) -> Option<EntityId> {
        (idx < self.channels.len()).then(|| EntityId::element(self.module_idx, idx as u16))
    }

    fn channel_for(&self, service_id: EntityId) -> FwkResult<EntityId> {
        match service_id {
            EntityId::Element { module, element } if module == self.module_idx => self
                .channels
                .get(element as usize)
                .copied()
                .ok_or(FwkError::Param),
            _ => Err(FwkError::Param),
        }
    }

    fn protocol(&self, id: u8) -> Option<&Arc<dyn Protocol>> {
        self.protocols.iter().find(|p| p.id() == id)
    }

    pub fn last_completion(&self) -> Option<Completion> {
        *self.last.lock()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Send a notification to the agent behind `service_id`.
    pub fn notify(&self, service_id: EntityId, protocol_id: u8, message_id: u8, payload: &[u8]) -> FwkResult<()> {
        let channel = self.channel_for(service_id)?;
        let header = MessageHeader::notification(protocol_id, message_id);
        self.transport.transmit(channel, header.pack(), payload)
    }

    /// Run the protocol handler for the message in `channel`.
    fn handle_message(&self, service_id: EntityId, channel: EntityId, raw_header: u32) -> FwkResult<Reply> {
        let mut payload = vec![0u8; self.transport.get_max_payload_size(channel)?];
        let len = self.transport.get_payload(channel, &mut payload)?;

        let header = match MessageHeader::unpack(raw_header) {
            Some(header) => header,
            None => return Ok(Reply::status(status::PROTOCOL_ERROR)),
        };
        let protocol = match self.protocol(header.protocol_id) {
            Some(p) => p,
            None => {
                fwk_warn!("[SCMI] protocol {:#x} not supported", header.protocol_id);
                return Ok(Reply::status(status::NOT_SUPPORTED));
            }
        };
        match protocol.payload_size(header.message_id) {
            None => return Ok(Reply::status(status::NOT_FOUND)),
            Some(expected) if expected != len => return Ok(Reply::status(status::PROTOCOL_ERROR)),
            Some(_) => {}
        }

        let request = Request {
            service_id,
            secure: self.transport.get_secure(channel)?,
            header,
            payload: &payload[..len],
        };
        let mut reply = Reply::new();
        if let Err(e) = protocol.handle(&request, &mut reply) {
            fwk_err!("[SCMI] {} message {} failed ({})", protocol.name(), header.message_id, e.code());
            return Ok(Reply::status(status::GENERIC_ERROR));
        }
        Ok(reply)
    }

    fn complete(&self, response: &Event) {
        let service_id = response.source_id;
        let expected = self.in_flight.lock().remove(&service_id);
        let completion = Completion {
            service_id,
            cookie: response.cookie,
            message_header: response.param_u32(1),
            status: response.param_u32(0) as i32,
            matched: expected == Some(response.cookie),
        };
        if !completion.matched {
            fwk_err!("[SCMI] unexpected response {} on {}", response.cookie, service_id);
        }
        fwk_trace!("[SCMI] {} done, status {}", service_id, completion.status);
        *self.last.lock() = Some(completion);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl ScmiService for ScmiRouter {
    fn signal_message(&self, fwk: &Framework, service_id: EntityId) -> FwkResult<()> {
        let mut event = Event::new(EntityId::event(self.module_idx, EVENT_MESSAGE), service_id)
            .with_source(service_id)
            .with_response();
        fwk.put_event(&mut event)
    }
}

impl Module for ScmiRouter {
    fn name(&self) -> &str {
        "SCMI"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Protocol
    }

    fn element_count(&self) -> usize {
        self.channels.len()
    }

    fn event_count(&self) -> usize {
        1
    }

    fn process_event(&self, _fwk: &Framework, event: &Event, response: &mut Event) -> FwkResult<()> {
        if event.is_response {
            self.complete(event);
            return Ok(());
        }
        if event.id.index() != Some(EVENT_MESSAGE) {
            return Err(FwkError::Param);
        }

        let service_id = event.target_id;
        let channel = self.channel_for(service_id)?;
        let raw_header = self.transport.get_message_header(channel)?;

        let reply = self.handle_message(service_id, channel, raw_header)?;
        self.transport.respond(channel, Some(reply.as_bytes()), reply.len())?;

        if event.response_requested {
            response.set_param_u32(0, reply.status_code() as u32);
            response.set_param_u32(1, raw_header);
            self.in_flight.lock().insert(service_id, event.cookie);
        }
        Ok(())
    }
}
