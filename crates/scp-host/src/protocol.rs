//! SCMI protocol handlers
//!
//! A protocol declares the request payload size of every message it
//! implements and writes its reply (status word first) into a [`Reply`].
//! The router checks the size before calling the handler, so handlers can
//! read their fixed-size requests without further length checks.

use scp_core::{EntityId, FwkResult};
use scp_smt::scmi::status;
use scp_smt::MessageHeader;

/// SCMI base protocol id
pub const BASE_PROTOCOL_ID: u8 = 0x10;
/// Base protocol version 2.0
pub const BASE_PROTOCOL_VERSION: u32 = 0x20000;

/// Message ids shared by every protocol
pub mod message {
    pub const PROTOCOL_VERSION: u8 = 0x0;
    pub const PROTOCOL_ATTRIBUTES: u8 = 0x1;
    pub const PROTOCOL_MESSAGE_ATTRIBUTES: u8 = 0x2;
}

/// An inbound command
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub service_id: EntityId,
    pub secure: bool,
    pub header: MessageHeader,
    pub payload: &'a [u8],
}

impl Request<'_> {
    /// Little-endian word `idx` of the payload, 0 past the end
    pub fn word(&self, idx: usize) -> u32 {
        let start = idx * 4;
        self.payload
            .get(start..start + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    }
}

/// Response payload under construction
#[derive(Debug, Default, Clone)]
pub struct Reply {
    bytes: Vec<u8>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply made of a single status word
    pub fn status(code: i32) -> Self {
        let mut reply = Self::new();
        reply.push_i32(code);
        reply
    }

    pub fn push_i32(&mut self, value: i32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First word, or `GENERIC_ERROR` if nothing was written
    pub fn status_code(&self) -> i32 {
        match self.bytes.get(..4) {
            Some(b) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            None => status::GENERIC_ERROR,
        }
    }
}

pub trait Protocol: Send + Sync {
    fn id(&self) -> u8;

    fn name(&self) -> &str;

    /// Request payload size of `message_id`, `None` if not implemented
    fn payload_size(&self, message_id: u8) -> Option<usize>;

    fn handle(&self, request: &Request<'_>, reply: &mut Reply) -> FwkResult<()>;
}

/// The SCMI base protocol: version and discovery
pub struct BaseProtocol {
    agent_count: u8,
    protocol_count: u8,
}

impl BaseProtocol {
    pub fn new(agent_count: u8, protocol_count: u8) -> Self {
        Self {
            agent_count,
            protocol_count,
        }
    }
}

impl Protocol for BaseProtocol {
    fn id(&self) -> u8 {
        BASE_PROTOCOL_ID
    }

    fn name(&self) -> &str {
        "base"
    }

    fn payload_size(&self, message_id: u8) -> Option<usize> {
        match message_id {
            message::PROTOCOL_VERSION | message::PROTOCOL_ATTRIBUTES => Some(0),
            message::PROTOCOL_MESSAGE_ATTRIBUTES => Some(4),
            _ => None,
        }
    }

    fn handle(&self, request: &Request<'_>, reply: &mut Reply) -> FwkResult<()> {
        match request.header.message_id {
            message::PROTOCOL_VERSION => {
                reply.push_i32(status::SUCCESS).push_u32(BASE_PROTOCOL_VERSION);
            }
            message::PROTOCOL_ATTRIBUTES => {
                let attributes = ((self.agent_count as u32) << 8) | self.protocol_count as u32;
                reply.push_i32(status::SUCCESS).push_u32(attributes);
            }
            message::PROTOCOL_MESSAGE_ATTRIBUTES => {
                let queried = request.word(0);
                if queried <= u8::MAX as u32 && self.payload_size(queried as u8).is_some() {
                    reply.push_i32(status::SUCCESS).push_u32(0);
                } else {
                    reply.push_i32(status::NOT_FOUND);
                }
            }
            _ => {
                reply.push_i32(status::NOT_FOUND);
            }
        }
        Ok(())
    }
}
