//! Event record
//!
//! Events are small fixed-size records copied by value between modules.
//! The framework owns the storage while an event is queued; handlers only
//! ever see copies.

use crate::constants::EVENT_PARAMETERS_SIZE;
use crate::id::EntityId;

/// Classification of an event. Exactly one applies to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Plain,
    Notification,
    Response,
}

/// An event exchanged between framework entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    /// Event (or notification) id
    pub id: EntityId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    /// Correlates a response with the request it answers
    pub cookie: u32,
    pub params: [u8; EVENT_PARAMETERS_SIZE],
    pub is_notification: bool,
    pub is_response: bool,
    /// Set by a handler that will answer later
    pub is_delayed_response: bool,
    pub response_requested: bool,
}

impl Event {
    /// Plain event `id` addressed to `target`
    pub fn new(id: EntityId, target: EntityId) -> Self {
        Event {
            id,
            target_id: target,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: EntityId) -> Self {
        self.source_id = source;
        self
    }

    pub fn with_response(mut self) -> Self {
        self.response_requested = true;
        self
    }

    pub fn with_params(mut self, params: &[u8]) -> Self {
        let n = params.len().min(EVENT_PARAMETERS_SIZE);
        self.params[..n].copy_from_slice(&params[..n]);
        self
    }

    /// Response wins over notification.
    pub fn kind(&self) -> EventKind {
        if self.is_response {
            EventKind::Response
        } else if self.is_notification {
            EventKind::Notification
        } else {
            EventKind::Plain
        }
    }

    /// Response skeleton for this request: same id and cookie, endpoints
    /// swapped, parameters carried over for the handler to overwrite.
    pub fn mirror_response(&self) -> Event {
        Event {
            id: self.id,
            source_id: self.target_id,
            target_id: self.source_id,
            cookie: self.cookie,
            params: self.params,
            is_notification: self.is_notification,
            is_response: false,
            is_delayed_response: false,
            response_requested: false,
        }
    }

    /// Little-endian u32 at parameter word `word` (0..4)
    pub fn param_u32(&self, word: usize) -> u32 {
        let off = word * 4;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.params[off..off + 4]);
        u32::from_le_bytes(raw)
    }

    pub fn set_param_u32(&mut self, word: usize, value: u32) {
        let off = word * 4;
        self.params[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }
}
