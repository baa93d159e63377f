//! Module capability interface
//!
//! A module is the unit the dispatch loop talks to: it owns a set of
//! elements, declares how many events and notifications it defines, and
//! handles events, notifications and signals addressed to it or to its
//! elements. Handlers run to completion on the dispatch loop and receive
//! the [`Framework`] so they can post further work.

use scp_core::{EntityId, Event, FwkError, FwkResult};

use crate::scheduler::Framework;

/// Broad role of a module, shown in registration and handler-failure logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Hal,
    Driver,
    Protocol,
    Service,
}

/// Handlers and shape of a registered module.
///
/// Handlers a module does not implement answer `Support`.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Service
    }

    fn element_count(&self) -> usize {
        0
    }

    fn sub_element_count(&self, _element: u16) -> usize {
        0
    }

    fn event_count(&self) -> usize {
        0
    }

    fn notification_count(&self) -> usize {
        0
    }

    /// Handle `event`. When the sender asked for a response, `response` is
    /// the pre-built reply; the handler fills its parameters, or sets
    /// `is_delayed_response` to answer later.
    fn process_event(&self, _fwk: &Framework, _event: &Event, _response: &mut Event) -> FwkResult<()> {
        Err(FwkError::Support)
    }

    fn process_notification(
        &self,
        _fwk: &Framework,
        _event: &Event,
        _response: &mut Event,
    ) -> FwkResult<()> {
        Err(FwkError::Support)
    }

    fn process_signal(&self, _fwk: &Framework, _target: EntityId, _signal: EntityId) -> FwkResult<()> {
        Err(FwkError::Support)
    }
}
