//! Execution context
//!
//! All queues and bookkeeping of one logical dispatch thread: the record
//! arena, the ready queue, the ISR queue, the event being processed, the
//! cookie counter and the synchronous-wait state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_queue::ArrayQueue;
use scp_core::irq_lock::IrqLock;
use scp_core::{EntityId, Event, FwkError, FwkResult};

use crate::pool::{EventHandle, EventPool};

#[derive(Debug, Default)]
pub(crate) struct DispatchState {
    /// Event whose handler is running
    pub current: Option<Event>,
    /// A `put_event_and_wait` is outstanding
    pub waiting: bool,
    /// `current` at the time the outstanding wait began
    pub saved_current: Option<Event>,
}

pub struct ExecutionContext {
    owner: EntityId,
    pub(crate) pool: EventPool,
    pub(crate) ready: IrqLock<VecDeque<EventHandle>>,
    pub(crate) isr: ArrayQueue<EventHandle>,
    pub(crate) state: IrqLock<DispatchState>,
    cookie_counter: AtomicU32,
}

impl ExecutionContext {
    pub fn new(owner: EntityId, event_count: usize, isr_capacity: usize) -> Self {
        Self {
            owner,
            pool: EventPool::new(event_count),
            ready: IrqLock::new(VecDeque::with_capacity(event_count)),
            isr: ArrayQueue::new(isr_capacity.max(1)),
            state: IrqLock::new(DispatchState::default()),
            cookie_counter: AtomicU32::new(0),
        }
    }

    /// Entity this context belongs to; `None` for the global context
    #[inline]
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Next cookie; wraps at `u32::MAX`
    #[inline]
    pub(crate) fn next_cookie(&self) -> u32 {
        self.cookie_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Copy `event` into the arena and append it to the ready or ISR queue.
    pub(crate) fn enqueue(&self, event: &Event, from_isr: bool) -> FwkResult<EventHandle> {
        let handle = self.pool.alloc(event)?;
        if from_isr {
            if self.isr.push(handle).is_err() {
                let _ = self.pool.free(handle);
                return Err(FwkError::NoMem);
            }
        } else {
            self.ready.lock().push_back(handle);
        }
        Ok(handle)
    }

    /// Queue an already allocated record on the ready queue.
    pub(crate) fn requeue(&self, handle: EventHandle, front: bool) {
        let mut ready = self.ready.lock();
        if front {
            ready.push_front(handle);
        } else {
            ready.push_back(handle);
        }
    }

    pub(crate) fn pop_ready(&self) -> Option<EventHandle> {
        self.ready.lock().pop_front()
    }

    pub(crate) fn peek_ready(&self) -> Option<EventHandle> {
        self.ready.lock().front().copied()
    }

    /// Move one event from the ISR queue to the tail of the ready queue.
    pub(crate) fn promote_isr(&self) -> bool {
        match self.isr.pop() {
            Some(handle) => {
                self.ready.lock().push_back(handle);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    #[inline]
    pub fn isr_len(&self) -> usize {
        self.isr.len()
    }

    /// Event records not currently queued, parked or being processed
    #[inline]
    pub fn free_events(&self) -> usize {
        self.pool.available()
    }

    #[inline]
    pub fn event_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn current_event(&self) -> Option<Event> {
        self.state.lock().current
    }

    pub(crate) fn set_current(&self, event: Option<Event>) {
        self.state.lock().current = event;
    }

    pub fn is_waiting(&self) -> bool {
        self.state.lock().waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev() -> Event {
        Event::new(EntityId::event(0, 0), EntityId::module(0))
    }

    #[test]
    fn test_enqueue_and_promote() {
        let ctx = ExecutionContext::new(EntityId::None, 4, 2);
        let a = ctx.enqueue(&ev(), false).unwrap();
        let b = ctx.enqueue(&ev(), true).unwrap();
        assert_eq!(ctx.ready_len(), 1);
        assert_eq!(ctx.isr_len(), 1);

        assert!(ctx.promote_isr());
        assert!(!ctx.promote_isr());
        assert_eq!(ctx.pop_ready(), Some(a));
        assert_eq!(ctx.pop_ready(), Some(b));
        assert_eq!(ctx.free_events(), 2);
    }

    #[test]
    fn test_isr_overflow_releases_record() {
        let ctx = ExecutionContext::new(EntityId::None, 4, 1);
        ctx.enqueue(&ev(), true).unwrap();
        assert_eq!(ctx.enqueue(&ev(), true), Err(FwkError::NoMem));
        assert_eq!(ctx.free_events(), 3);
    }

    #[test]
    fn test_cookie_wraps() {
        let ctx = ExecutionContext::new(EntityId::None, 1, 1);
        ctx.cookie_counter.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(ctx.next_cookie(), u32::MAX);
        assert_eq!(ctx.next_cookie(), 0);
    }
}
