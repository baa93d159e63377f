//! Event record arena
//!
//! Every execution context owns a fixed table of event records sized at
//! construction. Queued events are referred to by [`EventHandle`] (an index
//! into the table), so queues never own event storage and a record is only
//! ever released once. Free records are kept on a LIFO stack.

use scp_core::irq_lock::IrqLock;
use scp_core::{Event, FwkError, FwkResult};

/// Index of an allocated record in an [`EventPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u32);

impl EventHandle {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

struct PoolInner {
    records: Vec<Event>,
    in_use: Vec<bool>,
    free: Vec<u32>,
}

/// Fixed-capacity arena of event records
pub struct EventPool {
    inner: IrqLock<PoolInner>,
    capacity: usize,
}

impl EventPool {
    pub fn new(capacity: usize) -> Self {
        // Reverse so the first allocation gets record 0
        let free = (0..capacity as u32).rev().collect();
        Self {
            inner: IrqLock::new(PoolInner {
                records: vec![Event::default(); capacity],
                in_use: vec![false; capacity],
                free,
            }),
            capacity,
        }
    }

    /// Copy `event` into a free record.
    pub fn alloc(&self, event: &Event) -> FwkResult<EventHandle> {
        let mut inner = self.inner.lock();
        let idx = inner.free.pop().ok_or(FwkError::NoMem)?;
        inner.records[idx as usize] = *event;
        inner.in_use[idx as usize] = true;
        Ok(EventHandle(idx))
    }

    /// Copy of the record behind `handle`
    pub fn get(&self, handle: EventHandle) -> FwkResult<Event> {
        let inner = self.inner.lock();
        match inner.in_use.get(handle.index()) {
            Some(true) => Ok(inner.records[handle.index()]),
            _ => Err(FwkError::State),
        }
    }

    /// Modify an allocated record in place.
    pub fn update(&self, handle: EventHandle, f: impl FnOnce(&mut Event)) -> FwkResult<()> {
        let mut inner = self.inner.lock();
        match inner.in_use.get(handle.index()) {
            Some(true) => {
                f(&mut inner.records[handle.index()]);
                Ok(())
            }
            _ => Err(FwkError::State),
        }
    }

    /// Return a record to the pool. Releasing a free record is `State`.
    pub fn free(&self, handle: EventHandle) -> FwkResult<()> {
        let mut inner = self.inner.lock();
        match inner.in_use.get(handle.index()) {
            Some(true) => {
                inner.in_use[handle.index()] = false;
                inner.free.push(handle.0);
                Ok(())
            }
            _ => Err(FwkError::State),
        }
    }

    /// Records currently free
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}
