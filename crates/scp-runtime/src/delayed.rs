//! Delayed-response lists
//!
//! A handler that cannot answer a request immediately marks its response
//! delayed. The framework parks the response record on a list keyed by the
//! responding entity until the module completes it with `put_event`.

use std::collections::{HashMap, VecDeque};

use scp_core::irq_lock::IrqLock;
use scp_core::EntityId;

use crate::pool::EventHandle;

/// A parked response record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DelayedEntry {
    pub cookie: u32,
    /// Index of the context whose arena holds the record
    pub ctx: usize,
    pub handle: EventHandle,
}

#[derive(Default)]
pub(crate) struct DelayedResponses {
    lists: IrqLock<HashMap<EntityId, VecDeque<DelayedEntry>>>,
}

impl DelayedResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&self, responder: EntityId, entry: DelayedEntry, front: bool) {
        let mut lists = self.lists.lock();
        let list = lists.entry(responder).or_default();
        if front {
            list.push_front(entry);
        } else {
            list.push_back(entry);
        }
    }

    pub fn find(&self, responder: EntityId, cookie: u32) -> Option<DelayedEntry> {
        self.lists
            .lock()
            .get(&responder)
            .and_then(|list| list.iter().find(|e| e.cookie == cookie).copied())
    }

    /// Remove and return the entry for `(responder, cookie)`.
    pub fn take(&self, responder: EntityId, cookie: u32) -> Option<DelayedEntry> {
        let mut lists = self.lists.lock();
        let list = lists.get_mut(&responder)?;
        let pos = list.iter().position(|e| e.cookie == cookie)?;
        list.remove(pos)
    }

    pub fn is_empty(&self, responder: EntityId) -> bool {
        self.lists
            .lock()
            .get(&responder)
            .map_or(true, VecDeque::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::EventPool;
    use scp_core::Event;

    #[test]
    fn test_park_find_take() {
        let pool = EventPool::new(2);
        let a = pool.alloc(&Event::default()).unwrap();
        let b = pool.alloc(&Event::default()).unwrap();
        let who = EntityId::element(4, 0);
        let lists = DelayedResponses::new();
        assert!(lists.is_empty(who));

        lists.park(who, DelayedEntry { cookie: 10, ctx: 0, handle: a }, false);
        lists.park(who, DelayedEntry { cookie: 11, ctx: 0, handle: b }, true);
        assert!(!lists.is_empty(who));
        assert!(lists.is_empty(EntityId::element(4, 1)));

        assert_eq!(lists.find(who, 10).map(|e| e.handle), Some(a));
        assert_eq!(lists.take(who, 11).map(|e| e.handle), Some(b));
        assert_eq!(lists.take(who, 11), None);
        assert_eq!(lists.take(who, 10).map(|e| e.handle), Some(a));
        assert!(lists.is_empty(who));
    }
}
