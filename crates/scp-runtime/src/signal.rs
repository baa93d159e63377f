//! Signal table
//!
//! Signals are the lightest way to ask a module to run: a fixed table of
//! `(source, target, signal)` triples, posted from any context and drained
//! by the dispatch loop before it looks at ordinary events. A full table
//! rejects the post with `Busy`; nothing is allocated.

use scp_core::irq_lock::IrqLock;
use scp_core::{EntityId, FwkError, FwkResult};

use crate::config::defaults::SIGNAL_COUNT;

/// A posted signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub signal_id: EntityId,
}

struct SignalSlots {
    slots: [Option<Signal>; SIGNAL_COUNT],
    pending: usize,
    /// Signal whose handler is running, for source inference
    current: Option<Signal>,
}

pub struct SignalTable {
    inner: IrqLock<SignalSlots>,
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTable {
    pub fn new() -> Self {
        Self {
            inner: IrqLock::new(SignalSlots {
                slots: [None; SIGNAL_COUNT],
                pending: 0,
                current: None,
            }),
        }
    }

    /// Record a signal in the lowest free slot.
    ///
    /// Duplicates are not coalesced; each post takes its own slot.
    pub fn post(&self, signal: Signal) -> FwkResult<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(FwkError::Busy)?;
        *slot = Some(signal);
        inner.pending += 1;
        Ok(())
    }

    /// Take the first occupied slot at or after `*cursor`.
    ///
    /// The taken signal becomes the current one. When the scan reaches the
    /// end of the table the current signal is cleared and `None` returned,
    /// even if signals were posted behind the cursor meanwhile; they are
    /// picked up by the next drain.
    pub fn take_next(&self, cursor: &mut usize) -> Option<Signal> {
        let mut inner = self.inner.lock();
        if inner.pending == 0 {
            inner.current = None;
            return None;
        }
        while *cursor < SIGNAL_COUNT {
            if let Some(signal) = inner.slots[*cursor].take() {
                inner.pending -= 1;
                inner.current = Some(signal);
                return Some(signal);
            }
            *cursor += 1;
        }
        inner.current = None;
        None
    }

    /// Signal whose handler is running, if any
    pub fn current(&self) -> Option<Signal> {
        self.inner.lock().current
    }

    pub fn clear_current(&self) {
        self.inner.lock().current = None;
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        SIGNAL_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(n: u16) -> Signal {
        Signal {
            source_id: EntityId::module(0),
            target_id: EntityId::module(1),
            signal_id: EntityId::event(1, n),
        }
    }

    #[test]
    fn test_overflow_is_busy() {
        let table = SignalTable::new();
        for n in 0..SIGNAL_COUNT as u16 {
            table.post(sig(n)).unwrap();
        }
        assert_eq!(table.post(sig(99)), Err(FwkError::Busy));
        assert_eq!(table.pending(), SIGNAL_COUNT);
    }

    #[test]
    fn test_drain_lowest_slot_first() {
        let table = SignalTable::new();
        table.post(sig(0)).unwrap();
        table.post(sig(1)).unwrap();
        table.post(sig(1)).unwrap();

        let mut cursor = 0;
        assert_eq!(table.take_next(&mut cursor), Some(sig(0)));
        assert_eq!(table.current(), Some(sig(0)));
        assert_eq!(table.take_next(&mut cursor), Some(sig(1)));
        assert_eq!(table.take_next(&mut cursor), Some(sig(1)));
        assert_eq!(table.take_next(&mut cursor), None);
        assert_eq!(table.current(), None);
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn test_post_behind_cursor_waits_for_next_drain() {
        let table = SignalTable::new();
        table.post(sig(0)).unwrap();
        table.post(sig(1)).unwrap();

        let mut cursor = 0;
        assert_eq!(table.take_next(&mut cursor), Some(sig(0)));
        assert_eq!(table.take_next(&mut cursor), Some(sig(1)));
        assert_eq!(cursor, 1);
        // Slot 0 is free again and gets the new post
        table.post(sig(7)).unwrap();
        assert_eq!(table.take_next(&mut cursor), None);
        assert_eq!(table.pending(), 1);

        let mut cursor = 0;
        assert_eq!(table.take_next(&mut cursor), Some(sig(7)));
    }
}
