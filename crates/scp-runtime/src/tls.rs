//! Thread-local hardware thread identity
//!
//! On the target each hardware thread has a fixed id the framework keys
//! its thread-context table by. Hosted, every OS thread gets the next id
//! the first time it asks.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HW_THREAD_ID: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// Id of the calling hardware thread
#[inline]
pub fn hw_thread_id() -> usize {
    HW_THREAD_ID.with(|cell| {
        let id = cell.get();
        if id != usize::MAX {
            return id;
        }
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        cell.set(id);
        id
    })
}

/// Pin the calling thread to a specific id (boards with fixed core numbering)
#[inline]
pub fn set_hw_thread_id(id: usize) {
    HW_THREAD_ID.with(|cell| cell.set(id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_per_thread() {
        let a = hw_thread_id();
        assert_eq!(hw_thread_id(), a);
        let b = std::thread::spawn(hw_thread_id).join().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_pin() {
        std::thread::spawn(|| {
            set_hw_thread_id(3);
            assert_eq!(hw_thread_id(), 3);
        })
        .join()
        .unwrap();
    }
}
