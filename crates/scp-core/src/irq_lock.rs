//! Interrupt-masking critical section
//!
//! On the target every queue and table touched from both thread and
//! interrupt context is guarded by globally disabling interrupts around
//! the access. The hosted build models that as a short spin lock that also
//! tracks how deeply the current thread has "masked" interrupts, so code
//! can assert it runs inside a critical section.
//!
//! Critical sections must stay short and must never call back into module
//! handlers while a guard is alive.

use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    static MASK_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// True while the calling thread holds at least one [`IrqLock`] guard.
#[inline]
pub fn masked() -> bool {
    MASK_DEPTH.with(|d| d.get() > 0)
}

/// Data protected by the interrupt mask.
pub struct IrqLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// Safety: IrqLock provides exclusive access to T
unsafe impl<T: Send> Send for IrqLock<T> {}
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        IrqLock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Mask interrupts and take the lock.
    #[inline]
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        MASK_DEPTH.with(|d| d.set(d.get() + 1));
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqLockGuard { lock: self };
            }

            let mut spin_count = 0u32;
            while self.locked.load(Ordering::Relaxed) {
                spin_count = spin_count.wrapping_add(1);
                for _ in 0..spin_count.min(64) {
                    core::hint::spin_loop();
                }
            }
        }
    }

    /// Run `f` with the protected data, unmasking on return.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for IrqLock<T> {
    fn default() -> Self {
        IrqLock::new(T::default())
    }
}

/// Guard that unmasks and releases when dropped
pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
}

impl<'a, T> Deref for IrqLockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for IrqLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for IrqLockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        MASK_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mask_depth_tracks_guards() {
        let a = IrqLock::new(1u32);
        let b = IrqLock::new(2u32);
        assert!(!masked());
        {
            let ga = a.lock();
            assert!(masked());
            {
                let gb = b.lock();
                assert_eq!(*ga + *gb, 3);
            }
            assert!(masked());
        }
        assert!(!masked());
    }

    #[test]
    fn test_with() {
        let lock = IrqLock::new(Vec::new());
        lock.with(|v| v.push(7u8));
        assert_eq!(lock.with(|v| v.len()), 1);
        assert!(!lock.is_locked());
        assert_eq!(lock.into_inner(), vec![7]);
    }

    #[test]
    fn test_concurrent_increments() {
        let lock = Arc::new(IrqLock::new(0u32));
        let mut handles = vec![];

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }
}
