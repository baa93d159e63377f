//! Interrupt-context query
//!
//! The scheduler routes events posted from an interrupt handler to the ISR
//! queue and refuses blocking calls there. It only needs to ask "am I in
//! interrupt context"; the answer comes from an [`InterruptDriver`].

use std::cell::Cell;

/// Minimal view of the interrupt controller needed by the framework.
pub trait InterruptDriver: Send + Sync {
    /// Interrupt line being serviced by the calling thread, if any
    fn current(&self) -> Option<u32>;

    #[inline]
    fn is_interrupt_context(&self) -> bool {
        self.current().is_some()
    }
}

thread_local! {
    static CURRENT_IRQ: Cell<Option<u32>> = const { Cell::new(None) };
}

/// Hosted interrupt model.
///
/// Host code simulating an interrupt wraps the handler body in
/// [`HostInterrupts::with_isr`]; everything else runs in thread context.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostInterrupts;

impl HostInterrupts {
    /// Run `f` as if it were the handler for `irq`.
    pub fn with_isr<R>(irq: u32, f: impl FnOnce() -> R) -> R {
        let prev = CURRENT_IRQ.with(|c| c.replace(Some(irq)));
        let out = f();
        CURRENT_IRQ.with(|c| c.set(prev));
        out
    }
}

impl InterruptDriver for HostInterrupts {
    #[inline]
    fn current(&self) -> Option<u32> {
        CURRENT_IRQ.with(|c| c.get())
    }
}
