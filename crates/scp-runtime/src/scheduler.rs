//! Cooperative dispatch loop
//!
//! [`Framework`] owns the module table, the execution contexts, the signal
//! table and the delayed-response lists. Everything runs to completion on
//! the thread that calls [`Framework::process_events`] (or [`Framework::run`]);
//! interrupt handlers only post events and signals.
//!
//! One iteration of the loop:
//!
//! 1. Drain the signal table.
//! 2. Dispatch ready events one at a time, draining signals after each.
//! 3. Promote one event from the ISR queue and start over, or go idle.

use std::collections::HashMap;
use std::sync::Arc;

use scp_core::irq_lock::IrqLock;
use scp_core::{fwk_crit, fwk_err, fwk_info, fwk_trace};
use scp_core::{EntityId, Event, FwkError, FwkResult, HostInterrupts, InterruptDriver};

use crate::config::defaults::THREAD_COUNT;
use crate::config::FrameworkConfig;
use crate::context::ExecutionContext;
#[cfg(feature = "notification")]
use crate::delayed::{DelayedEntry, DelayedResponses};
use crate::module::Module;
use crate::signal::{Signal, SignalTable};
use crate::tls;

/// Index of the global context in `Framework::contexts`
const GLOBAL_CTX: usize = 0;

/// Collects modules and context owners, then builds a [`Framework`].
pub struct FrameworkBuilder {
    config: FrameworkConfig,
    modules: Vec<Option<Arc<dyn Module>>>,
    owners: Vec<EntityId>,
    interrupts: Arc<dyn InterruptDriver>,
}

impl FrameworkBuilder {
    pub fn new(config: FrameworkConfig) -> Self {
        Self {
            config,
            modules: Vec::new(),
            owners: Vec::new(),
            interrupts: Arc::new(HostInterrupts),
        }
    }

    /// Place `module` at index `idx`. Each index takes one module.
    pub fn register(&mut self, idx: u8, module: Arc<dyn Module>) -> FwkResult<EntityId> {
        let slot = idx as usize;
        if self.modules.len() <= slot {
            self.modules.resize_with(slot + 1, || None);
        }
        if self.modules[slot].is_some() {
            fwk_err!("[FWK] module index {} registered twice", idx);
            return Err(FwkError::State);
        }
        fwk_info!("[FWK] {:?} module '{}' at index {}", module.kind(), module.name(), idx);
        self.modules[slot] = Some(module);
        Ok(EntityId::module(idx))
    }

    /// Give `owner` (a module, element or sub-element) its own context.
    pub fn with_context(&mut self, owner: EntityId) -> FwkResult<&mut Self> {
        if !owner.is_entity() {
            return Err(FwkError::Param);
        }
        if !self.owners.contains(&owner) {
            self.owners.push(owner);
        }
        Ok(self)
    }

    pub fn interrupts(&mut self, driver: Arc<dyn InterruptDriver>) -> &mut Self {
        self.interrupts = driver;
        self
    }

    pub fn build(self) -> FwkResult<Framework> {
        if let Err(e) = self.config.validate() {
            fwk_crit!("[FWK] {}", e);
            return Err(FwkError::Init);
        }
        scp_core::log::set_buffered(self.config.log_buffered);
        if self.config.trace_events {
            self.config.print();
        }

        let event_count = self.config.event_count;
        let isr_capacity = self.config.isr_queue_capacity;

        let mut contexts = vec![ExecutionContext::new(EntityId::None, event_count, isr_capacity)];
        let mut owners = HashMap::new();
        for owner in self.owners {
            owners.insert(owner, contexts.len());
            contexts.push(ExecutionContext::new(owner, event_count, isr_capacity));
        }

        fwk_info!(
            "[FWK] {} modules, {} contexts, {} events each",
            self.modules.iter().filter(|m| m.is_some()).count(),
            contexts.len(),
            event_count
        );

        Ok(Framework {
            config: self.config,
            modules: self.modules,
            contexts,
            owners,
            thread_ctx: IrqLock::new(HashMap::with_capacity(THREAD_COUNT)),
            signals: SignalTable::new(),
            #[cfg(feature = "notification")]
            delayed: DelayedResponses::new(),
            interrupts: self.interrupts,
        })
    }
}

/// The dispatch core.
pub struct Framework {
    config: FrameworkConfig,
    modules: Vec<Option<Arc<dyn Module>>>,
    contexts: Vec<ExecutionContext>,
    owners: HashMap<EntityId, usize>,
    /// Context selected by each hardware thread, keyed by its exact id.
    /// Threads that never selected one use the global context.
    thread_ctx: IrqLock<HashMap<usize, usize>>,
    signals: SignalTable,
    #[cfg(feature = "notification")]
    delayed: DelayedResponses,
    interrupts: Arc<dyn InterruptDriver>,
}

impl Framework {
    pub fn builder(config: FrameworkConfig) -> FrameworkBuilder {
        FrameworkBuilder::new(config)
    }

    #[inline]
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Module table
    // ------------------------------------------------------------------

    pub fn module(&self, idx: u8) -> Option<&Arc<dyn Module>> {
        self.modules.get(idx as usize).and_then(Option::as_ref)
    }

    fn module_for(&self, id: EntityId) -> FwkResult<&Arc<dyn Module>> {
        id.module_idx()
            .and_then(|idx| self.module(idx))
            .ok_or(FwkError::Param)
    }

    /// Registered module, element or sub-element
    pub fn is_valid_entity_id(&self, id: EntityId) -> bool {
        match id {
            EntityId::Module { module } => self.module(module).is_some(),
            EntityId::Element { module, element } => self
                .module(module)
                .is_some_and(|m| (element as usize) < m.element_count()),
            EntityId::SubElement { module, element, sub_element } => {
                self.module(module).is_some_and(|m| {
                    (element as usize) < m.element_count()
                        && (sub_element as usize) < m.sub_element_count(element)
                })
            }
            _ => false,
        }
    }

    pub fn is_valid_event_id(&self, id: EntityId) -> bool {
        match id {
            EntityId::Event { module, event } => self
                .module(module)
                .is_some_and(|m| (event as usize) < m.event_count()),
            _ => false,
        }
    }

    pub fn is_valid_notification_id(&self, id: EntityId) -> bool {
        match id {
            EntityId::Notification { module, notification } => self
                .module(module)
                .is_some_and(|m| (notification as usize) < m.notification_count()),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------

    fn ctx_index(&self) -> usize {
        let thread = tls::hw_thread_id();
        self.thread_ctx
            .lock()
            .get(&thread)
            .copied()
            .unwrap_or(GLOBAL_CTX)
    }

    /// Context of the calling hardware thread
    pub fn context(&self) -> &ExecutionContext {
        &self.contexts[self.ctx_index()]
    }

    pub fn contexts(&self) -> &[ExecutionContext] {
        &self.contexts
    }

    fn context_index_for(&self, id: EntityId) -> usize {
        if let Some(&idx) = self.owners.get(&id) {
            return idx;
        }
        if let Some(&idx) = id.element_id().and_then(|elem| self.owners.get(&elem)) {
            return idx;
        }
        self.owners
            .get(&id.module_id())
            .copied()
            .unwrap_or(GLOBAL_CTX)
    }

    /// Select the context the calling thread dispatches on.
    ///
    /// Looks for a context owned by `id`, then by its element, then by its
    /// module, and falls back to the global context.
    pub fn set_thread_context(&self, id: EntityId) {
        let idx = self.context_index_for(id);
        let thread = tls::hw_thread_id();
        self.thread_ctx.lock().insert(thread, idx);
    }

    /// Copy of the event whose handler is running on this thread
    pub fn current_event(&self) -> Option<Event> {
        self.context().current_event()
    }

    pub fn pending_signals(&self) -> usize {
        self.signals.pending()
    }

    // ------------------------------------------------------------------
    // Posting
    // ------------------------------------------------------------------

    /// Fill in the sender of an outgoing event.
    ///
    /// Inside a handler the sender is the handler's target. Otherwise the
    /// caller's own source is kept when it names a registered entity, or
    /// the source of the signal being handled is used.
    fn resolve_source(&self, ctx: &ExecutionContext, event: &mut Event, in_isr: bool) -> FwkResult<()> {
        if !in_isr {
            if let Some(current) = ctx.current_event() {
                event.source_id = current.target_id;
                return Ok(());
            }
        }
        if self.is_valid_entity_id(event.source_id) {
            return Ok(());
        }
        match self.signals.current() {
            Some(signal) => {
                event.source_id = signal.source_id;
                Ok(())
            }
            None => Err(FwkError::Param),
        }
    }

    #[cfg(debug_assertions)]
    fn check_addressing(&self, event: &Event) -> FwkResult<()> {
        let same_module = |a: EntityId, b: EntityId| a.module_idx() == b.module_idx();

        let ok = if event.is_notification {
            self.is_valid_notification_id(event.id)
                && event.is_response
                && !event.response_requested
                && same_module(event.target_id, event.id)
        } else if event.is_response {
            self.is_valid_event_id(event.id)
                && same_module(event.source_id, event.id)
                && !event.response_requested
        } else {
            self.is_valid_event_id(event.id) && same_module(event.target_id, event.id)
        };
        if ok {
            Ok(())
        } else {
            Err(FwkError::Param)
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn check_addressing(&self, _event: &Event) -> FwkResult<()> {
        Ok(())
    }

    /// Queue an event for its target.
    ///
    /// A fresh cookie is written back into `event` unless it is a
    /// response, which keeps the cookie of its request. Events posted from
    /// interrupt context go to the ISR queue.
    pub fn put_event(&self, event: &mut Event) -> FwkResult<()> {
        let ctx_idx = self.ctx_index();
        let in_isr = self.interrupts.is_interrupt_context();

        let result = self
            .resolve_source(&self.contexts[ctx_idx], event, in_isr)
            .and_then(|_| self.check_addressing(event))
            .and_then(|_| self.enqueue(ctx_idx, event, Some(in_isr)));

        if let Err(e) = result {
            fwk_crit!("[FWK] Error {} in put_event", e.code());
        }
        result
    }

    /// Queue a notification. Sender and addressing are the caller's.
    #[cfg(feature = "notification")]
    pub fn put_notification(&self, event: &mut Event) -> FwkResult<()> {
        event.is_response = false;
        event.is_notification = true;
        self.enqueue(self.ctx_index(), event, None)
    }

    /// Post a signal. `Busy` when the table is full.
    pub fn put_signal(&self, source: EntityId, target: EntityId, signal_id: EntityId) -> FwkResult<()> {
        self.signals.post(Signal {
            source_id: source,
            target_id: target,
            signal_id,
        })
    }

    fn enqueue(&self, ctx_idx: usize, event: &mut Event, from_isr: Option<bool>) -> FwkResult<()> {
        if event.is_delayed_response {
            return self.complete_delayed(event);
        }

        let ctx = &self.contexts[ctx_idx];
        if !event.is_response {
            event.cookie = ctx.next_cookie();
        }
        let from_isr = from_isr.unwrap_or_else(|| self.interrupts.is_interrupt_context());

        if let Err(e) = ctx.enqueue(event, from_isr) {
            fwk_crit!("[FWK] Error {}: dropped {} -> {}", e.code(), event.id, event.target_id);
            return Err(e);
        }

        if self.config.trace_events {
            fwk_trace!(
                "[FWK] Sent {}: {} @ {} -> {}",
                event.cookie,
                event.id,
                event.source_id,
                event.target_id
            );
        }
        Ok(())
    }

    /// Requeue a parked response with the parameters of `event`.
    #[cfg(feature = "notification")]
    fn complete_delayed(&self, event: &Event) -> FwkResult<()> {
        let entry = match self.delayed.take(event.source_id, event.cookie) {
            Some(entry) => entry,
            None => {
                fwk_crit!(
                    "[FWK] no delayed response {} from {}",
                    event.cookie,
                    event.source_id
                );
                return Err(FwkError::Param);
            }
        };

        let owner = &self.contexts[entry.ctx];
        let params = event.params;
        owner.pool.update(entry.handle, |rec| rec.params = params)?;
        owner.requeue(entry.handle, false);
        Ok(())
    }

    #[cfg(not(feature = "notification"))]
    fn complete_delayed(&self, event: &Event) -> FwkResult<()> {
        fwk_crit!("[FWK] delayed response {} without notification support", event.cookie);
        Err(FwkError::Panic)
    }

    /// Queue a response produced by a handler, or park it when delayed.
    fn deliver_response(&self, ctx_idx: usize, response: &mut Event, park_front: bool) -> FwkResult<()> {
        if response.is_delayed_response {
            return self.park_response(ctx_idx, response, park_front);
        }
        self.enqueue(ctx_idx, response, None)
    }

    #[cfg(feature = "notification")]
    fn park_response(&self, ctx_idx: usize, response: &Event, front: bool) -> FwkResult<()> {
        let handle = self.contexts[ctx_idx].pool.alloc(response)?;
        let entry = DelayedEntry {
            cookie: response.cookie,
            ctx: ctx_idx,
            handle,
        };
        self.delayed.park(response.source_id, entry, front);
        Ok(())
    }

    #[cfg(not(feature = "notification"))]
    fn park_response(&self, _ctx_idx: usize, response: &Event, _front: bool) -> FwkResult<()> {
        fwk_crit!("[FWK] delayed response {} without notification support", response.cookie);
        Err(FwkError::Panic)
    }

    // ------------------------------------------------------------------
    // Delayed responses
    // ------------------------------------------------------------------

    /// Copy of the response parked by `responder` for `cookie`.
    ///
    /// The module sets its parameters and hands it back to
    /// [`Framework::put_event`] to complete the request.
    #[cfg(feature = "notification")]
    pub fn get_delayed_response(&self, responder: EntityId, cookie: u32) -> FwkResult<Event> {
        let entry = self.delayed.find(responder, cookie).ok_or(FwkError::Param)?;
        self.contexts[entry.ctx].pool.get(entry.handle)
    }

    #[cfg(feature = "notification")]
    pub fn is_delayed_response_list_empty(&self, responder: EntityId) -> bool {
        self.delayed.is_empty(responder)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn invoke(&self, module: &Arc<dyn Module>, event: &Event, response: &mut Event) -> FwkResult<()> {
        if event.is_notification {
            module.process_notification(self, event, response)
        } else {
            module.process_event(self, event, response)
        }
    }

    /// Run the handler for one event and route its response.
    fn dispatch(&self, ctx_idx: usize, event: &Event) {
        let module = match self.module_for(event.target_id) {
            Ok(module) => module,
            Err(e) => {
                fwk_crit!("[FWK] Error {}: no module for {}", e.code(), event.target_id);
                return;
            }
        };

        if event.response_requested {
            let mut response = event.mirror_response();
            if let Err(e) = self.invoke(module, event, &mut response) {
                fwk_crit!(
                    "[FWK] Error {} in {:?} module '{}' handling {}",
                    e.code(),
                    module.kind(),
                    module.name(),
                    event.id
                );
            }
            response.is_response = true;
            response.response_requested = false;
            if let Err(e) = self.deliver_response(ctx_idx, &mut response, false) {
                fwk_crit!("[FWK] Error {}: response {} lost", e.code(), response.cookie);
            }
        } else {
            let mut scratch = Event::default();
            match self.invoke(module, event, &mut scratch) {
                Ok(()) | Err(FwkError::Pending) => {}
                Err(e) => fwk_crit!(
                    "[FWK] Process event ({:?} '{}', {}: {} -> {}) ({})",
                    module.kind(),
                    module.name(),
                    event.id,
                    event.source_id,
                    event.target_id,
                    e.code()
                ),
            }
        }
    }

    fn process_next_event(&self, ctx_idx: usize) {
        let ctx = &self.contexts[ctx_idx];
        let Some(handle) = ctx.pop_ready() else {
            return;
        };
        let event = match ctx.pool.get(handle) {
            Ok(event) => event,
            Err(e) => {
                fwk_crit!("[FWK] Error {}: stale record {}", e.code(), handle.index());
                return;
            }
        };

        if self.config.trace_events {
            fwk_trace!(
                "[FWK] Processing {}: {} @ {} -> {}",
                event.cookie,
                event.id,
                event.source_id,
                event.target_id
            );
        }

        ctx.set_current(Some(event));
        self.dispatch(ctx_idx, &event);
        ctx.set_current(None);

        if let Err(e) = ctx.pool.free(handle) {
            fwk_crit!("[FWK] Error {}: record {} freed twice", e.code(), handle.index());
        }
    }

    fn execute_signal_handler(&self, signal: &Signal) {
        let module = match self.module_for(signal.target_id) {
            Ok(module) => module,
            Err(e) => {
                fwk_crit!("[FWK] Error {}: no module for {}", e.code(), signal.target_id);
                return;
            }
        };
        match module.process_signal(self, signal.target_id, signal.signal_id) {
            Ok(()) | Err(FwkError::Pending) => {}
            Err(e) => fwk_crit!(
                "[FWK] Process signal ({}: {} -> {}) ({})",
                module.name(),
                signal.signal_id,
                signal.target_id,
                e.code()
            ),
        }
    }

    /// Run every pending signal handler.
    ///
    /// Slots are scanned lowest first. Signals posted behind the cursor by
    /// a handler are picked up by another pass.
    fn drain_signals(&self) {
        let mut cursor = 0;
        let mut took_any = false;
        while self.signals.pending() > 0 {
            let Some(signal) = self.signals.take_next(&mut cursor) else {
                if !took_any {
                    break;
                }
                cursor = 0;
                took_any = false;
                continue;
            };
            took_any = true;
            self.execute_signal_handler(&signal);
            self.signals.clear_current();

            if self.config.trace_events {
                fwk_trace!("[FWK] Pulled signal ({}: {})", signal.target_id, signal.signal_id);
            }
        }
    }

    /// Run the loop until no work is left, then return.
    pub fn process_events(&self) {
        let ctx_idx = self.ctx_index();
        let ctx = &self.contexts[ctx_idx];
        loop {
            self.drain_signals();

            while ctx.ready_len() > 0 {
                self.process_next_event(ctx_idx);
                self.drain_signals();
            }

            if ctx.promote_isr() {
                continue;
            }

            scp_core::log::unbuffer();
            return;
        }
    }

    /// Dispatch forever.
    pub fn run(&self) -> ! {
        loop {
            self.process_events();
            std::thread::yield_now();
        }
    }

    // ------------------------------------------------------------------
    // Synchronous call emulation
    // ------------------------------------------------------------------

    /// Send `event` with a response requested and keep dispatching until
    /// that response arrives, then copy its parameters into `response`.
    ///
    /// Calls do not nest: a second call while one is outstanding on the
    /// same context fails with `Busy`.
    ///
    /// There is no timeout. If the response never comes (the target
    /// parks it and nothing ever completes it) this call never returns.
    pub fn put_event_and_wait(&self, event: &mut Event, response: &mut Event) -> FwkResult<()> {
        let ctx_idx = self.ctx_index();
        let ctx = &self.contexts[ctx_idx];

        #[cfg(debug_assertions)]
        {
            if !self.is_valid_event_id(event.id) {
                return wait_failed(FwkError::Param);
            }
            if self.interrupts.is_interrupt_context() {
                return wait_failed(FwkError::State);
            }
        }

        if ctx.is_waiting() {
            return wait_failed(FwkError::Busy);
        }

        if let Err(e) = self.resolve_source(ctx, event, false) {
            fwk_err!(
                "[FWK] put_event_and_wait ({}: {} -> {}) has no sender",
                event.id,
                event.source_id,
                event.target_id
            );
            return wait_failed(e);
        }

        {
            let mut state = ctx.state.lock();
            state.waiting = true;
            state.saved_current = state.current;
        }

        event.is_response = false;
        event.is_delayed_response = false;
        event.response_requested = true;
        event.is_notification = false;

        let result = self.wait_for_response(ctx_idx, event, response);

        {
            let mut state = ctx.state.lock();
            state.current = state.saved_current.take();
            state.waiting = false;
        }

        match result {
            Ok(()) => Ok(()),
            Err(e) => wait_failed(e),
        }
    }

    fn wait_for_response(&self, ctx_idx: usize, event: &mut Event, response: &mut Event) -> FwkResult<()> {
        let ctx = &self.contexts[ctx_idx];

        self.enqueue(ctx_idx, event, Some(false))?;
        let cookie = event.cookie;

        let mut handled = false;
        loop {
            self.drain_signals();

            let Some(head) = ctx.peek_ready() else {
                self.drain_signals();
                ctx.promote_isr();
                continue;
            };

            let next = ctx.pool.get(head)?;
            if next.cookie != cookie {
                self.process_next_event(ctx_idx);
                continue;
            }
            ctx.pop_ready();

            if !handled {
                // The request itself: run its handler in place
                ctx.set_current(Some(next));
                let result = self.answer_in_place(ctx_idx, &next);
                if let Err(e) = ctx.pool.free(head) {
                    fwk_crit!("[FWK] Error {}: record {} freed twice", e.code(), head.index());
                }
                result?;
                handled = true;
                ctx.promote_isr();
                continue;
            }

            response.params = next.params;
            ctx.pool.free(head)?;
            return Ok(());
        }
    }

    fn answer_in_place(&self, ctx_idx: usize, request: &Event) -> FwkResult<()> {
        let module = self.module_for(request.target_id)?;
        let mut response = request.mirror_response();
        module.process_event(self, request, &mut response)?;
        response.is_response = true;
        response.response_requested = false;
        self.deliver_response(ctx_idx, &mut response, true)
    }
}

fn wait_failed(e: FwkError) -> FwkResult<()> {
    fwk_crit!("[FWK] Error {} in put_event_and_wait", e.code());
    Err(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PING: u8 = 0;
    const ECHO: u8 = 1;

    fn config() -> FrameworkConfig {
        FrameworkConfig::new().event_count(8).isr_queue_capacity(4)
    }

    /// Signal asking `Ping` to post an event without naming a sender
    const SIG_SEND: EntityId = EntityId::event(PING, 1);

    /// Sender-side module; records the responses it receives
    #[derive(Default)]
    struct Ping {
        responses: Mutex<Vec<Event>>,
        signals: AtomicUsize,
        notifications: AtomicUsize,
        sent: Mutex<Option<FwkResult<EntityId>>>,
    }

    impl Module for Ping {
        fn name(&self) -> &str {
            "ping"
        }
        fn element_count(&self) -> usize {
            1
        }
        fn event_count(&self) -> usize {
            1
        }
        fn notification_count(&self) -> usize {
            1
        }
        fn process_event(&self, _fwk: &Framework, event: &Event, _resp: &mut Event) -> FwkResult<()> {
            if event.is_response {
                self.responses.lock().unwrap().push(*event);
            }
            Ok(())
        }
        fn process_notification(&self, _fwk: &Framework, event: &Event, _resp: &mut Event) -> FwkResult<()> {
            assert!(event.is_notification);
            self.notifications.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn process_signal(&self, fwk: &Framework, _target: EntityId, signal: EntityId) -> FwkResult<()> {
            self.signals.fetch_add(1, Ordering::SeqCst);
            if signal == SIG_SEND {
                let mut ev = Event::new(EntityId::event(ECHO, ECHO_NOW), EntityId::module(ECHO));
                let result = fwk.put_event(&mut ev).map(|_| ev.source_id);
                *self.sent.lock().unwrap() = Some(result);
            }
            Ok(())
        }
    }

    /// Answers event 0 with param word 0 + 1; event 1 answers later;
    /// event 2 tries a nested wait; event 3 signals `Ping`.
    #[derive(Default)]
    struct Echo {
        handled: AtomicUsize,
        nested: Mutex<Option<FwkResult<()>>>,
        /// Sender and pending signal count seen on entry to each handler
        seen: Mutex<Vec<(EntityId, usize)>>,
    }

    const ECHO_NOW: u16 = 0;
    const ECHO_LATER: u16 = 1;
    const ECHO_NESTED: u16 = 2;
    const ECHO_SIGNAL: u16 = 3;

    impl Module for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn element_count(&self) -> usize {
            1
        }
        fn event_count(&self) -> usize {
            4
        }
        fn process_event(&self, fwk: &Framework, event: &Event, resp: &mut Event) -> FwkResult<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((event.source_id, fwk.pending_signals()));
            match event.id.index() {
                Some(ECHO_NOW) => {
                    resp.set_param_u32(0, event.param_u32(0) + 1);
                    Ok(())
                }
                Some(ECHO_LATER) => {
                    resp.is_delayed_response = true;
                    Ok(())
                }
                Some(ECHO_NESTED) => {
                    let mut inner = Event::new(EntityId::event(ECHO, ECHO_NOW), EntityId::module(ECHO));
                    let mut out = Event::default();
                    let result = fwk.put_event_and_wait(&mut inner, &mut out);
                    *self.nested.lock().unwrap() = Some(result);
                    Ok(())
                }
                Some(ECHO_SIGNAL) => {
                    fwk.put_signal(EntityId::module(ECHO), EntityId::module(PING), EntityId::event(PING, 0))
                }
                _ => Err(FwkError::Param),
            }
        }
    }

    fn framework() -> (Framework, Arc<Ping>, Arc<Echo>) {
        let ping = Arc::new(Ping::default());
        let echo = Arc::new(Echo::default());
        let mut builder = Framework::builder(config());
        builder.register(PING, ping.clone()).unwrap();
        builder.register(ECHO, echo.clone()).unwrap();
        (builder.build().unwrap(), ping, echo)
    }

    fn request(event: u16) -> Event {
        Event::new(EntityId::event(ECHO, event), EntityId::module(ECHO))
            .with_source(EntityId::module(PING))
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut builder = Framework::builder(config());
        builder.register(3, Arc::new(Ping::default())).unwrap();
        assert_eq!(builder.register(3, Arc::new(Ping::default())).err(), Some(FwkError::State));
        assert!(builder.with_context(EntityId::event(3, 0)).is_err());
    }

    #[test]
    fn test_invalid_config_fails_init() {
        let builder = Framework::builder(FrameworkConfig::new().event_count(0));
        assert_eq!(builder.build().err(), Some(FwkError::Init));
    }

    #[test]
    fn test_request_response_round_trip() {
        let (fwk, ping, echo) = framework();
        let mut req = request(ECHO_NOW).with_response();
        req.set_param_u32(0, 41);
        fwk.put_event(&mut req).unwrap();
        fwk.process_events();

        assert_eq!(echo.handled.load(Ordering::SeqCst), 1);
        let responses = ping.responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].cookie, req.cookie);
        assert_eq!(responses[0].param_u32(0), 42);
        assert_eq!(responses[0].source_id, EntityId::module(ECHO));
        assert_eq!(fwk.context().free_events(), 8);
    }

    #[test]
    fn test_cookies_distinct() {
        let (fwk, _ping, _echo) = framework();
        let mut a = request(ECHO_NOW);
        let mut b = request(ECHO_NOW);
        fwk.put_event(&mut a).unwrap();
        fwk.put_event(&mut b).unwrap();
        assert_ne!(a.cookie, b.cookie);
        fwk.process_events();
    }

    #[test]
    fn test_pool_exhaustion_is_nomem() {
        let (fwk, _ping, echo) = framework();
        for _ in 0..8 {
            fwk.put_event(&mut request(ECHO_NOW)).unwrap();
        }
        assert_eq!(fwk.put_event(&mut request(ECHO_NOW)), Err(FwkError::NoMem));
        fwk.process_events();
        assert_eq!(echo.handled.load(Ordering::SeqCst), 8);
        assert_eq!(fwk.context().free_events(), 8);
    }

    #[test]
    fn test_missing_source_rejected() {
        let (fwk, _ping, _echo) = framework();
        let mut ev = Event::new(EntityId::event(ECHO, ECHO_NOW), EntityId::module(ECHO));
        assert_eq!(fwk.put_event(&mut ev), Err(FwkError::Param));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_bad_addressing_rejected_in_debug() {
        let (fwk, _ping, _echo) = framework();
        // Event of module ECHO sent to module PING
        let mut ev = Event::new(EntityId::event(ECHO, ECHO_NOW), EntityId::module(PING))
            .with_source(EntityId::module(PING));
        assert_eq!(fwk.put_event(&mut ev), Err(FwkError::Param));
        // Event index beyond the module's event count
        assert_eq!(fwk.put_event(&mut request(9)), Err(FwkError::Param));
    }

    #[test]
    fn test_isr_events_promoted_one_at_a_time() {
        let (fwk, _ping, echo) = framework();
        HostInterrupts::with_isr(7, || {
            fwk.put_event(&mut request(ECHO_NOW)).unwrap();
            fwk.put_event(&mut request(ECHO_NOW)).unwrap();
        });
        assert_eq!(fwk.context().isr_len(), 2);
        assert_eq!(fwk.context().ready_len(), 0);
        fwk.process_events();
        assert_eq!(echo.handled.load(Ordering::SeqCst), 2);
        assert_eq!(fwk.context().isr_len(), 0);
    }

    #[test]
    fn test_signals_run_before_events() {
        let (fwk, ping, echo) = framework();
        fwk.put_event(&mut request(ECHO_NOW)).unwrap();
        fwk.put_signal(EntityId::module(ECHO), EntityId::module(PING), EntityId::event(PING, 0))
            .unwrap();
        assert_eq!(fwk.pending_signals(), 1);
        fwk.process_events();
        assert_eq!(ping.signals.load(Ordering::SeqCst), 1);
        assert_eq!(echo.handled.load(Ordering::SeqCst), 1);
        assert_eq!(fwk.pending_signals(), 0);
    }

    #[test]
    fn test_put_event_and_wait() {
        let (fwk, ping, _echo) = framework();
        let mut req = request(ECHO_NOW);
        req.set_param_u32(0, 9);
        let mut resp = Event::default();
        fwk.put_event_and_wait(&mut req, &mut resp).unwrap();

        assert_eq!(resp.param_u32(0), 10);
        // Consumed by the waiter, never delivered to the sender's handler
        assert!(ping.responses.lock().unwrap().is_empty());
        assert!(!fwk.context().is_waiting());
        assert_eq!(fwk.current_event(), None);
        assert_eq!(fwk.context().free_events(), 8);
    }

    #[test]
    fn test_wait_processes_earlier_events_first() {
        let (fwk, _ping, echo) = framework();
        fwk.put_event(&mut request(ECHO_NOW)).unwrap();
        let mut resp = Event::default();
        fwk.put_event_and_wait(&mut request(ECHO_NOW), &mut resp).unwrap();
        assert_eq!(echo.handled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nested_wait_is_busy() {
        let (fwk, _ping, echo) = framework();
        let mut resp = Event::default();
        fwk.put_event_and_wait(&mut request(ECHO_NESTED), &mut resp).unwrap();
        assert_eq!(*echo.nested.lock().unwrap(), Some(Err(FwkError::Busy)));
        assert!(!fwk.context().is_waiting());
    }

    #[cfg(feature = "notification")]
    #[test]
    fn test_delayed_response_completion() {
        let (fwk, ping, _echo) = framework();
        let mut req = request(ECHO_LATER).with_response();
        fwk.put_event(&mut req).unwrap();
        fwk.process_events();

        let responder = EntityId::module(ECHO);
        assert!(!fwk.is_delayed_response_list_empty(responder));
        assert!(ping.responses.lock().unwrap().is_empty());

        let mut late = fwk.get_delayed_response(responder, req.cookie).unwrap();
        assert!(late.is_response);
        late.set_param_u32(0, 0x55);
        fwk.put_event(&mut late).unwrap();
        fwk.process_events();

        assert!(fwk.is_delayed_response_list_empty(responder));
        let responses = ping.responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].cookie, req.cookie);
        assert_eq!(responses[0].param_u32(0), 0x55);
        assert_eq!(fwk.context().free_events(), 8);
    }

    #[cfg(feature = "notification")]
    #[test]
    fn test_unknown_delayed_response_is_param() {
        let (fwk, _ping, _echo) = framework();
        assert_eq!(fwk.get_delayed_response(EntityId::module(ECHO), 77).err(), Some(FwkError::Param));
        let mut bogus = request(ECHO_NOW);
        bogus.is_response = true;
        bogus.is_delayed_response = true;
        bogus.source_id = EntityId::module(ECHO);
        bogus.target_id = EntityId::module(PING);
        assert_eq!(fwk.put_event(&mut bogus), Err(FwkError::Param));
    }

    #[test]
    fn test_entity_context_selection() {
        let ping = Arc::new(Ping::default());
        let mut builder = Framework::builder(config());
        builder.register(PING, ping).unwrap();
        builder.with_context(EntityId::module(PING)).unwrap();
        let fwk = builder.build().unwrap();

        std::thread::spawn(move || {
            assert_eq!(fwk.context().owner(), EntityId::None);
            fwk.set_thread_context(EntityId::element(PING, 0));
            assert_eq!(fwk.context().owner(), EntityId::module(PING));
            fwk.set_thread_context(EntityId::module(9));
            assert_eq!(fwk.context().owner(), EntityId::None);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_signal_runs_between_queued_events() {
        let (fwk, ping, echo) = framework();
        fwk.put_event(&mut request(ECHO_SIGNAL)).unwrap();
        fwk.put_event(&mut request(ECHO_NOW)).unwrap();
        fwk.process_events();

        assert_eq!(ping.signals.load(Ordering::SeqCst), 1);
        // The second event found the signal already handled
        let pending: Vec<usize> = echo.seen.lock().unwrap().iter().map(|&(_, p)| p).collect();
        assert_eq!(pending, vec![0, 0]);
        assert_eq!(fwk.pending_signals(), 0);
    }

    #[test]
    fn test_put_event_from_signal_takes_signal_source() {
        let (fwk, ping, echo) = framework();
        let sender = EntityId::element(ECHO, 0);
        fwk.put_signal(sender, EntityId::module(PING), SIG_SEND).unwrap();
        fwk.process_events();

        assert_eq!(*ping.sent.lock().unwrap(), Some(Ok(sender)));
        assert_eq!(echo.handled.load(Ordering::SeqCst), 1);
        assert_eq!(echo.seen.lock().unwrap()[0].0, sender);
        assert_eq!(fwk.context().free_events(), 8);
    }

    #[cfg(feature = "notification")]
    #[test]
    fn test_notification_dispatch() {
        let (fwk, ping, echo) = framework();
        let mut ev = Event::new(EntityId::notification(PING, 0), EntityId::module(PING))
            .with_source(EntityId::module(ECHO));
        fwk.put_notification(&mut ev).unwrap();
        assert!(ev.is_notification);
        assert_eq!(fwk.context().free_events(), 7);

        fwk.process_events();
        assert_eq!(ping.notifications.load(Ordering::SeqCst), 1);
        assert!(ping.responses.lock().unwrap().is_empty());
        assert_eq!(echo.handled.load(Ordering::SeqCst), 0);
        assert_eq!(fwk.context().free_events(), 8);
    }

    #[test]
    fn test_thread_selection_keyed_by_exact_thread_id() {
        let ping = Arc::new(Ping::default());
        let mut builder = Framework::builder(config());
        builder.register(PING, ping).unwrap();
        builder.with_context(EntityId::module(PING)).unwrap();
        let fwk = builder.build().unwrap();
        let ping_event = || {
            Event::new(EntityId::event(PING, 0), EntityId::module(PING)).with_source(EntityId::module(PING))
        };

        std::thread::scope(|s| {
            s.spawn(|| {
                tls::set_hw_thread_id(1 + THREAD_COUNT);
                fwk.set_thread_context(EntityId::module(PING));
                assert_eq!(fwk.context().owner(), EntityId::module(PING));
            })
            .join()
            .unwrap();

            s.spawn(|| {
                tls::set_hw_thread_id(1);
                assert_eq!(fwk.context().owner(), EntityId::None);
                fwk.put_event(&mut ping_event()).unwrap();
            })
            .join()
            .unwrap();
        });

        assert_eq!(fwk.contexts()[0].ready_len(), 1);
        assert_eq!(fwk.contexts()[1].ready_len(), 0);
    }
}
