//! SCP firmware end-to-end smoke test
//!
//! Exercises the whole hosted stack:
//!   Part A: Mailbox page: mmap'd shared memory seen through the wire layout
//!   Part B: Dispatch loop: events, signals, synchronous calls
//!   Part C: SCMI over SMT: agent requests through doorbell and router
//!   Part D: Requester channel: firmware notification to a waiting agent
//!
//! Run: ./target/release/scp-smoke
//! (SCP_LOG_LEVEL=trace for framework logs)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scp_core::{EntityId, Event, FwkResult};
use scp_host::{module_idx, AgentConfig, HostFirmware, BASE_PROTOCOL_ID, BASE_PROTOCOL_VERSION};
use scp_runtime::{Framework, FrameworkConfig, Module};
use scp_smt::layout::{MailboxHeader, FLAGS_IENABLED, PAYLOAD_OFFSET, STATUS_FREE};
use scp_smt::scmi::status;
use scp_smt::{CountingDoorbell, Doorbell, MailboxMemory, MessageHeader, RawMailbox};

const PAGE_SIZE: usize = 4096;
const MAILBOX_SIZE: usize = 128;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

/// Anonymous shared page carved into mailboxes of `MAILBOX_SIZE` bytes.
struct SharedPage {
    base: *mut u8,
}

impl SharedPage {
    fn map() -> Option<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                PAGE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        Some(Self { base: ptr as *mut u8 })
    }

    fn mailbox(&self, idx: usize) -> Arc<RawMailbox> {
        assert!((idx + 1) * MAILBOX_SIZE <= PAGE_SIZE);
        // Safety: inside the mapping, which outlives every test below
        Arc::new(unsafe { RawMailbox::from_raw(self.base.add(idx * MAILBOX_SIZE), MAILBOX_SIZE) })
    }
}

impl Drop for SharedPage {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, PAGE_SIZE);
        }
    }
}

#[cfg(target_os = "linux")]
fn host_doorbell() -> Arc<dyn Doorbell> {
    match scp_smt::doorbell::EventFdDoorbell::create() {
        Ok(bell) => Arc::new(bell),
        Err(_) => Arc::new(CountingDoorbell::new()),
    }
}

#[cfg(not(target_os = "linux"))]
fn host_doorbell() -> Arc<dyn Doorbell> {
    Arc::new(CountingDoorbell::new())
}

fn post_request(mbx: &dyn MailboxMemory, header: MessageHeader, payload: &[u8], flags: u32) {
    let _ = mbx.set_header(&MailboxHeader {
        flags,
        length: (4 + payload.len()) as u32,
        message_header: header.pack(),
        ..Default::default()
    });
    let _ = mbx.write_payload(payload);
}

fn payload_word(mbx: &dyn MailboxMemory, idx: usize) -> u32 {
    mbx.read_u32(PAYLOAD_OFFSET + idx * 4).unwrap_or(u32::MAX)
}

// ════════════════════════════════════════════════════════════
// Part A: Mailbox page
// ════════════════════════════════════════════════════════════

fn test_mailbox(t: &mut TestRunner, page: &SharedPage) {
    t.section("Part A: Mailbox page");

    let mbx = page.mailbox(0);
    t.check("mailbox size", mbx.size() == MAILBOX_SIZE, &format!("{}", mbx.size()));

    let header = MessageHeader::command(BASE_PROTOCOL_ID, 0, 0xAA);
    post_request(&*mbx, header, &[1, 2, 3, 4], FLAGS_IENABLED);
    let raw = unsafe { std::slice::from_raw_parts(mbx.as_ptr(), 32) };

    t.check("flags at offset 16", raw[16] == 1, &format!("{:?}", &raw[16..20]));
    t.check("length at offset 20", raw[20] == 8, &format!("{:?}", &raw[20..24]));
    t.check(
        "message_header at offset 24",
        raw[24..28] == header.pack().to_le_bytes(),
        &format!("{:?}", &raw[24..28]),
    );
    t.check("payload at offset 28", raw[28..32] == [1, 2, 3, 4], &format!("{:?}", &raw[28..32]));
    t.check(
        "out-of-range write rejected",
        mbx.write(MAILBOX_SIZE - 2, &[0; 4]).is_err(),
        "write succeeded",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Dispatch loop
// ════════════════════════════════════════════════════════════

const COUNTER: u8 = 0;

#[derive(Default)]
struct Counter {
    events: AtomicUsize,
    signals: AtomicUsize,
}

impl Module for Counter {
    fn name(&self) -> &str {
        "counter"
    }
    fn element_count(&self) -> usize {
        1
    }
    fn event_count(&self) -> usize {
        1
    }
    fn process_event(&self, _fwk: &Framework, event: &Event, resp: &mut Event) -> FwkResult<()> {
        self.events.fetch_add(1, Ordering::SeqCst);
        resp.set_param_u32(0, event.param_u32(0) * 2);
        Ok(())
    }
    fn process_signal(&self, _fwk: &Framework, _target: EntityId, _signal: EntityId) -> FwkResult<()> {
        self.signals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_dispatch(t: &mut TestRunner) {
    t.section("Part B: Dispatch loop");

    let counter = Arc::new(Counter::default());
    let mut builder = Framework::builder(FrameworkConfig::from_env().event_count(16));
    if builder.register(COUNTER, counter.clone()).is_err() {
        t.fail("register module", "index taken");
        return;
    }
    let fwk = match builder.build() {
        Ok(fwk) => { t.pass("build framework"); fwk }
        Err(e) => { t.fail("build framework", &e.to_string()); return; }
    };

    let me = EntityId::module(COUNTER);
    let id = EntityId::event(COUNTER, 0);

    let mut sent = 0;
    for _ in 0..10 {
        let mut ev = Event::new(id, EntityId::element(COUNTER, 0)).with_source(me);
        if fwk.put_event(&mut ev).is_ok() {
            sent += 1;
        }
    }
    fwk.process_events();
    let handled = counter.events.load(Ordering::SeqCst);
    t.check("10 events dispatched", sent == 10 && handled == 10, &format!("sent {} handled {}", sent, handled));
    t.check(
        "pool fully returned",
        fwk.context().free_events() == fwk.context().event_capacity(),
        &format!("{} free", fwk.context().free_events()),
    );

    let posted = (0..3).filter(|_| fwk.put_signal(me, me, id).is_ok()).count();
    fwk.process_events();
    t.check(
        "signals drained",
        posted == 3 && counter.signals.load(Ordering::SeqCst) == 3,
        &format!("posted {}", posted),
    );

    let mut req = Event::new(id, me).with_source(me);
    req.set_param_u32(0, 21);
    let mut out = Event::default();
    let result = fwk.put_event_and_wait(&mut req, &mut out);
    t.check(
        "put_event_and_wait -> 42",
        result.is_ok() && out.param_u32(0) == 42,
        &format!("{:?} {}", result, out.param_u32(0)),
    );
}

// ════════════════════════════════════════════════════════════
// Part C: SCMI over SMT
// ════════════════════════════════════════════════════════════

fn test_scmi(t: &mut TestRunner, page: &SharedPage) {
    t.section("Part C: SCMI over SMT");

    let bell = host_doorbell();
    let fw = match HostFirmware::new(
        FrameworkConfig::from_env(),
        vec![AgentConfig::responder(MAILBOX_SIZE).doorbell(bell.clone())],
    ) {
        Ok(fw) => { t.pass("firmware init"); fw }
        Err(e) => { t.fail("firmware init", &e.to_string()); return; }
    };

    let raw_device = EntityId::element(module_idx::MHU, 0).to_raw().expect("device id packs");
    let device = match fw.get_device(raw_device) {
        Some(d) => { t.pass("get_device"); d }
        None => { t.fail("get_device", "no device"); return; }
    };
    t.check("device handed out once", fw.get_device(raw_device).is_none(), "second claim succeeded");

    let mbx = page.mailbox(1);
    let request = MessageHeader::command(BASE_PROTOCOL_ID, 0, 0xAA);
    post_request(&*mbx, request, &[], FLAGS_IENABLED);
    let result = fw.process_message(device, mbx.clone());
    t.check("process_message", result.is_ok(), &format!("{:?}", result));

    let header = mbx.header().unwrap_or_default();
    t.check("mailbox handed back (FREE)", header.is_free(), &format!("status {:#x}", header.status));
    t.check("header preserved", header.message_header == request.pack(), &format!("{:#x}", header.message_header));
    t.check(
        "version response",
        payload_word(&*mbx, 0) == status::SUCCESS as u32
            && payload_word(&*mbx, 1) == BASE_PROTOCOL_VERSION,
        &format!("{:#x}", payload_word(&*mbx, 1)),
    );
    let rings = bell.take().unwrap_or(0);
    t.check("doorbell rung", rings == 1, &format!("{} rings", rings));
    let matched = fw.router().last_completion().map(|c| c.matched).unwrap_or(false);
    t.check("response cookie matched request", matched, "no matching completion");

    post_request(&*mbx, request, &[], 0);
    let _ = mbx.set_length(2);
    let _ = fw.process_message(device, mbx.clone());
    let header = mbx.header().unwrap_or_default();
    t.check(
        "short length -> PROTOCOL_ERROR",
        header.is_error() && payload_word(&*mbx, 0) == status::PROTOCOL_ERROR as u32,
        &format!("status {:#x}", header.status),
    );

    post_request(&*mbx, MessageHeader::command(0x42, 0, 1), &[], 0);
    let _ = fw.process_message(device, mbx.clone());
    t.check(
        "unknown protocol -> NOT_SUPPORTED",
        payload_word(&*mbx, 0) == status::NOT_SUPPORTED as u32,
        &format!("{:#x}", payload_word(&*mbx, 0)),
    );
}

// ════════════════════════════════════════════════════════════
// Part D: Requester channel
// ════════════════════════════════════════════════════════════

fn test_requester(t: &mut TestRunner, page: &SharedPage) {
    t.section("Part D: Requester channel");

    let fw = match HostFirmware::new(
        FrameworkConfig::from_env(),
        vec![AgentConfig::requester(MAILBOX_SIZE)],
    ) {
        Ok(fw) => fw,
        Err(e) => { t.fail("firmware init", &e.to_string()); return; }
    };
    let device = match fw.get_device(EntityId::element(module_idx::MHU, 0).to_raw().expect("device id packs")) {
        Some(d) => d,
        None => { t.fail("get_device", "no device"); return; }
    };

    let mbx = page.mailbox(2);
    let _ = mbx.set_status(STATUS_FREE);
    let result = fw.process_message(device, mbx.clone());
    t.check("agent hands over buffer", result.is_ok(), &format!("{:?}", result));

    let channel = EntityId::element(module_idx::SMT, 0);
    let service = fw.router().service_id(0).unwrap_or_default();
    let smt = Arc::clone(fw.smt());

    let woke = std::thread::scope(|s| {
        let agent = s.spawn(move || smt.wait_for_transmit(channel, Some(Duration::from_secs(2))));
        std::thread::sleep(Duration::from_millis(10));
        let sent = fw.router().notify(service, 0x11, 0, &5u32.to_le_bytes());
        sent.is_ok() && matches!(agent.join(), Ok(Ok(true)))
    });
    t.check("agent woken by transmit", woke, "timed out");

    let header = mbx.header().unwrap_or_default();
    t.check("buffer owned by agent", !header.is_free(), &format!("status {:#x}", header.status));
    t.check("notification payload", payload_word(&*mbx, 0) == 5, "payload mismatch");
}

// ════════════════════════════════════════════════════════════

fn main() {
    println!("=== SCP Firmware Smoke Test ===");
    scp_core::log::init();

    let mut t = TestRunner::new();

    let page = match SharedPage::map() {
        Some(p) => p,
        None => {
            println!("\nFATAL: mmap of the mailbox page failed");
            std::process::exit(1);
        }
    };

    test_mailbox(&mut t, &page);
    test_dispatch(&mut t);
    test_scmi(&mut t, &page);
    test_requester(&mut t, &page);

    drop(page);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
