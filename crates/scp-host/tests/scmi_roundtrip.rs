//! End-to-end exchanges through doorbell, transport, dispatch loop and
//! router.

use std::sync::Arc;
use std::time::Duration;

use scp_core::{EntityId, FwkError};
use scp_host::{module_idx, AgentConfig, HostFirmware, BASE_PROTOCOL_ID, BASE_PROTOCOL_VERSION};
use scp_runtime::FrameworkConfig;
use scp_smt::layout::{MailboxHeader, FLAGS_IENABLED, PAYLOAD_OFFSET, STATUS_FREE};
use scp_smt::scmi::status;
use scp_smt::{CountingDoorbell, Doorbell, HeapMailbox, MailboxMemory, MessageHeader};

const MAILBOX_SIZE: usize = 128;

fn config() -> FrameworkConfig {
    FrameworkConfig::new().event_count(8).isr_queue_capacity(4)
}

fn post_request(mbx: &HeapMailbox, header: MessageHeader, payload: &[u8], flags: u32) {
    mbx.set_header(&MailboxHeader {
        status: 0,
        flags,
        length: (4 + payload.len()) as u32,
        message_header: header.pack(),
        ..Default::default()
    })
    .unwrap();
    mbx.write_payload(payload).unwrap();
}

fn response_words(mbx: &HeapMailbox, count: usize) -> Vec<u32> {
    let raw = mbx.snapshot();
    (0..count)
        .map(|i| {
            let at = PAYLOAD_OFFSET + i * 4;
            u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
        })
        .collect()
}

fn claim(fw: &HostFirmware, device: u16) -> u32 {
    let raw = EntityId::element(module_idx::MHU, device).to_raw().unwrap();
    fw.get_device(raw).expect("device available")
}

#[test]
fn version_query_round_trip() {
    let bell = Arc::new(CountingDoorbell::new());
    let fw = HostFirmware::new(
        config(),
        vec![AgentConfig::responder(MAILBOX_SIZE).doorbell(bell.clone())],
    )
    .unwrap();
    assert_eq!(fw.devices_count(), 1);
    let device = claim(&fw, 0);

    let mbx = Arc::new(HeapMailbox::new(MAILBOX_SIZE));
    let request = MessageHeader::command(BASE_PROTOCOL_ID, 0, 0xAA);
    post_request(&mbx, request, &[], FLAGS_IENABLED);

    fw.process_message(device, mbx.clone()).unwrap();

    let header = mbx.header().unwrap();
    assert!(header.is_free());
    assert!(!header.is_error());
    assert_eq!(header.length, 12);
    assert_eq!(header.message_header, request.pack());
    assert_eq!(response_words(&mbx, 2), vec![status::SUCCESS as u32, BASE_PROTOCOL_VERSION]);
    assert_eq!(bell.take().unwrap(), 1);

    // the internal response carried the request's cookie
    let done = fw.router().last_completion().unwrap();
    assert!(done.matched);
    assert_eq!(done.status, status::SUCCESS);
    assert_eq!(done.message_header, request.pack());

    // every event record is back in the pool
    for ctx in fw.framework().contexts() {
        assert_eq!(ctx.free_events(), ctx.event_capacity());
    }
}

#[test]
fn consecutive_requests_get_distinct_cookies() {
    let fw = HostFirmware::new(config(), vec![AgentConfig::responder(MAILBOX_SIZE)]).unwrap();
    let device = claim(&fw, 0);
    let mbx = Arc::new(HeapMailbox::new(MAILBOX_SIZE));

    post_request(&mbx, MessageHeader::command(BASE_PROTOCOL_ID, 0, 1), &[], 0);
    fw.process_message(device, mbx.clone()).unwrap();
    let first = fw.router().last_completion().unwrap();

    post_request(&mbx, MessageHeader::command(BASE_PROTOCOL_ID, 1, 2), &[], 0);
    fw.process_message(device, mbx.clone()).unwrap();
    let second = fw.router().last_completion().unwrap();

    assert!(first.matched && second.matched);
    assert_ne!(first.cookie, second.cookie);
    assert_eq!(fw.router().completed(), 2);
    assert_eq!(response_words(&mbx, 2), vec![0, 1 << 8]);
}

#[test]
fn malformed_length_is_answered_with_protocol_error() {
    let fw = HostFirmware::new(config(), vec![AgentConfig::responder(MAILBOX_SIZE)]).unwrap();
    let device = claim(&fw, 0);
    let mbx = Arc::new(HeapMailbox::new(MAILBOX_SIZE));

    post_request(&mbx, MessageHeader::command(BASE_PROTOCOL_ID, 0, 3), &[], 0);
    mbx.set_length(MAILBOX_SIZE as u32).unwrap();
    fw.process_message(device, mbx.clone()).unwrap();

    let header = mbx.header().unwrap();
    assert!(header.is_free());
    assert!(header.is_error());
    assert_eq!(response_words(&mbx, 1), vec![status::PROTOCOL_ERROR as u32]);
    assert_eq!(fw.router().completed(), 0);

    // the channel takes the next message
    post_request(&mbx, MessageHeader::command(BASE_PROTOCOL_ID, 0, 4), &[], 0);
    fw.process_message(device, mbx.clone()).unwrap();
    assert!(!mbx.header().unwrap().is_error());
    assert_eq!(fw.router().completed(), 1);
}

#[test]
fn mailbox_still_owned_by_agent_is_refused() {
    let fw = HostFirmware::new(config(), vec![AgentConfig::responder(MAILBOX_SIZE)]).unwrap();
    let device = claim(&fw, 0);
    let mbx = Arc::new(HeapMailbox::new(MAILBOX_SIZE));

    post_request(&mbx, MessageHeader::command(BASE_PROTOCOL_ID, 0, 5), &[], 0);
    mbx.set_status(STATUS_FREE).unwrap();
    assert_eq!(fw.process_message(device, mbx.clone()), Err(FwkError::State));
    assert_eq!(fw.router().completed(), 0);
}

#[test]
fn devices_are_handed_out_once() {
    let fw = HostFirmware::new(
        config(),
        vec![AgentConfig::responder(MAILBOX_SIZE), AgentConfig::responder(MAILBOX_SIZE).secure()],
    )
    .unwrap();
    assert_eq!(fw.devices_count(), 2);

    let raw = EntityId::element(module_idx::MHU, 1).to_raw().unwrap();
    let slot = fw.get_device(raw).unwrap();
    assert_eq!(EntityId::from_raw(slot), Ok(EntityId::sub_element(module_idx::MHU, 1, 0)));
    assert_eq!(fw.get_device(raw), None);
    assert_eq!(fw.get_device(0xFFFF_FFF0), None);
    assert!(fw.process_message(0xFFFF_FFFF, Arc::new(HeapMailbox::new(MAILBOX_SIZE))).is_err());
}

#[test]
fn requester_channel_notification() {
    let fw = HostFirmware::new(
        config(),
        vec![AgentConfig::responder(MAILBOX_SIZE), AgentConfig::requester(MAILBOX_SIZE)],
    )
    .unwrap();
    let device = claim(&fw, 1);
    let channel = EntityId::element(module_idx::SMT, 1);
    let service = fw.router().service_id(1).unwrap();

    // the agent hands over an empty buffer
    let mbx = Arc::new(HeapMailbox::new(MAILBOX_SIZE));
    mbx.set_status(STATUS_FREE).unwrap();
    fw.process_message(device, mbx.clone()).unwrap();
    assert!(fw.smt().channel(channel).unwrap().is_locked());

    fw.router().notify(service, 0x11, 0, &7u32.to_le_bytes()).unwrap();
    assert_eq!(
        fw.smt().wait_for_transmit(channel, Some(Duration::from_millis(100))),
        Ok(true)
    );

    let header = mbx.header().unwrap();
    assert!(!header.is_free());
    assert_eq!(header.length, 8);
    assert_eq!(header.message_header, MessageHeader::notification(0x11, 0).pack());
    assert_eq!(response_words(&mbx, 1), vec![7]);
    assert_eq!(fw.mhu().rings(EntityId::sub_element(module_idx::MHU, 1, 0)), 1);
}
