//! Mailbox wire layout
//!
//! The shared mailbox is a little-endian header followed by the payload:
//!
//! ```text
//! offset  size  field
//!      0     4  reserved0
//!      4     4  status          bit0 FREE, bit1 ERROR
//!      8     8  reserved1
//!     16     4  flags           bit0 interrupt on completion
//!     20     4  length          message header + payload bytes
//!     24     4  message_header
//!     28     -  payload
//! ```
//!
//! The header is (de)serialized field by field at these offsets; nothing
//! relies on the in-memory layout of a Rust struct.

pub const RESERVED0_OFFSET: usize = 0;
pub const STATUS_OFFSET: usize = 4;
pub const RESERVED1_OFFSET: usize = 8;
pub const FLAGS_OFFSET: usize = 16;
pub const LENGTH_OFFSET: usize = 20;
pub const MESSAGE_HEADER_OFFSET: usize = 24;
pub const PAYLOAD_OFFSET: usize = 28;

/// Bytes before the payload
pub const MAILBOX_HEADER_SIZE: usize = PAYLOAD_OFFSET;

/// Bytes of `message_header`, counted in `length`
pub const MESSAGE_HEADER_SIZE: usize = 4;

/// The remote side owns the mailbox (no message pending for us)
pub const STATUS_FREE: u32 = 1 << 0;
/// The last message was malformed
pub const STATUS_ERROR: u32 = 1 << 1;

/// The remote wants an interrupt when the response is ready
pub const FLAGS_IENABLED: u32 = 1 << 0;

/// Decoded mailbox header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxHeader {
    pub reserved0: u32,
    pub status: u32,
    pub reserved1: u64,
    pub flags: u32,
    pub length: u32,
    pub message_header: u32,
}

fn le_u32(raw: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_le_bytes(b)
}

fn le_u64(raw: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&raw[offset..offset + 8]);
    u64::from_le_bytes(b)
}

impl MailboxHeader {
    pub fn decode(raw: &[u8; MAILBOX_HEADER_SIZE]) -> Self {
        Self {
            reserved0: le_u32(raw, RESERVED0_OFFSET),
            status: le_u32(raw, STATUS_OFFSET),
            reserved1: le_u64(raw, RESERVED1_OFFSET),
            flags: le_u32(raw, FLAGS_OFFSET),
            length: le_u32(raw, LENGTH_OFFSET),
            message_header: le_u32(raw, MESSAGE_HEADER_OFFSET),
        }
    }

    pub fn encode(&self) -> [u8; MAILBOX_HEADER_SIZE] {
        let mut raw = [0u8; MAILBOX_HEADER_SIZE];
        raw[RESERVED0_OFFSET..RESERVED0_OFFSET + 4].copy_from_slice(&self.reserved0.to_le_bytes());
        raw[STATUS_OFFSET..STATUS_OFFSET + 4].copy_from_slice(&self.status.to_le_bytes());
        raw[RESERVED1_OFFSET..RESERVED1_OFFSET + 8].copy_from_slice(&self.reserved1.to_le_bytes());
        raw[FLAGS_OFFSET..FLAGS_OFFSET + 4].copy_from_slice(&self.flags.to_le_bytes());
        raw[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&self.length.to_le_bytes());
        raw[MESSAGE_HEADER_OFFSET..MESSAGE_HEADER_OFFSET + 4]
            .copy_from_slice(&self.message_header.to_le_bytes());
        raw
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.status & STATUS_FREE != 0
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.status & STATUS_ERROR != 0
    }

    #[inline]
    pub fn interrupt_enabled(&self) -> bool {
        self.flags & FLAGS_IENABLED != 0
    }

    /// Payload bytes announced by `length`, or `None` when `length` does
    /// not even cover the message header.
    pub fn payload_len(&self) -> Option<usize> {
        (self.length as usize).checked_sub(MESSAGE_HEADER_SIZE)
    }
}
