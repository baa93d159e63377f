//! Shared mailbox memory
//!
//! The transport never dereferences mailbox memory directly; every access
//! goes through [`MailboxMemory`] with an explicit offset so the same code
//! drives a heap buffer in tests and a mapped shared page on a host.

use scp_core::irq_lock::IrqLock;
use scp_core::{FwkError, FwkResult};

use crate::layout::{MailboxHeader, LENGTH_OFFSET, MAILBOX_HEADER_SIZE, PAYLOAD_OFFSET, STATUS_OFFSET};

/// Byte-addressed view of one mailbox.
///
/// Out-of-range accesses fail with `Param` and touch nothing.
pub trait MailboxMemory: Send + Sync {
    fn size(&self) -> usize;

    fn read(&self, offset: usize, buf: &mut [u8]) -> FwkResult<()>;

    fn write(&self, offset: usize, data: &[u8]) -> FwkResult<()>;

    fn read_u32(&self, offset: usize) -> FwkResult<u32> {
        let mut raw = [0u8; 4];
        self.read(offset, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn write_u32(&self, offset: usize, value: u32) -> FwkResult<()> {
        self.write(offset, &value.to_le_bytes())
    }

    fn header(&self) -> FwkResult<MailboxHeader> {
        let mut raw = [0u8; MAILBOX_HEADER_SIZE];
        self.read(0, &mut raw)?;
        Ok(MailboxHeader::decode(&raw))
    }

    fn set_header(&self, header: &MailboxHeader) -> FwkResult<()> {
        self.write(0, &header.encode())
    }

    fn status(&self) -> FwkResult<u32> {
        self.read_u32(STATUS_OFFSET)
    }

    fn set_status(&self, status: u32) -> FwkResult<()> {
        self.write_u32(STATUS_OFFSET, status)
    }

    fn set_length(&self, length: u32) -> FwkResult<()> {
        self.write_u32(LENGTH_OFFSET, length)
    }

    fn read_payload(&self, buf: &mut [u8]) -> FwkResult<()> {
        self.read(PAYLOAD_OFFSET, buf)
    }

    fn write_payload(&self, data: &[u8]) -> FwkResult<()> {
        self.write(PAYLOAD_OFFSET, data)
    }
}

#[inline]
fn check_range(offset: usize, len: usize, size: usize) -> FwkResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(FwkError::Param),
    }
}

/// Mailbox backed by heap memory
pub struct HeapMailbox {
    bytes: IrqLock<Box<[u8]>>,
}

impl HeapMailbox {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: IrqLock::new(vec![0u8; size].into_boxed_slice()),
        }
    }

    /// Copy of the whole mailbox
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().to_vec()
    }
}

impl MailboxMemory for HeapMailbox {
    fn size(&self) -> usize {
        self.bytes.lock().len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> FwkResult<()> {
        let bytes = self.bytes.lock();
        check_range(offset, buf.len(), bytes.len())?;
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: usize, data: &[u8]) -> FwkResult<()> {
        let mut bytes = self.bytes.lock();
        check_range(offset, data.len(), bytes.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Mailbox over memory shared with another agent (a mapped page).
///
/// Every byte is accessed with a volatile load or store since the other
/// side may change it at any time.
pub struct RawMailbox {
    base: *mut u8,
    size: usize,
}

// Safety: the pointer is only used for volatile byte accesses within
// `size`; the memory is shared with the remote agent anyway.
unsafe impl Send for RawMailbox {}
unsafe impl Sync for RawMailbox {}

impl RawMailbox {
    /// Wrap `size` bytes at `base`.
    ///
    /// # Safety
    /// - `base` must be valid for reads and writes of `size` bytes.
    /// - The memory must stay mapped for the lifetime of this value.
    pub unsafe fn from_raw(base: *mut u8, size: usize) -> Self {
        Self { base, size }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.base
    }
}

impl MailboxMemory for RawMailbox {
    fn size(&self) -> usize {
        self.size
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> FwkResult<()> {
        check_range(offset, buf.len(), self.size)?;
        for (i, b) in buf.iter_mut().enumerate() {
            // Safety: range checked above
            *b = unsafe { std::ptr::read_volatile(self.base.add(offset + i)) };
        }
        Ok(())
    }

    fn write(&self, offset: usize, data: &[u8]) -> FwkResult<()> {
        check_range(offset, data.len(), self.size)?;
        for (i, b) in data.iter().enumerate() {
            // Safety: range checked above
            unsafe { std::ptr::write_volatile(self.base.add(offset + i), *b) };
        }
        Ok(())
    }
}
