//! eventfd doorbell
//!
//! Rings coalesce: several `ring()` calls before the agent reads the fd
//! show up as one wakeup carrying the total count.

use std::os::unix::io::RawFd;

use scp_core::{fwk_err, FwkError, FwkResult};

use super::Doorbell;

pub struct EventFdDoorbell {
    fd: RawFd,
    /// true if we created the fd and close it on drop
    owned: bool,
}

fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

impl EventFdDoorbell {
    /// Wrap an existing non-blocking eventfd. The caller keeps ownership.
    pub fn new(eventfd: RawFd) -> Self {
        Self { fd: eventfd, owned: false }
    }

    pub fn create() -> FwkResult<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            fwk_err!("[MHU] eventfd failed, errno {}", errno());
            return Err(FwkError::Init);
        }
        Ok(Self { fd, owned: true })
    }

    /// Descriptor for the agent side to poll
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Doorbell for EventFdDoorbell {
    fn ring(&self) -> FwkResult<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = errno();
            // counter saturated: a wakeup is already pending
            if errno == libc::EAGAIN {
                return Ok(());
            }
            fwk_err!("[MHU] doorbell write failed, errno {}", errno);
            return Err(FwkError::Handler);
        }
        Ok(())
    }

    fn take(&self) -> FwkResult<u64> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = errno();
            if errno == libc::EAGAIN {
                return Ok(0);
            }
            return Err(FwkError::Handler);
        }
        Ok(val)
    }
}

impl Drop for EventFdDoorbell {
    fn drop(&mut self) {
        if self.owned && self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rings_coalesce() {
        let bell = EventFdDoorbell::create().unwrap();
        assert!(bell.fd() >= 0);
        assert_eq!(bell.take().unwrap(), 0);
        bell.ring().unwrap();
        bell.ring().unwrap();
        bell.ring().unwrap();
        assert_eq!(bell.take().unwrap(), 3);
        assert_eq!(bell.take().unwrap(), 0);
    }
}
