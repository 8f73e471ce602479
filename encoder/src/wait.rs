use crate::select;
use libc::{c_int, fd_set, suseconds_t, time_t, timeval, FD_ISSET, FD_SET, FD_ZERO};
use std::{io, mem::MaybeUninit, ptr, time::Duration};

/// Waits for the encoder descriptor to become readable, bounded by a timeout.
pub(crate) struct Waiter {
    fd: c_int,
}

impl Waiter {
    pub(crate) fn new(fd: c_int) -> Self {
        Self { fd }
    }

    /// Blocks until the encoder descriptor is readable or `timeout` elapses.
    pub(crate) fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut tv = timeval {
            tv_sec: timeout.as_secs() as time_t,
            tv_usec: suseconds_t::from(timeout.subsec_micros()),
        };
        unsafe {
            #[allow(invalid_value, clippy::uninit_assumed_init)]
            let mut fd_set: fd_set = MaybeUninit::uninit().assume_init();
            FD_ZERO(&mut fd_set);
            FD_SET(self.fd, &mut fd_set);
            let n = select(self.fd + 1, &mut fd_set, ptr::null_mut(), ptr::null_mut(), &mut tv)?;
            Ok(n > 0 && FD_ISSET(self.fd, &fd_set))
        }
    }
}
