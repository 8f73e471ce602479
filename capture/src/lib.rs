//! V4L2 capture device bound to externally-owned DMABUF slots.
//!
//! The capture side never allocates or frees the buffers it streams
//! into — those are handed in by the caller (see `kvmd-dmaheap`) and
//! also bound to the encoder's OUTPUT queue, so frames travel from the
//! HDMI bridge to the encoder through the kernel without a user-space
//! copy.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod device;
mod wait;

pub use self::{
    device::{Capture, Dequeued, Error, Format},
    wait::Waiter,
};

use libc::{c_char, c_int, c_ulong, c_void, fd_set, timeval};
use std::io;

unsafe fn open(path: *const c_char, oflag: c_int) -> io::Result<c_int> {
    let fd = unsafe { libc::open(path, oflag) };
    if fd == -1 { Err(io::Error::last_os_error()) } else { Ok(fd) }
}

unsafe fn close(fd: c_int) -> io::Result<()> {
    let result = unsafe { libc::close(fd) };
    if result == -1 { Err(io::Error::last_os_error()) } else { Ok(()) }
}

/// Issues an ioctl, transparently retrying on `EINTR`.
///
/// # Safety
/// `argp` must point to a buffer of the size `request` expects.
unsafe fn ioctl(fd: c_int, request: c_ulong, argp: *mut c_void) -> io::Result<c_int> {
    loop {
        let result = unsafe { libc::ioctl(fd, request, argp) };
        if result != -1 {
            return Ok(result);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

unsafe fn select(
    nfds: c_int,
    readfds: *mut fd_set,
    writefds: *mut fd_set,
    errorfds: *mut fd_set,
    timeout: *mut timeval,
) -> io::Result<c_int> {
    let result = unsafe { libc::select(nfds, readfds, writefds, errorfds, timeout) };
    if result == -1 { Err(io::Error::last_os_error()) } else { Ok(result) }
}

