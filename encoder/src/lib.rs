//! V4L2 memory-to-memory hardware H.264 encoder.
//!
//! The OUTPUT queue is bound to the same DMABUF file descriptors the
//! capture device fills, so a frame travels from the HDMI bridge to
//! the encoder without a user-space copy. The CAPTURE queue owns its
//! own mapped memory, since the only consumer of encoded bytes is this
//! process.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod device;
mod wait;

pub use self::device::{Encoder, Error, Params};

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

/// Like [`ioctl`], but treats `EAGAIN`/`EWOULDBLOCK` as `Ok(None)` instead
/// of an error, for non-blocking dequeues.
unsafe fn ioctl_nonblocking(fd: c_int, request: c_ulong, argp: *mut c_void) -> io::Result<Option<c_int>> {
    match unsafe { ioctl(fd, request, argp) } {
        Ok(result) => Ok(Some(result)),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(err),
    }
}

unsafe fn mmap(
    addr: *mut c_void,
    len: libc::size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: libc::off_t,
) -> io::Result<*mut c_void> {
    let ptr = unsafe { libc::mmap(addr, len, prot, flags, fd, offset) };
    if ptr == libc::MAP_FAILED { Err(io::Error::last_os_error()) } else { Ok(ptr) }
}

unsafe fn munmap(addr: *mut c_void, len: libc::size_t) -> io::Result<()> {
    let result = unsafe { libc::munmap(addr, len) };
    if result == -1 { Err(io::Error::last_os_error()) } else { Ok(()) }
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
