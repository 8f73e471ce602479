//! Allocates page-aligned DMABUF descriptors from the kernel DMA-BUF heap.
//!
//! A [`DmaHeap`] handle is scoped to one capture session: open it once,
//! call [`DmaHeap::alloc`] for every buffer the session needs, and let
//! the returned [`DmaBuffer`]s close their file descriptors on drop.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use libc::{c_char, c_int, c_void, O_CLOEXEC, O_RDONLY};
use std::{ffi::CString, io, mem, os::unix::ffi::OsStrExt, path::Path, ptr};
use thiserror::Error;
use v4l2_sys::{dma_heap_allocation_data, DMA_HEAP_IOCTL_ALLOC};

/// Default DMA-BUF heap exposed by the kernel for contiguous allocations.
pub const DEFAULT_HEAP: &str = "linux,cma";

/// Errors produced by DMA-BUF heap operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The heap device could not be opened or the allocation ioctl was refused.
    #[error("DMA-BUF heap allocation failed: {0}")]
    AllocFailed(#[source] io::Error),
}

unsafe fn open(path: *const c_char, oflag: c_int) -> io::Result<c_int> {
    let fd = unsafe { libc::open(path, oflag) };
    if fd == -1 { Err(io::Error::last_os_error()) } else { Ok(fd) }
}

unsafe fn close(fd: c_int) -> io::Result<()> {
    let result = unsafe { libc::close(fd) };
    if result == -1 { Err(io::Error::last_os_error()) } else { Ok(()) }
}

unsafe fn ioctl(fd: c_int, request: libc::c_ulong, argp: *mut c_void) -> io::Result<c_int> {
    let result = unsafe { libc::ioctl(fd, request, argp) };
    if result == -1 { Err(io::Error::last_os_error()) } else { Ok(result) }
}

/// Handle to a kernel DMA-BUF heap, scoped to the session that opened it.
#[derive(Debug)]
pub struct DmaHeap {
    fd: c_int,
}

/// An opaque kernel DMABUF file descriptor plus its byte length.
///
/// Exclusively owned by the process that allocated it; shared by
/// reference (its fd) with the V4L2 drivers it is queued against. At any
/// instant a buffer is queued on at most one V4L2 queue, or idle.
#[derive(Debug)]
pub struct DmaBuffer {
    fd: c_int,
    len: usize,
}

impl DmaHeap {
    /// Opens the named DMA-BUF heap device under `/dev/dma_heap/`.
    pub fn open(name: &str) -> Result<Self, Error> {
        Self::open_path(Path::new("/dev/dma_heap").join(name))
    }

    fn open_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path =
            CString::new(path.as_ref().as_os_str().as_bytes()).map_err(|err| {
                Error::AllocFailed(io::Error::new(io::ErrorKind::InvalidInput, err))
            })?;
        let fd = unsafe { open(path.as_ptr(), O_RDONLY | O_CLOEXEC) }
            .map_err(Error::AllocFailed)?;
        Ok(Self { fd })
    }

    /// Allocates a single page-aligned buffer of at least `size` bytes.
    pub fn alloc(&self, size: usize) -> Result<DmaBuffer, Error> {
        let mut data: dma_heap_allocation_data = unsafe { mem::zeroed() };
        data.len = size as u64;
        data.fd_flags = (libc::O_RDWR | libc::O_CLOEXEC) as u32;
        unsafe {
            ioctl(
                self.fd,
                DMA_HEAP_IOCTL_ALLOC as libc::c_ulong,
                ptr::addr_of_mut!(data).cast::<c_void>(),
            )
        }
        .map_err(Error::AllocFailed)?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(DmaBuffer { fd: data.fd as c_int, len: size })
    }
}

impl Drop for DmaHeap {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = close(self.fd) {
                log::error!("Couldn't close DMA-BUF heap descriptor: {err}");
            }
        }
    }
}

impl DmaBuffer {
    /// Raw file descriptor, valid for the lifetime of this `DmaBuffer`.
    ///
    /// Callers only ever `QBUF` this fd into a V4L2 queue; user space never
    /// reads or writes through it directly.
    #[must_use]
    pub fn fd(&self) -> c_int {
        self.fd
    }

    /// Byte length requested at allocation time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has zero length (always `false` for a successful alloc).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = close(self.fd) {
                log::error!("Couldn't close DMABUF descriptor: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_heap_is_alloc_failed() {
        let err = DmaHeap::open_path("/dev/dma_heap/does-not-exist-kvmd-test").unwrap_err();
        assert!(matches!(err, Error::AllocFailed(_)));
    }
}
