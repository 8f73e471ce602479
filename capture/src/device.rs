use crate::{close, ioctl, open, wait::Waiter};
use libc::{c_int, c_uint, O_CLOEXEC, O_NONBLOCK, O_RDWR};
use std::{ffi::CString, io, mem, os::unix::ffi::OsStrExt, path::Path, ptr, time::Duration};
use thiserror::Error;
use v4l2_sys::{
    v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE, v4l2_buffer, v4l2_capability, v4l2_format,
    v4l2_memory_V4L2_MEMORY_DMABUF, v4l2_pix_format, v4l2_requestbuffers, V4L2_CAP_STREAMING,
    V4L2_CAP_VIDEO_CAPTURE, VIDIOC_DQBUF, VIDIOC_G_FMT, VIDIOC_QBUF, VIDIOC_QUERYCAP,
    VIDIOC_REQBUFS, VIDIOC_STREAMOFF, VIDIOC_STREAMON, VIDIOC_S_FMT,
};

/// Errors produced while initializing or driving the capture device.
#[derive(Debug, Error)]
pub enum Error {
    /// `VIDIOC_QUERYCAP` failed.
    #[error("VIDIOC_QUERYCAP failed: {0}")]
    QueryCapFailed(#[source] io::Error),
    /// The device doesn't report the `VIDEO_CAPTURE` capability.
    #[error("device doesn't support video capture")]
    NotCaptureDevice,
    /// The device doesn't report the `STREAMING` capability.
    #[error("device doesn't support streaming I/O")]
    NoStreaming,
    /// `VIDIOC_G_FMT` failed.
    #[error("VIDIOC_G_FMT failed: {0}")]
    GetFormatFailed(#[source] io::Error),
    /// `VIDIOC_S_FMT` failed.
    #[error("VIDIOC_S_FMT failed: {0}")]
    SetFormatFailed(#[source] io::Error),
    /// `VIDIOC_REQBUFS` failed.
    #[error("VIDIOC_REQBUFS failed: {0}")]
    ReqBufsFailed(#[source] io::Error),
    /// `VIDIOC_QBUF` failed.
    #[error("VIDIOC_QBUF failed: {0}")]
    QBufFailed(#[source] io::Error),
    /// `VIDIOC_STREAMON` failed.
    #[error("VIDIOC_STREAMON failed: {0}")]
    StreamOnFailed(#[source] io::Error),
    /// `VIDIOC_DQBUF` failed (other than the dequeue timing out).
    #[error("VIDIOC_DQBUF failed: {0}")]
    DQBufFailed(#[source] io::Error),
    /// No frame became ready before the deadline.
    #[error("capture dequeue timed out")]
    Timeout,
}

/// Format negotiated with the capture device, possibly narrowed by the driver
/// from what was requested.
#[derive(Debug, Clone, Copy)]
pub struct Format {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// The fourcc pixel format.
    pub pixel_format: c_uint,
    /// Distance in bytes between the leftmost pixels of two adjacent lines.
    pub bytes_per_line: u32,
    /// Size in bytes of a complete image, as reported by the driver.
    pub size_image: u32,
}

/// One successfully dequeued capture buffer.
#[derive(Debug, Clone, Copy)]
pub struct Dequeued {
    /// Index of the filled buffer, identifying which DMABUF slot it is.
    pub index: u32,
    /// Number of valid bytes the driver wrote into the buffer.
    pub bytesused: u32,
}

/// A V4L2 capture device bound to `N` externally-owned DMABUF file
/// descriptors, one per slot, for the lifetime of the session.
#[derive(Debug)]
pub struct Capture {
    fd: c_int,
    format: Format,
    count: u32,
    streaming: bool,
}

impl Capture {
    /// Opens `device`, negotiates `fourcc`, and reports the format the
    /// driver actually settled on, without binding any buffers or
    /// starting the stream.
    ///
    /// Used during probing to learn `sizeimage` before DMABUFs of the
    /// right size are allocated for the real, buffer-bound [`init`](Self::init).
    pub fn query_format(device: &Path, fourcc: c_uint) -> Result<Format, Error> {
        let path = CString::new(device.as_os_str().as_bytes()).map_err(|err| {
            Error::QueryCapFailed(io::Error::new(io::ErrorKind::InvalidInput, err))
        })?;
        let fd = unsafe { open(path.as_ptr(), O_RDWR | O_NONBLOCK | O_CLOEXEC) }
            .map_err(Error::QueryCapFailed)?;

        let mut cap: v4l2_capability = unsafe { mem::zeroed() };
        let result = unsafe { ioctl(fd, VIDIOC_QUERYCAP, ptr::addr_of_mut!(cap).cast()) };
        if let Err(err) = result {
            unsafe {
                let _ = close(fd);
            }
            return Err(Error::QueryCapFailed(err));
        }
        if cap.capabilities & V4L2_CAP_VIDEO_CAPTURE == 0 {
            unsafe {
                let _ = close(fd);
            }
            return Err(Error::NotCaptureDevice);
        }

        let mut fmt: v4l2_format = unsafe { mem::zeroed() };
        fmt.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        let format = negotiate_format(fd, fourcc, &mut fmt);
        unsafe {
            let _ = close(fd);
        }
        format
    }

    /// Opens `device`, negotiates `fourcc`, and binds it to `dmabufs`
    /// (one DMABUF fd per buffer slot, in index order), queuing all of
    /// them and starting the stream.
    pub fn init(device: &Path, fourcc: c_uint, dmabufs: &[c_int]) -> Result<Self, Error> {
        let path = CString::new(device.as_os_str().as_bytes()).map_err(|err| {
            Error::QueryCapFailed(io::Error::new(io::ErrorKind::InvalidInput, err))
        })?;
        let fd = unsafe { open(path.as_ptr(), O_RDWR | O_NONBLOCK | O_CLOEXEC) }
            .map_err(Error::QueryCapFailed)?;

        let mut cap: v4l2_capability = unsafe { mem::zeroed() };
        unsafe { ioctl(fd, VIDIOC_QUERYCAP, ptr::addr_of_mut!(cap).cast()) }
            .map_err(Error::QueryCapFailed)?;
        if cap.capabilities & V4L2_CAP_VIDEO_CAPTURE == 0 {
            unsafe {
                let _ = close(fd);
            }
            return Err(Error::NotCaptureDevice);
        }
        if cap.capabilities & V4L2_CAP_STREAMING == 0 {
            unsafe {
                let _ = close(fd);
            }
            return Err(Error::NoStreaming);
        }

        let mut fmt: v4l2_format = unsafe { mem::zeroed() };
        fmt.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        let format = negotiate_format(fd, fourcc, &mut fmt)?;

        let count = dmabufs.len() as u32;
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.memory = v4l2_memory_V4L2_MEMORY_DMABUF;
        req.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        unsafe { ioctl(fd, VIDIOC_REQBUFS, ptr::addr_of_mut!(req).cast()) }
            .map_err(Error::ReqBufsFailed)?;

        for (index, &dmabuf_fd) in dmabufs.iter().enumerate() {
            queue_raw(fd, index as u32, dmabuf_fd)?;
        }

        let mut type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        unsafe { ioctl(fd, VIDIOC_STREAMON, ptr::addr_of_mut!(type_).cast()) }
            .map_err(Error::StreamOnFailed)?;

        Ok(Self { fd, format, count, streaming: true })
    }

    /// The format actually negotiated with the driver (may be narrower
    /// than requested: width, height, `sizeimage`, `bytesperline`).
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Number of DMABUF slots bound to this device.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Blocks up to `timeout` for a filled buffer, then dequeues it.
    ///
    /// Returns [`Error::Timeout`] if no frame arrives in time; the
    /// caller decides whether to retry.
    pub fn dequeue(&self, timeout: Duration) -> Result<Dequeued, Error> {
        let waiter = Waiter::new(self.fd);
        if !waiter.wait_readable(timeout).map_err(Error::DQBufFailed)? {
            return Err(Error::Timeout);
        }
        let mut buffer: v4l2_buffer = unsafe { mem::zeroed() };
        buffer.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buffer.memory = v4l2_memory_V4L2_MEMORY_DMABUF;
        unsafe { ioctl(self.fd, VIDIOC_DQBUF, ptr::addr_of_mut!(buffer).cast()) }
            .map_err(Error::DQBufFailed)?;
        Ok(Dequeued { index: buffer.index, bytesused: buffer.bytesused })
    }

    /// Returns buffer `index` to the driver for refilling.
    ///
    /// Must be called for every successful [`dequeue`](Self::dequeue)
    /// unless the encoder is about to consume the same index instead.
    pub fn queue(&self, index: u32, dmabuf_fd: c_int) -> Result<(), Error> {
        queue_raw(self.fd, index, dmabuf_fd)
    }
}

/// Shared by [`Capture::query_format`] and [`Capture::init`]: reads the
/// driver's current format, requests `fourcc`, and reports what the
/// driver actually settled on.
fn negotiate_format(fd: c_int, fourcc: c_uint, fmt: &mut v4l2_format) -> Result<Format, Error> {
    unsafe { ioctl(fd, VIDIOC_G_FMT, ptr::addr_of_mut!(*fmt).cast()) }.map_err(Error::GetFormatFailed)?;
    unsafe {
        fmt.fmt.pix.pixelformat = fourcc;
    }
    unsafe { ioctl(fd, VIDIOC_S_FMT, ptr::addr_of_mut!(*fmt).cast()) }.map_err(Error::SetFormatFailed)?;
    Ok(Format::from(unsafe { fmt.fmt.pix }))
}

fn queue_raw(fd: c_int, index: u32, dmabuf_fd: c_int) -> Result<(), Error> {
    let mut buffer: v4l2_buffer = unsafe { mem::zeroed() };
    buffer.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
    buffer.memory = v4l2_memory_V4L2_MEMORY_DMABUF;
    buffer.index = index;
    buffer.m.fd = dmabuf_fd;
    unsafe { ioctl(fd, VIDIOC_QBUF, ptr::addr_of_mut!(buffer).cast()) }.map_err(Error::QBufFailed)?;
    Ok(())
}

impl Drop for Capture {
    fn drop(&mut self) {
        if self.streaming {
            let mut type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
            unsafe {
                if let Err(err) =
                    ioctl(self.fd, VIDIOC_STREAMOFF, ptr::addr_of_mut!(type_).cast())
                {
                    log::error!("Couldn't stop video4linux capture streaming: {err}");
                }
            }
        }
        unsafe {
            if let Err(err) = close(self.fd) {
                log::error!("Couldn't close video4linux capture descriptor: {err}");
            }
        }
    }
}

impl From<v4l2_pix_format> for Format {
    fn from(fmt: v4l2_pix_format) -> Self {
        Self {
            width: fmt.width,
            height: fmt.height,
            pixel_format: fmt.pixelformat,
            bytes_per_line: fmt.bytesperline,
            size_image: fmt.sizeimage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_pix_format_copies_fields() {
        let mut pix: v4l2_pix_format = unsafe { mem::zeroed() };
        pix.width = 1920;
        pix.height = 1080;
        pix.pixelformat = 0x3231_3459; // "Y412" as a stand-in fourcc
        pix.bytesperline = 1920 * 2;
        pix.sizeimage = 1920 * 1080 * 2;

        let format = Format::from(pix);
        assert_eq!(format.width, 1920);
        assert_eq!(format.height, 1080);
        assert_eq!(format.pixel_format, pix.pixelformat);
        assert_eq!(format.bytes_per_line, 3840);
        assert_eq!(format.size_image, 1920 * 1080 * 2);
    }

    #[test]
    fn init_on_missing_device_fails() {
        let err = Capture::init(Path::new("/dev/kvmd-test-missing-video"), 0, &[]).unwrap_err();
        assert!(matches!(err, Error::QueryCapFailed(_)));
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(format!("{}", Error::NotCaptureDevice), "device doesn't support video capture");
        assert_eq!(format!("{}", Error::NoStreaming), "device doesn't support streaming I/O");
        assert_eq!(format!("{}", Error::Timeout), "capture dequeue timed out");
    }
}
