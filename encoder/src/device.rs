use crate::{close, ioctl, ioctl_nonblocking, mmap, munmap, open, wait::Waiter};
use libc::{c_int, c_uint, MAP_SHARED, O_CLOEXEC, O_NONBLOCK, O_RDWR, PROT_READ};
use std::{ffi::CString, io, mem, os::unix::ffi::OsStrExt, path::Path, ptr, slice, time::Duration};
use thiserror::Error;
use v4l2_sys::{
    v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE, v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT,
    v4l2_buffer, v4l2_control, v4l2_format, v4l2_memory_V4L2_MEMORY_DMABUF,
    v4l2_memory_V4L2_MEMORY_MMAP, v4l2_mpeg_video_h264_profile_V4L2_MPEG_VIDEO_H264_PROFILE_CONSTRAINED_BASELINE,
    v4l2_requestbuffers, V4L2_CID_MPEG_VIDEO_B_FRAMES, V4L2_CID_MPEG_VIDEO_BITRATE,
    V4L2_CID_MPEG_VIDEO_FORCE_KEY_FRAME, V4L2_CID_MPEG_VIDEO_GOP_SIZE,
    V4L2_CID_MPEG_VIDEO_H264_PROFILE, V4L2_CID_MPEG_VIDEO_REPEAT_SEQ_HEADER, V4L2_PIX_FMT_H264,
    VIDIOC_DQBUF, VIDIOC_QBUF, VIDIOC_QUERYBUF, VIDIOC_REQBUFS, VIDIOC_STREAMOFF, VIDIOC_STREAMON,
    VIDIOC_S_CTRL, VIDIOC_S_FMT,
};

/// Errors produced while initializing or driving the encoder.
#[derive(Debug, Error)]
pub enum Error {
    /// `VIDIOC_S_FMT` failed on either queue.
    #[error("VIDIOC_S_FMT failed: {0}")]
    SetFormatFailed(#[source] io::Error),
    /// Setting an encoder control failed.
    #[error("VIDIOC_S_CTRL failed: {0}")]
    SetControlFailed(#[source] io::Error),
    /// `VIDIOC_REQBUFS` failed on either queue.
    #[error("VIDIOC_REQBUFS failed: {0}")]
    ReqBufsFailed(#[source] io::Error),
    /// `VIDIOC_QUERYBUF` failed while setting up CAPTURE buffers.
    #[error("VIDIOC_QUERYBUF failed: {0}")]
    QueryBufFailed(#[source] io::Error),
    /// Mapping a CAPTURE buffer into memory failed.
    #[error("mmap of CAPTURE buffer failed: {0}")]
    MmapFailed(#[source] io::Error),
    /// Queuing a buffer on either queue failed.
    #[error("VIDIOC_QBUF failed: {0}")]
    QBufFailed(#[source] io::Error),
    /// Dequeuing a buffer failed (other than a non-blocking miss).
    #[error("VIDIOC_DQBUF failed: {0}")]
    DQBufFailed(#[source] io::Error),
    /// `VIDIOC_STREAMON` failed on either queue.
    #[error("VIDIOC_STREAMON failed: {0}")]
    StreamOnFailed(#[source] io::Error),
    /// No encoded frame arrived before the deadline.
    #[error("encoder poll timed out")]
    PollTimeout,
    /// The readiness poll on the encoder descriptor failed.
    #[error("encoder poll failed: {0}")]
    PollFailed(#[source] io::Error),
    /// An operation was attempted before `STREAMON` completed.
    #[error("encoder is not streaming")]
    NotStreaming,
}

/// Raw frame geometry bound to the OUTPUT queue.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Fourcc of the raw input pixel format (matches the capture device).
    pub input_fourcc: c_uint,
    /// Bytes per line of the raw input.
    pub bytes_per_line: u32,
    /// Size in bytes of one raw input image.
    pub size_image: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Number of frames between keyframes.
    pub gop_size: u32,
}

struct CaptureSlot {
    ptr: *mut u8,
    len: usize,
}

/// A V4L2 M2M hardware H.264 encoder.
///
/// The OUTPUT queue is bound to caller-owned DMABUF descriptors (the same
/// ones the capture device fills); the CAPTURE queue owns mapped memory
/// for the encoded bitstream.
pub struct Encoder {
    fd: c_int,
    dmabuf_fds: Vec<c_int>,
    capture_slots: Vec<CaptureSlot>,
    streaming: bool,
}

impl Encoder {
    /// Opens `device` and negotiates both queues per `params`, binding the
    /// OUTPUT queue to `dmabuf_fds` (one slot per fd, in index order).
    pub fn init(device: &Path, params: Params, dmabuf_fds: &[c_int]) -> Result<Self, Error> {
        let path = CString::new(device.as_os_str().as_bytes())
            .map_err(|err| Error::SetFormatFailed(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
        let fd = unsafe { open(path.as_ptr(), O_RDWR | O_NONBLOCK | O_CLOEXEC) }
            .map_err(Error::SetFormatFailed)?;

        // 1. S_FMT on OUTPUT.
        let mut out_fmt: v4l2_format = unsafe { mem::zeroed() };
        out_fmt.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT;
        unsafe {
            out_fmt.fmt.pix.width = params.width;
            out_fmt.fmt.pix.height = params.height;
            out_fmt.fmt.pix.pixelformat = params.input_fourcc;
            out_fmt.fmt.pix.bytesperline = params.bytes_per_line;
            out_fmt.fmt.pix.sizeimage = params.size_image;
        }
        unsafe { ioctl(fd, VIDIOC_S_FMT, ptr::addr_of_mut!(out_fmt).cast()) }
            .map_err(Error::SetFormatFailed)?;

        // 2. S_FMT on CAPTURE.
        let mut cap_fmt: v4l2_format = unsafe { mem::zeroed() };
        cap_fmt.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        unsafe {
            cap_fmt.fmt.pix.width = params.width;
            cap_fmt.fmt.pix.height = params.height;
            cap_fmt.fmt.pix.pixelformat = V4L2_PIX_FMT_H264;
        }
        unsafe { ioctl(fd, VIDIOC_S_FMT, ptr::addr_of_mut!(cap_fmt).cast()) }
            .map_err(Error::SetFormatFailed)?;

        // 3. Controls.
        set_control(fd, V4L2_CID_MPEG_VIDEO_BITRATE, params.bitrate as i32)?;
        set_control(fd, V4L2_CID_MPEG_VIDEO_GOP_SIZE, params.gop_size as i32)?;
        set_control(fd, V4L2_CID_MPEG_VIDEO_B_FRAMES, 0)?;
        set_control(
            fd,
            V4L2_CID_MPEG_VIDEO_H264_PROFILE,
            v4l2_mpeg_video_h264_profile_V4L2_MPEG_VIDEO_H264_PROFILE_CONSTRAINED_BASELINE as i32,
        )?;
        set_control(fd, V4L2_CID_MPEG_VIDEO_REPEAT_SEQ_HEADER, 1)?;

        // 4. REQBUFS OUTPUT, DMABUF.
        let count = dmabuf_fds.len() as u32;
        let mut out_req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        out_req.count = count;
        out_req.memory = v4l2_memory_V4L2_MEMORY_DMABUF;
        out_req.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT;
        unsafe { ioctl(fd, VIDIOC_REQBUFS, ptr::addr_of_mut!(out_req).cast()) }
            .map_err(Error::ReqBufsFailed)?;

        // 5. REQBUFS CAPTURE, MMAP.
        let mut cap_req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        cap_req.count = count;
        cap_req.memory = v4l2_memory_V4L2_MEMORY_MMAP;
        cap_req.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        unsafe { ioctl(fd, VIDIOC_REQBUFS, ptr::addr_of_mut!(cap_req).cast()) }
            .map_err(Error::ReqBufsFailed)?;

        // 6. Query, mmap, and pre-queue every CAPTURE slot.
        let mut capture_slots = Vec::with_capacity(cap_req.count as usize);
        for index in 0..cap_req.count {
            let mut buffer: v4l2_buffer = unsafe { mem::zeroed() };
            buffer.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
            buffer.memory = v4l2_memory_V4L2_MEMORY_MMAP;
            buffer.index = index;
            unsafe { ioctl(fd, VIDIOC_QUERYBUF, ptr::addr_of_mut!(buffer).cast()) }
                .map_err(Error::QueryBufFailed)?;

            let len = buffer.length as usize;
            let offset = unsafe { buffer.m.offset };
            let addr = unsafe { mmap(ptr::null_mut(), len, PROT_READ, MAP_SHARED, fd, offset.into()) }
                .map_err(Error::MmapFailed)?;
            capture_slots.push(CaptureSlot { ptr: addr.cast(), len });

            queue_capture(fd, index)?;
        }

        // 7. STREAMON OUTPUT, then CAPTURE.
        let mut out_type = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT;
        unsafe { ioctl(fd, VIDIOC_STREAMON, ptr::addr_of_mut!(out_type).cast()) }
            .map_err(Error::StreamOnFailed)?;
        let mut cap_type = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        unsafe { ioctl(fd, VIDIOC_STREAMON, ptr::addr_of_mut!(cap_type).cast()) }
            .map_err(Error::StreamOnFailed)?;

        Ok(Self { fd, dmabuf_fds: dmabuf_fds.to_vec(), capture_slots, streaming: true })
    }

    /// Runs one encode cycle: queues `index` (with `bytes_used` valid
    /// bytes) on OUTPUT, waits for and dequeues one CAPTURE slot,
    /// requeues it, and reports an OUTPUT slot reclaimed in the same
    /// cycle, if any.
    ///
    /// The returned slice borrows `self` and must be consumed before the
    /// next call, since the CAPTURE slot backing it is requeued to the
    /// driver before this call returns.
    pub fn encode(
        &mut self,
        index: u32,
        bytes_used: u32,
        timeout: Duration,
    ) -> Result<(&[u8], Option<u32>), Error> {
        if !self.streaming {
            return Err(Error::NotStreaming);
        }

        // 1. Queue OUTPUT slot.
        let mut out_buf: v4l2_buffer = unsafe { mem::zeroed() };
        out_buf.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT;
        out_buf.memory = v4l2_memory_V4L2_MEMORY_DMABUF;
        out_buf.index = index;
        out_buf.bytesused = bytes_used;
        out_buf.m.fd = self.dmabuf_fds[index as usize];
        unsafe { ioctl(self.fd, VIDIOC_QBUF, ptr::addr_of_mut!(out_buf).cast()) }
            .map_err(Error::QBufFailed)?;

        // 2. Poll encoder fd for readable.
        let waiter = Waiter::new(self.fd);
        if !waiter.wait_readable(timeout).map_err(Error::PollFailed)? {
            return Err(Error::PollTimeout);
        }

        // 3. Dequeue a CAPTURE slot.
        let mut cap_buf: v4l2_buffer = unsafe { mem::zeroed() };
        cap_buf.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        cap_buf.memory = v4l2_memory_V4L2_MEMORY_MMAP;
        unsafe { ioctl(self.fd, VIDIOC_DQBUF, ptr::addr_of_mut!(cap_buf).cast()) }
            .map_err(Error::DQBufFailed)?;
        let slot = &self.capture_slots[cap_buf.index as usize];
        let len = (cap_buf.bytesused as usize).min(slot.len);
        let encoded = unsafe { slice::from_raw_parts(slot.ptr, len) };

        // 4. Requeue that CAPTURE slot.
        queue_capture(self.fd, cap_buf.index)?;

        // 5. Attempt a non-blocking dequeue of one OUTPUT slot.
        let mut reclaim_buf: v4l2_buffer = unsafe { mem::zeroed() };
        reclaim_buf.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT;
        reclaim_buf.memory = v4l2_memory_V4L2_MEMORY_DMABUF;
        let reclaimed = unsafe {
            ioctl_nonblocking(self.fd, VIDIOC_DQBUF, ptr::addr_of_mut!(reclaim_buf).cast())
        }
        .map_err(Error::DQBufFailed)?
        .map(|_| reclaim_buf.index);

        Ok((encoded, reclaimed))
    }

    /// Requests the next encoded frame be a keyframe.
    pub fn force_key_frame(&self) -> Result<(), Error> {
        set_control(self.fd, V4L2_CID_MPEG_VIDEO_FORCE_KEY_FRAME, 1)
    }
}

fn queue_capture(fd: c_int, index: u32) -> Result<(), Error> {
    let mut buffer: v4l2_buffer = unsafe { mem::zeroed() };
    buffer.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
    buffer.memory = v4l2_memory_V4L2_MEMORY_MMAP;
    buffer.index = index;
    unsafe { ioctl(fd, VIDIOC_QBUF, ptr::addr_of_mut!(buffer).cast()) }.map_err(Error::QBufFailed)?;
    Ok(())
}

fn set_control(fd: c_int, id: u32, value: i32) -> Result<(), Error> {
    let mut ctrl = v4l2_control { id, value };
    unsafe { ioctl(fd, VIDIOC_S_CTRL, ptr::addr_of_mut!(ctrl).cast()) }
        .map_err(Error::SetControlFailed)?;
    Ok(())
}

impl Drop for Encoder {
    fn drop(&mut self) {
        for slot in &self.capture_slots {
            unsafe {
                if let Err(err) = munmap(slot.ptr.cast(), slot.len) {
                    log::error!("Couldn't unmap encoder CAPTURE buffer: {err}");
                }
            }
        }
        if self.streaming {
            let mut out_type = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT;
            let mut cap_type = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
            unsafe {
                if let Err(err) = ioctl(self.fd, VIDIOC_STREAMOFF, ptr::addr_of_mut!(out_type).cast())
                {
                    log::error!("Couldn't stop encoder OUTPUT streaming: {err}");
                }
                if let Err(err) = ioctl(self.fd, VIDIOC_STREAMOFF, ptr::addr_of_mut!(cap_type).cast())
                {
                    log::error!("Couldn't stop encoder CAPTURE streaming: {err}");
                }
            }
        }
        unsafe {
            if let Err(err) = close(self.fd) {
                log::error!("Couldn't close video4linux encoder descriptor: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_on_missing_device_fails() {
        let params = Params {
            width: 1920,
            height: 1080,
            input_fourcc: 0,
            bytes_per_line: 3840,
            size_image: 1920 * 1080 * 2,
            bitrate: 1_000_000,
            gop_size: 3,
        };
        let err = Encoder::init(Path::new("/dev/kvmd-test-missing-encoder"), params, &[])
            .unwrap_err();
        assert!(matches!(err, Error::SetFormatFailed(_)));
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(format!("{}", Error::PollTimeout), "encoder poll timed out");
        assert_eq!(format!("{}", Error::NotStreaming), "encoder is not streaming");
    }
}
