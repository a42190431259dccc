//! Uniform capability over a V4L2-style video endpoint: either the local
//! capture device or the UVC gadget's video-output device. Mirrors the
//! kernel calls `libcala-camera` makes against `/dev/videoN` plus the
//! UVC-gadget-private event/response ioctls, wrapped behind a trait
//! instead of calling `libc` inline everywhere.

use std::fs::File;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::path::Path;

use remain::sorted;
use thiserror::Error;

use uvc_base::MappedRegion;

use crate::kernel_abi as abi;

#[sorted]
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("ioctl {0} failed: {1}")]
    Ioctl(&'static str, uvc_base::Error),
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, EndpointError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Mapped,
    UserPtr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Capture,
    GadgetOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    pub fn fourcc(self) -> u32 {
        match self {
            PixelFormat::Yuyv => abi::v4l2_fourcc(b'Y', b'U', b'Y', b'V'),
            PixelFormat::Mjpeg => abi::v4l2_fourcc(b'M', b'J', b'P', b'G'),
        }
    }
}

/// What a single `dequeue` call produced. `Transient`/`HostDisconnect` are
/// plain outcomes rather than errors: the orchestrator absorbs both without
/// ever seeing a `Result::Err` for them (spec's error taxonomy keeps these
/// out of the propagated-error family entirely).
pub enum DequeueOutcome {
    Buffer { index: usize, bytes_used: usize, error_flagged: bool },
    WouldBlock,
    DeviceGone,
}

pub enum EnqueueOutcome {
    Queued,
    DeviceGone,
}

/// One UVC control/streaming event as delivered by `VIDIOC_DQEVENT`.
pub enum Event {
    Connect,
    Disconnect,
    StreamOn,
    StreamOff,
    Setup(SetupPacket),
    Data { length: usize, bytes: [u8; abi::UVC_MAX_REQUEST_SIZE] },
}

#[derive(Debug, Clone, Copy)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

pub struct BufferInfo {
    pub length: usize,
    pub offset: libc::off_t,
}

/// What `VIDIOC_G_FMT` currently reports for an endpoint. `pixelformat` is
/// the raw fourcc rather than `PixelFormat`, since the kernel may report a
/// format this agent didn't itself negotiate (e.g. before the first
/// `set_format` call).
pub struct CurrentFormat {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub sizeimage: u32,
}

/// A UVC-gadget response payload, or a STALL. Converted to the kernel's
/// negative-length sentinel only at `send_response`, never earlier.
pub enum Response {
    Stall,
    Bytes(Vec<u8>),
}

pub trait VideoEndpoint {
    fn query_capabilities(&self, kind: EndpointKind) -> Result<()>;
    fn get_format(&self, kind: EndpointKind) -> Result<CurrentFormat>;
    fn set_format(&self, pixfmt: PixelFormat, width: u32, height: u32, sizeimage: u32, kind: EndpointKind) -> Result<()>;
    fn request_buffers(&mut self, n: u32, mode: IoMode, kind: EndpointKind) -> Result<u32>;
    fn query_buffer(&self, index: usize, kind: EndpointKind) -> Result<BufferInfo>;
    fn map_buffer(&self, index: usize, info: &BufferInfo) -> Result<MappedRegion>;
    fn enqueue(&mut self, index: usize, bytes_used: usize, mode: IoMode, user_ptr: Option<(*mut u8, usize)>, kind: EndpointKind) -> Result<EnqueueOutcome>;
    fn dequeue(&mut self, mode: IoMode, kind: EndpointKind) -> Result<DequeueOutcome>;
    fn stream_on(&mut self, kind: EndpointKind) -> Result<()>;
    fn stream_off(&mut self, kind: EndpointKind) -> Result<()>;
    fn set_control(&self, id: u32, value: i32) -> Result<()>;
    fn subscribe_event(&self, event_type: u32) -> Result<()>;
    fn dequeue_event(&mut self) -> Result<Event>;
    fn send_response(&self, response: Response) -> Result<()>;
    fn as_raw_fd(&self) -> RawFd;
}

/// `VideoEndpoint` backed by a real `/dev/videoN` character device.
pub struct V4l2Endpoint {
    file: File,
}

impl V4l2Endpoint {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| EndpointError::Open { path: path.display().to_string(), source })?;
        Ok(V4l2Endpoint { file })
    }

    fn ioctl<T>(&self, name: &'static str, request: libc::c_ulong, arg: &mut T) -> Result<()> {
        // SAFETY: `arg` is a valid, uniquely-borrowed `T` for the duration
        // of the call, and `request` was built from `T` by `kernel_abi`.
        unsafe { abi::ioctl_raw(self.file.as_raw_fd(), request, arg as *mut T) }
            .map_err(|e| EndpointError::Ioctl(name, e))
    }

    fn buf_type(kind: EndpointKind) -> u32 {
        match kind {
            EndpointKind::Capture => abi::V4L2_BUF_TYPE_VIDEO_CAPTURE,
            EndpointKind::GadgetOutput => abi::V4L2_BUF_TYPE_VIDEO_OUTPUT,
        }
    }

    fn memory(mode: IoMode) -> u32 {
        match mode {
            IoMode::Mapped => abi::V4L2_MEMORY_MMAP,
            IoMode::UserPtr => abi::V4L2_MEMORY_USERPTR,
        }
    }
}

impl VideoEndpoint for V4l2Endpoint {
    fn query_capabilities(&self, _kind: EndpointKind) -> Result<()> {
        let mut cap = abi::V4l2Capability::default();
        self.ioctl("VIDIOC_QUERYCAP", abi::VIDIOC_QUERYCAP, &mut cap)
    }

    fn get_format(&self, kind: EndpointKind) -> Result<CurrentFormat> {
        let mut fmt = abi::V4l2Format { type_: Self::buf_type(kind), ..Default::default() };
        self.ioctl("VIDIOC_G_FMT", abi::VIDIOC_G_FMT, &mut fmt)?;
        Ok(CurrentFormat {
            width: fmt.fmt.width,
            height: fmt.fmt.height,
            pixelformat: fmt.fmt.pixelformat,
            sizeimage: fmt.fmt.sizeimage,
        })
    }

    fn set_format(&self, pixfmt: PixelFormat, width: u32, height: u32, sizeimage: u32, kind: EndpointKind) -> Result<()> {
        let mut fmt = abi::V4l2Format { type_: Self::buf_type(kind), ..Default::default() };
        fmt.fmt.width = width;
        fmt.fmt.height = height;
        fmt.fmt.pixelformat = pixfmt.fourcc();
        fmt.fmt.field = abi::V4L2_FIELD_NONE;
        fmt.fmt.sizeimage = sizeimage;
        self.ioctl("VIDIOC_S_FMT", abi::VIDIOC_S_FMT, &mut fmt)
    }

    fn request_buffers(&mut self, n: u32, mode: IoMode, kind: EndpointKind) -> Result<u32> {
        let mut req = abi::V4l2RequestBuffers {
            count: n,
            type_: Self::buf_type(kind),
            memory: Self::memory(mode),
            ..Default::default()
        };
        self.ioctl("VIDIOC_REQBUFS", abi::VIDIOC_REQBUFS, &mut req)?;
        Ok(req.count)
    }

    fn query_buffer(&self, index: usize, kind: EndpointKind) -> Result<BufferInfo> {
        let mut buf = abi::V4l2Buffer {
            index: index as u32,
            type_: Self::buf_type(kind),
            memory: abi::V4L2_MEMORY_MMAP,
            ..Default::default()
        };
        self.ioctl("VIDIOC_QUERYBUF", abi::VIDIOC_QUERYBUF, &mut buf)?;
        Ok(BufferInfo { length: buf.length as usize, offset: buf.m_offset_or_userptr as libc::off_t })
    }

    fn map_buffer(&self, _index: usize, info: &BufferInfo) -> Result<MappedRegion> {
        MappedRegion::new(self.file.as_raw_fd(), info.length, info.offset)
            .map_err(|e| EndpointError::Ioctl("mmap", e))
    }

    fn enqueue(
        &mut self,
        index: usize,
        bytes_used: usize,
        mode: IoMode,
        user_ptr: Option<(*mut u8, usize)>,
        kind: EndpointKind,
    ) -> Result<EnqueueOutcome> {
        let mut buf = abi::V4l2Buffer {
            index: index as u32,
            type_: Self::buf_type(kind),
            memory: Self::memory(mode),
            bytesused: bytes_used as u32,
            ..Default::default()
        };
        if let Some((ptr, len)) = user_ptr {
            buf.m_offset_or_userptr = ptr as u64;
            buf.length = len as u32;
        }
        match self.ioctl("VIDIOC_QBUF", abi::VIDIOC_QBUF, &mut buf) {
            Ok(()) => Ok(EnqueueOutcome::Queued),
            Err(EndpointError::Ioctl(_, e)) if e.is_device_gone() => Ok(EnqueueOutcome::DeviceGone),
            Err(e) => Err(e),
        }
    }

    fn dequeue(&mut self, mode: IoMode, kind: EndpointKind) -> Result<DequeueOutcome> {
        let mut buf = abi::V4l2Buffer {
            type_: Self::buf_type(kind),
            memory: Self::memory(mode),
            ..Default::default()
        };
        match self.ioctl("VIDIOC_DQBUF", abi::VIDIOC_DQBUF, &mut buf) {
            Ok(()) => Ok(DequeueOutcome::Buffer {
                index: buf.index as usize,
                bytes_used: buf.bytesused as usize,
                error_flagged: buf.flags & abi::V4L2_BUF_FLAG_ERROR != 0,
            }),
            Err(EndpointError::Ioctl(_, e)) if e.is_would_block() => Ok(DequeueOutcome::WouldBlock),
            Err(EndpointError::Ioctl(_, e)) if e.is_device_gone() => Ok(DequeueOutcome::DeviceGone),
            Err(e) => Err(e),
        }
    }

    fn stream_on(&mut self, kind: EndpointKind) -> Result<()> {
        let mut buf_type = Self::buf_type(kind) as libc::c_int;
        self.ioctl("VIDIOC_STREAMON", abi::VIDIOC_STREAMON, &mut buf_type)
    }

    fn stream_off(&mut self, kind: EndpointKind) -> Result<()> {
        let mut buf_type = Self::buf_type(kind) as libc::c_int;
        self.ioctl("VIDIOC_STREAMOFF", abi::VIDIOC_STREAMOFF, &mut buf_type)
    }

    fn set_control(&self, id: u32, value: i32) -> Result<()> {
        let mut ctrl = abi::V4l2Control { id, value };
        self.ioctl("VIDIOC_S_CTRL", abi::VIDIOC_S_CTRL, &mut ctrl)
    }

    fn subscribe_event(&self, event_type: u32) -> Result<()> {
        let mut sub = abi::V4l2EventSubscription { type_: event_type, ..Default::default() };
        self.ioctl("VIDIOC_SUBSCRIBE_EVENT", abi::VIDIOC_SUBSCRIBE_EVENT, &mut sub)
    }

    fn dequeue_event(&mut self) -> Result<Event> {
        let mut ev = abi::V4l2Event::default();
        self.ioctl("VIDIOC_DQEVENT", abi::VIDIOC_DQEVENT, &mut ev)?;
        Ok(match ev.type_ {
            abi::UVC_EVENT_CONNECT => Event::Connect,
            abi::UVC_EVENT_DISCONNECT => Event::Disconnect,
            abi::UVC_EVENT_STREAMON => Event::StreamOn,
            abi::UVC_EVENT_STREAMOFF => Event::StreamOff,
            abi::UVC_EVENT_SETUP => {
                // SAFETY: the kernel populates `u_data` with a
                // `usb_ctrlrequest` for SETUP events; both are POD and the
                // setup packet (8 bytes) fits within the 64-byte union.
                let req: abi::UsbCtrlRequest = unsafe {
                    std::ptr::read_unaligned(ev.u_data.as_ptr() as *const abi::UsbCtrlRequest)
                };
                Event::Setup(SetupPacket {
                    request_type: req.request_type,
                    request: req.request,
                    value: req.value,
                    index: req.index,
                    length: req.length,
                })
            }
            abi::UVC_EVENT_DATA => {
                // SAFETY: same as above; DATA events carry a
                // `uvc_request_data` (4-byte length + 60-byte payload).
                let data: abi::UvcRequestData = unsafe {
                    std::ptr::read_unaligned(ev.u_data.as_ptr() as *const abi::UvcRequestData)
                };
                Event::Data { length: data.length.max(0) as usize, bytes: data.data }
            }
            other => {
                log::warn!("ignoring unrecognized gadget event type {:#x}", other);
                Event::Disconnect
            }
        })
    }

    fn send_response(&self, response: Response) -> Result<()> {
        let mut data = abi::UvcRequestData::default();
        match response {
            Response::Stall => data.length = abi::UVC_STALL_LENGTH,
            Response::Bytes(bytes) => {
                let n = bytes.len().min(abi::UVC_MAX_REQUEST_SIZE);
                data.length = n as i32;
                data.data[..n].copy_from_slice(&bytes[..n]);
            }
        }
        self.ioctl("UVCIOC_SEND_RESPONSE", abi::UVCIOC_SEND_RESPONSE, &mut data)
    }

    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
