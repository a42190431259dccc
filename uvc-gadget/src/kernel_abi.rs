//! `#[repr(C)]` mirrors of the kernel structures this agent exchanges via
//! ioctl with `/dev/videoN` (V4L2) and the UVC function's control-event
//! ioctls. Field names and layouts follow `linux/videodev2.h` and
//! `linux/usb/video.h` / `drivers/usb/gadget/function/uvc.h`; see
//! `libcala-camera`'s `lib.rs` for the same treatment applied to a smaller
//! V4L2 subset.
//!
//! These are data-only bindings: no behavior lives here, only the shapes
//! ioctl expects. Assumes a little-endian host (the only target this agent
//! runs on), so no byte-swapping wrapper types are needed.

use std::os::unix::io::RawFd;

use uvc_base::ior;
use uvc_base::iow;
use uvc_base::iowr;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;

pub const V4L2_FIELD_NONE: u32 = 1;

pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_MEMORY_USERPTR: u32 = 2;

pub const V4L2_BUF_FLAG_ERROR: u32 = 0x0040;

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_VIDEO_OUTPUT: u32 = 0x0000_0002;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;

pub fn v4l2_fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

impl Default for V4l2Capability {
    fn default() -> Self {
        // SAFETY: an all-zero byte pattern is a valid `V4l2Capability`.
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2PixFormat {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub private: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Format {
    pub type_: u32,
    // The real union also carries `win`/`vbi`/raw variants; this agent only
    // ever speaks `V4L2_BUF_TYPE_VIDEO_{CAPTURE,OUTPUT}`, so `pix` plus
    // enough trailing padding to match `sizeof(union)` (200 bytes) is all
    // that's needed for the ioctl to round-trip correctly.
    pub fmt: V4l2PixFormat,
    pub _reserved: [u8; 200 - std::mem::size_of::<V4l2PixFormat>()],
}

impl Default for V4l2Format {
    fn default() -> Self {
        V4l2Format {
            type_: 0,
            fmt: V4l2PixFormat::default(),
            _reserved: [0; 200 - std::mem::size_of::<V4l2PixFormat>()],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2Timeval {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2Timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: V4l2Timeval,
    pub timecode: V4l2Timecode,
    pub sequence: u32,
    pub memory: u32,
    /// `union m`: mmap offset, or the user pointer for `USERPTR` buffers.
    pub m_offset_or_userptr: u64,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl Default for V4l2Buffer {
    fn default() -> Self {
        // SAFETY: an all-zero byte pattern is a valid `V4l2Buffer`.
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2RequestBuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2EventSubscription {
    pub type_: u32,
    pub id: u32,
    pub flags: u32,
    pub reserved: [u32; 5],
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Event {
    pub type_: u32,
    pub u_data: [u8; 64],
    pub pending: u32,
    pub sequence: u32,
    pub timestamp: V4l2Timespec,
    pub id: u32,
    pub reserved: [u32; 8],
}

impl Default for V4l2Event {
    fn default() -> Self {
        // SAFETY: an all-zero byte pattern is a valid `V4l2Event`.
        unsafe { std::mem::zeroed() }
    }
}

// --- UVC-gadget-specific events and control-transfer structures ---------

pub const V4L2_EVENT_PRIVATE_START: u32 = 0x0800_0000;
pub const UVC_EVENT_CONNECT: u32 = V4L2_EVENT_PRIVATE_START;
pub const UVC_EVENT_DISCONNECT: u32 = V4L2_EVENT_PRIVATE_START + 1;
pub const UVC_EVENT_STREAMON: u32 = V4L2_EVENT_PRIVATE_START + 2;
pub const UVC_EVENT_STREAMOFF: u32 = V4L2_EVENT_PRIVATE_START + 3;
pub const UVC_EVENT_SETUP: u32 = V4L2_EVENT_PRIVATE_START + 4;
pub const UVC_EVENT_DATA: u32 = V4L2_EVENT_PRIVATE_START + 5;

/// Mirrors `struct usb_ctrlrequest` (linux/usb/ch9.h).
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct UsbCtrlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

pub const USB_TYPE_MASK: u8 = 0x60;
pub const USB_TYPE_STANDARD: u8 = 0x00;
pub const USB_TYPE_CLASS: u8 = 0x20;
pub const USB_RECIP_MASK: u8 = 0x1f;
pub const USB_RECIP_INTERFACE: u8 = 0x01;

pub const UVC_MAX_REQUEST_SIZE: usize = 60;

/// Mirrors `struct uvc_request_data` (drivers/usb/gadget/function/uvc.h):
/// the response payload handed back to the kernel via
/// `UVCIOC_SEND_RESPONSE`. `length < 0` is the kernel's STALL sentinel.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct UvcRequestData {
    pub length: i32,
    pub data: [u8; UVC_MAX_REQUEST_SIZE],
}

impl Default for UvcRequestData {
    fn default() -> Self {
        UvcRequestData { length: 0, data: [0; UVC_MAX_REQUEST_SIZE] }
    }
}

pub const UVC_STALL_LENGTH: i32 = -1;

pub const UVC_INTF_CONTROL: u16 = 0;
pub const UVC_INTF_STREAMING: u16 = 1;

pub const UVC_VS_PROBE_CONTROL: u8 = 0x01;
pub const UVC_VS_COMMIT_CONTROL: u8 = 0x02;

pub const UVC_VC_REQUEST_ERROR_CODE_CONTROL: u8 = 0x02;
pub const UVC_CT_AE_MODE_CONTROL: u8 = 0x02;
pub const UVC_PU_BRIGHTNESS_CONTROL: u8 = 0x02;

pub const UVC_SET_CUR: u8 = 0x01;
pub const UVC_GET_CUR: u8 = 0x81;
pub const UVC_GET_MIN: u8 = 0x82;
pub const UVC_GET_MAX: u8 = 0x83;
pub const UVC_GET_RES: u8 = 0x84;
pub const UVC_GET_LEN: u8 = 0x85;
pub const UVC_GET_INFO: u8 = 0x86;
pub const UVC_GET_DEF: u8 = 0x87;

// --- ioctl request numbers -----------------------------------------------

pub const VIDIOC_QUERYCAP: libc::c_ulong = ior::<V4l2Capability>(b'V', 0);
pub const VIDIOC_G_FMT: libc::c_ulong = iowr::<V4l2Format>(b'V', 4);
pub const VIDIOC_S_FMT: libc::c_ulong = iowr::<V4l2Format>(b'V', 5);
pub const VIDIOC_REQBUFS: libc::c_ulong = iowr::<V4l2RequestBuffers>(b'V', 8);
pub const VIDIOC_QUERYBUF: libc::c_ulong = iowr::<V4l2Buffer>(b'V', 9);
pub const VIDIOC_QBUF: libc::c_ulong = iowr::<V4l2Buffer>(b'V', 15);
pub const VIDIOC_DQBUF: libc::c_ulong = iowr::<V4l2Buffer>(b'V', 17);
pub const VIDIOC_STREAMON: libc::c_ulong = iow::<libc::c_int>(b'V', 18);
pub const VIDIOC_STREAMOFF: libc::c_ulong = iow::<libc::c_int>(b'V', 19);
pub const VIDIOC_S_CTRL: libc::c_ulong = iowr::<V4l2Control>(b'V', 28);
pub const VIDIOC_DQEVENT: libc::c_ulong = ior::<V4l2Event>(b'V', 89);
pub const VIDIOC_SUBSCRIBE_EVENT: libc::c_ulong = iow::<V4l2EventSubscription>(b'V', 90);

pub const UVCIOC_SEND_RESPONSE: libc::c_ulong = iow::<UvcRequestData>(b'U', 1);

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct V4l2Control {
    pub id: u32,
    pub value: i32,
}

pub const V4L2_CID_BRIGHTNESS: u32 = 0x0098_0900;

/// Issue one ioctl with the given request/payload pointer on `fd`.
///
/// # Safety
/// `arg` must point at a value whose layout matches what `request` expects.
pub unsafe fn ioctl_raw<T>(fd: RawFd, request: libc::c_ulong, arg: *mut T) -> uvc_base::Result<()> {
    uvc_base::ioctl(fd, request, arg as *mut libc::c_void).map(|_| ())
}
