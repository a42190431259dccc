//! Raw-fd readiness multiplexing and ioctl/mmap wrappers shared by the UVC
//! gadget agent. Kept separate from `uvc-gadget` as a platform layer so the
//! rest of the workspace never needs to reach for `libc` directly.

mod errno;
mod ioctl;
mod mmap;
mod wait;

pub use errno::check_syscall;
pub use errno::Error;
pub use errno::Result;
pub use ioctl::io_plain;
pub use ioctl::ior;
pub use ioctl::iow;
pub use ioctl::iowr;
pub use ioctl::ioctl;
pub use mmap::MappedRegion;
pub use wait::EventToken;
pub use wait::Interest;
pub use wait::TriggeredEvent;
pub use wait::WaitContext;
