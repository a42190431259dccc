// ioctl request-number construction and a safe-ish call wrapper, following
// the same `_IOC` bit layout V4L2 drivers and `libcala-camera` build their
// request constants from.

use std::mem::size_of;
use std::os::unix::io::RawFd;

use libc::c_int;
use libc::c_ulong;

const IOC_NONE: c_ulong = 0;
const IOC_WRITE: c_ulong = 1;
const IOC_READ: c_ulong = 2;

const fn ioc(dir: c_ulong, ty: u8, nr: u8, size: usize) -> c_ulong {
    (dir << 30) | ((size as c_ulong & 0x1fff) << 16) | ((ty as c_ulong) << 8) | nr as c_ulong
}

/// Build a "write" ioctl request number (`_IOW`): host writes, device reads.
pub const fn iow<T>(ty: u8, nr: u8) -> c_ulong {
    ioc(IOC_WRITE, ty, nr, size_of::<T>())
}

/// Build a "read" ioctl request number (`_IOR`): device writes, host reads.
pub const fn ior<T>(ty: u8, nr: u8) -> c_ulong {
    ioc(IOC_READ, ty, nr, size_of::<T>())
}

/// Build a "read-write" ioctl request number (`_IOWR`).
pub const fn iowr<T>(ty: u8, nr: u8) -> c_ulong {
    ioc(IOC_WRITE | IOC_READ, ty, nr, size_of::<T>())
}

/// Build a bare ioctl request number with no associated payload (`_IO`).
pub const fn io_plain(ty: u8, nr: u8) -> c_ulong {
    ioc(IOC_NONE, ty, nr, 0)
}

/// Issue `ioctl(fd, request, arg)`, retrying on `EINTR` and reporting the
/// last errno on failure. `arg` must point at a buffer whose layout matches
/// what `request` expects; that invariant is on the caller.
///
/// # Safety
/// `arg` must be valid for whatever read/write `request` performs, for the
/// duration of the call.
pub unsafe fn ioctl(fd: RawFd, request: c_ulong, arg: *mut libc::c_void) -> crate::errno::Result<c_int> {
    crate::errno::check_syscall(|| libc::ioctl(fd, request as _, arg) as libc::c_long)
        .map(|v| v as c_int)
}
