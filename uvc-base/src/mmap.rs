// `mmap(2)`/`munmap(2)` wrapper for V4L2 MMAP-mode buffers, in the style of
// `libcala-camera`'s direct `mmap`/`munmap` bindings but returning a typed,
// `Drop`-cleaned-up region instead of a raw pointer the caller must remember
// to unmap.

use std::os::unix::io::RawFd;
use std::ptr;

use crate::errno::Error;
use crate::errno::Result;

/// A single memory-mapped kernel buffer. Non-owning of the fd it was mapped
/// from; the caller keeps that open for as long as any `MappedRegion` over
/// it is alive.
pub struct MappedRegion {
    addr: *mut libc::c_void,
    len: usize,
}

// SAFETY: the mapping is exclusively owned by this `MappedRegion` once
// constructed; nothing else holds the pointer.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of `fd` at `offset`, read/write, shared with the
    /// kernel (the mode V4L2 MMAP buffers require).
    pub fn new(fd: RawFd, len: usize, offset: libc::off_t) -> Result<MappedRegion> {
        // SAFETY: all arguments are well-formed; the kernel validates `fd`
        // and `offset` against the device's buffer table.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::last());
        }
        Ok(MappedRegion { addr, len })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr as *mut u8
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the mapping as a mutable byte slice.
    ///
    /// # Safety
    /// The caller must not hold this slice across a point where the kernel
    /// owns the buffer (i.e. between enqueue and the matching dequeue).
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.addr as *mut u8, self.len)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: `addr`/`len` describe exactly the mapping created in `new`.
        let ret = unsafe { libc::munmap(self.addr, self.len) };
        if ret != 0 {
            log::warn!("munmap failed: {}", Error::last());
        }
    }
}
