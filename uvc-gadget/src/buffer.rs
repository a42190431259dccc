//! Per-endpoint buffer bookkeeping. Tracks which of a pool's buffers are
//! presently kernel-owned without reaching back into the endpoint for every
//! question, keeping counters alongside the buffer vector instead of
//! re-deriving them each time.

use uvc_base::MappedRegion;

use crate::endpoint::BufferInfo;
use crate::endpoint::IoMode;

pub struct Buffer {
    pub index: usize,
    pub length: usize,
    pub bytes_used: usize,
    pub mapping: Option<MappedRegion>,
    /// Owned backing for `IoMode::UserPtr` buffers in standalone-producer
    /// use (bridged mode instead points this at the peer pool's mapping).
    pub owned_storage: Option<Vec<u8>>,
    pub error_flagged: bool,
}

impl Buffer {
    fn new(index: usize, info: BufferInfo, mapping: Option<MappedRegion>) -> Self {
        Buffer { index, length: info.length, bytes_used: 0, mapping, owned_storage: None, error_flagged: false }
    }

    /// Raw pointer and length to hand the kernel for a `USERPTR` enqueue.
    pub fn user_ptr(&self) -> Option<(*mut u8, usize)> {
        if let Some(region) = &self.mapping {
            Some((region.as_ptr(), region.len()))
        } else {
            self.owned_storage.as_ref().map(|v| (v.as_ptr() as *mut u8, v.len()))
        }
    }

    /// View this buffer's backing memory. Caller must only call this while
    /// the buffer is user-owned (i.e. strictly between a dequeue and the
    /// matching enqueue), matching `MappedRegion::as_mut_slice`'s contract.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        if let Some(region) = &self.mapping {
            region.as_mut_slice()
        } else if let Some(storage) = &mut self.owned_storage {
            storage.as_mut_slice()
        } else {
            &mut []
        }
    }
}

/// A pool's notion of "how many buffers are currently with the kernel":
/// `enqueued - dequeued`, maintained incrementally so P1 is checkable at
/// any observation point without rescanning the buffer vector.
pub struct EndpointPool {
    pub mode: IoMode,
    pub buffers: Vec<Buffer>,
    pub enqueued: u64,
    pub dequeued: u64,
    pub streaming: bool,
}

impl EndpointPool {
    pub fn empty(mode: IoMode) -> Self {
        EndpointPool { mode, buffers: Vec::new(), enqueued: 0, dequeued: 0, streaming: false }
    }

    pub fn populate_mapped(&mut self, infos: Vec<(BufferInfo, MappedRegion)>) {
        self.buffers = infos
            .into_iter()
            .enumerate()
            .map(|(i, (info, mapping))| Buffer::new(i, info, Some(mapping)))
            .collect();
        self.enqueued = 0;
        self.dequeued = 0;
    }

    pub fn populate_userptr(&mut self, infos: Vec<BufferInfo>) {
        self.buffers = infos
            .into_iter()
            .enumerate()
            .map(|(i, info)| {
                let mut b = Buffer::new(i, BufferInfo { length: info.length, offset: 0 }, None);
                b.owned_storage = Some(vec![0u8; info.length]);
                b
            })
            .collect();
        self.enqueued = 0;
        self.dequeued = 0;
    }

    /// Bookkeeping-only buffers with no backing of their own: used for the
    /// user-pointer side of a zero-copy bridge, whose real address always
    /// comes from the complementary mapped pool at the same index.
    pub fn populate_linked(&mut self, n: usize, length: usize) {
        self.buffers = (0..n)
            .map(|i| Buffer::new(i, BufferInfo { length, offset: 0 }, None))
            .collect();
        self.enqueued = 0;
        self.dequeued = 0;
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// P1: `0 <= enqueued - dequeued <= pool_size`.
    pub fn in_flight(&self) -> u64 {
        self.enqueued - self.dequeued
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.enqueued = 0;
        self.dequeued = 0;
        self.streaming = false;
    }

    #[cfg(test)]
    pub fn invariant_holds(&self) -> bool {
        let in_flight = self.enqueued as i64 - self.dequeued as i64;
        in_flight >= 0 && in_flight as usize <= self.buffers.len().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pool_has_zero_in_flight() {
        let pool = EndpointPool::empty(IoMode::Mapped);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.invariant_holds());
    }

    #[test]
    fn enqueue_dequeue_tracks_in_flight() {
        let mut pool = EndpointPool::empty(IoMode::UserPtr);
        pool.populate_userptr(vec![
            BufferInfo { length: 128, offset: 0 },
            BufferInfo { length: 128, offset: 0 },
        ]);
        assert_eq!(pool.len(), 2);

        pool.enqueued += 1;
        assert_eq!(pool.in_flight(), 1);
        assert!(pool.invariant_holds());

        pool.enqueued += 1;
        assert_eq!(pool.in_flight(), 2);
        assert!(pool.invariant_holds());

        pool.dequeued += 1;
        assert_eq!(pool.in_flight(), 1);
        pool.dequeued += 1;
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.invariant_holds());
    }

    #[test]
    fn clear_resets_counters_and_streaming() {
        let mut pool = EndpointPool::empty(IoMode::Mapped);
        pool.populate_userptr(vec![BufferInfo { length: 8, offset: 0 }]);
        pool.enqueued = 5;
        pool.dequeued = 3;
        pool.streaming = true;

        pool.clear();

        assert!(pool.is_empty());
        assert_eq!(pool.enqueued, 0);
        assert_eq!(pool.dequeued, 0);
        assert!(!pool.streaming);
    }
}
