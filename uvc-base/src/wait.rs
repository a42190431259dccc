// A small `poll(2)`-based readiness multiplexer: register a handful of
// descriptors against an application-defined token enum, then block until
// at least one is ready.

use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::c_short;

use crate::errno::check_syscall;
use crate::errno::Result;

/// Marker trait for the caller's "what fired" enum. Implementations are
/// expected to be cheap `Copy` tags; there is no wire representation to
/// derive, since `poll(2)` gives us the triggering index directly, so the
/// token is carried alongside it verbatim rather than packed into an epoll
/// `data` field.
pub trait EventToken: Copy {}

bitflags::bitflags! {
    /// Readiness conditions a caller can register interest in.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Interest: c_short {
        const READABLE = libc::POLLIN;
        const WRITABLE = libc::POLLOUT;
        /// Out-of-band / exceptional condition readiness (V4L2 surfaces
        /// control events on the "except" fd set).
        const PRIORITY = libc::POLLPRI;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriggeredEvent<T> {
    pub token: T,
    pub is_readable: bool,
    pub is_writable: bool,
    pub is_priority: bool,
    pub is_hungup: bool,
}

struct Entry<T> {
    fd: RawFd,
    interest: Interest,
    token: T,
}

pub struct WaitContext<T: EventToken> {
    entries: Vec<Entry<T>>,
}

impl<T: EventToken> WaitContext<T> {
    pub fn new() -> Self {
        WaitContext { entries: Vec::new() }
    }

    pub fn build_with(fds: &[(&dyn AsRawFd, Interest, T)]) -> Result<Self> {
        let mut ctx = Self::new();
        for (fd, interest, token) in fds {
            ctx.add(*fd, *interest, *token)?;
        }
        Ok(ctx)
    }

    pub fn add(&mut self, fd: &dyn AsRawFd, interest: Interest, token: T) -> Result<()> {
        self.entries.push(Entry { fd: fd.as_raw_fd(), interest, token });
        Ok(())
    }

    pub fn remove(&mut self, fd: &dyn AsRawFd) {
        let raw = fd.as_raw_fd();
        self.entries.retain(|e| e.fd != raw);
    }

    /// Block until at least one registered descriptor is ready, `timeout`
    /// elapses, or the call is interrupted and retried transparently.
    /// `None` blocks indefinitely, matching standalone mode's event loop.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<TriggeredEvent<T>>> {
        let mut pollfds: Vec<libc::pollfd> = self
            .entries
            .iter()
            .map(|e| libc::pollfd { fd: e.fd, events: e.interest.bits(), revents: 0 })
            .collect();

        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        // SAFETY: `pollfds` is a valid, uniquely-owned array of the right
        // length for the duration of the call.
        let n = check_syscall(|| unsafe {
            libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) as libc::c_long
        })?;

        if n == 0 {
            return Ok(Vec::new());
        }

        let mut triggered = Vec::with_capacity(n as usize);
        for (entry, pfd) in self.entries.iter().zip(pollfds.iter()) {
            if pfd.revents == 0 {
                continue;
            }
            triggered.push(TriggeredEvent {
                token: entry.token,
                is_readable: pfd.revents & libc::POLLIN != 0,
                is_writable: pfd.revents & libc::POLLOUT != 0,
                is_priority: pfd.revents & libc::POLLPRI != 0,
                is_hungup: pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0,
            });
        }
        Ok(triggered)
    }
}

impl<T: EventToken> Default for WaitContext<T> {
    fn default() -> Self {
        Self::new()
    }
}
