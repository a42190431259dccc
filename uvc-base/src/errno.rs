// Thin wrapper around errno-reporting syscalls: most of this crate's
// fallible calls bottom out in a libc function that signals failure via a
// negative return and `errno(3)`.

use std::fmt;
use std::io;

#[derive(Debug)]
pub struct Error(i32);

impl Error {
    /// Construct an `Error` from the current value of `errno`.
    pub fn last() -> Error {
        Error(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    pub fn errno(&self) -> i32 {
        self.0
    }

    pub fn is_would_block(&self) -> bool {
        self.0 == libc::EAGAIN || self.0 == libc::EWOULDBLOCK
    }

    pub fn is_interrupted(&self) -> bool {
        self.0 == libc::EINTR
    }

    pub fn is_device_gone(&self) -> bool {
        self.0 == libc::ENODEV || self.0 == libc::ENXIO || self.0 == libc::ESHUTDOWN
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", io::Error::from_raw_os_error(self.0), self.0)
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::from_raw_os_error(e.0)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs `f`, retrying automatically on `EINTR`, and converts a negative
/// return value into `Err(Error::last())`.
pub fn check_syscall<F: FnMut() -> libc::c_long>(mut f: F) -> Result<libc::c_long> {
    loop {
        let ret = f();
        if ret >= 0 {
            return Ok(ret);
        }
        let err = Error::last();
        if !err.is_interrupted() {
            return Err(err);
        }
    }
}
