//! Error taxonomy for the agent. `Transient` and `HostDisconnect` are
//! represented as outcome variants rather than errors (see
//! [`crate::endpoint::DequeueOutcome`]/[`crate::endpoint::EnqueueOutcome`])
//! since neither one is ever propagated to `main` — they are absorbed where
//! they occur. `ProtocolViolation` never leaves the control dispatcher
//! either; it becomes a STALL response plus a request-error-code update.
//! What's left here is what can actually reach `main`.

use remain::sorted;
use thiserror::Error;

/// Failures that can only happen once, before the event loop starts.
#[sorted]
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to open capture device {path}: {reason}")]
    CaptureOpen { path: String, reason: String },
    #[error("unsupported pixel format code {0}")]
    InvalidPixelFormat(u8),
    #[error("unsupported frame resolution index {0}")]
    InvalidResolution(u8),
    #[error("failed to read MJPEG image {path}: {source}")]
    MjpegRead { path: String, source: std::io::Error },
    #[error("nbufs must be in [2, 32], got {0}")]
    NbufsOutOfRange(usize),
    #[error("failed to open gadget device {path}: {reason}")]
    UvcOpen { path: String, reason: String },
}

/// Failures the event loop cannot recover from; these break out of the
/// loop and are reported to the caller of `run`.
#[sorted]
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("buffer pool operation failed: {0}")]
    Endpoint(#[from] crate::endpoint::EndpointError),
    #[error("no readiness on any descriptor after {0:?}; treating as a stall")]
    NoProgress(std::time::Duration),
    #[error("poll(2) failed: {0}")]
    Poll(#[from] uvc_base::Error),
}
