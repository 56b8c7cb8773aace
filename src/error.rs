//! # Error Types
//!
//! This module provides the error types used throughout the avtransport
//! library. It defines a central error type [`Error`] that encapsulates
//! every failure kind the packet pipeline can produce.
//!
//! ## Example Usage
//!
//! ```rust
//! use avtransport::error::{Result, Error};
//!
//! fn validate_stream_id(id: u16) -> Result<()> {
//!     if id == 0xFFFF {
//!         return Err(Error::InvalidArgument("stream id 0xFFFF is reserved".into()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error as ThisError;

/// Primary error type for the avtransport library.
///
/// Each variant corresponds to one of the error kinds in the protocol
/// design (not a concrete exception type): callers are expected to match
/// on the kind, not the message.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed URL, bad UUID, duplicate/reserved stream id, unknown
    /// option key, out-of-range port, and similar caller mistakes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure in the codec, FIFO, or scheduler.
    #[error("out of memory")]
    OutOfMemory,

    /// Unknown URI scheme, missing back-end, or an operation the current
    /// transport does not implement (e.g. `add_dst` on a unicast socket).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A segment offset/length run past the declared total, or a seek
    /// past the end of a seekable back-end.
    #[error("out of range: {0}")]
    Range(String),

    /// More input is needed: the merger has not yet assembled a complete
    /// packet, or a non-blocking transport call would have blocked.
    #[error("more input needed")]
    Again,

    /// A transport call timed out before any data moved.
    #[error("operation timed out")]
    Timeout,

    /// The transport reached end-of-stream.
    #[error("end of stream")]
    Eof,

    /// An underlying OS error, wrapped verbatim.
    #[error("os error: {0}")]
    Os(#[from] std::io::Error),

    /// The merger was given a packet belonging to a different target
    /// sequence while a logical packet is still being assembled; the
    /// caller must call `done` before submitting it.
    #[error("merger busy with a different target")]
    Busy,

    /// A FEC-protected header's parity suffix didn't match its message: the
    /// bytes were altered in transit and this header cannot be trusted.
    #[error("fec parity check failed: {0}")]
    FecCheckFailed(String),
}

impl Error {
    /// `true` for error kinds that preserve all pending state and are
    /// safe for the caller to retry against.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Again | Error::Timeout)
    }
}

/// A specialized `Result` type for avtransport operations.
pub type Result<T> = std::result::Result<T, Error>;
