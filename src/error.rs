//! Error handling for the splitlink library.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! is the [`Error`] enum below. Failures raised inside a segment worker are
//! tagged with the entry id ([`Error::Segment`]) and failures that abort a
//! whole download are tagged with the orchestrator phase that was running
//! ([`Error::Phase`]). [`Error::root`] strips both wrappers.

use crate::downloader::Phase;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can happen when using splitlink.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller supplied input is malformed.
    ///
    /// Raised for shares outside `(0, 1]`, non-positive throttles, empty
    /// allocations, shares that do not sum to one, and checksums whose
    /// algorithm is unknown or cannot be detected. Always raised before any
    /// network activity.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// An operation was attempted in the wrong lifecycle state, such as
    /// mutating a locked allocation or locking it twice.
    #[error("Invalid state: {0}")]
    State(String),

    /// The server cannot honor multi-segment ranged requests.
    #[error("Byte ranges are not supported: {0}")]
    RangeUnsupported(String),

    /// A ranged response starts elsewhere, has the wrong length, or uses a
    /// status that cannot carry a range. A new connection gets the same
    /// answer, so segments do not retry it.
    #[error("Response does not match the requested range: {0}")]
    RangeMismatch(String),

    /// The prefetch did not yield a usable content length.
    #[error("Unknown content length: {0}")]
    LengthUnknown(String),

    /// Malformed or truncated response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The response body uses a content coding other than identity, gzip or
    /// deflate.
    #[error("Unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    /// The server answered with a non-success status line.
    #[error("Server answered {code} {reason}")]
    Status {
        /// Numeric status code.
        code: u16,
        /// Reason phrase as sent by the server.
        reason: String,
    },

    /// The segment stores could not be assembled into the output file.
    ///
    /// The partial output is left on disk for inspection.
    #[error("Failed to merge {}: {source}", path.display())]
    Merge {
        /// File that could not be read or written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The target URL cannot be parsed or uses an unsupported scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The download was stopped by its cancellation token.
    #[error("Download cancelled")]
    Cancelled,

    /// A segment worker failed.
    #[error("Segment {id} failed: {source}")]
    Segment {
        /// Allocation entry id of the failed segment.
        id: String,
        /// Failure reported by the worker.
        #[source]
        source: Box<Error>,
    },

    /// The download aborted while the orchestrator was in `phase`.
    #[error("{phase} failed: {source}")]
    Phase {
        /// Phase that was running when the failure happened.
        phase: Phase,
        /// Failure that aborted the run.
        #[source]
        source: Box<Error>,
    },

    /// I/O Error.
    ///
    /// Wraps socket and file errors, including connect and read timeouts
    /// (reported with [`io::ErrorKind::TimedOut`]).
    #[error("I/O error: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },
}

impl Error {
    /// Returns the underlying failure, looking through the [`Error::Phase`]
    /// and [`Error::Segment`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Phase { source, .. } | Error::Segment { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the orchestrator phase that failed, if this error aborted a
    /// download.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns `true` for failures that a fresh connection may not repeat.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Error::IOError { .. } | Error::Protocol(_) => true,
            Error::Status { code, .. } => *code >= 500,
            Error::Segment { source, .. } | Error::Phase { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for operations that can fail with a splitlink error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_phase_and_segment() {
        let error = Error::Phase {
            phase: Phase::Downloading,
            source: Box::new(Error::Segment {
                id: "eth0".into(),
                source: Box::new(Error::Protocol("truncated".into())),
            }),
        };

        assert_eq!(error.phase(), Some(Phase::Downloading));
        assert!(matches!(error.root(), Error::Protocol(msg) if msg == "truncated"));
    }

    #[test]
    fn test_display_names_phase() {
        let error = Error::Phase {
            phase: Phase::Prefetching,
            source: Box::new(Error::LengthUnknown("no Content-Length".into())),
        };

        let message = error.to_string();
        assert!(message.starts_with("prefetching failed"));
        assert!(message.contains("no Content-Length"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Protocol("x".into()).is_transient());
        assert!(Error::from(io::Error::from(io::ErrorKind::ConnectionReset)).is_transient());
        assert!(Error::Status {
            code: 503,
            reason: "Service Unavailable".into()
        }
        .is_transient());
        assert!(!Error::Status {
            code: 404,
            reason: "Not Found".into()
        }
        .is_transient());
        assert!(!Error::UnsupportedEncoding("br".into()).is_transient());
        assert!(!Error::RangeMismatch("bytes 0-9/10".into()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn test_validation_message_is_not_tied_to_allocations() {
        let error = Error::Validation("unknown checksum algorithm `crc32`".into());
        assert_eq!(
            error.to_string(),
            "Invalid input: unknown checksum algorithm `crc32`"
        );
    }
}
