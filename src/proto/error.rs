use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for respool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a Redis server through the pool.
///
/// The variants fall into a few classes. Transport and framing failures
/// ([`Io`](Error::Io), [`Timeout`](Error::Timeout), [`Protocol`](Error::Protocol),
/// [`Decode`](Error::Decode)) leave the connection in an unknown state and are
/// reported by [`is_fatal`](Error::is_fatal); the pool never reuses a
/// connection after one of them. Everything else is raised on a healthy
/// connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// A protocol error occurred, e.g. the peer closed the stream mid-frame.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// Decoding failed because the byte stream is malformed.
    #[error("decode error: {source}")]
    Decode {
        /// Underlying decode error.
        #[from]
        source: DecodeError,
    },

    /// A read or write did not complete before its deadline.
    #[error("deadline of {timeout:?} exceeded")]
    Timeout {
        /// The deadline that expired.
        timeout: Duration,
    },

    /// The server returned an error reply.
    #[error("server error: {message}")]
    Server {
        /// Error message from server, verbatim.
        message: String,
    },

    /// The server returned a nil bulk or nil array where a value was required.
    ///
    /// Callers use this to tell "key or field absent" apart from a failure.
    #[error("nil reply")]
    Nil,

    /// The reply shape does not match the requested target type.
    #[error("unexpected reply: {message}")]
    UnexpectedReply {
        /// Description of the mismatch.
        message: String,
    },

    /// One or more struct fields could not be converted from their wire value.
    #[error("scan failed: {}", join_field_errors(.errors))]
    Scan {
        /// Per-field conversion failures, in field order.
        errors: Vec<FieldError>,
    },

    /// Authentication failed during the connection handshake.
    #[error("authentication failed: {message}")]
    Auth {
        /// Error message from server.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// Every connection slot is in use and the pool is configured not to wait.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Timed out waiting for a connection slot to free up.
    #[error("timed out after {waited:?} waiting for a pooled connection")]
    PoolTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl Error {
    /// Returns `true` if this error leaves the connection unusable.
    ///
    /// Network, deadline and framing errors are fatal; server replies, nil
    /// replies and coercion failures are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io { .. } | Error::Protocol { .. } | Error::Decode { .. } | Error::Timeout { .. }
        )
    }

    /// Returns `true` if this is the nil-reply sentinel.
    pub fn is_nil(&self) -> bool {
        matches!(self, Error::Nil)
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Error::UnexpectedReply {
            message: message.into(),
        }
    }
}

/// Error returned when frame decoding fails.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct DecodeError {
    source: io::Error,
}

impl DecodeError {
    /// Creates a new decode error from an IO error.
    pub fn new(source: io::Error) -> Self {
        Self { source }
    }

    /// Creates a decode error describing malformed input.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(io::Error::new(io::ErrorKind::InvalidData, message.into()))
    }
}

/// A conversion failure for a single struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The field tag as it appears on the wire.
    pub field: String,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field `{}`: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
