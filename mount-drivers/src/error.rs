//! Error types shared by every layer of the driver.
//!
//! Two levels exist. [`DecodeError`] is what a codec reports when a reply
//! cannot be turned into typed fields; it keeps "nothing arrived" apart from
//! "something arrived but made no sense" so the two can be logged
//! differently. [`MountError`] is what every session operation returns.

use thiserror::Error;

use crate::state::TrackingState;

/// Failure to decode a protocol reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No bytes arrived for the reply.
    #[error("no reply")]
    Timeout,

    /// Bytes arrived but the terminator, length or a numeric field was wrong.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Build a [`DecodeError::Malformed`] that quotes the offending bytes.
    pub fn malformed(what: &str, bytes: &[u8]) -> Self {
        DecodeError::Malformed(format!("{what}: {:?}", printable(bytes)))
    }
}

/// Errors returned by mount operations.
#[derive(Error, Debug)]
pub enum MountError {
    /// No reply within the protocol timeout.
    #[error("Timeout waiting for response")]
    TransportTimeout,

    /// A reply arrived but could not be decoded.
    #[error("Decode error: {0}")]
    Decode(DecodeError),

    /// The operation is not allowed in the current tracking state.
    ///
    /// Raised before any I/O; the state is left untouched.
    #[error("Cannot {operation} while {from}")]
    InvalidTransition {
        from: TrackingState,
        operation: &'static str,
    },

    /// A position or rate outside what the protocol can represent.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The connected mount lacks the capability.
    #[error("Unsupported by this mount: {0}")]
    Unsupported(&'static str),

    /// Low-level I/O error (serial or socket failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport could not be opened, or the handshake was refused.
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl From<DecodeError> for MountError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Timeout => MountError::TransportTimeout,
            other => MountError::Decode(other),
        }
    }
}

impl MountError {
    /// True for failures of the wire itself (timeouts and garbled replies).
    ///
    /// Status polls retry these on the next tick.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            MountError::TransportTimeout | MountError::Decode(_) | MountError::Io(_)
        )
    }
}

/// Result type for mount operations.
pub type MountResult<T> = Result<T, MountError>;

/// Render raw protocol bytes for logs: ASCII stays readable, the rest is escaped.
pub fn printable(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_timeout_maps_to_transport_timeout() {
        let err: MountError = DecodeError::Timeout.into();
        assert!(matches!(err, MountError::TransportTimeout));
    }

    #[test]
    fn test_decode_malformed_is_kept_distinct() {
        let err: MountError = DecodeError::malformed("status", b"?\x01").into();
        match err {
            MountError::Decode(DecodeError::Malformed(msg)) => {
                assert!(msg.contains("status"));
                assert!(msg.contains("\\x01"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = MountError::InvalidTransition {
            from: TrackingState::Parked,
            operation: "goto",
        };
        assert_eq!(err.to_string(), "Cannot goto while Parked");
        assert!(!err.is_link_failure());
    }

    #[test]
    fn test_printable_escapes_binary() {
        assert_eq!(printable(b"r1234,ABCD#"), "r1234,ABCD#");
        assert_eq!(printable(&[b'P', 2, 17]), "P\\x02\\x11");
    }
}
