//! Communicator Error Types
//!
//! Error handling for sending, routing, sealing and delivering messages
//! between cluster processes.

use crate::host::Uid;
use crate::MessageId;
use thiserror::Error;

/// Failures reported by a [`Sealer`](crate::security::Sealer)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealError {
    /// A key required for the operation was not available
    #[error("missing key")]
    MissingKey,

    /// A key was present but unusable (wrong length, low-order point, ...)
    #[error("invalid key")]
    InvalidKey,

    /// Signature or AEAD tag check failed: tampered data or wrong key pair
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Sealed blob is too short or structurally broken
    #[error("malformed sealed payload")]
    Malformed,
}

/// Main communicator error type
#[derive(Error, Debug)]
pub enum CommError {
    /// Resolver lookup miss for one or more peers
    #[error("Unknown peer(s): {}", format_uids(.uids))]
    UnknownPeer { uids: Vec<Uid> },

    /// Peer is known but no route to it has been configured
    #[error("No route to peer {uid}")]
    NoRoute { uid: Uid },

    /// Sealing an outbound payload failed
    #[error("Seal failure: {source}")]
    Seal { source: SealError },

    /// Unsealing an inbound payload failed
    #[error("Unseal failure from {peer}: {source}")]
    Unseal { peer: Uid, source: SealError },

    /// A reply claims a sender other than the one it was delivered by or awaited from
    #[error("Signature mismatch for message {message_id}: expected {expected}, got {actual}")]
    SignatureMismatch {
        expected: Uid,
        actual: Uid,
        message_id: MessageId,
    },

    /// Wire format and framing errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Payload (de)serialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Errors raised by a route's send callback
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Communicator used before build or after end
    #[error("Communicator is closed")]
    Closed,

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for communicator operations
pub type Result<T> = std::result::Result<T, CommError>;

fn format_uids(uids: &[Uid]) -> String {
    uids.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CommError {
    /// Create an unknown peer error for a single UID
    pub fn unknown_peer(uid: Uid) -> Self {
        Self::UnknownPeer { uids: vec![uid] }
    }

    /// Create an unknown peer error listing every unresolved UID
    pub fn unknown_peers(uids: Vec<Uid>) -> Self {
        Self::UnknownPeer { uids }
    }

    /// Create a missing route error
    pub fn no_route(uid: Uid) -> Self {
        Self::NoRoute { uid }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    /// Create a serialization error with source
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Errors that must never be retried or papered over
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CommError::SignatureMismatch { .. }
                | CommError::Seal { .. }
                | CommError::Unseal { .. }
                | CommError::Closed
        )
    }

    /// Get error category for logs and stats
    pub fn category(&self) -> &'static str {
        match self {
            CommError::UnknownPeer { .. } => "unknown_peer",
            CommError::NoRoute { .. } => "no_route",
            CommError::Seal { .. } => "seal",
            CommError::Unseal { .. } => "unseal",
            CommError::SignatureMismatch { .. } => "signature_mismatch",
            CommError::Protocol { .. } => "protocol",
            CommError::Serialization { .. } => "serialization",
            CommError::Transport { .. } => "transport",
            CommError::Configuration { .. } => "configuration",
            CommError::Closed => "closed",
            CommError::Io { .. } => "io",
        }
    }
}

// Boxed sources are not cloneable, so clones drop them
impl Clone for CommError {
    fn clone(&self) -> Self {
        match self {
            CommError::UnknownPeer { uids } => CommError::UnknownPeer { uids: uids.clone() },
            CommError::NoRoute { uid } => CommError::NoRoute { uid: *uid },
            CommError::Seal { source } => CommError::Seal { source: *source },
            CommError::Unseal { peer, source } => CommError::Unseal {
                peer: *peer,
                source: *source,
            },
            CommError::SignatureMismatch {
                expected,
                actual,
                message_id,
            } => CommError::SignatureMismatch {
                expected: *expected,
                actual: *actual,
                message_id: *message_id,
            },
            CommError::Protocol { message } => CommError::Protocol {
                message: message.clone(),
            },
            CommError::Serialization { message, .. } => CommError::Serialization {
                message: message.clone(),
                source: None,
            },
            CommError::Transport { message, .. } => CommError::Transport {
                message: message.clone(),
                source: None,
            },
            CommError::Configuration { message, field } => CommError::Configuration {
                message: message.clone(),
                field: field.clone(),
            },
            CommError::Closed => CommError::Closed,
            CommError::Io { message, source } => CommError::Io {
                message: message.clone(),
                source: std::io::Error::new(source.kind(), message.as_str()),
            },
        }
    }
}

/// Convert standard I/O errors to communicator errors
impl From<std::io::Error> for CommError {
    fn from(error: std::io::Error) -> Self {
        CommError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Convert bincode errors to communicator errors
impl From<bincode::Error> for CommError {
    fn from(error: bincode::Error) -> Self {
        CommError::serialization_with_source("Binary serialization failed", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_peer_lists_every_uid() {
        let a = Uid::generate();
        let b = Uid::generate();
        let err = CommError::unknown_peers(vec![a, b]);

        let text = err.to_string();
        assert!(text.contains(&a.to_string()));
        assert!(text.contains(&b.to_string()));
        assert_eq!(err.category(), "unknown_peer");
    }

    #[test]
    fn test_fatal_errors() {
        let mismatch = CommError::SignatureMismatch {
            expected: Uid::generate(),
            actual: Uid::generate(),
            message_id: 7,
        };
        assert!(mismatch.is_fatal());
        assert!(CommError::Closed.is_fatal());
        assert!(CommError::Seal {
            source: SealError::MissingKey
        }
        .is_fatal());
        assert!(!CommError::transport("socket closed").is_fatal());
        assert!(!CommError::no_route(Uid::generate()).is_fatal());
    }

    #[test]
    fn test_clone_drops_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = CommError::transport_with_source("write failed", io_err);

        match err.clone() {
            CommError::Transport { message, source } => {
                assert_eq!(message, "write failed");
                assert!(source.is_none());
            }
            other => panic!("Expected Transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "identity");
        match CommError::from(io_err) {
            CommError::Io { message, .. } => assert!(message.contains("identity")),
            other => panic!("Expected Io error, got {other:?}"),
        }
    }
}
