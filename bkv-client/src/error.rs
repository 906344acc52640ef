//! # Client Errors
//!
//! Purpose: One error type for every public operation, grouped into kinds so
//! callers can decide whether a failure is worth retrying.
//!
//! ## Design Principles
//! 1. **Typed Sentinels**: "not found" is its own variant, never a string match.
//! 2. **Direction Is Visible**: JSON failures are split into encode and decode.
//! 3. **Kind Classification**: `ErrorKind` groups variants for retry decisions.

use std::time::Duration;

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No connection became available before the acquire deadline.
    #[error("connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },
    /// Network or IO failure while talking to the backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wire framing could not be parsed.
    #[error("protocol error")]
    Protocol,
    /// Backend returned an error reply.
    #[error("server error: {0}")]
    Server(String),
    /// Reply type did not match the command that was sent.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// No object stored under the bucket and key.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    /// Value could not be serialized to JSON.
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    /// Stored bytes could not be deserialized into the requested type.
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
    /// HTTP transport failure against the search endpoint.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Search endpoint answered with a status we do not accept.
    #[error("unexpected status code from search endpoint: {status}")]
    UnexpectedStatus { status: u16 },
    /// Search response body did not have the expected envelope.
    #[error("malformed search envelope: {0}")]
    MalformedEnvelope(String),
    /// Random source could not supply the requested bytes.
    #[error("entropy source failed: {0}")]
    Entropy(String),
    /// Every candidate key in the probe loop was already taken.
    #[error("no unused key found after {attempts} attempts")]
    KeyGenerationExhausted { attempts: usize },
    /// Key length too short to carry the version and variant bytes.
    #[error("invalid key length {0}, need at least 9 bytes")]
    InvalidKeyLength(usize),
    /// Address could not be parsed or resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Bucket or key name rejected before reaching the backend.
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// Configuration values are unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timed out waiting for a pooled connection.
    PoolExhaustion,
    /// Dial, fetch, store, delete, or HTTP failure.
    Transport,
    /// Distinguished missing-object sentinel.
    NotFound,
    /// JSON encode or decode failure.
    Serialization,
    /// Search engine replied with an unexpected status or body shape.
    ProtocolMismatch,
    /// Key generation could not produce a usable key.
    EntropyExhaustion,
    /// Caller supplied an unusable argument or configuration.
    InvalidInput,
}

impl ClientError {
    /// Returns the kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::PoolExhausted { .. } => ErrorKind::PoolExhaustion,
            ClientError::Io(_)
            | ClientError::Protocol
            | ClientError::Server(_)
            | ClientError::UnexpectedResponse
            | ClientError::Http(_) => ErrorKind::Transport,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Encode(_) | ClientError::Decode(_) => ErrorKind::Serialization,
            ClientError::UnexpectedStatus { .. } | ClientError::MalformedEnvelope(_) => {
                ErrorKind::ProtocolMismatch
            }
            ClientError::Entropy(_) | ClientError::KeyGenerationExhausted { .. } => {
                ErrorKind::EntropyExhaustion
            }
            ClientError::InvalidKeyLength(_)
            | ClientError::InvalidAddress(_)
            | ClientError::InvalidName(_)
            | ClientError::InvalidConfig(_) => ErrorKind::InvalidInput,
        }
    }

    /// True for failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::PoolExhaustion | ErrorKind::Transport)
    }

    /// True when the backend reported a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// True when the connection that produced this error should not be reused.
    pub(crate) fn poisons_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Protocol | ClientError::UnexpectedResponse
        )
    }
}
