//! Error types for the cluster subsystem.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by membership, election and transport operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Coordination-store operation failed.
    #[error("kv store error: {0}")]
    Kv(String),

    /// Coordination-store operation exceeded its deadline.
    #[error("kv store operation timed out")]
    KvTimeout,

    /// Leader-election operation failed.
    #[error("election error: {0}")]
    Election(String),

    /// A member record in the store could not be decoded.
    #[error("malformed member record: {0}")]
    MalformedMember(String),

    /// Outbound HTTP call failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Peer answered with a non-success status.
    #[error("peer responded with status {0}")]
    PeerStatus(u16),

    /// The circuit breaker for outbound calls is open.
    #[error("circuit open, retry in {0:?}")]
    CircuitOpen(Duration),

    /// Stanza could not be serialized for the wire.
    #[error("encode error: {0}")]
    Encode(String),

    /// Listener or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
