//! Message and ack structures
//!
//! A `Message` is the immutable unit the frame codec produces from one or
//! more frames on a connection; an `Ack` is the protocol acknowledgement
//! written back. Both carry the per-connection wire sequence number that
//! ties them together. Neither ever spans connections.

use std::net::SocketAddr;

use uuid::Uuid;

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// A decoded application message
///
/// Ownership transfers to the listener for the duration of the dispatch
/// call; the pipeline does not touch it afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Per-connection sequence number assigned by the client
    pub sequence: u64,
    /// Opaque application payload
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self { sequence, payload }
    }
}

// ----------------------------------------------------------------------------
// Ack
// ----------------------------------------------------------------------------

/// Acknowledgement that messages up to `sequence` were received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub sequence: u64,
}

impl Ack {
    /// Acknowledge everything up to and including `sequence`
    pub fn up_to(sequence: u64) -> Self {
        Self { sequence }
    }
}

// ----------------------------------------------------------------------------
// Connection Identity
// ----------------------------------------------------------------------------

/// Unique identifier for one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of a connection handed to the listener
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique id for this accepted socket
    pub id: ConnectionId,
    /// Remote peer address
    pub remote_addr: SocketAddr,
    /// Whether the connection is TLS-terminated
    pub tls: bool,
}

impl ConnectionInfo {
    pub fn new(remote_addr: SocketAddr, tls: bool) -> Self {
        Self {
            id: ConnectionId::generate(),
            remote_addr,
            tls,
        }
    }
}

// ----------------------------------------------------------------------------
// Close Reason
// ----------------------------------------------------------------------------

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the socket or the transport failed
    PeerClosed,
    /// The inactivity watchdog reclaimed the connection
    IdleTimeout,
    /// A decode, dispatch, or write fault closed the connection
    ProtocolError,
    /// Server-wide graceful shutdown
    ServerShutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::ProtocolError => "protocol error",
            CloseReason::ServerShutdown => "server shutdown",
        };
        write!(f, "{s}")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
