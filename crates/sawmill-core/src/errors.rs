//! Error types for the sawmill server
//!
//! This module contains all error types used throughout the sawmill core,
//! including codec errors, TLS errors, and the main SawmillError type that
//! unifies them all. Nothing below the server's public `listen`/`stop`
//! surface is allowed to terminate the process; per-connection faults are
//! funneled through the listener's `on_exception`.

use std::net::SocketAddr;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Frame codec error types
///
/// A codec error is always connection-scoped: the faulting connection is
/// closed, the server keeps serving every other connection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },
    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },
}

/// TLS error types
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to read certificate material from {path}: {reason}")]
    CertificateRead { path: String, reason: String },
    #[error("Invalid certificate material: {reason}")]
    InvalidCertificate { reason: String },
    #[error("Invalid private key material: {reason}")]
    InvalidPrivateKey { reason: String },
    #[error("TLS server configuration rejected: {reason}")]
    ServerConfig { reason: String },
    #[error("TLS handshake failed: {reason}")]
    HandshakeFailed { reason: String },
}

// ----------------------------------------------------------------------------
// Top-Level Error
// ----------------------------------------------------------------------------

/// Core error type for the sawmill server
#[derive(Debug, thiserror::Error)]
pub enum SawmillError {
    /// Binding the listening socket failed. Fatal to `listen()`.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Configuration error (invalid settings, or a setting changed after
    /// the server already started).
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Application listener reported a fault while handling a message.
    #[error("Listener error: {reason}")]
    Listener { reason: String },

    #[error("Server is already running")]
    AlreadyRunning,
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl SawmillError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SawmillError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a listener error with a reason
    pub fn listener_error<T: Into<String>>(reason: T) -> Self {
        SawmillError::Listener {
            reason: reason.into(),
        }
    }
}

impl CodecError {
    /// Create a malformed frame error with a reason
    pub fn malformed<T: Into<String>>(reason: T) -> Self {
        CodecError::MalformedFrame {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, SawmillError>;
