//! Listener contract
//!
//! The boundary between the server core and application logic. Exactly one
//! listener instance is shared across all connections, so every entry
//! point must tolerate concurrent invocation from unrelated connections. A
//! blocking listener delays only its own connection's pipeline; accept and
//! watchdog progress never depend on it.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::{Result, SawmillError};
use crate::message::{Ack, CloseReason, ConnectionInfo, Message};

// ----------------------------------------------------------------------------
// Listener Trait
// ----------------------------------------------------------------------------

/// Application-side handler the server dispatches decoded messages to
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// Handle one decoded message
    ///
    /// Returning `Ok(Some(ack))` queues the ack for the encode stage;
    /// `Ok(None)` means "no ack yet" (the protocol may batch acks). An
    /// `Err` is a connection-scoped fault: the connection is closed and
    /// `on_exception` is invoked, other connections are unaffected.
    async fn on_new_message(
        &self,
        connection: &ConnectionInfo,
        message: Message,
    ) -> Result<Option<Ack>>;

    /// Informational close notification, invoked exactly once per
    /// connection whether the peer, the watchdog, a protocol fault, or
    /// server shutdown triggered the close.
    async fn on_connection_close(&self, connection: &ConnectionInfo, reason: CloseReason);

    /// Fault report
    ///
    /// `connection` is `None` for construction-time failures (the pipeline
    /// never came up). Implementations must not panic here.
    fn on_exception(&self, connection: Option<&ConnectionInfo>, error: &SawmillError);
}

// ----------------------------------------------------------------------------
// Default Listener
// ----------------------------------------------------------------------------

/// Default listener: logs every event and acks every message
///
/// The server falls back to this when no listener is supplied, so a bare
/// server is still a functioning ack-everything sink.
#[derive(Debug, Default)]
pub struct LoggingListener;

#[async_trait]
impl MessageListener for LoggingListener {
    async fn on_new_message(
        &self,
        connection: &ConnectionInfo,
        message: Message,
    ) -> Result<Option<Ack>> {
        debug!(
            connection = %connection.id,
            sequence = message.sequence,
            payload_len = message.payload.len(),
            "message received"
        );
        Ok(Some(Ack::up_to(message.sequence)))
    }

    async fn on_connection_close(&self, connection: &ConnectionInfo, reason: CloseReason) {
        info!(connection = %connection.id, %reason, "connection closed");
    }

    fn on_exception(&self, connection: Option<&ConnectionInfo>, error: &SawmillError) {
        match connection {
            Some(conn) => warn!(connection = %conn.id, %error, "connection fault"),
            None => warn!(%error, "pipeline construction fault"),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_listener_acks_every_message() {
        let listener = LoggingListener;
        let info = ConnectionInfo::new("127.0.0.1:9000".parse().unwrap(), false);

        let ack = listener
            .on_new_message(&info, Message::new(3, b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(ack, Some(Ack::up_to(3)));

        // Close and exception reporting must not panic.
        listener
            .on_connection_close(&info, CloseReason::PeerClosed)
            .await;
        listener.on_exception(None, &SawmillError::config_error("boom"));
    }
}
