//! Server builder API
//!
//! Builder-style construction for consumers (CLI, tests, embedding
//! applications) that want to assemble a server in one expression.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sawmill_core::{FrameCodec, MessageListener, Result, ServerConfig, TlsSettings};

use crate::server::Server;

// ----------------------------------------------------------------------------
// Server Builder
// ----------------------------------------------------------------------------

/// Builder for a [`Server`]
pub struct ServerBuilder {
    config: ServerConfig,
    listener: Option<Arc<dyn MessageListener>>,
    codec: Option<Arc<dyn FrameCodec>>,
}

impl ServerBuilder {
    /// Start from default configuration
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            listener: None,
            codec: None,
        }
    }

    /// Use a complete configuration
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the per-connection inactivity timeout
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config.inactivity_timeout = timeout;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Enable TLS termination with the given certificate material
    pub fn tls(mut self, settings: TlsSettings) -> Self {
        self.config.tls = Some(settings);
        self
    }

    /// Set the dispatch target
    pub fn listener(mut self, listener: Arc<dyn MessageListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Set the frame codec factory
    pub fn codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Validate the configuration and build the server
    pub fn build(self) -> Result<Server> {
        let mut server = Server::new(self.config)?;
        if let Some(listener) = self.listener {
            server.set_listener(listener);
        }
        if let Some(codec) = self.codec {
            server.set_codec(codec);
        }
        Ok(server)
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
