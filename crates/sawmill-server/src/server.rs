//! Connection acceptor and server lifecycle
//!
//! The `Server` owns the listening socket, builds one connection pipeline
//! per accepted socket, and owns the shutdown protocol. The accept loop,
//! the per-connection pipeline tasks, and the per-connection watchdog
//! tasks are spawned independently, so a burst of slow connections cannot
//! starve new accepts and a blocked listener callback cannot starve
//! timeout enforcement.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use sawmill_core::{
    CloseReason, ConnectionId, ConnectionInfo, FrameCodec, LengthPrefixedCodec, LoggingListener,
    MessageListener, Result, SawmillError, ServerConfig, TlsSettings,
};

use crate::connection::{CloseSignal, ConnectionPipeline};
use crate::tls::TlsContext;
use crate::watchdog::{ActivityClock, IdleWatchdog};

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Server-side handle to one live connection
struct ConnectionHandle {
    close: CloseSignal,
    pipeline: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// Framed-message TCP server
///
/// Constructed once per process with immutable configuration. `listen`
/// binds and accepts until `stop` is called; `stop` triggers graceful
/// shutdown bounded by the configured grace period. `set_listener`,
/// `set_codec`, and `enable_tls` must be called before `listen` — they
/// take `&mut self`, and calling `enable_tls` once the server has started
/// is a configuration error.
pub struct Server {
    config: ServerConfig,
    listener: Arc<dyn MessageListener>,
    codec: Arc<dyn FrameCodec>,
    tls: Option<TlsContext>,
    shutdown: watch::Sender<bool>,
    /// True while the accept loop is admitting sockets
    accepting: watch::Sender<bool>,
    started: AtomicBool,
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
    teardown: tokio::sync::Mutex<()>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Create a server from configuration
    ///
    /// If the configuration carries TLS settings the certificate material
    /// is loaded and validated here; invalid material is fatal to startup,
    /// not deferred to the first connection.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| SawmillError::Configuration { reason })?;

        let tls = match &config.tls {
            Some(settings) => Some(TlsContext::from_settings(settings)?),
            None => None,
        };

        let (shutdown, _) = watch::channel(false);
        let (accepting, _) = watch::channel(false);

        Ok(Self {
            config,
            listener: Arc::new(LoggingListener),
            codec: Arc::new(LengthPrefixedCodec::default()),
            tls,
            shutdown,
            accepting,
            started: AtomicBool::new(false),
            connections: Arc::new(DashMap::new()),
            teardown: tokio::sync::Mutex::new(()),
            local_addr: std::sync::Mutex::new(None),
        })
    }

    /// Replace the dispatch target
    ///
    /// Safe before `listen`; replacing the listener while connections are
    /// live is not supported.
    pub fn set_listener(&mut self, listener: Arc<dyn MessageListener>) {
        self.listener = listener;
    }

    /// Replace the frame codec factory; same constraint as `set_listener`
    pub fn set_codec(&mut self, codec: Arc<dyn FrameCodec>) {
        self.codec = codec;
    }

    /// Enable TLS termination; must be called before `listen`
    pub fn enable_tls(&mut self, settings: TlsSettings) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(SawmillError::config_error(
                "enable_tls must be called before listen",
            ));
        }
        self.tls = Some(TlsContext::from_settings(&settings)?);
        Ok(())
    }

    /// Whether TLS termination is configured
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Address the server is bound to, once `listen` has bound it
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of currently tracked connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind the configured address and accept until `stop`
    ///
    /// Fails with `Bind` if the address is unavailable. Does not return
    /// normally while accepting; on shutdown the same bounded teardown as
    /// `stop` runs before this returns.
    pub async fn listen(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SawmillError::AlreadyRunning);
        }

        let tcp = match TcpListener::bind(self.config.bind_addr).await {
            Ok(tcp) => tcp,
            Err(source) => {
                // A server that never bound may retry listen.
                self.started.store(false, Ordering::SeqCst);
                return Err(SawmillError::Bind {
                    addr: self.config.bind_addr,
                    source,
                });
            }
        };

        let bound = tcp.local_addr().map_err(SawmillError::Io)?;
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(bound);
        info!(addr = %bound, tls = self.tls.is_some(), "server listening");

        let mut shutdown_rx = self.shutdown.subscribe();
        let _ = self.accepting.send(true);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = tcp.accept() => match accepted {
                    Ok((socket, remote)) => self.spawn_connection(socket, remote),
                    Err(err) => {
                        // No connection object exists yet for this fault.
                        error!(error = %err, "accept failed");
                        self.listener.on_exception(None, &SawmillError::Io(err));
                    }
                },
            }
        }

        // Published before teardown so `stop` cannot sweep while another
        // socket can still be admitted.
        let _ = self.accepting.send(false);
        self.drain_connections().await;
        Ok(())
    }

    /// Trigger graceful shutdown and wait for it to complete
    ///
    /// Returns once every connection has either drained within the grace
    /// period or been force-cancelled. Idempotent; calling it on a server
    /// that never started or already stopped is a no-op.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        // Wait for the accept loop to exit first: a socket admitted after
        // the close sweep below would miss its shutdown signal.
        let mut accepting_rx = self.accepting.subscribe();
        let _ = accepting_rx.wait_for(|accepting| !accepting).await;
        self.drain_connections().await;
    }

    /// Build and spawn one connection pipeline; never blocks the accept loop
    fn spawn_connection(&self, socket: TcpStream, remote: SocketAddr) {
        // Acks and small frames should go out immediately, not be batched.
        let _ = socket.set_nodelay(true);

        let info = ConnectionInfo::new(remote, self.tls.is_some());
        let id = info.id;
        debug!(connection = %id, peer = %remote, "connection accepted");

        let close = CloseSignal::new();
        let clock = Arc::new(ActivityClock::new());
        // The inactivity timer starts counting from accept.
        clock.touch();

        let watchdog = IdleWatchdog::new(
            Arc::clone(&clock),
            self.config.inactivity_timeout,
            close.clone(),
        );
        let watchdog_handle = tokio::spawn(watchdog.run());

        let pipeline = ConnectionPipeline {
            info,
            socket,
            tls: self.tls.as_ref().map(TlsContext::acceptor),
            codec: Arc::clone(&self.codec),
            listener: Arc::clone(&self.listener),
            clock,
            close: close.clone(),
            read_buffer_size: self.config.read_buffer_size,
        };

        let connections = Arc::clone(&self.connections);
        let (registered_tx, registered_rx) = oneshot::channel();
        let pipeline_handle = tokio::spawn(async move {
            pipeline.run().await;
            // A connection that ends instantly can get here before the
            // insert below; wait for it so the removal always lands.
            let _ = registered_rx.await;
            connections.remove(&id);
        });

        self.connections.insert(
            id,
            ConnectionHandle {
                close,
                pipeline: pipeline_handle,
                watchdog: watchdog_handle,
            },
        );
        let _ = registered_tx.send(());
    }

    /// Bounded teardown shared by `stop` and the exit path of `listen`
    async fn drain_connections(&self) {
        let _guard = self.teardown.lock().await;
        if self.connections.is_empty() {
            return;
        }

        info!(
            connections = self.connections.len(),
            grace = ?self.config.shutdown_grace,
            "draining connections"
        );

        for entry in self.connections.iter() {
            entry.value().close.trigger(CloseReason::ServerShutdown);
        }

        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut tick = tokio::time::interval(Duration::from_millis(20));
        while !self.connections.is_empty() && Instant::now() < deadline {
            tick.tick().await;
        }

        // Force-cancel anything still running past the grace period. This
        // is reported but never escalated to a crash.
        let stragglers: Vec<ConnectionId> =
            self.connections.iter().map(|entry| *entry.key()).collect();
        if !stragglers.is_empty() {
            warn!(
                count = stragglers.len(),
                "force-cancelling connections after grace period"
            );
        }
        for id in stragglers {
            if let Some((_, handle)) = self.connections.remove(&id) {
                handle.pipeline.abort();
                handle.watchdog.abort();
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Abort anything still attached if the server is dropped while
        // connections are live.
        for entry in self.connections.iter() {
            entry.value().pipeline.abort();
            entry.value().watchdog.abort();
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
    async fn test_invalid_config_rejected_at_construction() {
        let config = ServerConfig {
            inactivity_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(matches!(
            Server::new(config),
            Err(SawmillError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_on_never_started_server_is_a_no_op() {
        let server = Server::new(ServerConfig::for_port(0)).unwrap();
        server.stop().await;
        server.stop().await;
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_enable_tls_after_listen_is_a_configuration_error() {
        let mut server = Server::new(ServerConfig::for_port(0)).unwrap();
        server.started.store(true, Ordering::SeqCst);

        let settings = TlsSettings {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
        };
        assert!(matches!(
            server.enable_tls(settings),
            Err(SawmillError::Configuration { .. })
        ));
    }
}
