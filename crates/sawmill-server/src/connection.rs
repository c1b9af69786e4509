//! Per-connection pipeline
//!
//! One pipeline instance per accepted socket, never reused. Inbound bytes
//! flow through transport logging, optional TLS unwrap, the watchdog's
//! activity tee, frame decode, and dispatch; acks produced by dispatch are
//! encoded and written back on the same connection in message order. The
//! whole pipeline races the connection's close signal, so a close from the
//! peer, the watchdog, a protocol fault, or server shutdown unwinds any
//! in-flight stage, including a dispatch call in progress.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, trace};

use sawmill_core::{
    AckEncoder, CloseReason, ConnectionInfo, FrameCodec, FrameDecoder, MessageListener,
    SawmillError, TlsError,
};

use crate::watchdog::ActivityClock;

// ----------------------------------------------------------------------------
// Close Signal
// ----------------------------------------------------------------------------

/// One-shot close latch for a connection
///
/// Any stage, the watchdog, or the server may trigger it; the first reason
/// wins and later triggers are ignored. Every stage observes it through a
/// subscribed receiver.
#[derive(Clone)]
pub struct CloseSignal {
    tx: watch::Sender<Option<CloseReason>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Mark the connection closed; returns false if it already was
    pub fn trigger(&self, reason: CloseReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    /// The close reason, if the connection is already marked closed
    pub fn reason(&self) -> Option<CloseReason> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> CloseReceiver {
        CloseReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`CloseSignal`]
pub struct CloseReceiver {
    rx: watch::Receiver<Option<CloseReason>>,
}

impl CloseReceiver {
    /// Wait until the connection is marked closed and return the reason
    pub async fn closed_with_reason(&mut self) -> CloseReason {
        match self.rx.wait_for(|reason| reason.is_some()).await {
            Ok(reason) => (*reason).unwrap_or(CloseReason::ServerShutdown),
            // All senders gone counts as closed.
            Err(_) => CloseReason::ServerShutdown,
        }
    }

    /// Wait until the connection is marked closed
    pub async fn closed(&mut self) {
        self.closed_with_reason().await;
    }
}

// ----------------------------------------------------------------------------
// Connection Stream
// ----------------------------------------------------------------------------

/// Transport under the pipeline: plaintext TCP or TLS-terminated TCP
enum ConnectionStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
}

impl AsyncRead for ConnectionStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ConnectionStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnectionStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ConnectionStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ConnectionStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ConnectionStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ConnectionStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Pipeline
// ----------------------------------------------------------------------------

/// Everything one accepted socket needs to run its pipeline
pub(crate) struct ConnectionPipeline {
    pub info: ConnectionInfo,
    pub socket: TcpStream,
    pub tls: Option<TlsAcceptor>,
    pub codec: Arc<dyn FrameCodec>,
    pub listener: Arc<dyn MessageListener>,
    pub clock: Arc<ActivityClock>,
    pub close: CloseSignal,
    pub read_buffer_size: usize,
}

impl ConnectionPipeline {
    /// Run the pipeline to completion and report the close exactly once
    pub(crate) async fn run(self) -> CloseReason {
        let info = self.info.clone();
        let listener = Arc::clone(&self.listener);
        let close = self.close.clone();
        let mut close_rx = close.subscribe();

        let reason = tokio::select! {
            biased;
            reason = close_rx.closed_with_reason() => reason,
            reason = self.drive() => reason,
        };

        // First trigger wins; this is a no-op when the close came through
        // the signal in the first place.
        close.trigger(reason);
        let reason = close.reason().unwrap_or(reason);

        debug!(connection = %info.id, %reason, "pipeline finished");
        listener.on_connection_close(&info, reason).await;
        reason
    }

    /// Inbound stage sequence; returns how the connection ended
    async fn drive(self) -> CloseReason {
        let ConnectionPipeline {
            info,
            socket,
            tls,
            codec,
            listener,
            clock,
            read_buffer_size,
            ..
        } = self;

        // Stage 2: TLS termination, only present when configured.
        let mut stream = match tls {
            Some(acceptor) => match acceptor.accept(socket).await {
                Ok(tls_stream) => {
                    trace!(connection = %info.id, "TLS handshake complete");
                    clock.touch();
                    ConnectionStream::Tls(Box::new(tls_stream))
                }
                Err(err) => {
                    let error = SawmillError::Tls(TlsError::HandshakeFailed {
                        reason: err.to_string(),
                    });
                    listener.on_exception(Some(&info), &error);
                    return CloseReason::ProtocolError;
                }
            },
            None => ConnectionStream::Plain(socket),
        };

        let mut decoder: Box<dyn FrameDecoder> = codec.decoder();
        let encoder: Box<dyn AckEncoder> = codec.encoder();
        let mut buf = vec![0u8; read_buffer_size];

        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => return CloseReason::PeerClosed,
                Ok(n) => n,
                Err(err) => {
                    listener.on_exception(Some(&info), &SawmillError::Io(err));
                    return CloseReason::PeerClosed;
                }
            };

            // Stage 1 + 3: transport logging and the watchdog's activity tee.
            trace!(connection = %info.id, bytes = n, "bytes in");
            clock.touch();

            // Stage 4: frame decode, resumable across partial reads.
            decoder.feed(&buf[..n]);
            loop {
                let message = match decoder.decode_next() {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(err) => {
                        listener.on_exception(Some(&info), &SawmillError::Codec(err));
                        return CloseReason::ProtocolError;
                    }
                };

                // Stage 5: dispatch. Messages of one connection are
                // dispatched strictly in wire order.
                let ack = match listener.on_new_message(&info, message).await {
                    Ok(ack) => ack,
                    Err(err) => {
                        listener.on_exception(Some(&info), &err);
                        return CloseReason::ProtocolError;
                    }
                };

                // Stage 6: ack encode and write-back, in message order.
                if let Some(ack) = ack {
                    let wire = match encoder.encode(&ack) {
                        Ok(wire) => wire,
                        Err(err) => {
                            listener.on_exception(Some(&info), &SawmillError::Codec(err));
                            return CloseReason::ProtocolError;
                        }
                    };
                    trace!(connection = %info.id, sequence = ack.sequence, bytes = wire.len(), "ack out");
                    if let Err(err) = stream.write_all(&wire).await {
                        listener.on_exception(Some(&info), &SawmillError::Io(err));
                        return CloseReason::PeerClosed;
                    }
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
