//! Shared helpers for server integration tests

// Each integration test crate compiles its own copy; not every crate
// uses every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use sawmill_core::{
    encode_frame, Ack, CloseReason, ConnectionId, ConnectionInfo, Message, MessageListener,
    Result, SawmillError,
};
use sawmill_server::{Server, ServerBuilder};

use std::sync::Arc;

// ----------------------------------------------------------------------------
// Recording Listener
// ----------------------------------------------------------------------------

/// Listener that records everything the server reports, for assertions
#[derive(Default)]
pub struct RecordingListener {
    pub messages: Mutex<Vec<(ConnectionId, Message)>>,
    pub closes: Mutex<Vec<(ConnectionId, CloseReason)>>,
    pub exceptions: Mutex<Vec<(Option<ConnectionId>, String)>>,
    fail_payload: Option<Vec<u8>>,
    dispatch_delay: Option<Duration>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail dispatch for messages carrying exactly this payload
    pub fn failing_on(payload: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            fail_payload: Some(payload.to_vec()),
            ..Self::default()
        })
    }

    /// Park every dispatch call for this long before acking
    pub fn with_dispatch_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            dispatch_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn close_count(&self) -> usize {
        self.closes.lock().unwrap().len()
    }

    pub fn exception_count(&self) -> usize {
        self.exceptions.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageListener for RecordingListener {
    async fn on_new_message(
        &self,
        connection: &ConnectionInfo,
        message: Message,
    ) -> Result<Option<Ack>> {
        if let Some(delay) = self.dispatch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_payload.as_deref() == Some(&message.payload[..]) {
            return Err(SawmillError::listener_error("refused by test listener"));
        }
        let sequence = message.sequence;
        self.messages.lock().unwrap().push((connection.id, message));
        Ok(Some(Ack::up_to(sequence)))
    }

    async fn on_connection_close(&self, connection: &ConnectionInfo, reason: CloseReason) {
        self.closes.lock().unwrap().push((connection.id, reason));
    }

    fn on_exception(&self, connection: Option<&ConnectionInfo>, error: &SawmillError) {
        self.exceptions
            .lock()
            .unwrap()
            .push((connection.map(|c| c.id), error.to_string()));
    }
}

// ----------------------------------------------------------------------------
// Server Helpers
// ----------------------------------------------------------------------------

/// Start a server on an ephemeral loopback port
pub async fn start_server(
    listener: Arc<dyn MessageListener>,
    inactivity: Duration,
    grace: Duration,
) -> (Arc<Server>, SocketAddr, JoinHandle<Result<()>>) {
    let builder = ServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .inactivity_timeout(inactivity)
        .shutdown_grace(grace)
        .listener(listener);
    start_with_builder(builder).await
}

/// Start a server from a prepared builder
pub async fn start_with_builder(
    builder: ServerBuilder,
) -> (Arc<Server>, SocketAddr, JoinHandle<Result<()>>) {
    let server = Arc::new(builder.build().expect("server construction failed"));
    let handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen().await })
    };
    let addr = wait_for_bind(&server).await;
    (server, addr, handle)
}

async fn wait_for_bind(server: &Server) -> SocketAddr {
    for _ in 0..200 {
        if let Some(addr) = server.local_addr() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("server did not bind in time");
}

// ----------------------------------------------------------------------------
// Wire Helpers
// ----------------------------------------------------------------------------

/// Write one frame in the reference codec's layout
pub async fn send_frame<S: AsyncWrite + Unpin>(stream: &mut S, sequence: u64, payload: &[u8]) {
    let wire = encode_frame(&Message::new(sequence, payload.to_vec()));
    stream.write_all(&wire).await.expect("frame write failed");
}

/// Read one ack in the reference codec's layout
pub async fn read_ack<S: AsyncRead + Unpin>(stream: &mut S) -> u64 {
    let mut buf = [0u8; 9];
    stream.read_exact(&mut buf).await.expect("ack read failed");
    assert_eq!(buf[0], 0x41, "unexpected ack marker");
    u64::from_be_bytes(buf[1..].try_into().unwrap())
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_until<F: Fn() -> bool>(deadline: Duration, condition: F) -> bool {
    let end = tokio::time::Instant::now() + deadline;
    while tokio::time::Instant::now() < end {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
