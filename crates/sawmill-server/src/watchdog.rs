//! Inactivity watchdog
//!
//! One watchdog task per connection, spawned independently of the
//! connection's pipeline task so that a pipeline parked in a slow listener
//! call is still timed out and reclaimed. The timer is advanced by the
//! pipeline's read stage through `ActivityClock`; the watchdog never
//! touches the data path it is guarding.
//!
//! State machine: `Active -> (timeout with no inbound byte) ->
//! IdleClosing -> Closed`. Entering `IdleClosing` immediately triggers the
//! connection's close signal; no probe or notice is sent first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use sawmill_core::CloseReason;

use crate::connection::CloseSignal;

// ----------------------------------------------------------------------------
// Activity Clock
// ----------------------------------------------------------------------------

/// Last-activity timestamp for one connection
///
/// Written by the pipeline on every inbound read, read by the watchdog.
/// Stored as milliseconds since the clock's creation so both sides can
/// share it without locking.
pub struct ActivityClock {
    epoch: Instant,
    last_millis: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    /// Record inbound activity now
    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_millis.store(elapsed, Ordering::Relaxed);
    }

    /// Instant of the most recent inbound activity
    pub fn last_activity(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_millis.load(Ordering::Relaxed))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Watchdog
// ----------------------------------------------------------------------------

/// Per-connection watchdog state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Active,
    IdleClosing,
    Closed,
}

/// Idle-connection reclamation task for one connection
pub struct IdleWatchdog {
    clock: Arc<ActivityClock>,
    timeout: Duration,
    close: CloseSignal,
    state: WatchdogState,
}

impl IdleWatchdog {
    pub fn new(clock: Arc<ActivityClock>, timeout: Duration, close: CloseSignal) -> Self {
        Self {
            clock,
            timeout,
            close,
            state: WatchdogState::Active,
        }
    }

    /// Current position in the `Active -> IdleClosing -> Closed` machine
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Run until the connection goes idle or closes for another reason
    pub async fn run(mut self) {
        let mut close_rx = self.close.subscribe();

        loop {
            let deadline = self.clock.last_activity() + self.timeout;

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    // Activity may have moved the deadline while we slept.
                    if self.clock.last_activity() + self.timeout > Instant::now() {
                        continue;
                    }
                    self.state = WatchdogState::IdleClosing;
                    debug!(timeout = ?self.timeout, "connection idle, closing");
                    self.close.trigger(CloseReason::IdleTimeout);
                    break;
                }
                _ = close_rx.closed() => break,
            }
        }

        self.state = WatchdogState::Closed;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
