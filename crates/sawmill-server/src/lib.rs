//! Sawmill Server
//!
//! Connection-oriented TCP server for framed messages: a bounded accept
//! loop, one ordered pipeline per connection (transport logging, optional
//! TLS, inactivity watchdog tee, frame decode, dispatch, ack encode), and
//! graceful shutdown within a configurable grace period. Application
//! logic plugs in through the `MessageListener` contract from
//! `sawmill-core`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod connection;
pub mod server;
pub mod tls;
pub mod watchdog;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::ServerBuilder;
pub use connection::{CloseReceiver, CloseSignal};
pub use server::Server;
pub use tls::TlsContext;
pub use watchdog::{ActivityClock, IdleWatchdog, WatchdogState};
