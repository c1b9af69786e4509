//! Sawmill Core
//!
//! Foundational types and contracts for the sawmill framed-message ingest
//! server: the message/ack data model, the frame codec boundary, the
//! pluggable listener contract, configuration, and the error taxonomy.
//! The server itself lives in `sawmill-server`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod errors;
pub mod listener;
pub mod message;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::{encode_frame, AckEncoder, FrameCodec, FrameDecoder, LengthPrefixedCodec};
pub use config::{ServerConfig, TlsSettings};
pub use errors::{CodecError, Result, SawmillError, TlsError};
pub use listener::{LoggingListener, MessageListener};
pub use message::{Ack, CloseReason, ConnectionId, ConnectionInfo, Message};
