//! Frame codec boundary
//!
//! The wire grammar itself is an external collaborator: the server only
//! consumes it through the traits below. A decoder is fed raw bytes as
//! they arrive off the socket and yields complete messages, buffering
//! incomplete frames across partial reads. An encoder turns acks back
//! into bytes for the same connection.
//!
//! `LengthPrefixedCodec` is the built-in reference implementation, used by
//! the CLI and the test suite.

use crate::errors::CodecError;
use crate::message::{Ack, Message};

// ----------------------------------------------------------------------------
// Codec Traits
// ----------------------------------------------------------------------------

/// Resumable frame decoder for one connection
///
/// Implementations own whatever buffer state they need; a partial frame is
/// held until more bytes arrive. A decode error is fatal for the
/// connection, never for the server.
pub trait FrameDecoder: Send {
    /// Append newly received bytes to the decoder's buffer
    fn feed(&mut self, bytes: &[u8]);

    /// Decode the next complete message, if one is buffered
    ///
    /// Returns `Ok(None)` when more bytes are needed. Called in a loop
    /// after every `feed` so one read can yield several messages.
    fn decode_next(&mut self) -> Result<Option<Message>, CodecError>;
}

/// Ack encoder for one connection
pub trait AckEncoder: Send {
    /// Serialize an ack into wire bytes
    fn encode(&self, ack: &Ack) -> Result<Vec<u8>, CodecError>;
}

/// Per-connection codec factory
///
/// The server calls this once per accepted socket; decoder state is owned
/// exclusively by that socket's pipeline.
pub trait FrameCodec: Send + Sync {
    fn decoder(&self) -> Box<dyn FrameDecoder>;
    fn encoder(&self) -> Box<dyn AckEncoder>;
}

// ----------------------------------------------------------------------------
// Length-Prefixed Reference Codec
// ----------------------------------------------------------------------------

/// Frame layout: marker byte `0x44`, u32 BE payload length, u64 BE
/// sequence, payload bytes. Ack layout: marker byte `0x41`, u64 BE
/// sequence.
const FRAME_HEADER_LEN: usize = 1 + 4 + 8;
const FRAME_MARKER: u8 = 0x44;
const ACK_MARKER: u8 = 0x41;

/// Built-in length-prefixed codec
#[derive(Debug, Clone)]
pub struct LengthPrefixedCodec {
    /// Maximum accepted payload size per frame
    pub max_frame_size: usize,
}

impl LengthPrefixedCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        // 1 MiB is generous for log-shipping style payloads
        Self::new(1024 * 1024)
    }
}

impl FrameCodec for LengthPrefixedCodec {
    fn decoder(&self) -> Box<dyn FrameDecoder> {
        Box::new(LengthPrefixedDecoder {
            buffer: Vec::new(),
            max_frame_size: self.max_frame_size,
        })
    }

    fn encoder(&self) -> Box<dyn AckEncoder> {
        Box::new(LengthPrefixedAckEncoder)
    }
}

/// Decoder state for one connection
struct LengthPrefixedDecoder {
    buffer: Vec<u8>,
    max_frame_size: usize,
}

impl FrameDecoder for LengthPrefixedDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn decode_next(&mut self) -> Result<Option<Message>, CodecError> {
        // The marker is checked as soon as one byte is in, so a stream
        // that is not speaking this protocol fails fast.
        match self.buffer.first() {
            None => return Ok(None),
            Some(&FRAME_MARKER) => {}
            Some(&other) => {
                return Err(CodecError::malformed(format!(
                    "unexpected frame marker {other:#04x}"
                )));
            }
        }

        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
        ]) as usize;

        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max_size: self.max_frame_size,
            });
        }

        if self.buffer.len() < FRAME_HEADER_LEN + len {
            // Partial frame, wait for more bytes
            return Ok(None);
        }

        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&self.buffer[5..13]);
        let sequence = u64::from_be_bytes(seq_bytes);

        let payload = self.buffer[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec();
        self.buffer.drain(..FRAME_HEADER_LEN + len);

        Ok(Some(Message::new(sequence, payload)))
    }
}

struct LengthPrefixedAckEncoder;

impl AckEncoder for LengthPrefixedAckEncoder {
    fn encode(&self, ack: &Ack) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(9);
        out.push(ACK_MARKER);
        out.extend_from_slice(&ack.sequence.to_be_bytes());
        Ok(out)
    }
}

/// Encode a message the way `LengthPrefixedCodec` expects it on the wire
///
/// Provided for clients and tests; the server itself never encodes
/// messages.
pub fn encode_frame(message: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + message.payload.len());
    out.push(FRAME_MARKER);
    out.extend_from_slice(&(message.payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&message.sequence.to_be_bytes());
    out.extend_from_slice(&message.payload);
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
