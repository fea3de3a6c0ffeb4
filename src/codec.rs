//! Length-prefixed codec for outbound link messages
//!
//! Outbound messages are framed as:
//! ```text
//! [ 1 byte: length (2 + payload len) ][ 1 byte: command ][ N bytes: payload ]
//! ```
//!
//! The length byte counts itself and the command byte, so the payload is
//! capped at 253 bytes. This is a hard wire-format limit.
//!
//! There is deliberately no decode path here: inbound traffic is not
//! length-prefixed. The session read loop hands each raw command byte plus
//! the live input stream to the observer, which knows how many further
//! bytes belong to each command.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum payload length encodable in the single length byte
pub const MAX_PAYLOAD: usize = 253;

/// Chunk size for bulk stream/buffer writes
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Reserved command codes carried in the command byte. These are
/// payload-level conventions between peers; the core does not act on them.
pub mod cmd {
    /// Ask the remote peer for its profile
    pub const REQUEST_PROFILE: u8 = 3;
    /// Reply carrying the local profile
    pub const CLIENT_PROFILE: u8 = 4;
    /// Per-line acknowledgement during bulk transfers
    pub const LINE_ACK: u8 = 77;
    /// Per-line negative acknowledgement
    pub const LINE_NACK: u8 = 78;
    /// Identifier byte for this device class
    pub const DEVICE_ID: u8 = 0xA7;
}

/// Errors that can occur while encoding a frame
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD})")]
    PayloadTooLarge(usize),
}

/// One outbound message: a command byte plus an optional payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with no payload
    pub fn new(cmd: u8) -> Self {
        Self {
            cmd,
            payload: Bytes::new(),
        }
    }

    /// Create a frame with a payload
    pub fn with_payload(cmd: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            cmd,
            payload: payload.into(),
        }
    }

    /// Create a frame carrying a UTF-8 string payload
    pub fn with_text(cmd: u8, text: impl AsRef<str>) -> Self {
        Self {
            cmd,
            payload: Bytes::copy_from_slice(text.as_ref().as_bytes()),
        }
    }

    /// Encode this frame into wire bytes
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        encode(self.cmd, &self.payload)
    }
}

/// Encode a command and payload into a length-prefixed frame
pub fn encode(cmd: u8, payload: &[u8]) -> Result<Bytes, CodecError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let len = 2 + payload.len();
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u8(len as u8);
    buf.put_u8(cmd);
    buf.put_slice(payload);

    Ok(buf.freeze())
}
