//! Stream protocol: channel negotiation and chunk decoding.
//!
//! A connection delivers exactly one control (text) message first — a JSON
//! positive integer giving the channel count — and raw interleaved f32
//! chunks as binary messages afterwards. Anything else is a protocol error
//! that tears the connection down.

use thiserror::Error;

/// Application-level WebSocket close code used on protocol violations
pub const PROTOCOL_CLOSE_CODE: u16 = 4000;

/// Violations of the stream protocol. All of these are fatal to the
/// current connection; the transport closes with [`PROTOCOL_CLOSE_CODE`]
/// and the reconnect policy takes over from a clean unnegotiated state.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("channel count already negotiated")]
    AlreadyNegotiated,

    #[error("binary chunk received before channel negotiation")]
    ChunkBeforeNegotiation,

    #[error("malformed channel-count message: {0}")]
    MalformedControl(String),

    #[error("channel count must be a positive integer, got {0}")]
    InvalidChannelCount(i64),
}

/// Per-connection negotiation state.
///
/// Gates chunk acceptance until the channel count is known; a fresh
/// negotiator is created for every connection epoch.
#[derive(Debug, Default)]
pub struct ChannelNegotiator {
    channels: Option<usize>,
}

impl ChannelNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiated channel count, if the control message has been seen
    pub fn negotiated(&self) -> Option<usize> {
        self.channels
    }

    /// Process the control message.
    ///
    /// # Returns
    /// The channel count on first, well-formed negotiation
    ///
    /// # Errors
    /// [`ProtocolError::AlreadyNegotiated`] on a second control message,
    /// [`ProtocolError::MalformedControl`] if the payload is not a JSON
    /// integer, [`ProtocolError::InvalidChannelCount`] if it is zero or
    /// negative.
    pub fn handle_control(&mut self, text: &str) -> Result<usize, ProtocolError> {
        if self.channels.is_some() {
            return Err(ProtocolError::AlreadyNegotiated);
        }
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedControl(e.to_string()))?;
        let count = value
            .as_i64()
            .ok_or_else(|| ProtocolError::MalformedControl(format!("not an integer: {value}")))?;
        if count < 1 {
            return Err(ProtocolError::InvalidChannelCount(count));
        }
        let channels = count as usize;
        self.channels = Some(channels);
        Ok(channels)
    }

    /// Check that a binary chunk may be accepted.
    ///
    /// # Returns
    /// The negotiated channel count
    ///
    /// # Errors
    /// [`ProtocolError::ChunkBeforeNegotiation`] if no control message has
    /// arrived yet
    pub fn accept_chunk(&self) -> Result<usize, ProtocolError> {
        self.channels.ok_or(ProtocolError::ChunkBeforeNegotiation)
    }
}

/// Decode a binary chunk payload into interleaved f32 samples.
///
/// The wire format is little-endian IEEE 754 single precision; a trailing
/// partial sample is ignored.
pub fn decode_samples(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
