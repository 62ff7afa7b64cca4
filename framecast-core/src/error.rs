//! Domain error type for the framecast protocol.
//!
//! All fallible operations return `Result<T, FramecastError>`. Most variants
//! are recoverable at a higher level: a bad packet costs at most one slice,
//! a bad slice costs at most one stream for one frame.

use std::net::IpAddr;

use thiserror::Error;

/// The canonical error type for the framecast protocol.
#[derive(Debug, Error)]
pub enum FramecastError {
    // ── Bitstream ────────────────────────────────────────────────
    /// A bit was read past the end of the stream.
    #[error("bitstream underflow")]
    BitstreamUnderflow,

    /// A write would exceed the backing buffer.
    #[error("bitstream overflow: capacity {capacity} bytes")]
    BitstreamOverflow { capacity: usize },

    // ── Wire format ──────────────────────────────────────────────
    /// A datagram arrived shorter than the fixed packet size.
    #[error("short packet: {got} bytes (expected {expected})")]
    ShortPacket { got: usize, expected: usize },

    /// A header or trailer could not be parsed from the given bytes.
    #[error("invalid {what}: {got} bytes (need {need})")]
    Truncated {
        what: &'static str,
        got: usize,
        need: usize,
    },

    /// An uplink datagram was not a well-formed render command.
    #[error("invalid render command: {got} bytes (expected {expected})")]
    InvalidCommand { got: usize, expected: usize },

    /// A datagram arrived from an address outside the routing table.
    #[error("unknown source address: {0}")]
    UnknownSource(IpAddr),

    // ── Codec ────────────────────────────────────────────────────
    /// An encoded slice would not fit its output buffer.
    #[error("encoded slice too large: {size} bytes (max {max})")]
    SliceTooLarge { size: usize, max: usize },

    // ── Pipeline ─────────────────────────────────────────────────
    /// The socket or OS layer reported an error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline channel was closed (peer task exited).
    #[error("pipeline channel closed")]
    ChannelClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FramecastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FramecastError::ChannelClosed
    }
}
