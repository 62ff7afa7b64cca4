//! Downlink packet framing.
//!
//! Every downlink datagram is exactly [`MTU`](crate::config::MTU) bytes:
//!
//! ```text
//! byte 0        : (slice_end << 7) | (has_data << 6) | (slice_id & 0x0F)
//! byte 1        : pkt_id
//! bytes 2..     : payload (valid only when has_data = 1)
//! bytes MTU-16..: frame info trailer (only in the frame-terminal packet)
//! ```
//!
//! `slice_end` marks the last packet of a slice; `has_data = 0` means the
//! payload region is ignored (a trailer-only packet). Bits 5..4 of byte 0
//! are reserved and transmitted as zero.

use crate::config::MTU;
use crate::error::FramecastError;

// ── PacketInfo ───────────────────────────────────────────────────

/// Two-byte header carried by every downlink packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    /// Last packet of its slice.
    pub slice_end: bool,
    /// A payload follows the header.
    pub has_data: bool,
    /// Slice index within the frame (4 bits: max 16 slices).
    pub slice_id: u8,
    /// Packet index within the slice (max 256 packets).
    pub pkt_id: u8,
}

impl PacketInfo {
    /// Encoded size on the wire.
    pub const SIZE: usize = 2;

    /// Serialize to the two header bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        [
            (u8::from(self.slice_end) << 7) | (u8::from(self.has_data) << 6) | (self.slice_id & 0x0F),
            self.pkt_id,
        ]
    }

    /// Deserialize from the leading bytes of a datagram. Reserved bits are
    /// ignored.
    pub fn decode(data: &[u8]) -> Result<Self, FramecastError> {
        if data.len() < Self::SIZE {
            return Err(FramecastError::Truncated {
                what: "packet info",
                got: data.len(),
                need: Self::SIZE,
            });
        }
        Ok(Self {
            slice_end: (data[0] >> 7) & 1 == 1,
            has_data: (data[0] >> 6) & 1 == 1,
            slice_id: data[0] & 0x0F,
            pkt_id: data[1],
        })
    }
}

// ── FrameInfo ────────────────────────────────────────────────────

/// 16-byte trailer carried in the final packet of a frame.
///
/// `timestamp_ns` echoes the triggering pose so the client can compute the
/// pose round-trip time; the durations are measured server-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Capture timestamp echoed from the pose (nanoseconds).
    pub timestamp_ns: u64,
    /// Server render + encode duration (microseconds).
    pub render_us: u32,
    /// Server stream (packet emission) duration (microseconds).
    pub stream_us: u32,
}

impl FrameInfo {
    /// Encoded size on the wire.
    pub const SIZE: usize = 16;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[8..12].copy_from_slice(&self.render_us.to_le_bytes());
        buf[12..16].copy_from_slice(&self.stream_us.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, FramecastError> {
        if data.len() < Self::SIZE {
            return Err(FramecastError::Truncated {
                what: "frame info",
                got: data.len(),
                need: Self::SIZE,
            });
        }
        Ok(Self {
            timestamp_ns: u64::from_le_bytes(data[0..8].try_into().unwrap()),
            render_us: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            stream_us: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        })
    }

    /// Write the trailer into its fixed position at the datagram tail.
    pub fn write_trailer(&self, pkt: &mut [u8; MTU]) {
        pkt[MTU - Self::SIZE..].copy_from_slice(&self.encode());
    }

    /// Read the trailer from its fixed position at the datagram tail.
    pub fn read_trailer(pkt: &[u8]) -> Result<Self, FramecastError> {
        if pkt.len() < MTU {
            return Err(FramecastError::ShortPacket {
                got: pkt.len(),
                expected: MTU,
            });
        }
        Self::decode(&pkt[MTU - Self::SIZE..])
    }
}
