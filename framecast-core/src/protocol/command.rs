//! Uplink render command: the pose sampled by the display loop plus the
//! tile a given server is responsible for this frame.
//!
//! One datagram per server per frame, fixed 42-byte little-endian layout:
//!
//! ```text
//! Pose  { u64 ts, u16 frame_num, f32 pos_x, f32 pos_y,
//!         f32 dir_x, f32 dir_y, f32 plane_x, f32 plane_y }
//! Tile  { f32 x_scale, f32 x_offset }
//! ```

use crate::error::FramecastError;

// ── Pose ─────────────────────────────────────────────────────────

/// Camera state sampled once per frame and broadcast verbatim to every
/// server.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    /// Monotonic capture timestamp (nanoseconds); echoed back in the frame
    /// trailer for RTT measurement.
    pub timestamp_ns: u64,
    /// Wrapping frame counter.
    pub frame_num: u16,
    /// World position.
    pub pos: [f32; 2],
    /// View direction (unit vector).
    pub dir: [f32; 2],
    /// Camera plane (perpendicular to `dir`, scaled by the FOV).
    pub plane: [f32; 2],
}

impl Pose {
    /// Encoded size on the wire.
    pub const SIZE: usize = 34;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[8..10].copy_from_slice(&self.frame_num.to_le_bytes());
        buf[10..14].copy_from_slice(&self.pos[0].to_le_bytes());
        buf[14..18].copy_from_slice(&self.pos[1].to_le_bytes());
        buf[18..22].copy_from_slice(&self.dir[0].to_le_bytes());
        buf[22..26].copy_from_slice(&self.dir[1].to_le_bytes());
        buf[26..30].copy_from_slice(&self.plane[0].to_le_bytes());
        buf[30..34].copy_from_slice(&self.plane[1].to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, FramecastError> {
        if data.len() < Self::SIZE {
            return Err(FramecastError::Truncated {
                what: "pose",
                got: data.len(),
                need: Self::SIZE,
            });
        }
        let f = |off: usize| f32::from_le_bytes(data[off..off + 4].try_into().unwrap());
        Ok(Self {
            timestamp_ns: u64::from_le_bytes(data[0..8].try_into().unwrap()),
            frame_num: u16::from_le_bytes(data[8..10].try_into().unwrap()),
            pos: [f(10), f(14)],
            dir: [f(18), f(22)],
            plane: [f(26), f(30)],
        })
    }
}

// ── Tile ─────────────────────────────────────────────────────────

/// Horizontal window of normalized screen space (`[-1, +1]`) a stream
/// renders: `x_scale` is the window width, `x_offset` its left edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub x_scale: f32,
    pub x_offset: f32,
}

impl Tile {
    /// Encoded size on the wire.
    pub const SIZE: usize = 8;

    /// The whole screen.
    pub const FULL: Tile = Tile {
        x_scale: 2.0,
        x_offset: -1.0,
    };

    /// The `i`-th of `n` equal tiles.
    pub fn nth_of(i: usize, n: usize) -> Self {
        let span = 2.0 / n as f32;
        Self {
            x_scale: span,
            x_offset: span * i as f32 - 1.0,
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.x_scale.to_le_bytes());
        buf[4..8].copy_from_slice(&self.x_offset.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, FramecastError> {
        if data.len() < Self::SIZE {
            return Err(FramecastError::Truncated {
                what: "tile",
                got: data.len(),
                need: Self::SIZE,
            });
        }
        Ok(Self {
            x_scale: f32::from_le_bytes(data[0..4].try_into().unwrap()),
            x_offset: f32::from_le_bytes(data[4..8].try_into().unwrap()),
        })
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::FULL
    }
}

// ── RenderCommand ────────────────────────────────────────────────

/// One uplink datagram: pose plus the receiving server's tile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderCommand {
    pub pose: Pose,
    pub tile: Tile,
}

impl RenderCommand {
    /// Encoded size on the wire; uplink datagrams must be exactly this long.
    pub const SIZE: usize = Pose::SIZE + Tile::SIZE;

    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..Pose::SIZE].copy_from_slice(&self.pose.encode());
        buf[Pose::SIZE..].copy_from_slice(&self.tile.encode());
        buf
    }

    /// Deserialize from an uplink datagram. The size must match exactly;
    /// anything else is not a render command.
    pub fn decode(data: &[u8]) -> Result<Self, FramecastError> {
        if data.len() != Self::SIZE {
            return Err(FramecastError::InvalidCommand {
                got: data.len(),
                expected: Self::SIZE,
            });
        }
        Ok(Self {
            pose: Pose::decode(&data[..Pose::SIZE])?,
            tile: Tile::decode(&data[Pose::SIZE..])?,
        })
    }
}
