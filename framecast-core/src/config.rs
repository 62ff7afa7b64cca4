//! Compile-time stream geometry and protocol constants.
//!
//! Every per-stream and per-slice collection in the crate is a fixed-size
//! array indexed by these constants, so the whole parameter set lives here.
//! Changing the resolution, slice count, or stream count is a recompile.

use std::time::Duration;

// ── Screen geometry ──────────────────────────────────────────────

/// Frame width in pixels.
pub const SCREEN_W: usize = 320;
/// Frame height in pixels.
pub const SCREEN_H: usize = 240;
/// Number of independently encoded horizontal bands per frame.
pub const NUM_SLICES: usize = 4;
/// Number of render servers contributing to one frame.
pub const NUM_STREAMS: usize = 2;

/// Bytes of one full frame (1 byte per pixel, RGB233 by convention).
pub const SCREEN_BUFFER_SIZE: usize = SCREEN_W * SCREEN_H;
/// Bytes of one uncompressed slice.
pub const SLICE_BUFFER_SIZE: usize = SCREEN_BUFFER_SIZE / NUM_SLICES;
/// Pixel rows per slice.
pub const SLICE_HEIGHT: usize = SCREEN_H / NUM_SLICES;

// ── Transport ────────────────────────────────────────────────────

/// Fixed datagram size: every packet on the wire is exactly this long,
/// chosen below the link MTU so one datagram is one IP packet.
pub const MTU: usize = 1440;
/// Payload bytes per packet (everything after the 2-byte packet header).
pub const PKT_PAYLOAD_CAP: usize = MTU - crate::protocol::PacketInfo::SIZE;
/// Largest payload a frame-terminal packet can carry while still leaving
/// room for the 16-byte frame-info trailer at the datagram tail.
pub const PKT_PAYLOAD_WITH_TRAILER: usize = PKT_PAYLOAD_CAP - crate::protocol::FrameInfo::SIZE;

/// Worst-case encoded slice size: the RLE codec emits at most two bytes per
/// input byte plus the two-byte terminator.
pub const ENC_SLICE_CAPACITY: usize = 2 * SLICE_BUFFER_SIZE + 2;
/// Upper bound on data packets per slice.
pub const MAX_PKTS_PER_SLICE: usize = ENC_SLICE_CAPACITY.div_ceil(PKT_PAYLOAD_CAP);
/// Client-side stride between per-slice regions of the encode buffer.
/// Payloads land at `pkt_id * PKT_PAYLOAD_CAP`, so the stride rounds the
/// worst-case slice up to whole packets.
pub const ENC_SLICE_STRIDE: usize = MAX_PKTS_PER_SLICE * PKT_PAYLOAD_CAP;
/// Client-side stride between per-stream regions of the encode buffer.
pub const ENC_STREAM_STRIDE: usize = NUM_SLICES * ENC_SLICE_STRIDE;

/// Bitmask with one bit set per slice.
pub const ALL_SLICE_BITMASK: u32 = (1 << NUM_SLICES) - 1;
/// Bitmask with one bit set per stream.
pub const ALL_STREAM_BITMASK: u32 = (1 << NUM_STREAMS) - 1;

// ── Timing ───────────────────────────────────────────────────────

/// Target display rate; the frame budget is its reciprocal.
pub const TARGET_FPS: u32 = 30;

/// Per-frame time budget. Streams that miss it are excluded from the frame.
pub const fn frame_budget() -> Duration {
    Duration::from_micros(1_000_000 / TARGET_FPS as u64)
}

/// Client receive timeout: coarse, only so the receiver task notices
/// shutdown; completion is signalled per-packet.
pub const CLIENT_RECV_TIMEOUT: Duration = Duration::from_secs(1);
/// Server command timeout between frames.
pub const SERVER_RECV_TIMEOUT: Duration = Duration::from_secs(10);

// ── Camera ───────────────────────────────────────────────────────

/// Horizontal field of view in degrees.
pub const FOV_DEGREES: f32 = 60.0;
pub const SPRINT_SPEED: f32 = 0.1;
pub const STRAFE_SPEED: f32 = 0.1;
pub const ROTATE_SPEED: f32 = 0.05;

// ── Layout invariants ────────────────────────────────────────────

const _: () = {
    assert!(SCREEN_H % NUM_SLICES == 0, "slices must tile the screen evenly");
    assert!(NUM_SLICES <= 16, "slice_id is a 4-bit header field");
    assert!(NUM_STREAMS <= 32, "stream bitmask is a u32");
    assert!(MAX_PKTS_PER_SLICE <= 32, "packet bitmask is a u32");
    assert!(MAX_PKTS_PER_SLICE * NUM_SLICES <= 256, "pkt_id is a u8");
};
