//! Per-frame results reported by the session.

use crate::config::{ALL_STREAM_BITMASK, NUM_STREAMS};

// ── StreamStats ──────────────────────────────────────────────────

/// What one stream delivered for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Pose round-trip time: trailer receipt minus pose capture (ns).
    pub rtt_ns: u64,
    /// Server-measured render + encode duration (µs).
    pub render_us: u32,
    /// Server-measured stream duration (µs).
    pub stream_us: u32,
    /// Bit `s` set ⇔ slice `s` fully received and decoded.
    pub slice_bitmask: u32,
    /// Encoded bytes consumed by the decoded slices.
    pub num_enc_bytes: u32,
}

// ── FrameResult ──────────────────────────────────────────────────

/// Result of one frame across all streams.
///
/// A stream missing from `stream_bitmask` is not an error: the tile
/// controller simply re-tiles around it next frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameResult {
    /// Bit `i` set ⇔ stream `i` delivered at least one slice this frame.
    pub stream_bitmask: u32,
    /// Per-stream statistics, indexed by stream id.
    pub stats: [StreamStats; NUM_STREAMS],
}

impl FrameResult {
    /// A freshly armed result: all streams presumed present until `stop`
    /// clears the ones that delivered nothing.
    pub fn armed() -> Self {
        Self {
            stream_bitmask: ALL_STREAM_BITMASK,
            stats: [StreamStats::default(); NUM_STREAMS],
        }
    }

    /// Whether stream `i` survived into this result.
    pub fn stream_active(&self, i: usize) -> bool {
        self.stream_bitmask & (1 << i) != 0
    }

    /// Number of streams that survived.
    pub fn active_count(&self) -> u32 {
        self.stream_bitmask.count_ones()
    }
}
