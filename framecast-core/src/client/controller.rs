//! Adaptive tile controller.
//!
//! A pure function from last frame's stream bitmask to this frame's
//! layout: surviving streams split the screen evenly between themselves,
//! while each missing stream is assigned its *ideal* slot (the tile it
//! would own with everyone present) so it re-joins seamlessly when it
//! recovers.
//!
//! An optional two-frame debounce damps single-frame flicker from bursty
//! loss: a changed mask must repeat once before the layout reacts.

use crate::config::{ALL_STREAM_BITMASK, NUM_STREAMS};
use crate::protocol::{Pose, RenderCommand, Tile};

// ── TileLayout ───────────────────────────────────────────────────

/// The tile each stream renders this frame, plus which streams are being
/// counted on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileLayout {
    /// Per-stream tiles, indexed by stream id.
    pub tiles: [Tile; NUM_STREAMS],
    /// Streams participating in the active partition.
    pub active_mask: u32,
}

impl TileLayout {
    /// Every stream present, each at its native slot.
    pub fn ideal() -> Self {
        let mut tiles = [Tile::FULL; NUM_STREAMS];
        for (i, tile) in tiles.iter_mut().enumerate() {
            *tile = Tile::nth_of(i, NUM_STREAMS);
        }
        Self {
            tiles,
            active_mask: ALL_STREAM_BITMASK,
        }
    }
}

// ── TileController ───────────────────────────────────────────────

/// Per-frame tile redistribution, stateless apart from the debounce window.
pub struct TileController {
    committed_mask: u32,
    last_observed: u32,
    debounce: bool,
}

impl TileController {
    /// Immediate mode: the layout reacts on the very next frame.
    pub fn new() -> Self {
        Self {
            committed_mask: ALL_STREAM_BITMASK,
            last_observed: ALL_STREAM_BITMASK,
            debounce: false,
        }
    }

    /// Debounced mode: a changed mask must persist for two consecutive
    /// frames before the active set changes.
    pub fn with_debounce() -> Self {
        Self {
            debounce: true,
            ..Self::new()
        }
    }

    /// Feed the previous frame's stream bitmask.
    pub fn observe(&mut self, stream_bitmask: u32) {
        let mask = stream_bitmask & ALL_STREAM_BITMASK;
        if !self.debounce || mask == self.last_observed {
            self.committed_mask = mask;
        }
        self.last_observed = mask;
    }

    /// Compute this frame's layout from the committed mask.
    ///
    /// With zero active streams there is no partition to scale, so every
    /// stream falls back to its ideal slot.
    pub fn layout(&self) -> TileLayout {
        let mask = self.committed_mask;
        let active = mask.count_ones();
        if active == 0 {
            return TileLayout {
                active_mask: 0,
                ..TileLayout::ideal()
            };
        }

        let span = 2.0 / active as f32;
        let mut tiles = [Tile::FULL; NUM_STREAMS];
        let mut rank = 0u32;
        for (i, tile) in tiles.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *tile = Tile {
                    x_scale: span,
                    x_offset: span * rank as f32 - 1.0,
                };
                rank += 1;
            } else {
                *tile = Tile::nth_of(i, NUM_STREAMS);
            }
        }

        TileLayout {
            tiles,
            active_mask: mask,
        }
    }

    /// Pair the pose with each stream's tile for this frame. The pose is
    /// broadcast identically; only the tile differs.
    pub fn commands(&self, pose: Pose) -> ([RenderCommand; NUM_STREAMS], TileLayout) {
        let layout = self.layout();
        let mut cmds = [RenderCommand::default(); NUM_STREAMS];
        for (i, cmd) in cmds.iter_mut().enumerate() {
            cmd.pose = pose;
            cmd.tile = layout.tiles[i];
        }
        (cmds, layout)
    }
}

impl Default for TileController {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
