//! What the display layer gets to see.
//!
//! The core hands the presenter decoded pixels plus enough metadata to
//! visualize degradation: which streams answered, which slices landed, and
//! the tile layout that was in force. Pixel bytes are opaque here; the
//! presenter applies its own palette (RGB233 in the reference setup).

use std::collections::VecDeque;
use std::time::Duration;

use crate::client::controller::TileLayout;
use crate::config::{NUM_STREAMS, SCREEN_BUFFER_SIZE};

// ── FrameView ────────────────────────────────────────────────────

/// One frame as offered to the presentation layer.
#[derive(Debug)]
pub struct FrameView<'a> {
    /// Composited pixels: `NUM_STREAMS` consecutive full-screen regions.
    pub screen: &'a [u8],
    /// Streams that delivered this frame.
    pub active_mask: u32,
    /// Per-stream slice completion; a clear bit marks a stale region.
    pub slice_masks: [u32; NUM_STREAMS],
    /// The layout the frame was rendered with.
    pub layout: TileLayout,
    /// Windowed average frame rate.
    pub fps: f64,
}

impl<'a> FrameView<'a> {
    /// The decoded full-screen region rendered by stream `i`.
    pub fn stream_tile(&self, i: usize) -> &'a [u8] {
        &self.screen[i * SCREEN_BUFFER_SIZE..(i + 1) * SCREEN_BUFFER_SIZE]
    }
}

/// Anything that can consume finished frames: a GL uploader, a TUI, a
/// logger. Called once per display frame from the frame loop.
pub trait PresentationSink {
    fn present(&mut self, frame: &FrameView<'_>);
}

/// Window title for the presenter, matching the classic
/// `"<name> | <fps> fps"` shape.
pub fn window_title(name: &str, fps: f64) -> String {
    format!("{name} | {fps:.1} fps")
}

// ── FpsWindow ────────────────────────────────────────────────────

/// Rolling average of recent frame times.
pub struct FpsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FpsWindow {
    /// A ten-frame window, like the reference client.
    pub fn new() -> Self {
        Self::with_capacity(10)
    }

    /// A window over the last `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one frame's wall time.
    pub fn record(&mut self, frame_time: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(frame_time.as_secs_f64());
    }

    /// Average frames per second over the window; zero before any sample.
    pub fn average_fps(&self) -> f64 {
        let total: f64 = self.samples.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / total
    }
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new()
    }
}
