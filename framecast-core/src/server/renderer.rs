//! The renderer contract between the pipeline and the scene raycaster.
//!
//! The raycaster itself lives outside this crate; the pipeline only needs
//! something that can fill one slice of pixels for a pose and tile.

use crate::config::{SCREEN_W, SLICE_BUFFER_SIZE, SLICE_HEIGHT};
use crate::protocol::RenderCommand;

/// A scene renderer that can produce one slice at a time.
///
/// `out` is exactly [`SLICE_BUFFER_SIZE`] bytes, row-major, one byte per
/// pixel; the interpretation of pixel bytes (RGB233 in practice) is the
/// renderer's business. Implementations are driven from a dedicated task
/// and may keep mutable state between slices of the same frame.
pub trait SliceRenderer: Send + 'static {
    /// Fill `out` with the pixels of slice `slice_id` for `cmd`.
    fn render_slice(&mut self, cmd: &RenderCommand, slice_id: usize, out: &mut [u8]);
}

/// Deterministic stand-in renderer: every row is a constant byte derived
/// from the frame number and the row's global position, so clients and
/// tests can recompute the expected image without a scene.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestPatternRenderer;

impl TestPatternRenderer {
    /// The byte filling row `row` of slice `slice_id` for `cmd`.
    pub fn pixel(cmd: &RenderCommand, slice_id: usize, row: usize) -> u8 {
        let global_row = slice_id * SLICE_HEIGHT + row;
        ((cmd.pose.frame_num as usize + global_row) & 0x7F) as u8
    }
}

impl SliceRenderer for TestPatternRenderer {
    fn render_slice(&mut self, cmd: &RenderCommand, slice_id: usize, out: &mut [u8]) {
        debug_assert_eq!(out.len(), SLICE_BUFFER_SIZE);
        for (row, line) in out.chunks_mut(SCREEN_W).enumerate() {
            line.fill(Self::pixel(cmd, slice_id, row));
        }
    }
}
