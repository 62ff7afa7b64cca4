//! Scripted pose source.
//!
//! Input handling belongs to the display layer; a headless client still
//! has to produce one pose per frame, so this slowly orbits the spawn
//! point. The camera plane is derived from the field of view exactly as a
//! raycaster expects: perpendicular to the view direction, scaled by
//! `tan(fov / 2)`.

use framecast_core::client::session::timestamp_ns;
use framecast_core::config::{FOV_DEGREES, ROTATE_SPEED};
use framecast_core::Pose;

/// Rotate a 2-vector by `angle` radians.
fn rotate(v: [f32; 2], angle: f32) -> [f32; 2] {
    let (sin, cos) = angle.sin_cos();
    [v[0] * cos - v[1] * sin, v[0] * sin + v[1] * cos]
}

/// Camera plane for a view direction.
fn cam_plane(dir: [f32; 2]) -> [f32; 2] {
    let fov_scale = (FOV_DEGREES.to_radians() * 0.5).tan();
    [-dir[1] * fov_scale, dir[0] * fov_scale]
}

/// Produces one timestamped pose per frame, rotating in place at the
/// configured rotate speed.
pub struct PoseSource {
    pose: Pose,
}

impl PoseSource {
    /// Start at the classic spawn point, looking down negative x.
    pub fn new() -> Self {
        let dir = [-1.0, 0.0];
        Self {
            pose: Pose {
                timestamp_ns: 0,
                frame_num: 0,
                pos: [22.0, 11.5],
                dir,
                plane: cam_plane(dir),
            },
        }
    }

    /// Advance one frame and return the stamped pose.
    pub fn next(&mut self) -> Pose {
        self.pose.dir = rotate(self.pose.dir, ROTATE_SPEED);
        self.pose.plane = cam_plane(self.pose.dir);
        self.pose.timestamp_ns = timestamp_ns();
        self.pose.frame_num = self.pose.frame_num.wrapping_add(1);
        self.pose
    }
}

impl Default for PoseSource {
    fn default() -> Self {
        Self::new()
    }
}
