// Seams to the authoring host. The host owns the document, its frame cursor and all
// node-tree, clip and keyframe machinery; the recorder only talks through these traits.

use std::path::Path;

use glam::DMat4;

use crate::error::ImportError;
use crate::scene::SceneProperties;
use crate::types::{CameraInfo, FrameRange};

/// Host-side perspective camera settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLens {
    /// Millimetres.
    pub sensor_width: f64,
    pub sensor_height: f64,
    pub focal_length: f64,
    /// Measured in units of the larger sensor dimension.
    pub shift_x: f64,
    pub shift_y: f64,
    pub clip_start: f64,
    pub clip_end: f64,
}

impl Default for CameraLens {
    fn default() -> Self {
        CameraLens {
            sensor_width: 36.0,
            sensor_height: 24.0,
            focal_length: 50.0,
            shift_x: 0.0,
            shift_y: 0.0,
            clip_start: 0.1,
            clip_end: 1000.0,
        }
    }
}

impl CameraLens {
    fn larger_dimension(&self) -> f64 {
        self.sensor_width.max(self.sensor_height)
    }

    pub fn to_camera_info(&self) -> CameraInfo {
        let larger = self.larger_dimension();
        CameraInfo {
            sensor_size: [self.sensor_width, self.sensor_height],
            focal_length: self.focal_length,
            lens_shift: [
                per_axis_shift(self.shift_x, larger, self.sensor_width),
                per_axis_shift(self.shift_y, larger, self.sensor_height),
            ],
            near_clip_plane: self.clip_start,
            far_clip_plane: self.clip_end,
        }
    }

    pub fn from_camera_info(info: &CameraInfo) -> Self {
        let [sensor_width, sensor_height] = info.sensor_size;
        let larger = sensor_width.max(sensor_height);
        CameraLens {
            sensor_width,
            sensor_height,
            focal_length: info.focal_length,
            shift_x: per_axis_shift(info.lens_shift[0], sensor_width, larger),
            shift_y: per_axis_shift(info.lens_shift[1], sensor_height, larger),
            clip_start: info.near_clip_plane,
            clip_end: info.far_clip_plane,
        }
    }
}

fn per_axis_shift(shift: f64, from: f64, to: f64) -> f64 {
    if to > 0.0 {
        shift * from / to
    } else {
        0.0
    }
}

/// Read access to the open document plus its frame cursor.
pub trait HostDocument {
    /// Whether the document has a file on disk.
    fn is_saved(&self) -> bool;

    fn scene(&self) -> &SceneProperties;

    fn scene_mut(&mut self) -> &mut SceneProperties;

    fn frame_range(&self) -> FrameRange;

    fn current_frame(&self) -> i32;

    /// Move the frame cursor; animated values are re-evaluated before this returns.
    fn set_current_frame(&mut self, frame: i32);

    /// World matrix of a named object at the current frame.
    fn world_matrix(&self, object: &str) -> Option<DMat4>;

    /// Returns false when the object does not exist.
    fn set_world_matrix(&mut self, object: &str, matrix: DMat4) -> bool;

    /// World matrix of the 3D cursor.
    fn cursor_matrix(&self) -> DMat4;

    fn camera_lens(&self, camera: &str) -> Option<CameraLens>;

    fn set_camera_lens(&mut self, camera: &str, lens: CameraLens) -> bool;

    /// Value of the scene's time-scale property at the current frame.
    fn time_scale(&self) -> f64;
}

/// Write access used when recorder output comes back.
pub trait HostImport {
    /// Load or reuse a movie clip bound to `path`; returns the clip name.
    fn load_movie_clip(&mut self, path: &Path) -> Result<String, ImportError>;

    fn set_camera_background(&mut self, camera: &str, clip: &str, alpha: f64)
        -> Result<(), ImportError>;

    /// Use the clip's still as the environment map driven by `camera`.
    fn set_environment_clip(&mut self, camera: &str, clip: &str) -> Result<(), ImportError>;

    /// Remove location, rotation and scale animation from the object.
    fn clear_transform_animation(&mut self, object: &str) -> Result<(), ImportError>;

    fn insert_transform_keyframe(
        &mut self,
        object: &str,
        frame: i32,
        world: DMat4,
    ) -> Result<(), ImportError>;
}
