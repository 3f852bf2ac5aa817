// Strong typing for frames, recording progress and camera intrinsics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inclusive frame range of the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i32,
    pub end: i32,
}

impl FrameRange {
    pub fn new(start: i32, end: i32) -> Self {
        FrameRange { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Number of frames, zero when the range is inverted.
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.end as i64 - self.start as i64 + 1) as u32
        }
    }

    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.start && frame <= self.end
    }
}

/// What the orchestrator is currently doing, as shown in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingStage {
    SendingAnimation,
    Recording,
}

/// Live state of one Record command.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    pub in_progress: bool,
    /// 0.0 to 1.0.
    pub progress: f64,
    pub stage: RecordingStage,
    pub animation_chunk_size: u32,
    pub modal_timer_delay: Duration,
}

impl RecordingSession {
    pub fn new(animation_chunk_size: u32, modal_timer_delay: Duration) -> Self {
        RecordingSession {
            in_progress: true,
            progress: 0.0,
            stage: RecordingStage::SendingAnimation,
            animation_chunk_size: animation_chunk_size.max(1),
            modal_timer_delay: modal_timer_delay.max(Duration::from_millis(1)),
        }
    }

    /// Enter a new stage; progress restarts at zero.
    pub fn enter(&mut self, stage: RecordingStage) {
        self.stage = stage;
        self.progress = 0.0;
    }

    /// Raise progress to `done / total`. Never decreases within a stage.
    pub fn advance(&mut self, done: u32, total: u32) {
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        self.progress = self.progress.max(fraction);
    }
}

/// Perspective intrinsics in physical units, as the mod's cameras take them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Sensor width and height in millimetres.
    pub sensor_size: [f64; 2],
    /// Millimetres.
    pub focal_length: f64,
    /// Fraction of the sensor size per axis.
    pub lens_shift: [f64; 2],
    pub near_clip_plane: f64,
    pub far_clip_plane: f64,
}
