// Document-side recording configuration: scene origin, ground body, per-camera and
// per-object recording settings, and the progress flags the UI reads.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::api::WarpRequest;
use crate::coords::{self, GameTransform, Transform};
use crate::error::TransformError;
use crate::host::HostDocument;
use crate::types::RecordingStage;

/// Where host-world zero sits in the game, in game coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneOrigin {
    pub parent: String,
    pub position: DVec3,
    /// Unit quaternion, game convention.
    pub rotation: DQuat,
}

impl SceneOrigin {
    pub fn new(
        parent: impl Into<String>,
        position: DVec3,
        rotation: DQuat,
    ) -> Result<Self, TransformError> {
        Ok(SceneOrigin {
            parent: parent.into(),
            position,
            rotation: coords::normalize_rotation(rotation)?,
        })
    }

    pub fn game_transform(&self) -> Result<GameTransform, TransformError> {
        Transform::new(self.position, self.rotation, DVec3::ONE)
    }

    /// Origin pose in the parent's frame, game convention.
    pub fn game_matrix(&self) -> Result<DMat4, TransformError> {
        Ok(self.game_transform()?.to_matrix())
    }

    /// Origin converted to host coordinates.
    pub fn host_matrix(&self) -> Result<DMat4, TransformError> {
        Ok(self.game_transform()?.to_host_matrix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraKind {
    #[default]
    None,
    Perspective,
    Equirectangular,
}

const MIN_FACE_SIZE: u32 = 10;

fn default_face_size() -> u32 {
    1024
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecordingConfig {
    pub kind: CameraKind,
    /// Set while the mod is recording this camera.
    #[serde(default)]
    pub is_recording_enabled: bool,
    #[serde(default)]
    pub color_recording_path: Option<PathBuf>,
    #[serde(default)]
    pub depth_recording_path: Option<PathBuf>,
    #[serde(default = "default_face_size")]
    equirect_face_size: u32,
}

impl Default for CameraRecordingConfig {
    fn default() -> Self {
        CameraRecordingConfig {
            kind: CameraKind::None,
            is_recording_enabled: false,
            color_recording_path: None,
            depth_recording_path: None,
            equirect_face_size: default_face_size(),
        }
    }
}

impl CameraRecordingConfig {
    pub fn perspective(color: impl Into<PathBuf>) -> Self {
        CameraRecordingConfig {
            kind: CameraKind::Perspective,
            color_recording_path: Some(color.into()),
            ..Default::default()
        }
    }

    pub fn equirectangular(color: impl Into<PathBuf>, face_size: u32) -> Self {
        let mut config = CameraRecordingConfig {
            kind: CameraKind::Equirectangular,
            color_recording_path: Some(color.into()),
            ..Default::default()
        };
        config.set_equirect_face_size(face_size);
        config
    }

    pub fn with_depth(mut self, depth: impl Into<PathBuf>) -> Self {
        self.depth_recording_path = Some(depth.into());
        self
    }

    /// A camera records when it has a kind and somewhere to write color.
    pub fn is_active(&self) -> bool {
        self.kind != CameraKind::None
            && self
                .color_recording_path
                .as_deref()
                .is_some_and(|p| !p.as_os_str().is_empty())
    }

    /// Depth is only recorded for perspective cameras.
    pub fn depth_path(&self) -> Option<&Path> {
        match self.kind {
            CameraKind::Perspective => self
                .depth_recording_path
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty()),
            _ => None,
        }
    }

    pub fn equirect_face_size(&self) -> u32 {
        self.equirect_face_size.max(MIN_FACE_SIZE)
    }

    pub fn set_equirect_face_size(&mut self, size: u32) {
        self.equirect_face_size = size.max(MIN_FACE_SIZE);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformRecordingMode {
    /// The game captures the in-game object's transform every frame.
    Record,
    /// Host keyframes are handed to the game.
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecordingConfig {
    pub recording_path: PathBuf,
    pub mode: TransformRecordingMode,
}

/// Progress flags mirrored for the UI while a Record command runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordingFlags {
    pub in_progress: bool,
    pub progress: f64,
    pub stage: Option<RecordingStage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneProperties {
    #[serde(default)]
    pub origin: Option<SceneOrigin>,
    /// Host object standing in for the origin's parent body.
    #[serde(default)]
    pub ground_body: Option<String>,
    #[serde(default)]
    pub hide_player_model: bool,
    /// Host camera driving the mod's free camera. Falls back to the first active camera.
    #[serde(default)]
    pub free_camera: Option<String>,
    /// Host object driving the HDRI pivot.
    #[serde(default)]
    pub hdri_pivot: Option<String>,
    #[serde(default)]
    pub cameras: BTreeMap<String, CameraRecordingConfig>,
    #[serde(default)]
    pub transform_recordings: BTreeMap<String, TransformRecordingConfig>,
    #[serde(default)]
    pub saved_warp: Option<WarpRequest>,
    #[serde(skip)]
    pub recording: RecordingFlags,
}

impl SceneProperties {
    pub fn active_cameras(&self) -> impl Iterator<Item = (&str, &CameraRecordingConfig)> {
        self.cameras
            .iter()
            .filter(|(_, config)| config.is_active())
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn has_active_camera(&self) -> bool {
        self.active_cameras().next().is_some()
    }

    pub fn objects_with_mode(
        &self,
        mode: TransformRecordingMode,
    ) -> impl Iterator<Item = (&str, &TransformRecordingConfig)> {
        self.transform_recordings
            .iter()
            .filter(move |(_, config)| config.mode == mode)
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn free_camera_name(&self) -> Option<&str> {
        self.free_camera
            .as_deref()
            .or_else(|| self.active_cameras().map(|(name, _)| name).next())
    }

    /// Explicit pivot, else the first equirectangular camera, else the free camera.
    pub fn hdri_pivot_name(&self) -> Option<&str> {
        self.hdri_pivot
            .as_deref()
            .or_else(|| {
                self.active_cameras()
                    .find(|(_, c)| c.kind == CameraKind::Equirectangular)
                    .map(|(name, _)| name)
            })
            .or_else(|| self.free_camera_name())
    }

    pub fn set_recording_enabled_on_active(&mut self, enabled: bool) {
        for config in self.cameras.values_mut() {
            config.is_recording_enabled = enabled && config.is_active();
        }
    }
}

/// World matrix placing the ground body so host-world zero coincides with the origin.
pub fn ground_body_matrix(origin: &SceneOrigin) -> Result<DMat4, TransformError> {
    let host_origin = origin.host_matrix()?;
    Ok(DMat4::from_rotation_x(FRAC_PI_2) * coords::inverse(&host_origin)?)
}

/// Re-place the ground body placeholder. Returns false when there is nothing to place.
pub fn align_ground_body<H: HostDocument + ?Sized>(host: &mut H) -> Result<bool, TransformError> {
    let scene = host.scene();
    let (Some(origin), Some(body)) = (scene.origin.clone(), scene.ground_body.clone()) else {
        return Ok(false);
    };
    let matrix = ground_body_matrix(&origin)?;
    if !host.set_world_matrix(&body, matrix) {
        tracing::warn!(ground_body = %body, "ground body object missing from document");
        return Ok(false);
    }
    tracing::debug!(ground_body = %body, parent = %origin.parent, "ground body aligned");
    Ok(true)
}

/// Store a new origin and realign the ground body.
pub fn set_origin<H: HostDocument + ?Sized>(
    host: &mut H,
    origin: SceneOrigin,
) -> Result<(), TransformError> {
    host.scene_mut().origin = Some(origin);
    align_ground_body(host)?;
    Ok(())
}
