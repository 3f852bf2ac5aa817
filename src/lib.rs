// ow_recorder: recording bridge between a 3D authoring host and the Outer Wilds
// scene-recorder mod. The host document is plumbing; conversions and protocol live here.

mod api;
mod config;
mod coords;
mod error;
mod host;
mod http;
mod import;
mod recorder;
mod scene;
mod task;
mod types;
mod warp;

#[cfg(test)]
mod testing;

pub use api::{
    ApiClient, ApiResult, FramesRecorded, FramesRecordedPoll, GameObject, KeyframeProperty,
    OriginPayload, PlayerSectors, RecordingStatus, ScenePayload, Sector, WarpRequest,
};
pub use config::Preferences;
pub use coords::{
    compose, game_matrix_to_host, game_to_host, host_matrix_to_game, host_to_game, inverse,
    local_of, matrix_from_trs, normalize_rotation, Convention, Game, GameTransform, Host,
    HostTransform, Transform,
};
pub use error::{DriverBusy, ImportError, RecordError, TransformError, TransportError};
pub use host::{CameraLens, HostDocument, HostImport};
pub use http::{Method, Problem, ReqwestTransport, Request, Response, Transport};
pub use import::{
    import_all, import_camera_media, import_transform_recording, read_transform_recording,
    write_transform_recording, ImportSummary, TransformRecording,
};
pub use recorder::{chunk_ranges, record, RecordState, Recorder, RecordingReport};
pub use scene::{
    align_ground_body, ground_body_matrix, set_origin, CameraKind, CameraRecordingConfig,
    RecordingFlags, SceneOrigin, SceneProperties, TransformRecordingConfig,
    TransformRecordingMode,
};
pub use task::{run_blocking, AwaitSet, EventKind, ModalResult, Step, Task, TaskDriver, TaskOutcome};
pub use types::*;
pub use warp::{
    fetch_object_pose, pull_camera_info, push_camera_info, warp_player, warp_request,
    WarpDestination,
};

use glam::DMat4;

/// Main interface for host add-ons: one configured client per session.
pub struct Bridge<T: Transport = ReqwestTransport> {
    prefs: Preferences,
    client: ApiClient<T>,
}

impl Bridge<ReqwestTransport> {
    /// Build from the add-on's preferences JSON.
    pub fn new(prefs_json: &str) -> Result<Bridge, RecordError> {
        let prefs = Preferences::from_json(prefs_json)
            .map_err(|e| RecordError::PreconditionViolated(format!("invalid preferences: {}", e)))?;
        Bridge::from_preferences(prefs)
    }

    pub fn from_preferences(prefs: Preferences) -> Result<Bridge, RecordError> {
        prefs.require_api_port()?;
        let client = ApiClient::from_preferences(&prefs)?;
        Ok(Bridge { prefs, client })
    }

    /// A fresh Record command for the host's task driver.
    pub fn recorder(&self) -> Result<Recorder, RecordError> {
        Recorder::from_preferences(&self.prefs)
    }
}

impl<T: Transport> Bridge<T> {
    pub fn with_client(prefs: Preferences, client: ApiClient<T>) -> Self {
        Bridge { prefs, client }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    pub fn warp<H: HostDocument + ?Sized>(
        &self,
        host: &mut H,
        destination: &WarpDestination,
    ) -> Result<WarpRequest, RecordError> {
        warp_player(&self.client, host, destination)
    }

    pub fn object_pose<H: HostDocument + ?Sized>(
        &self,
        host: &H,
        name: &str,
    ) -> Result<DMat4, RecordError> {
        fetch_object_pose(&self.client, host, name)
    }

    pub fn push_camera_info<H: HostDocument + ?Sized>(
        &self,
        host: &H,
        host_camera: &str,
        mod_camera: &str,
    ) -> Result<(), RecordError> {
        push_camera_info(&self.client, host, host_camera, mod_camera)
    }

    pub fn pull_camera_info<H: HostDocument + ?Sized>(
        &self,
        host: &mut H,
        mod_camera: &str,
        host_camera: &str,
    ) -> Result<CameraLens, RecordError> {
        pull_camera_info(&self.client, host, mod_camera, host_camera)
    }
}
