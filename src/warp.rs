// Player warps and one-off queries against the running game, all relative to the
// scene origin.

use glam::DMat4;
use tracing::info;

use crate::api::{ApiClient, WarpRequest};
use crate::coords::{self, GameTransform};
use crate::error::RecordError;
use crate::host::{CameraLens, HostDocument};
use crate::http::Transport;
use crate::scene::SceneOrigin;

/// Where to send the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarpDestination {
    /// The host's 3D cursor.
    Cursor,
    /// A document object, by name.
    Object(String),
    /// The last warp stored on the document.
    Saved,
}

fn require_origin<H: HostDocument + ?Sized>(host: &H) -> Result<SceneOrigin, RecordError> {
    host.scene()
        .origin
        .clone()
        .ok_or_else(|| RecordError::PreconditionViolated("no scene origin set".to_string()))
}

/// Warp request placing the player at `host_world` relative to the origin's parent body.
pub fn warp_request(origin: &SceneOrigin, host_world: &DMat4) -> Result<WarpRequest, RecordError> {
    let local = coords::compose(&origin.game_matrix()?, &coords::host_matrix_to_game(host_world)?);
    let local = GameTransform::from_matrix(&local)?;
    Ok(WarpRequest {
        ground_body: origin.parent.clone(),
        local_position: local.position_array(),
        local_rotation: local.rotation_array(),
    })
}

/// Warp the player and remember the request on the document.
pub fn warp_player<T: Transport, H: HostDocument + ?Sized>(
    client: &ApiClient<T>,
    host: &mut H,
    destination: &WarpDestination,
) -> Result<WarpRequest, RecordError> {
    let request = match destination {
        WarpDestination::Saved => host.scene().saved_warp.clone().ok_or_else(|| {
            RecordError::PreconditionViolated("no saved warp on this document".to_string())
        })?,
        WarpDestination::Cursor => warp_request(&require_origin(&*host)?, &host.cursor_matrix())?,
        WarpDestination::Object(name) => {
            let world = host.world_matrix(name).ok_or_else(|| {
                RecordError::PreconditionViolated(format!("object '{}' not found in document", name))
            })?;
            warp_request(&require_origin(&*host)?, &world)?
        }
    };

    client.warp_player(&request)?;
    info!(ground_body = %request.ground_body, position = ?request.local_position, "player warped");
    host.scene_mut().saved_warp = Some(request.clone());
    Ok(request)
}

/// Host-world matrix of a game object, mapped back through the scene origin.
pub fn fetch_object_pose<T: Transport, H: HostDocument + ?Sized>(
    client: &ApiClient<T>,
    host: &H,
    name: &str,
) -> Result<DMat4, RecordError> {
    let origin = require_origin(host)?;
    let object = client.get_object(name, Some(&origin.parent))?;
    let game_local = coords::local_of(&origin.game_matrix()?, &object.transform.to_matrix())?;
    Ok(coords::game_matrix_to_host(&game_local)?)
}

/// Send a host camera's lens to a mod camera.
pub fn push_camera_info<T: Transport, H: HostDocument + ?Sized>(
    client: &ApiClient<T>,
    host: &H,
    host_camera: &str,
    mod_camera: &str,
) -> Result<(), RecordError> {
    let lens = host.camera_lens(host_camera).ok_or_else(|| {
        RecordError::PreconditionViolated(format!("'{}' is not a camera", host_camera))
    })?;
    client.set_camera_info(mod_camera, &lens.to_camera_info())?;
    Ok(())
}

/// Apply a mod camera's intrinsics to a host camera.
pub fn pull_camera_info<T: Transport, H: HostDocument + ?Sized>(
    client: &ApiClient<T>,
    host: &mut H,
    mod_camera: &str,
    host_camera: &str,
) -> Result<CameraLens, RecordError> {
    let lens = CameraLens::from_camera_info(&client.get_camera_info(mod_camera)?);
    if !host.set_camera_lens(host_camera, lens) {
        return Err(RecordError::PreconditionViolated(format!(
            "'{}' is not a camera",
            host_camera
        )));
    }
    Ok(lens)
}
