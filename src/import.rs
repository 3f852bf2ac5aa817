// Brings recorder output back into the host: movie clips and backgrounds for cameras,
// keyframes for transform recordings. Also writes replay recordings for the mod.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::GameTransform;
use crate::error::ImportError;
use crate::host::HostImport;
use crate::scene::{CameraKind, CameraRecordingConfig};

/// On-disk transform recording: one game-space transform per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecording {
    pub values: Vec<GameTransform>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    /// Names of the clips loaded or reused.
    pub clips: Vec<String>,
    /// Objects that received keyframes, with the keyframe count.
    pub keyframed: Vec<(String, usize)>,
}

/// Attach a camera's recorded media.
pub fn import_camera_media<H: HostImport + ?Sized>(
    host: &mut H,
    camera: &str,
    config: &CameraRecordingConfig,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let Some(color_path) = config.color_recording_path.as_deref() else {
        return Ok(());
    };

    let color = host.load_movie_clip(color_path)?;
    match config.kind {
        CameraKind::Perspective => host.set_camera_background(camera, &color, 1.0)?,
        CameraKind::Equirectangular => host.set_environment_clip(camera, &color)?,
        CameraKind::None => {}
    }
    summary.clips.push(color);

    if let Some(depth_path) = config.depth_path() {
        summary.clips.push(host.load_movie_clip(depth_path)?);
    }

    tracing::debug!(camera, "camera media imported");
    Ok(())
}

pub fn read_transform_recording(path: &Path) -> Result<TransformRecording, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ImportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_transform_recording(path: &Path, values: &[GameTransform]) -> Result<(), ImportError> {
    let io_error = |source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(
        &mut writer,
        &TransformRecording {
            values: values.to_vec(),
        },
    )
    .map_err(|source| ImportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

/// Replace the object's transform animation with one keyframe per recorded frame,
/// starting at `frame_start`. Returns the number of keyframes inserted.
pub fn import_transform_recording<H: HostImport + ?Sized>(
    host: &mut H,
    object: &str,
    path: &Path,
    frame_start: i32,
) -> Result<usize, ImportError> {
    let recording = read_transform_recording(path)?;

    host.clear_transform_animation(object)?;
    for (i, value) in recording.values.iter().enumerate() {
        host.insert_transform_keyframe(object, frame_start + i as i32, value.to_host_matrix())?;
    }

    tracing::debug!(object, keyframes = recording.values.len(), "transform recording imported");
    Ok(recording.values.len())
}

/// Import everything a finished recording produced.
pub fn import_all<H: HostImport + ?Sized>(
    host: &mut H,
    cameras: &[(String, CameraRecordingConfig)],
    recordings: &[(String, PathBuf)],
    frame_start: i32,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();
    for (camera, config) in cameras.iter().filter(|(_, c)| c.is_active()) {
        import_camera_media(host, camera, config, &mut summary)?;
    }
    for (object, path) in recordings {
        let count = import_transform_recording(host, object, path, frame_start)?;
        summary.keyframed.push((object.clone(), count));
    }
    Ok(summary)
}
