// Typed client for the mod's control API. Every call is one blocking round-trip; the mod
// is authoritative on ordering, so rejections come back as TransportError values.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Preferences;
use crate::coords::GameTransform;
use crate::error::TransportError;
use crate::http::{Method, Request, ReqwestTransport, Response, Transport};
use crate::scene::SceneOrigin;
use crate::types::CameraInfo;

pub type ApiResult<T> = Result<T, TransportError>;

/// Animated channels the mod accepts keyframes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyframeProperty {
    FreeCameraTransform,
    HdriPivotTransform,
    FreeCameraInfo,
    TimeScale,
}

impl KeyframeProperty {
    pub const ALL: [KeyframeProperty; 4] = [
        KeyframeProperty::FreeCameraTransform,
        KeyframeProperty::HdriPivotTransform,
        KeyframeProperty::FreeCameraInfo,
        KeyframeProperty::TimeScale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyframeProperty::FreeCameraTransform => "free-camera/transform",
            KeyframeProperty::HdriPivotTransform => "hdri-pivot/transform",
            KeyframeProperty::FreeCameraInfo => "free-camera/camera-info",
            KeyframeProperty::TimeScale => "time/scale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginPayload {
    pub parent: String,
    pub position: [f64; 3],
    /// (x, y, z, w)
    pub rotation: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePayload {
    pub origin: OriginPayload,
    pub hide_player_model: bool,
}

impl ScenePayload {
    pub fn new(origin: &SceneOrigin, hide_player_model: bool) -> Self {
        ScenePayload {
            origin: OriginPayload {
                parent: origin.parent.clone(),
                position: origin.position.to_array(),
                rotation: origin.rotation.to_array(),
            },
            hide_player_model,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub in_progress: bool,
    pub start_frame: i32,
    pub end_frame: i32,
    pub current_frame: i32,
    pub frames_recorded: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameObject {
    pub name: String,
    pub path: String,
    pub transform: GameTransform,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSectors {
    #[serde(default)]
    pub last_entered: Option<Sector>,
    pub sectors: Vec<Sector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpRequest {
    pub ground_body: String,
    pub local_position: [f64; 3],
    /// (x, y, z, w)
    pub local_rotation: [f64; 4],
}

/// Client over any transport; production uses blocking reqwest.
pub struct ApiClient<T = ReqwestTransport> {
    transport: T,
    base_url: String,
}

impl ApiClient<ReqwestTransport> {
    pub fn from_preferences(prefs: &Preferences) -> ApiResult<Self> {
        Ok(ApiClient::new(
            ReqwestTransport::new(prefs.timeout())?,
            prefs.base_url(),
        ))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        ApiClient {
            transport,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn execute(&self, request: Request) -> ApiResult<Response> {
        request.validate()?;
        self.transport.send(&request)?.error_for_status()
    }

    /// (Re)define the scene origin. Must precede keyframes and recorder start.
    pub fn post_scene(&self, scene: &ScenePayload) -> ApiResult<()> {
        self.execute(Request::new(Method::Post, self.url("scene")).json(scene)?)?;
        Ok(())
    }

    /// Send a contiguous block of keyframes starting at `start_frame`; the mod merges.
    pub fn set_keyframes<V: Serialize>(
        &self,
        property: KeyframeProperty,
        start_frame: i32,
        values: &[V],
    ) -> ApiResult<()> {
        let request = Request::new(
            Method::Put,
            self.url(&format!("keyframes/{}", property.as_str())),
        )
        .query("from_frame", start_frame)
        .json(values)?;
        self.execute(request)?;
        Ok(())
    }

    pub fn get_recording_status(&self) -> ApiResult<RecordingStatus> {
        self.execute(Request::new(Method::Get, self.url("recording/status")))?
            .typed_body()
    }

    pub fn set_recorder_enabled(&self, enabled: bool) -> ApiResult<()> {
        self.execute(Request::new(Method::Put, self.url("recording/enabled")).json(&enabled)?)?;
        Ok(())
    }

    /// Lazy, one-shot sequence of recorded-frame counts.
    pub fn frames_recorded_stream(&self, stall_limit: Option<u32>) -> FramesRecorded<'_, T> {
        FramesRecorded {
            client: self,
            poll: FramesRecordedPoll::new(stall_limit),
            interval: Duration::ZERO,
            started: false,
        }
    }

    pub fn get_object(&self, name: &str, origin: Option<&str>) -> ApiResult<GameObject> {
        let mut request = Request::new(
            Method::Get,
            self.url(&format!("objects/{}", urlencoding::encode(name))),
        );
        if let Some(origin) = origin {
            request = request.query("origin", origin);
        }
        self.execute(request)?.typed_body()
    }

    pub fn get_player_sectors(&self) -> ApiResult<PlayerSectors> {
        self.execute(Request::new(Method::Get, self.url("players/sectors")))?
            .typed_body()
    }

    pub fn get_camera_info(&self, camera: &str) -> ApiResult<CameraInfo> {
        self.execute(Request::new(Method::Get, self.camera_info_url(camera)))?
            .typed_body()
    }

    pub fn set_camera_info(&self, camera: &str, info: &CameraInfo) -> ApiResult<()> {
        self.execute(Request::new(Method::Put, self.camera_info_url(camera)).json(info)?)?;
        Ok(())
    }

    fn camera_info_url(&self, camera: &str) -> String {
        self.url(&format!("cameras/{}/info", urlencoding::encode(camera)))
    }

    pub fn warp_player(&self, warp: &WarpRequest) -> ApiResult<()> {
        self.execute(Request::new(Method::Post, self.url("players/warp")).json(warp)?)?;
        Ok(())
    }
}

/// Poll state behind `FramesRecorded`, usable one step at a time from a cooperative task.
///
/// The sequence ends when the recorder reports it is no longer in progress and the count
/// stops changing, when a request fails (the error is the last item), or after
/// `stall_limit` consecutive unchanged polls. A recorder that has not started yet (never
/// in progress, nothing recorded) counts toward the stall limit instead of ending it.
#[derive(Debug, Clone, Default)]
pub struct FramesRecordedPoll {
    last: Option<u32>,
    seen_active: bool,
    unchanged: u32,
    stall_limit: Option<u32>,
    finished: bool,
    stalled: bool,
}

impl FramesRecordedPoll {
    pub fn new(stall_limit: Option<u32>) -> Self {
        FramesRecordedPoll {
            stall_limit,
            ..Default::default()
        }
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn poll<T: Transport>(&mut self, client: &ApiClient<T>) -> Option<ApiResult<u32>> {
        if self.finished {
            return None;
        }

        let status = match client.get_recording_status() {
            Ok(status) => status,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };

        let count = status.frames_recorded;
        let changed = self.last != Some(count);
        self.seen_active |= status.in_progress || count > 0;

        if !changed {
            if !status.in_progress && self.seen_active {
                self.finished = true;
                return None;
            }
            self.unchanged += 1;
            if self.stall_limit.is_some_and(|limit| self.unchanged >= limit) {
                tracing::warn!(frames_recorded = count, polls = self.unchanged, "recorder stalled");
                self.finished = true;
                self.stalled = true;
                return None;
            }
        } else {
            self.unchanged = 0;
        }

        self.last = Some(count);
        Some(Ok(count))
    }
}

pub struct FramesRecorded<'a, T> {
    client: &'a ApiClient<T>,
    poll: FramesRecordedPoll,
    interval: Duration,
    started: bool,
}

impl<T> FramesRecorded<'_, T> {
    /// Sleep this long between polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> &FramesRecordedPoll {
        &self.poll
    }
}

impl<T: Transport> Iterator for FramesRecorded<'_, T> {
    type Item = ApiResult<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.started && !self.poll.is_finished() && !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        self.started = true;
        self.poll.poll(self.client)
    }
}

impl<T: Transport> std::iter::FusedIterator for FramesRecorded<'_, T> {}
