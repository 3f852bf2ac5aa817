// Record command: validate, push the scene, stream host animation in chunks, run the
// mod's recorder, then import what it wrote. Runs as a cooperative task so the host UI
// stays responsive between chunks and polls.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use glam::DMat4;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, FramesRecordedPoll, KeyframeProperty, ScenePayload};
use crate::config::Preferences;
use crate::coords::{self, GameTransform, HostTransform};
use crate::error::RecordError;
use crate::host::{HostDocument, HostImport};
use crate::http::{ReqwestTransport, Transport};
use crate::import::{self, ImportSummary};
use crate::scene::{CameraRecordingConfig, RecordingFlags, SceneOrigin, TransformRecordingMode};
use crate::task::{run_blocking, AwaitSet, Step, Task, TaskOutcome};
use crate::types::{CameraInfo, FrameRange, RecordingSession, RecordingStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Validating,
    PushScene,
    StreamAnimation,
    StartRecorder,
    PollProgress,
    Import,
    Done,
    Failed,
    Cancelled,
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Done | RecordState::Failed | RecordState::Cancelled
        )
    }
}

/// What a finished recording did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingReport {
    pub frames_streamed: u32,
    pub frames_recorded: u32,
    /// Non-fatal problems, such as rejected keyframe chunks.
    pub warnings: Vec<String>,
    pub import: ImportSummary,
}

/// Split `range` into consecutive chunks of at most `chunk_size` frames.
pub fn chunk_ranges(range: FrameRange, chunk_size: u32) -> Vec<FrameRange> {
    if range.is_empty() {
        return Vec::new();
    }
    let size = chunk_size.max(1) as i64;
    let end = range.end as i64;
    (range.start as i64..=end)
        .step_by(size as usize)
        .map(|start| FrameRange::new(start as i32, (start + size - 1).min(end) as i32))
        .collect()
}

/// Everything validation resolved up front.
#[derive(Debug, Clone)]
struct RecordingPlan {
    frames: FrameRange,
    origin: SceneOrigin,
    hide_player_model: bool,
    ground_body: Option<String>,
    free_camera: String,
    hdri_pivot: String,
    chunks: Vec<FrameRange>,
    cameras: Vec<(String, CameraRecordingConfig)>,
    replays: Vec<(String, PathBuf)>,
    records: Vec<(String, PathBuf)>,
}

#[derive(Debug, Default)]
struct ChunkSamples {
    free_camera: Vec<GameTransform>,
    hdri_pivot: Vec<GameTransform>,
    camera_info: Vec<CameraInfo>,
    time_scale: Vec<f64>,
}

impl ChunkSamples {
    fn with_capacity(frames: usize) -> Self {
        ChunkSamples {
            free_camera: Vec::with_capacity(frames),
            hdri_pivot: Vec::with_capacity(frames),
            camera_info: Vec::with_capacity(frames),
            time_scale: Vec::with_capacity(frames),
        }
    }

    fn sample<H: HostDocument + ?Sized>(
        &mut self,
        host: &H,
        plan: &RecordingPlan,
    ) -> Result<(), RecordError> {
        let ground_body = plan.ground_body.as_deref();
        let lens = host
            .camera_lens(&plan.free_camera)
            .ok_or_else(|| missing_object(&plan.free_camera))?;

        self.free_camera
            .push(sample_pose(host, ground_body, &plan.free_camera)?);
        self.hdri_pivot
            .push(sample_pose(host, ground_body, &plan.hdri_pivot)?);
        self.camera_info.push(lens.to_camera_info());
        self.time_scale.push(host.time_scale());
        Ok(())
    }
}

/// Pose of `object` relative to the ground body, in game convention.
fn sample_pose<H: HostDocument + ?Sized>(
    host: &H,
    ground_body: Option<&str>,
    object: &str,
) -> Result<GameTransform, RecordError> {
    let world = host
        .world_matrix(object)
        .ok_or_else(|| missing_object(object))?;
    let parent = match ground_body {
        Some(body) => host.world_matrix(body).ok_or_else(|| missing_object(body))?,
        None => DMat4::IDENTITY,
    };
    let local = coords::local_of(&parent, &world)?;
    Ok(HostTransform::from_matrix(&local)?.to_game())
}

fn missing_object(name: &str) -> RecordError {
    RecordError::PreconditionViolated(format!("object '{}' not found in document", name))
}

fn missing_plan() -> RecordError {
    RecordError::PreconditionViolated("recording was not validated".to_string())
}

fn mirror_flags<H: HostDocument + ?Sized>(host: &mut H, session: &RecordingSession) {
    host.scene_mut().recording = RecordingFlags {
        in_progress: session.in_progress,
        progress: session.progress,
        stage: Some(session.stage),
    };
}

/// The Record command as a resumable state machine.
pub struct Recorder<T: Transport = ReqwestTransport> {
    client: ApiClient<T>,
    state: RecordState,
    has_api_port: bool,
    stall_limit: Option<u32>,
    session: RecordingSession,
    plan: Option<RecordingPlan>,
    next_chunk: usize,
    saved_frame: Option<i32>,
    poll: FramesRecordedPoll,
    replay_values: BTreeMap<String, Vec<GameTransform>>,
    report: RecordingReport,
}

impl Recorder<ReqwestTransport> {
    pub fn from_preferences(prefs: &Preferences) -> Result<Self, RecordError> {
        prefs.require_api_port()?;
        Ok(Recorder::new(ApiClient::from_preferences(prefs)?, prefs))
    }
}

impl<T: Transport> Recorder<T> {
    pub fn new(client: ApiClient<T>, prefs: &Preferences) -> Self {
        let mut session = RecordingSession::new(prefs.chunk_size(), prefs.timer_delay());
        session.in_progress = false;
        Recorder {
            client,
            state: RecordState::Idle,
            has_api_port: prefs.has_api_port(),
            stall_limit: prefs.stall_poll_limit,
            session,
            plan: None,
            next_chunk: 0,
            saved_frame: None,
            poll: FramesRecordedPoll::new(prefs.stall_poll_limit),
            replay_values: BTreeMap::new(),
            report: RecordingReport::default(),
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    pub fn timer_delay(&self) -> Duration {
        self.session.modal_timer_delay
    }

    fn enter(&mut self, state: RecordState) {
        debug!(from = ?self.state, to = ?state, "recorder state");
        self.state = state;
    }

    fn advance<H: HostDocument + HostImport>(
        &mut self,
        host: &mut H,
    ) -> Result<Step<RecordingReport>, RecordError> {
        loop {
            match self.state {
                RecordState::Idle => self.enter(RecordState::Validating),
                RecordState::Validating => {
                    let plan = self.validate(&*host)?;
                    self.begin(host, plan);
                    self.enter(RecordState::PushScene);
                }
                RecordState::PushScene => {
                    self.push_scene()?;
                    self.enter(RecordState::StreamAnimation);
                }
                RecordState::StreamAnimation => {
                    if self.stream_next_chunk(host)? {
                        return Ok(Step::Await(AwaitSet::TIMER));
                    }
                    self.finish_stream(host);
                    self.enter(RecordState::StartRecorder);
                }
                RecordState::StartRecorder => {
                    self.start_recorder(host)?;
                    self.enter(RecordState::PollProgress);
                    return Ok(Step::Await(AwaitSet::TIMER));
                }
                RecordState::PollProgress => {
                    if self.poll_progress(host)? {
                        return Ok(Step::Await(AwaitSet::TIMER));
                    }
                    self.enter(RecordState::Import);
                }
                RecordState::Import => {
                    self.import(host)?;
                    self.enter(RecordState::Done);
                }
                RecordState::Done => {
                    self.session.in_progress = false;
                    clear_scene_flags(host);
                    let report = std::mem::take(&mut self.report);
                    info!(
                        frames_recorded = report.frames_recorded,
                        warnings = report.warnings.len(),
                        "recording finished"
                    );
                    return Ok(Step::Complete(report));
                }
                RecordState::Failed | RecordState::Cancelled => {
                    return Err(RecordError::PreconditionViolated(
                        "recording already ended".to_string(),
                    ));
                }
            }
        }
    }

    /// Local checks first so a misconfigured document never touches the network.
    fn validate<H: HostDocument + ?Sized>(&self, host: &H) -> Result<RecordingPlan, RecordError> {
        let violated = |reason: &str| RecordError::PreconditionViolated(reason.to_string());

        if !host.is_saved() {
            return Err(violated("save the document before recording"));
        }
        let scene = host.scene();
        let origin = scene
            .origin
            .clone()
            .ok_or_else(|| violated("no scene origin set"))?;
        origin.game_transform()?;
        if !scene.has_active_camera() {
            return Err(violated("no camera has an active recording configuration"));
        }
        if !self.has_api_port {
            return Err(violated("no API port configured in preferences"));
        }

        let frames = host.frame_range();
        if frames.is_empty() {
            return Err(RecordError::PreconditionViolated(format!(
                "frame end {} is before frame start {}",
                frames.end, frames.start
            )));
        }

        let free_camera = scene
            .free_camera_name()
            .ok_or_else(|| violated("no free camera"))?
            .to_string();
        if host.camera_lens(&free_camera).is_none() {
            return Err(RecordError::PreconditionViolated(format!(
                "free camera '{}' is not a camera in the document",
                free_camera
            )));
        }
        let hdri_pivot = scene
            .hdri_pivot_name()
            .unwrap_or(free_camera.as_str())
            .to_string();

        let ground_body = scene.ground_body.clone();
        let replays: Vec<(String, PathBuf)> = scene
            .objects_with_mode(TransformRecordingMode::Replay)
            .map(|(name, config)| (name.to_string(), config.recording_path.clone()))
            .collect();
        let records: Vec<(String, PathBuf)> = scene
            .objects_with_mode(TransformRecordingMode::Record)
            .map(|(name, config)| (name.to_string(), config.recording_path.clone()))
            .collect();

        let required = [Some(&free_camera), Some(&hdri_pivot), ground_body.as_ref()];
        let tracked = replays.iter().map(|(name, _)| Some(name));
        for name in required.into_iter().chain(tracked).flatten() {
            if host.world_matrix(name).is_none() {
                return Err(missing_object(name));
            }
        }

        let status = self.client.get_recording_status().map_err(|err| {
            RecordError::PreconditionViolated(format!("mod API not reachable: {}", err))
        })?;
        if status.in_progress {
            return Err(violated("the game is already recording"));
        }

        Ok(RecordingPlan {
            frames,
            chunks: chunk_ranges(frames, self.session.animation_chunk_size),
            hide_player_model: scene.hide_player_model,
            cameras: scene
                .active_cameras()
                .map(|(name, config)| (name.to_string(), config.clone()))
                .collect(),
            origin,
            ground_body,
            free_camera,
            hdri_pivot,
            replays,
            records,
        })
    }

    fn begin<H: HostDocument + ?Sized>(&mut self, host: &mut H, plan: RecordingPlan) {
        info!(
            start = plan.frames.start,
            end = plan.frames.end,
            chunks = plan.chunks.len(),
            free_camera = %plan.free_camera,
            "recording started"
        );
        self.session = RecordingSession::new(
            self.session.animation_chunk_size,
            self.session.modal_timer_delay,
        );
        self.saved_frame = Some(host.current_frame());
        self.next_chunk = 0;
        self.replay_values.clear();
        self.report = RecordingReport::default();
        self.plan = Some(plan);
        mirror_flags(host, &self.session);
    }

    fn push_scene(&mut self) -> Result<(), RecordError> {
        let plan = self.plan.as_ref().ok_or_else(missing_plan)?;
        let payload = ScenePayload::new(&plan.origin, plan.hide_player_model);
        self.client
            .post_scene(&payload)
            .map_err(RecordError::SceneRejected)?;
        info!(parent = %plan.origin.parent, "scene pushed");
        Ok(())
    }

    /// Sample and send one chunk. Returns true while more chunks remain.
    fn stream_next_chunk<H: HostDocument + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<bool, RecordError> {
        let plan = self.plan.as_ref().ok_or_else(missing_plan)?;
        let Some(chunk) = plan.chunks.get(self.next_chunk).copied() else {
            return Ok(false);
        };
        let total = plan.frames.len();

        let mut samples = ChunkSamples::with_capacity(chunk.len() as usize);
        for frame in chunk.start..=chunk.end {
            host.set_current_frame(frame);
            let actual = host.current_frame();
            if actual != frame {
                warn!(requested = frame, actual, "host did not move to the requested frame");
            }

            samples.sample(&*host, plan)?;
            for (object, _) in &plan.replays {
                let pose = sample_pose(&*host, plan.ground_body.as_deref(), object)?;
                self.replay_values
                    .entry(object.clone())
                    .or_default()
                    .push(pose);
            }

            self.report.frames_streamed += 1;
            self.session.advance(self.report.frames_streamed, total);
            mirror_flags(host, &self.session);
        }

        self.next_chunk += 1;
        let more = self.next_chunk < plan.chunks.len();
        self.send_chunk(chunk.start, &samples);
        debug!(start = chunk.start, end = chunk.end, "animation chunk sent");
        Ok(more)
    }

    /// Keyframe rejections are reported but do not stop the recording.
    fn send_chunk(&mut self, start_frame: i32, samples: &ChunkSamples) {
        let results = [
            (
                KeyframeProperty::FreeCameraTransform,
                self.client.set_keyframes(
                    KeyframeProperty::FreeCameraTransform,
                    start_frame,
                    &samples.free_camera,
                ),
            ),
            (
                KeyframeProperty::HdriPivotTransform,
                self.client.set_keyframes(
                    KeyframeProperty::HdriPivotTransform,
                    start_frame,
                    &samples.hdri_pivot,
                ),
            ),
            (
                KeyframeProperty::FreeCameraInfo,
                self.client.set_keyframes(
                    KeyframeProperty::FreeCameraInfo,
                    start_frame,
                    &samples.camera_info,
                ),
            ),
            (
                KeyframeProperty::TimeScale,
                self.client.set_keyframes(
                    KeyframeProperty::TimeScale,
                    start_frame,
                    &samples.time_scale,
                ),
            ),
        ];

        for (property, result) in results {
            if let Err(err) = result {
                warn!(property = property.as_str(), start_frame, error = %err, "keyframes rejected");
                self.report.warnings.push(format!(
                    "keyframes {} from frame {}: {}",
                    property.as_str(),
                    start_frame,
                    err
                ));
            }
        }
    }

    fn finish_stream<H: HostDocument + ?Sized>(&mut self, host: &mut H) {
        self.restore_frame(host);

        let Some(plan) = self.plan.as_ref() else {
            return;
        };
        for (object, path) in &plan.replays {
            let values = self.replay_values.remove(object).unwrap_or_default();
            match import::write_transform_recording(path, &values) {
                Ok(()) => debug!(object = %object, frames = values.len(), "replay written"),
                Err(err) => {
                    warn!(object = %object, error = %err, "replay not written");
                    self.report.warnings.push(err.to_string());
                }
            }
        }
    }

    fn start_recorder<H: HostDocument + ?Sized>(&mut self, host: &mut H) -> Result<(), RecordError> {
        self.client
            .set_recorder_enabled(true)
            .map_err(RecordError::RecorderStartFailed)?;

        self.session.enter(RecordingStage::Recording);
        self.poll = FramesRecordedPoll::new(self.stall_limit);
        host.scene_mut().set_recording_enabled_on_active(true);
        mirror_flags(host, &self.session);
        info!("game recorder started");
        Ok(())
    }

    /// One status poll. Returns true while the recorder is still going.
    fn poll_progress<H: HostDocument + ?Sized>(&mut self, host: &mut H) -> Result<bool, RecordError> {
        let plan = self.plan.as_ref().ok_or_else(missing_plan)?;
        let expected = plan.frames.len();

        match self.poll.poll(&self.client) {
            Some(Ok(recorded)) => {
                self.report.frames_recorded = recorded;
                self.session.advance(recorded, expected);
                mirror_flags(host, &self.session);
                Ok(true)
            }
            Some(Err(err)) => {
                let recorded = self.poll.last().unwrap_or(0);
                warn!(error = %err, recorded, "lost contact with the recorder");
                Err(RecordError::IncompleteRecording { recorded, expected })
            }
            None => {
                let recorded = self.poll.last().unwrap_or(0);
                if recorded < expected {
                    return Err(RecordError::IncompleteRecording { recorded, expected });
                }
                Ok(false)
            }
        }
    }

    fn import<H: HostImport + ?Sized>(&mut self, host: &mut H) -> Result<(), RecordError> {
        let plan = self.plan.as_ref().ok_or_else(missing_plan)?;
        self.report.import =
            import::import_all(host, &plan.cameras, &plan.records, plan.frames.start)?;
        info!(
            clips = self.report.import.clips.len(),
            keyframed = self.report.import.keyframed.len(),
            "import finished"
        );
        Ok(())
    }

    fn restore_frame<H: HostDocument + ?Sized>(&mut self, host: &mut H) {
        if let Some(frame) = self.saved_frame.take() {
            host.set_current_frame(frame);
        }
    }

    fn abort<H: HostDocument + ?Sized>(&mut self, host: &mut H, state: RecordState) {
        self.restore_frame(host);
        self.session.in_progress = false;
        clear_scene_flags(host);
        self.state = state;
    }
}

fn clear_scene_flags<H: HostDocument + ?Sized>(host: &mut H) {
    let scene = host.scene_mut();
    scene.set_recording_enabled_on_active(false);
    scene.recording = RecordingFlags::default();
}

impl<T: Transport, H: HostDocument + HostImport> Task<H> for Recorder<T> {
    type Output = RecordingReport;
    type Error = RecordError;

    fn step(&mut self, host: &mut H) -> Result<Step<RecordingReport>, RecordError> {
        self.advance(host).map_err(|err| {
            error!(state = ?self.state, reason = %err, "recording failed");
            self.abort(host, RecordState::Failed);
            err
        })
    }

    fn cancelled(&mut self, host: &mut H) {
        info!(state = ?self.state, "recording cancelled");
        self.abort(host, RecordState::Cancelled);
    }
}

/// Run a whole recording on the calling thread, sleeping between steps.
pub fn record<H: HostDocument + HostImport>(
    host: &mut H,
    prefs: &Preferences,
) -> Result<RecordingReport, RecordError> {
    let recorder = Recorder::from_preferences(prefs)?;
    let delay = recorder.timer_delay();
    match run_blocking(recorder, host, delay) {
        TaskOutcome::Completed(report) => Ok(report),
        TaskOutcome::Failed(err) => Err(err),
        TaskOutcome::Cancelled => Err(RecordError::Cancelled),
    }
}
