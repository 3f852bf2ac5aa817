// In-memory stand-ins for the mod and the host document, shared by the unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glam::DMat4;
use serde_json::json;

use crate::error::{ImportError, TransportError};
use crate::host::{CameraLens, HostDocument, HostImport};
use crate::http::{Method, Request, Response, Transport};
use crate::scene::SceneProperties;
use crate::types::FrameRange;

pub fn status_json(in_progress: bool, frames_recorded: u32) -> Response {
    Response::json(
        200,
        &json!({
            "inProgress": in_progress,
            "startFrame": 0,
            "endFrame": 0,
            "currentFrame": 0,
            "framesRecorded": frames_recorded
        }),
    )
}

struct Route {
    method: Method,
    path: String,
    answers: VecDeque<Result<Response, TransportError>>,
}

#[derive(Default)]
struct Script {
    routes: Vec<Route>,
    log: Vec<Request>,
}

/// Records every request and answers from a per-route queue. The last queued answer
/// repeats; unscripted routes answer 204.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: Method, path: &str, response: Response) -> &Self {
        self.push(method, path, Ok(response))
    }

    pub fn fail(&self, method: Method, path: &str, error: TransportError) -> &Self {
        self.push(method, path, Err(error))
    }

    fn push(&self, method: Method, path: &str, answer: Result<Response, TransportError>) -> &Self {
        let mut script = self.script.borrow_mut();
        match script
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => route.answers.push_back(answer),
            None => script.routes.push(Route {
                method,
                path: path.to_string(),
                answers: VecDeque::from([answer]),
            }),
        }
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.script.borrow().log.clone()
    }

    pub fn requests_to(&self, method: Method, path_prefix: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path().starts_with(path_prefix))
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut script = self.script.borrow_mut();
        script.log.push(request.clone());
        let path = request.path().to_string();
        let route = script
            .routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == path);
        match route {
            Some(route) if route.answers.len() > 1 => route
                .answers
                .pop_front()
                .unwrap_or_else(|| Ok(Response::empty(204))),
            Some(route) => route
                .answers
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(Response::empty(204))),
            None => Ok(Response::empty(204)),
        }
    }
}

type Track = Rc<dyn Fn(i32) -> DMat4>;

/// Host document kept entirely in memory.
pub struct FakeHost {
    pub saved: bool,
    pub scene: SceneProperties,
    pub range: FrameRange,
    pub frame: i32,
    pub frame_log: Vec<i32>,
    pub cursor: DMat4,
    pub lenses: BTreeMap<String, CameraLens>,
    pub time_scale: Rc<dyn Fn(i32) -> f64>,
    objects: BTreeMap<String, Track>,
    pub clips: Vec<(String, PathBuf)>,
    pub backgrounds: Vec<(String, String, f64)>,
    pub environments: Vec<(String, String)>,
    pub keyframes: BTreeMap<String, Vec<(i32, DMat4)>>,
}

impl FakeHost {
    pub fn new() -> Self {
        FakeHost {
            saved: true,
            scene: SceneProperties::default(),
            range: FrameRange::new(1, 250),
            frame: 1,
            frame_log: Vec::new(),
            cursor: DMat4::IDENTITY,
            lenses: BTreeMap::new(),
            time_scale: Rc::new(|_| 1.0),
            objects: BTreeMap::new(),
            clips: Vec::new(),
            backgrounds: Vec::new(),
            environments: Vec::new(),
            keyframes: BTreeMap::new(),
        }
    }

    pub fn add_object(&mut self, name: &str, matrix: DMat4) {
        self.objects.insert(name.to_string(), Rc::new(move |_| matrix));
    }

    pub fn add_animated_object(&mut self, name: &str, track: impl Fn(i32) -> DMat4 + 'static) {
        self.objects.insert(name.to_string(), Rc::new(track));
    }

    pub fn add_camera(&mut self, name: &str, matrix: DMat4) {
        self.add_object(name, matrix);
        self.lenses.insert(name.to_string(), CameraLens::default());
    }
}

impl HostDocument for FakeHost {
    fn is_saved(&self) -> bool {
        self.saved
    }

    fn scene(&self) -> &SceneProperties {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut SceneProperties {
        &mut self.scene
    }

    fn frame_range(&self) -> FrameRange {
        self.range
    }

    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn set_current_frame(&mut self, frame: i32) {
        self.frame_log.push(frame);
        self.frame = frame;
    }

    fn world_matrix(&self, object: &str) -> Option<DMat4> {
        self.objects.get(object).map(|track| track(self.frame))
    }

    fn set_world_matrix(&mut self, object: &str, matrix: DMat4) -> bool {
        if !self.objects.contains_key(object) {
            return false;
        }
        self.add_object(object, matrix);
        true
    }

    fn cursor_matrix(&self) -> DMat4 {
        self.cursor
    }

    fn camera_lens(&self, camera: &str) -> Option<CameraLens> {
        self.lenses.get(camera).copied()
    }

    fn set_camera_lens(&mut self, camera: &str, lens: CameraLens) -> bool {
        match self.lenses.get_mut(camera) {
            Some(slot) => {
                *slot = lens;
                true
            }
            None => false,
        }
    }

    fn time_scale(&self) -> f64 {
        (self.time_scale)(self.frame)
    }
}

impl HostImport for FakeHost {
    fn load_movie_clip(&mut self, path: &Path) -> Result<String, ImportError> {
        if let Some((name, _)) = self.clips.iter().find(|(_, p)| p == path) {
            return Ok(name.clone());
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ImportError::Host(format!("not a file: {}", path.display())))?;
        self.clips.push((name.clone(), path.to_path_buf()));
        Ok(name)
    }

    fn set_camera_background(
        &mut self,
        camera: &str,
        clip: &str,
        alpha: f64,
    ) -> Result<(), ImportError> {
        self.backgrounds
            .push((camera.to_string(), clip.to_string(), alpha));
        Ok(())
    }

    fn set_environment_clip(&mut self, camera: &str, clip: &str) -> Result<(), ImportError> {
        self.environments.push((camera.to_string(), clip.to_string()));
        Ok(())
    }

    fn clear_transform_animation(&mut self, object: &str) -> Result<(), ImportError> {
        self.keyframes.remove(object);
        Ok(())
    }

    fn insert_transform_keyframe(
        &mut self,
        object: &str,
        frame: i32,
        world: DMat4,
    ) -> Result<(), ImportError> {
        self.keyframes
            .entry(object.to_string())
            .or_default()
            .push((frame, world));
        Ok(())
    }
}
