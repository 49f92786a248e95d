//! Avatar viewport controller.
//!
//! Owns everything one trainer viewport needs: the scene, the camera rig, the
//! render surface and the loaded avatar. All of it lives in a single
//! [`ViewportState`] behind one mutex; background activities (layout wait,
//! render loop, resize observation, asset loads) run on the controller's
//! [`TaskTracker`] and stop on its [`CancellationToken`].
//!
//! ```text
//! initialize ──wait_for_layout──▶ setup ──▶ render loop (every frame)
//!                                       └─▶ resize observation ──▶ on_resize
//! load_or_adopt ──loader.load / preloaded──▶ place + default pose ──▶ scene
//! teardown ──cancel + wait──▶ dispose avatar, surface ──▶ TornDown
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::catalog::{BoneRotation, Expression, HumanoidBone, TrainerProfile};
use crate::config::ViewportConfig;
use crate::error::Result;
use crate::viewport::avatar::LoadedAvatar;
use crate::viewport::camera::CameraRig;
use crate::viewport::container::{ContainerHandle, ViewportSize};
use crate::viewport::loader::ModelLoader;
use crate::viewport::renderer::{RenderBackend, RenderSurface};
use crate::viewport::scene::{Light, Scene};
use crate::viewport::vrm::VrmModel;

/// What the viewport currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportStatus {
    /// The container has not reported a positive size yet.
    Waiting,
    /// Laid out, model not in the scene yet (loading placeholder).
    Loading,
    /// Model in the scene.
    Ready,
    /// The last load failed; nothing to show.
    Empty,
    /// Torn down; no further activity.
    TornDown,
}

impl std::fmt::Display for ViewportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Empty => "empty",
            Self::TornDown => "torn down",
        };
        f.write_str(s)
    }
}

/// Result of [`AvatarViewportController::load_or_adopt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A preloaded model was placed without I/O.
    Adopted,
    /// The model was fetched and placed.
    Loaded,
    /// Fetch or parse failed; the viewport is empty.
    Failed,
    /// Teardown or a newer load won; the result was discarded.
    Cancelled,
}

/// Snapshot of the avatar currently in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarSnapshot {
    pub source_url: String,
    pub model_name: Option<String>,
    pub scale: f32,
    pub y_offset: f32,
    pub yaw: f32,
    pub bones: BTreeMap<HumanoidBone, BoneRotation>,
    pub expressions: BTreeMap<Expression, f32>,
}

impl AvatarSnapshot {
    fn of(avatar: &LoadedAvatar) -> Self {
        let transform = avatar.transform();
        Self {
            source_url: avatar.source_url().to_owned(),
            model_name: avatar.model().name.clone(),
            scale: transform.scale,
            y_offset: transform.position.y,
            yaw: transform.yaw,
            bones: avatar.bone_rotations().clone(),
            expressions: avatar.expression_weights().clone(),
        }
    }
}

#[derive(Default)]
struct ViewportState {
    profile: Option<Arc<TrainerProfile>>,
    scene: Scene,
    camera: Option<CameraRig>,
    surface: Option<Box<dyn RenderSurface>>,
    container: Option<ContainerHandle>,
    current_pose: Option<String>,
    load_generation: u64,
    load_failed: bool,
    torn_down: bool,
}

impl ViewportState {
    fn status(&self) -> ViewportStatus {
        if self.torn_down {
            ViewportStatus::TornDown
        } else if self.camera.is_none() {
            ViewportStatus::Waiting
        } else if self.scene.avatar().is_some() {
            ViewportStatus::Ready
        } else if self.load_failed {
            ViewportStatus::Empty
        } else {
            ViewportStatus::Loading
        }
    }
}

/// Controller for one trainer viewport.
///
/// Cloning yields another handle to the same viewport.
#[derive(Clone)]
pub struct AvatarViewportController {
    state: Arc<Mutex<ViewportState>>,
    backend: Arc<dyn RenderBackend>,
    loader: Arc<dyn ModelLoader>,
    settings: ViewportConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl AvatarViewportController {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        loader: Arc<dyn ModelLoader>,
        settings: ViewportConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewportState::default())),
            backend,
            loader,
            settings,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the viewport once `container` is laid out.
    ///
    /// Returns immediately. Setup, the render loop and resize observation
    /// run in the background until [`teardown`](Self::teardown).
    pub fn initialize(&self, container: ContainerHandle, profile: Arc<TrainerProfile>) {
        {
            let mut state = self.lock();
            if state.torn_down {
                warn!("initialize called on a torn down viewport");
                return;
            }
            state.profile.get_or_insert_with(|| Arc::clone(&profile));
        }

        let this = self.clone();
        self.tracker.spawn(async move {
            let mut handle = container;
            let size = tokio::select! {
                _ = this.cancel.cancelled() => return,
                size = handle.wait_for_layout() => size,
            };
            let Some(size) = size else {
                debug!("container dropped before layout");
                return;
            };
            if let Err(e) = this.setup(&handle, &profile, size) {
                error!(error = %e, "viewport setup failed");
                return;
            }
            this.spawn_render_loop();

            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    changed = handle.changed() => match changed {
                        Some(size) => this.on_resize(size),
                        None => break,
                    },
                }
            }
        });
    }

    fn setup(
        &self,
        handle: &ContainerHandle,
        profile: &TrainerProfile,
        size: ViewportSize,
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let surface = self.backend.create_surface(size)?;
        let camera = CameraRig::new(profile.camera, size, self.settings.near, self.settings.far);
        let fov = camera.fov_y_degrees();

        let mut state = self.lock();
        handle.attach_surface();
        state.container = Some(handle.clone());
        state.surface = Some(surface);
        state.camera = Some(camera);
        state
            .scene
            .add_light(Light::key(self.settings.directional_intensity));
        state
            .scene
            .add_light(Light::ambient(self.settings.ambient_intensity));
        info!(trainer = %profile.id, %size, fov, "viewport initialized");
        Ok(())
    }

    fn spawn_render_loop(&self) {
        let this = self.clone();
        let period = self.settings.frame_interval();
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => this.render_frame(),
                }
            }
            debug!("render loop stopped");
        });
    }

    fn render_frame(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let (Some(surface), Some(camera)) = (state.surface.as_mut(), state.camera.as_ref()) {
            surface.render(&state.scene, camera);
        }
    }

    /// Place a preloaded model, or fetch `profile`'s model.
    ///
    /// Never returns an error: failures are logged and leave the viewport
    /// empty.
    pub async fn load_or_adopt(
        &self,
        profile: Arc<TrainerProfile>,
        preloaded: Option<Arc<VrmModel>>,
    ) -> LoadOutcome {
        let generation = {
            let mut state = self.lock();
            if state.torn_down || self.cancel.is_cancelled() {
                return LoadOutcome::Cancelled;
            }
            state.load_generation += 1;
            state.load_failed = false;
            state.load_generation
        };

        let (model, outcome) = match preloaded {
            Some(model) => (model, LoadOutcome::Adopted),
            None => {
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        debug!(url = %profile.model_url, "load cancelled by teardown");
                        return LoadOutcome::Cancelled;
                    }
                    result = self.loader.load(&profile.model_url) => result,
                };
                match result {
                    Ok(model) => (Arc::new(model), LoadOutcome::Loaded),
                    Err(e) => {
                        error!(url = %profile.model_url, error = %e, "failed to load trainer model");
                        let mut state = self.lock();
                        if state.load_generation == generation {
                            state.load_failed = true;
                        }
                        return LoadOutcome::Failed;
                    }
                }
            }
        };

        let mut state = self.lock();
        if self.cancel.is_cancelled() || state.torn_down || state.load_generation != generation {
            debug!(url = %profile.model_url, "discarding superseded model");
            return LoadOutcome::Cancelled;
        }

        let mut avatar = LoadedAvatar::instantiate(model, profile.model_url.clone());
        avatar.place(profile.model_scale, profile.model_y_offset);
        if let Some(pose) = profile.pose(&profile.default_pose) {
            avatar.apply_pose(pose);
        }
        if let Some(mut previous) = state.scene.attach_avatar(avatar) {
            previous.dispose();
        }
        state.current_pose = Some(profile.default_pose.clone());
        state.profile = Some(Arc::clone(&profile));
        info!(trainer = %profile.id, ?outcome, "trainer model placed");
        outcome
    }

    /// Run [`load_or_adopt`](Self::load_or_adopt) in the background once
    /// `preloaded` resolves.
    pub fn spawn_load<F>(&self, profile: Arc<TrainerProfile>, preloaded: F) -> JoinHandle<LoadOutcome>
    where
        F: Future<Output = Option<Arc<VrmModel>>> + Send + 'static,
    {
        let this = self.clone();
        self.tracker.spawn(async move {
            let model = tokio::select! {
                _ = this.cancel.cancelled() => return LoadOutcome::Cancelled,
                model = preloaded => model,
            };
            this.load_or_adopt(profile, model).await
        })
    }

    /// Apply the named pose of the current trainer.
    ///
    /// Returns `false` (and changes nothing) for an unknown pose or when no
    /// avatar is loaded.
    pub fn apply_pose(&self, name: &str) -> bool {
        let mut state = self.lock();
        let Some(profile) = state.profile.clone() else {
            return false;
        };
        let Some(pose) = profile.pose(name) else {
            debug!(pose = name, trainer = %profile.id, "unknown pose");
            return false;
        };
        let Some(avatar) = state.scene.avatar_mut() else {
            debug!(pose = name, "no avatar to pose");
            return false;
        };
        avatar.apply_pose(pose);
        state.current_pose = Some(name.to_owned());
        true
    }

    /// Re-frame for a new container size. Empty sizes are ignored.
    pub fn on_resize(&self, size: ViewportSize) {
        if size.is_empty() {
            return;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(camera) = state.camera.as_mut() {
            camera.resize(size);
            debug!(%size, fov = camera.fov_y_degrees(), "viewport resized");
        }
        if let Some(surface) = state.surface.as_mut() {
            surface.set_size(size);
        }
    }

    /// Stop every background activity and release the scene.
    ///
    /// Safe before initialization and safe to call more than once.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let mut state = self.lock();
        if state.torn_down {
            return;
        }
        if let Some(mut avatar) = state.scene.detach_avatar() {
            avatar.dispose();
        }
        state.scene.clear_lights();
        if let Some(mut surface) = state.surface.take() {
            surface.dispose();
        }
        if let Some(container) = state.container.take() {
            container.detach_surface();
        }
        state.camera = None;
        state.current_pose = None;
        state.torn_down = true;
        info!("viewport torn down");
    }

    pub fn status(&self) -> ViewportStatus {
        self.lock().status()
    }

    pub fn current_pose(&self) -> Option<String> {
        self.lock().current_pose.clone()
    }

    pub fn avatar(&self) -> Option<AvatarSnapshot> {
        self.lock().scene.avatar().map(AvatarSnapshot::of)
    }

    /// Current vertical field of view in degrees, once laid out.
    pub fn fov_degrees(&self) -> Option<f32> {
        self.lock().camera.as_ref().map(CameraRig::fov_y_degrees)
    }

    /// NDC height of the ground point, once laid out.
    pub fn ground_ndc_y(&self) -> Option<f32> {
        self.lock().camera.as_ref().map(CameraRig::ground_ndc_y)
    }

    pub fn light_count(&self) -> usize {
        self.lock().scene.lights().len()
    }

    /// Background tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}
