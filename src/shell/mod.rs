//! Application shell: the `Title → Session → Title` state machine.
//!
//! The title screen holds the trainer and training-menu selections and warms
//! the model cache. Starting a session builds a viewport for the selected
//! trainer, adopts its preloaded model (or fetches it), and starts the
//! capture cycle whose evaluations drive pose, speech and overlay text.

pub mod cache;
pub mod pose;
pub mod session;

pub use cache::{ModelCache, SlotState};
pub use pose::PoseSelector;
pub use session::Session;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::capture::FrameSource;
use crate::catalog::TrainerCatalog;
use crate::chat::TrainerChatClient;
use crate::config::ViewportConfig;
use crate::error::{CoachError, Result};
use crate::evaluation::Evaluator;
use crate::speech::{AudioSink, SpeechClient, SpeechSynthesizer};
use crate::viewport::{AvatarViewportController, ContainerHandle, ModelLoader, RenderBackend};
use session::SessionParts;

/// Training menu offered on the title screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrainingMenu {
    #[default]
    Plank,
}

impl TrainingMenu {
    pub const ALL: [TrainingMenu; 1] = [TrainingMenu::Plank];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plank => "plank",
        }
    }
}

impl std::fmt::Display for TrainingMenu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingMenu {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoachError::Session(format!("unknown training menu '{s}'")))
    }
}

/// Which screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Title,
    Session,
}

/// Title-screen selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub trainer_id: String,
    pub menu: TrainingMenu,
}

/// Builds a fresh frame source for each session.
pub type FrameSourceFactory = Arc<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

/// Collaborators the shell wires into each session.
#[derive(Clone)]
pub struct ShellServices {
    pub catalog: Arc<TrainerCatalog>,
    pub loader: Arc<dyn ModelLoader>,
    pub render: Arc<dyn RenderBackend>,
    pub evaluator: Arc<dyn Evaluator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub sink: Arc<dyn AudioSink>,
    pub chat: Option<TrainerChatClient>,
    pub frames: FrameSourceFactory,
    pub viewport: ViewportConfig,
    pub capture_interval: Duration,
    pub speech_enabled: bool,
    pub max_chat_history: usize,
}

/// The application state machine.
pub struct AppShell {
    services: ShellServices,
    cache: Arc<ModelCache>,
    selection: Selection,
    session: Option<Session>,
    pose_seed: Option<u64>,
}

impl AppShell {
    /// Create the shell on the title screen and start preloading models.
    pub fn new(services: ShellServices) -> Self {
        let cache = Arc::new(ModelCache::new(Arc::clone(&services.loader)));
        let selection = Selection {
            trainer_id: services.catalog.first().id.clone(),
            menu: TrainingMenu::default(),
        };
        let shell = Self {
            services,
            cache,
            selection,
            session: None,
            pose_seed: None,
        };
        shell.enter_title();
        shell
    }

    /// Seed pose selection so sessions pick poses reproducibly.
    pub fn with_pose_seed(mut self, seed: u64) -> Self {
        self.pose_seed = Some(seed);
        self
    }

    fn enter_title(&self) {
        let started = self.cache.preload_all(&self.services.catalog);
        debug!(started, "title screen: preloading trainer models");
    }

    pub fn state(&self) -> ShellState {
        if self.session.is_some() {
            ShellState::Session
        } else {
            ShellState::Title
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn catalog(&self) -> &Arc<TrainerCatalog> {
        &self.services.catalog
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn require_title(&self, action: &str) -> Result<()> {
        match self.state() {
            ShellState::Title => Ok(()),
            ShellState::Session => Err(CoachError::Session(format!(
                "cannot {action} during a session"
            ))),
        }
    }

    /// Select a trainer by catalog id.
    ///
    /// # Errors
    ///
    /// Fails outside the title screen or for an unknown id.
    pub fn select_trainer(&mut self, id: &str) -> Result<()> {
        self.require_title("select a trainer")?;
        if self.services.catalog.get(id).is_none() {
            return Err(CoachError::Catalog(format!("unknown trainer '{id}'")));
        }
        self.selection.trainer_id = id.to_owned();
        info!(trainer = id, "trainer selected");
        Ok(())
    }

    /// Select the training menu.
    ///
    /// # Errors
    ///
    /// Fails outside the title screen.
    pub fn select_menu(&mut self, menu: TrainingMenu) -> Result<()> {
        self.require_title("select a menu")?;
        self.selection.menu = menu;
        Ok(())
    }

    /// Leave the title screen and start a session in `container`.
    ///
    /// Does not wait for preloading; the viewport adopts the cached model
    /// when it is ready, or fetches it if the preload failed.
    ///
    /// # Errors
    ///
    /// Fails when a session is already running.
    pub fn start_session(&mut self, container: ContainerHandle) -> Result<&Session> {
        self.require_title("start a session")?;
        let profile = self
            .services
            .catalog
            .get(&self.selection.trainer_id)
            .cloned()
            .ok_or_else(|| {
                CoachError::Catalog(format!("unknown trainer '{}'", self.selection.trainer_id))
            })?;

        let viewport = AvatarViewportController::new(
            Arc::clone(&self.services.render),
            Arc::clone(&self.services.loader),
            self.services.viewport.clone(),
        );
        viewport.initialize(container, Arc::clone(&profile));
        viewport.spawn_load(Arc::clone(&profile), self.cache.wait(&profile.model_url));

        let speech = SpeechClient::new(
            Arc::clone(&self.services.synthesizer),
            Arc::clone(&self.services.sink),
        );
        let session = Session::start(SessionParts {
            profile,
            menu: self.selection.menu,
            viewport,
            frames: (self.services.frames)(),
            evaluator: Arc::clone(&self.services.evaluator),
            capture_interval: self.services.capture_interval,
            speech,
            speech_enabled: self.services.speech_enabled,
            chat: self.services.chat.clone(),
            max_chat_history: self.services.max_chat_history,
            selector: PoseSelector::new(self.pose_seed),
        });
        Ok(self.session.insert(session))
    }

    /// End the session and go back to the title screen.
    ///
    /// # Errors
    ///
    /// Fails when no session is running.
    pub async fn return_to_title(&mut self) -> Result<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| CoachError::Session("no session to leave".into()))?;
        session.end().await;
        self.enter_title();
        Ok(())
    }

    /// End any session and stop preloading.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.end().await;
        }
        self.cache.shutdown().await;
    }
}
