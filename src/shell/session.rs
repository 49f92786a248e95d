//! A running training session: capture, evaluation routing, speech, chat.
//!
//! Every trainer line (an evaluation or a chat reply) carries a sequence
//! number from the session's [`RequestSequence`]. Lines older than the last
//! one applied are dropped; an applied line picks a new pose, is spoken with
//! the trainer's voice and replaces the overlay text.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::{CaptureCycle, EvaluationEvent, FrameSource, RequestSequence};
use crate::catalog::TrainerProfile;
use crate::chat::{ChatHistory, ChatTurn, TrainerChatClient};
use crate::error::{CoachError, Result};
use crate::evaluation::Evaluator;
use crate::shell::TrainingMenu;
use crate::shell::pose::PoseSelector;
use crate::speech::SpeechClient;
use crate::viewport::AvatarViewportController;

const EVENT_BUFFER: usize = 16;

struct Routing {
    last_applied: u64,
    overlay: Option<String>,
    requested_pose: Option<String>,
    selector: PoseSelector,
    history: ChatHistory,
}

/// State shared between the session handle and its routing task.
struct SessionShared {
    profile: Arc<TrainerProfile>,
    viewport: AvatarViewportController,
    speech: SpeechClient,
    speech_enabled: bool,
    routing: Mutex<Routing>,
}

impl SessionShared {
    fn routing(&self) -> MutexGuard<'_, Routing> {
        self.routing.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply trainer line `seq` unless a newer one was applied already.
    ///
    /// Pose and speech are issued while the routing lock is held, so
    /// concurrent lines take effect in sequence order.
    fn route(&self, seq: u64, text: &str) -> bool {
        let mut routing = self.routing();
        if seq <= routing.last_applied {
            debug!(seq, last = routing.last_applied, "dropping stale trainer line");
            return false;
        }
        routing.last_applied = seq;
        routing.overlay = Some(text.to_owned());
        routing.history.push(ChatTurn::trainer(text));
        let names = self.profile.pose_names();
        let pose = routing.selector.choose(&names).map(str::to_owned);
        routing.requested_pose.clone_from(&pose);

        if let Some(pose) = &pose {
            let applied = self.viewport.apply_pose(pose);
            debug!(seq, pose = %pose, applied, "pose selected");
        }
        if self.speech_enabled {
            self.speech.speak(text, self.profile.voice_id);
        }
        drop(routing);
        info!(seq, text, "trainer line");
        true
    }
}

/// Everything a session needs besides the viewport.
pub(crate) struct SessionParts {
    pub profile: Arc<TrainerProfile>,
    pub menu: TrainingMenu,
    pub viewport: AvatarViewportController,
    pub frames: Box<dyn FrameSource>,
    pub evaluator: Arc<dyn Evaluator>,
    pub capture_interval: Duration,
    pub speech: SpeechClient,
    pub speech_enabled: bool,
    pub chat: Option<TrainerChatClient>,
    pub max_chat_history: usize,
    pub selector: PoseSelector,
}

/// A running session. Ended through
/// [`AppShell::return_to_title`](crate::shell::AppShell::return_to_title).
pub struct Session {
    id: Uuid,
    menu: TrainingMenu,
    shared: Arc<SessionShared>,
    capture: CaptureCycle,
    sequence: RequestSequence,
    chat: Option<TrainerChatClient>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Session {
    pub(crate) fn start(parts: SessionParts) -> Self {
        let id = Uuid::new_v4();
        let shared = Arc::new(SessionShared {
            profile: parts.profile,
            viewport: parts.viewport,
            speech: parts.speech,
            speech_enabled: parts.speech_enabled,
            routing: Mutex::new(Routing {
                last_applied: 0,
                overlay: None,
                requested_pose: None,
                selector: parts.selector,
                history: ChatHistory::new(parts.max_chat_history),
            }),
        });

        let sequence = RequestSequence::new();
        let (tx, mut rx) = mpsc::channel::<EvaluationEvent>(EVENT_BUFFER);
        let capture = CaptureCycle::start(
            parts.frames,
            parts.evaluator,
            parts.capture_interval,
            sequence.clone(),
            tx,
        );

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let route_shared = Arc::clone(&shared);
        let route_cancel = cancel.clone();
        tracker.spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = route_cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Some(event) => {
                        route_shared.route(event.seq, &event.text);
                    }
                    None => break,
                }
            }
            debug!("evaluation routing stopped");
        });

        info!(session = %id, trainer = %shared.profile.id, menu = %parts.menu, "session started");
        Self {
            id,
            menu: parts.menu,
            shared,
            capture,
            sequence,
            chat: parts.chat,
            cancel,
            tracker,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn trainer(&self) -> &Arc<TrainerProfile> {
        &self.shared.profile
    }

    pub fn menu(&self) -> TrainingMenu {
        self.menu
    }

    pub fn viewport(&self) -> &AvatarViewportController {
        &self.shared.viewport
    }

    /// Text shown over the trainer panel.
    pub fn overlay(&self) -> Option<String> {
        self.shared.routing().overlay.clone()
    }

    /// Pose most recently drawn for a trainer line.
    pub fn requested_pose(&self) -> Option<String> {
        self.shared.routing().requested_pose.clone()
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.shared.routing().history.to_vec()
    }

    /// Sequence number of the last applied trainer line.
    pub fn last_applied(&self) -> u64 {
        self.shared.routing().last_applied
    }

    /// Apply a trainer line as if it arrived from the evaluator.
    ///
    /// Returns `false` when `seq` is older than the last applied line.
    pub fn deliver(&self, seq: u64, text: &str) -> bool {
        self.shared.route(seq, text)
    }

    /// Issue the next sequence number for an out-of-band trainer line.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.next()
    }

    /// Ask the trainer something and route the reply like an evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Session`] when chat is not configured or the
    /// session ends first, and [`CoachError::Chat`] when the request fails.
    pub async fn ask(&self, text: &str) -> Result<String> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| CoachError::Session("trainer chat is not configured".into()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CoachError::Session("empty question".into()));
        }

        let seq = self.sequence.next();
        let history = {
            let mut routing = self.shared.routing();
            routing.history.push(ChatTurn::user(text));
            routing.history.to_vec()
        };
        let reply = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(CoachError::Session("session ended".into()));
            }
            reply = chat.reply(&history) => reply?,
        };
        self.shared.route(seq, &reply);
        Ok(reply)
    }

    pub fn active_tasks(&self) -> usize {
        self.tracker.len() + self.capture.active_tasks() + self.shared.speech.active_tasks()
    }

    /// Stop capture, routing and speech, then tear the viewport down.
    pub(crate) async fn end(&self) {
        self.cancel.cancel();
        self.capture.stop().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.shared.speech.shutdown().await;
        self.shared.viewport.teardown().await;
        self.shared.routing().overlay = None;
        info!(session = %self.id, "session ended");
    }
}
