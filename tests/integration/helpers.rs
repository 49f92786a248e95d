//! Shared doubles and fixtures for integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use fitcoach::capture::{FrameSource, StillFrameSource};
use fitcoach::catalog::{Expression, HumanoidBone, TrainerCatalog, VoiceId};
use fitcoach::chat::TrainerChatClient;
use fitcoach::config::ViewportConfig;
use fitcoach::evaluation::Evaluator;
use fitcoach::shell::ShellServices;
use fitcoach::speech::{AudioSink, SpeechSynthesizer};
use fitcoach::viewport::vrm::{encode_glb, vrm1_document};
use fitcoach::viewport::{HeadlessBackend, ModelLoader, VrmModel};
use fitcoach::{CoachError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Two trainers: A speaks with voice 10, B with voice 20.
pub(crate) const CATALOG_AB: &str = r#"
[[trainer]]
id = "A"
name = "Trainer A"
model_url = "/avatars/a.vrm"
voice_id = 10
default_pose = "rest"

[trainer.poses.rest]

[trainer.poses.cheer]
expression = "happy"
[trainer.poses.cheer.bones]
rightUpperArm = [0.0, 0.0, -1.1]

[trainer.poses.nod]
[trainer.poses.nod.bones]
head = [0.3, 0.0, 0.0]

[[trainer]]
id = "B"
name = "Trainer B"
model_url = "avatars/b.vrm"
voice_id = 20
default_pose = "rest"
model_scale = 1.5

[trainer.poses.rest]

[trainer.poses.cheer]
expression = "happy"
[trainer.poses.cheer.bones]
rightUpperArm = [0.0, 0.0, -1.1]

[trainer.poses.nod]
[trainer.poses.nod.bones]
head = [0.3, 0.0, 0.0]

[trainer.poses.stretch]
[trainer.poses.stretch.bones]
leftUpperArm = [0.0, 0.0, 1.2]
rightUpperArm = [0.0, 0.0, -1.2]
"#;

pub(crate) fn catalog_ab() -> Arc<TrainerCatalog> {
    Arc::new(TrainerCatalog::from_toml_str(CATALOG_AB).expect("valid catalog"))
}

/// A VRM named after `url` with the bones the fixture poses use.
pub(crate) fn model_for(url: &str) -> VrmModel {
    let doc = vrm1_document(
        url,
        &[
            HumanoidBone::Hips,
            HumanoidBone::Head,
            HumanoidBone::LeftUpperArm,
            HumanoidBone::RightUpperArm,
        ],
        &[Expression::Happy],
    );
    VrmModel::parse(&encode_glb(&doc, None)).expect("valid model")
}

/// Serves a model for any URL and records what was requested.
#[derive(Default)]
pub(crate) struct RecordingLoader {
    pub urls: Mutex<Vec<String>>,
}

#[async_trait]
impl ModelLoader for RecordingLoader {
    async fn load(&self, url: &str) -> Result<VrmModel> {
        self.urls.lock().unwrap().push(url.to_owned());
        tokio::task::yield_now().await;
        Ok(model_for(url))
    }
}

pub(crate) struct FailingLoader;

#[async_trait]
impl ModelLoader for FailingLoader {
    async fn load(&self, url: &str) -> Result<VrmModel> {
        Err(CoachError::Asset(format!("GET {url}: 404 Not Found")))
    }
}

pub(crate) struct PendingLoader;

#[async_trait]
impl ModelLoader for PendingLoader {
    async fn load(&self, _url: &str) -> Result<VrmModel> {
        std::future::pending().await
    }
}

/// Answers every frame with the same line and counts calls.
pub(crate) struct ScriptedEvaluator {
    pub line: String,
    pub calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub(crate) fn new(line: &str) -> Arc<Self> {
        Arc::new(Self {
            line: line.to_owned(),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, png: Vec<u8>) -> Result<String> {
        assert!(png.starts_with(b"\x89PNG"), "frames are sent as PNG");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.line.clone())
    }
}

/// Records `(text, voice)` for every synthesis request; the audio is the
/// text itself.
#[derive(Default)]
pub(crate) struct RecordingSynth {
    pub lines: Mutex<Vec<(String, VoiceId)>>,
}

impl RecordingSynth {
    pub(crate) fn lines(&self) -> Vec<(String, VoiceId)> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn synthesize(&self, text: &str, voice: VoiceId) -> Result<Bytes> {
        self.lines.lock().unwrap().push((text.to_owned(), voice));
        Ok(Bytes::from(text.to_owned()))
    }
}

/// Records what reaches the speaker, in order.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub played: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(crate) fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: Bytes, _cancel: CancellationToken) -> Result<()> {
        self.played
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&audio).into_owned());
        Ok(())
    }
}

/// Capture interval long enough that no frame is taken during a test.
pub(crate) const NEVER: Duration = Duration::from_secs(3600);

pub(crate) struct Fixture {
    pub services: ShellServices,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub synth: Arc<RecordingSynth>,
    pub sink: Arc<RecordingSink>,
}

pub(crate) fn fixture(
    loader: Arc<dyn ModelLoader>,
    capture_interval: Duration,
    chat: Option<TrainerChatClient>,
) -> Fixture {
    let evaluator = ScriptedEvaluator::new("Great form!");
    let synth = Arc::new(RecordingSynth::default());
    let sink = Arc::new(RecordingSink::default());
    let services = ShellServices {
        catalog: catalog_ab(),
        loader,
        render: Arc::new(HeadlessBackend::new()),
        evaluator: evaluator.clone(),
        synthesizer: synth.clone(),
        sink: sink.clone(),
        chat,
        frames: Arc::new(|| {
            Box::new(StillFrameSource::solid(4, 4, [200, 120, 40, 255])) as Box<dyn FrameSource>
        }),
        viewport: ViewportConfig {
            frame_rate: 200,
            ..ViewportConfig::default()
        },
        capture_interval,
        speech_enabled: true,
        max_chat_history: 8,
    };
    Fixture {
        services,
        evaluator,
        synth,
        sink,
    }
}

/// Poll `check` until it holds, failing after about two seconds.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
