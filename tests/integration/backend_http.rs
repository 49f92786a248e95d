//! Sessions wired to HTTP backends served by wiremock.

use crate::helpers::{CATALOG_AB, NEVER, RecordingLoader, eventually, fixture};
use fitcoach::capture::{FrameSource, StillFrameSource};
use fitcoach::chat::{ChatTurn, TrainerChatClient};
use fitcoach::config::{AssetConfig, CoachConfig};
use fitcoach::evaluation::EvaluationClient;
use fitcoach::shell::ShellServices;
use fitcoach::speech::{NullSink, synthesizer_from_config};
use fitcoach::viewport::vrm::{encode_glb, vrm1_document};
use fitcoach::viewport::{HeadlessBackend, ViewportStatus, loader_from_config};
use fitcoach::catalog::{Expression, HumanoidBone};
use fitcoach::{AppShell, CoachError, TrainerCatalog, ViewportContainer, ViewportSize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn glb(name: &str) -> Vec<u8> {
    let doc = vrm1_document(
        name,
        &[HumanoidBone::Hips, HumanoidBone::Head, HumanoidBone::RightUpperArm],
        &[Expression::Happy],
    );
    encode_glb(&doc, None)
}

async fn mount_assets(server: &MockServer) {
    for (route, name) in [("/avatars/a.vrm", "Trainer A"), ("/avatars/b.vrm", "Trainer B")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(glb(name)))
            .mount(server)
            .await;
    }
}

async fn mount_voicevox(server: &MockServer) {
    let query = json!({ "accent_phrases": [], "speedScale": 1.0 });
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF....WAVE".to_vec()))
        .mount(server)
        .await;
}

/// Services built from configuration the same way the binary builds them.
fn services_from_config(config: &CoachConfig) -> ShellServices {
    let timeout = config.backend.timeout();
    ShellServices {
        catalog: Arc::new(TrainerCatalog::from_toml_str(CATALOG_AB).unwrap()),
        loader: loader_from_config(&config.assets, timeout).unwrap(),
        render: Arc::new(HeadlessBackend::new()),
        evaluator: Arc::new(EvaluationClient::from_config(&config.backend).unwrap()),
        synthesizer: synthesizer_from_config(&config.speech, timeout).unwrap(),
        sink: Arc::new(NullSink),
        chat: Some(TrainerChatClient::from_config(&config.backend).unwrap()),
        frames: Arc::new(|| {
            Box::new(StillFrameSource::solid(8, 8, [30, 30, 30, 255])) as Box<dyn FrameSource>
        }),
        viewport: config.viewport.clone(),
        capture_interval: config.capture.interval(),
        speech_enabled: config.speech.enabled,
        max_chat_history: config.backend.max_chat_history,
    }
}

#[tokio::test]
async fn http_backends_drive_a_session() {
    let server = MockServer::start().await;
    mount_assets(&server).await;
    mount_voicevox(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/post_image"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "evaluation": "Nice plank" })),
        )
        .mount(&server)
        .await;

    let mut config = CoachConfig::default();
    config.backend.base_url = server.uri();
    config.speech.voicevox_url = server.uri();
    config.capture.interval_ms = 25;
    config.assets = AssetConfig {
        base_url: Some(server.uri()),
        ..AssetConfig::default()
    };

    let mut shell = AppShell::new(services_from_config(&config));
    let container = ViewportContainer::new(ViewportSize::new(320, 240));
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();

    eventually(|| viewport.status() == ViewportStatus::Ready).await;
    assert_eq!(
        viewport.avatar().unwrap().model_name.as_deref(),
        Some("Trainer A")
    );
    eventually(|| session.overlay().as_deref() == Some("Nice plank")).await;

    // Trainer A speaks with voice 10.
    let mut spoke = false;
    for _ in 0..200 {
        let requests = server.received_requests().await.unwrap_or_default();
        spoke = requests.iter().any(|r| {
            r.url.path() == "/synthesis"
                && r.url.query_pairs().any(|(k, v)| k == "speaker" && v == "10")
        });
        if spoke {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(spoke, "no synthesis request for voice 10");

    shell.shutdown().await;
}

#[tokio::test]
async fn chat_reply_is_routed_like_an_evaluation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({
            "history": [{ "speaker": "user", "text": "How long should I hold?" }]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "reply": "Thirty more seconds!" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let chat = TrainerChatClient::new(format!("{}/api/chat", server.uri()), None).unwrap();
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, Some(chat));
    let mut shell = AppShell::new(fx.services);
    let container = ViewportContainer::new(ViewportSize::new(320, 240));
    let session = shell.start_session(container.handle()).unwrap();

    let reply = session.ask("  How long should I hold?  ").await.unwrap();
    assert_eq!(reply, "Thirty more seconds!");
    assert_eq!(session.overlay().as_deref(), Some("Thirty more seconds!"));
    assert!(session.requested_pose().is_some());
    assert_eq!(
        session.history(),
        [
            ChatTurn::user("How long should I hold?"),
            ChatTurn::trainer("Thirty more seconds!"),
        ]
    );
    eventually(|| {
        fx.synth
            .lines()
            .contains(&("Thirty more seconds!".to_owned(), 10))
    })
    .await;

    shell.shutdown().await;
}

#[tokio::test]
async fn newer_evaluation_supersedes_slow_chat_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "reply": "Late answer" }))
                .set_delay(Duration::from_millis(150)),
        )
        .mount(&server)
        .await;

    let chat = TrainerChatClient::new(format!("{}/api/chat", server.uri()), None).unwrap();
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, Some(chat));
    let mut shell = AppShell::new(fx.services);
    let container = ViewportContainer::new(ViewportSize::new(320, 240));
    let session = shell.start_session(container.handle()).unwrap();

    let (reply, delivered) = tokio::join!(session.ask("Am I doing well?"), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.deliver(session.next_sequence(), "Straighten your back")
    });
    assert_eq!(reply.unwrap(), "Late answer");
    assert!(delivered);
    assert_eq!(session.overlay().as_deref(), Some("Straighten your back"));

    shell.shutdown().await;
}

#[tokio::test]
async fn chat_requires_a_backend_and_a_question() {
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, None);
    let mut shell = AppShell::new(fx.services);
    let container = ViewportContainer::new(ViewportSize::new(320, 240));
    let session = shell.start_session(container.handle()).unwrap();
    assert!(matches!(
        session.ask("hello").await,
        Err(CoachError::Session(_))
    ));
    shell.shutdown().await;

    let server = MockServer::start().await;
    let chat = TrainerChatClient::new(format!("{}/api/chat", server.uri()), None).unwrap();
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, Some(chat));
    let mut shell = AppShell::new(fx.services);
    let session = shell.start_session(container.handle()).unwrap();
    assert!(matches!(session.ask("   ").await, Err(CoachError::Session(_))));
    assert!(matches!(session.ask("hello").await, Err(CoachError::Chat(_))));
    shell.shutdown().await;
}
