//! Title → session → title scenarios through `AppShell`.

use crate::helpers::{
    FailingLoader, NEVER, PendingLoader, RecordingLoader, eventually, fixture,
};
use fitcoach::shell::{PoseSelector, SlotState};
use fitcoach::viewport::{ViewportStatus, ViewportContainer, ViewportSize};
use fitcoach::{AppShell, CoachError, ShellState, TrainingMenu};
use std::sync::Arc;
use std::time::Duration;

fn container() -> ViewportContainer {
    ViewportContainer::new(ViewportSize::new(640, 480))
}

#[tokio::test]
async fn selected_trainer_drives_model_and_voice() {
    let loader = Arc::new(RecordingLoader::default());
    let fx = fixture(loader.clone(), Duration::from_millis(20), None);
    let mut shell = AppShell::new(fx.services);
    assert_eq!(shell.state(), ShellState::Title);
    assert_eq!(shell.selection().trainer_id, "A");

    shell.select_trainer("B").unwrap();
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();
    let b_url = session.trainer().model_url.clone();
    assert_eq!(b_url, "avatars/b.vrm");

    eventually(|| viewport.avatar().is_some_and(|a| a.source_url == b_url)).await;
    let avatar = viewport.avatar().unwrap();
    assert_eq!(avatar.scale, 1.5);
    assert!(viewport.current_pose().is_some());

    eventually(|| !fx.synth.lines().is_empty()).await;
    let (text, voice) = fx.synth.lines()[0].clone();
    assert_eq!(text, "Great form!");
    assert_eq!(voice, 20);
    assert_eq!(session.overlay().as_deref(), Some("Great form!"));

    shell.return_to_title().await.unwrap();
    assert_eq!(shell.state(), ShellState::Title);
    shell.shutdown().await;

    // Both trainers were preloaded once on the title screen.
    let mut urls = loader.urls.lock().unwrap().clone();
    urls.sort();
    urls.dedup();
    assert_eq!(urls, ["/avatars/a.vrm", "/avatars/b.vrm"]);
}

#[tokio::test]
async fn seeded_pose_matches_identically_seeded_selector() {
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, None);
    let mut shell = AppShell::new(fx.services).with_pose_seed(42);
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();
    eventually(|| viewport.status() == ViewportStatus::Ready).await;

    let names = session.trainer().pose_names();
    let expected = PoseSelector::seeded(42).choose(&names).map(str::to_owned);
    assert!(expected.is_some());

    assert!(session.deliver(session.next_sequence(), "Great form!"));
    assert_eq!(session.requested_pose(), expected);
    assert_eq!(viewport.current_pose(), expected);
    assert_eq!(session.overlay().as_deref(), Some("Great form!"));

    shell.shutdown().await;
}

#[tokio::test]
async fn stale_lines_are_dropped() {
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, None);
    let mut shell = AppShell::new(fx.services);
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();

    let older = session.next_sequence();
    let newer = session.next_sequence();
    assert!(newer > older);

    assert!(session.deliver(newer, "Keep your hips level"));
    assert!(!session.deliver(older, "Lower your hips"));
    assert_eq!(session.last_applied(), newer);
    assert_eq!(session.overlay().as_deref(), Some("Keep your hips level"));

    eventually(|| !fx.synth.lines().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let spoken: Vec<String> = fx.synth.lines().into_iter().map(|(t, _)| t).collect();
    assert_eq!(spoken, ["Keep your hips level"]);

    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text, "Keep your hips level");

    shell.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_lines_settle_on_the_newest() {
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, None);
    let mut shell = AppShell::new(fx.services).with_pose_seed(7);
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();
    eventually(|| viewport.status() == ViewportStatus::Ready).await;

    let runtime = tokio::runtime::Handle::current();
    for round in 0..20 {
        let seqs: Vec<u64> = (0..8).map(|_| session.next_sequence()).collect();
        let newest = *seqs.last().unwrap();
        std::thread::scope(|scope| {
            for &seq in seqs.iter().rev() {
                let runtime = runtime.clone();
                scope.spawn(move || {
                    let _guard = runtime.enter();
                    session.deliver(seq, &format!("line {seq}"));
                });
            }
        });

        let expected = format!("line {newest}");
        assert_eq!(session.last_applied(), newest, "round {round}");
        assert_eq!(session.overlay().as_deref(), Some(expected.as_str()));
        assert_eq!(viewport.current_pose(), session.requested_pose());
        eventually(|| fx.sink.played().last() == Some(&expected)).await;
    }

    shell.shutdown().await;
}

#[tokio::test]
async fn returning_to_title_stops_everything() {
    let fx = fixture(
        Arc::new(RecordingLoader::default()),
        Duration::from_millis(10),
        None,
    );
    let mut shell = AppShell::new(fx.services);
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();
    eventually(|| fx.evaluator.calls() >= 2).await;
    assert!(session.active_tasks() > 0);

    shell.return_to_title().await.unwrap();
    assert_eq!(shell.state(), ShellState::Title);
    assert!(shell.session().is_none());
    assert_eq!(viewport.status(), ViewportStatus::TornDown);
    assert_eq!(viewport.active_tasks(), 0);
    assert_eq!(container.attached_surfaces(), 0);

    let calls = fx.evaluator.calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.evaluator.calls(), calls);

    // A second session starts cleanly.
    let container = self::container();
    let session = shell.start_session(container.handle()).unwrap();
    assert_eq!(session.trainer().id, "A");
    assert!(session.overlay().is_none());
    shell.shutdown().await;
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let fx = fixture(Arc::new(RecordingLoader::default()), NEVER, None);
    let mut shell = AppShell::new(fx.services);

    assert!(matches!(
        shell.return_to_title().await,
        Err(CoachError::Session(_))
    ));
    assert!(matches!(
        shell.select_trainer("Z"),
        Err(CoachError::Catalog(_))
    ));
    assert_eq!(shell.selection().trainer_id, "A");

    shell.select_menu(TrainingMenu::Plank).unwrap();
    let container = container();
    shell.start_session(container.handle()).unwrap();
    assert_eq!(shell.state(), ShellState::Session);

    assert!(matches!(shell.select_trainer("B"), Err(CoachError::Session(_))));
    assert!(matches!(
        shell.select_menu(TrainingMenu::Plank),
        Err(CoachError::Session(_))
    ));
    let other = self::container();
    assert!(matches!(
        shell.start_session(other.handle()),
        Err(CoachError::Session(_))
    ));
    assert_eq!(shell.session().unwrap().trainer().id, "A");

    shell.shutdown().await;
}

#[tokio::test]
async fn failed_model_leaves_viewport_empty() {
    let fx = fixture(Arc::new(FailingLoader), NEVER, None);
    let mut shell = AppShell::new(fx.services);
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();

    eventually(|| viewport.status() == ViewportStatus::Empty).await;
    assert!(viewport.avatar().is_none());
    assert!(matches!(
        shell.cache().state("/avatars/a.vrm"),
        Some(SlotState::Failed(_))
    ));

    // Lines are still shown and spoken without a model.
    let session = shell.session().unwrap();
    assert!(session.deliver(session.next_sequence(), "Breathe steadily"));
    assert!(session.requested_pose().is_some());
    assert!(viewport.current_pose().is_none());
    eventually(|| !fx.synth.lines().is_empty()).await;

    shell.shutdown().await;
}

#[tokio::test]
async fn leaving_before_the_model_arrives_is_clean() {
    let fx = fixture(Arc::new(PendingLoader), NEVER, None);
    let mut shell = AppShell::new(fx.services);
    let container = container();
    let session = shell.start_session(container.handle()).unwrap();
    let viewport = session.viewport().clone();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(viewport.status(), ViewportStatus::Loading);

    shell.return_to_title().await.unwrap();
    assert_eq!(viewport.status(), ViewportStatus::TornDown);
    assert_eq!(viewport.active_tasks(), 0);
    assert!(viewport.avatar().is_none());

    tokio::time::timeout(Duration::from_secs(2), shell.shutdown())
        .await
        .expect("shutdown cancels pending preloads");
    assert!(matches!(
        shell.cache().state("/avatars/a.vrm"),
        Some(SlotState::Failed(_))
    ));
}
