//! Against a real VOICEVOX engine on `localhost:50021`.
//!
//! Enabled with `--features voicevox`.

use fitcoach::speech::{SpeechSynthesizer, VoicevoxSynthesizer, decode_wav};

#[tokio::test]
async fn engine_synthesizes_playable_wav() {
    let synth = VoicevoxSynthesizer::new("http://localhost:50021", None).unwrap();
    let wav = synth.synthesize("いいフォームです", 2).await.unwrap();
    let audio = decode_wav(&wav).unwrap();
    assert!(audio.sample_rate > 0);
    assert!(audio.duration_secs() > 0.2);
}
