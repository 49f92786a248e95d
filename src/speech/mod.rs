//! Voice feedback: synthesize trainer lines and play them.
//!
//! A [`SpeechClient`] runs at most one utterance at a time. Each call to
//! [`SpeechClient::speak`] cancels the utterance in flight, so only the
//! latest line is ever heard.

pub mod hosted;
pub mod sink;
pub mod voicevox;

pub use hosted::HostedSynthesizer;
pub use sink::{AudioSink, CpalSink, DecodedAudio, NullSink, decode_wav};
pub use voicevox::VoicevoxSynthesizer;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::catalog::VoiceId;
use crate::config::{SpeechConfig, SpeechEngine};
use crate::error::Result;

/// Text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with speaker `voice`, returning encoded audio.
    async fn synthesize(&self, text: &str, voice: VoiceId) -> Result<Bytes>;
}

/// Build the configured synthesizer.
pub fn synthesizer_from_config(
    config: &SpeechConfig,
    timeout: Option<Duration>,
) -> Result<Arc<dyn SpeechSynthesizer>> {
    Ok(match config.engine {
        SpeechEngine::Voicevox => Arc::new(VoicevoxSynthesizer::new(&config.voicevox_url, timeout)?),
        SpeechEngine::Hosted => Arc::new(HostedSynthesizer::new(
            &config.hosted_url,
            &config.hosted_api_key,
            timeout,
        )?),
    })
}

/// Build the configured sink, falling back to [`NullSink`] when playback is
/// off or no output device is usable.
pub fn sink_from_config(config: &SpeechConfig) -> Arc<dyn AudioSink> {
    if !config.playback {
        return Arc::new(NullSink);
    }
    match CpalSink::new(config.output_device.clone()) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!(error = %e, "audio output unavailable, speech will be silent");
            Arc::new(NullSink)
        }
    }
}

/// Speaks trainer lines, latest request wins.
pub struct SpeechClient {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    root: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
    tracker: TaskTracker,
    requests: AtomicU64,
}

impl SpeechClient {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            synthesizer,
            sink,
            root: CancellationToken::new(),
            current: Mutex::new(None),
            tracker: TaskTracker::new(),
            requests: AtomicU64::new(0),
        }
    }

    /// Synthesize and play `text` in the background.
    ///
    /// Empty text issues no request and returns `false`. Otherwise the
    /// previous utterance is cancelled and `true` is returned.
    pub fn speak(&self, text: &str, voice: VoiceId) -> bool {
        let text = text.trim();
        if text.is_empty() {
            debug!("empty text, nothing to speak");
            return false;
        }
        if self.root.is_cancelled() {
            debug!("speech client shut down, dropping line");
            return false;
        }

        let token = self.root.child_token();
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
        }
        let id = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        let synthesizer = Arc::clone(&self.synthesizer);
        let sink = Arc::clone(&self.sink);
        let text = text.to_owned();
        self.tracker.spawn(async move {
            let audio = tokio::select! {
                _ = token.cancelled() => {
                    debug!(id, "speech superseded before synthesis finished");
                    return;
                }
                audio = synthesizer.synthesize(&text, voice) => audio,
            };
            let audio = match audio {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(id, voice, error = %e, "speech synthesis failed");
                    return;
                }
            };
            if token.is_cancelled() {
                debug!(id, "speech superseded, audio discarded");
                return;
            }
            info!(id, voice, bytes = audio.len(), "speaking");
            if let Err(e) = sink.play(audio, token).await {
                warn!(id, error = %e, "speech playback failed");
            }
        });
        true
    }

    /// Cancel everything and wait for background work to stop.
    pub async fn shutdown(&self) {
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Requests issued so far (empty text excluded).
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}
