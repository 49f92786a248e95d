//! VOICEVOX engine client.
//!
//! Synthesis is two calls: `POST /audio_query?speaker=&text=` returns a
//! query document, which is posted back to `POST /synthesis?speaker=` to get
//! WAV bytes.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use super::SpeechSynthesizer;
use crate::catalog::VoiceId;
use crate::error::{CoachError, Result};

pub struct VoicevoxSynthesizer {
    client: reqwest::Client,
    base_url: String,
}

impl VoicevoxSynthesizer {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CoachError::Speech(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn audio_query(&self, text: &str, voice: VoiceId) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("speaker", voice)])
            .query(&[("text", text)])
            .send()
            .await
            .map_err(|e| CoachError::Speech(format!("audio_query request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoachError::Speech(format!("audio_query failed: {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| CoachError::Speech(format!("audio_query returned invalid JSON: {e}")))
    }
}

#[async_trait]
impl SpeechSynthesizer for VoicevoxSynthesizer {
    async fn synthesize(&self, text: &str, voice: VoiceId) -> Result<Bytes> {
        let query = self.audio_query(text, voice).await?;
        debug!(voice, "audio query ready");

        let response = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", voice)])
            .json(&query)
            .send()
            .await
            .map_err(|e| CoachError::Speech(format!("synthesis request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoachError::Speech(format!("synthesis failed: {status}")));
        }
        response
            .bytes()
            .await
            .map_err(|e| CoachError::Speech(format!("cannot read synthesized audio: {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_query_then_synthesis() {
        let server = MockServer::start().await;
        let query = serde_json::json!({ "accent_phrases": [], "speedScale": 1.0 });
        Mock::given(method("POST"))
            .and(path("/audio_query"))
            .and(query_param("speaker", "8"))
            .and(query_param("text", "いいフォームです"))
            .respond_with(ResponseTemplate::new(200).set_body_json(query.clone()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/synthesis"))
            .and(query_param("speaker", "8"))
            .and(body_json(query))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF....WAVE".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let synth = VoicevoxSynthesizer::new(server.uri(), None).unwrap();
        let audio = synth.synthesize("いいフォームです", 8).await.unwrap();
        assert_eq!(&audio[..], b"RIFF....WAVE");
    }

    #[tokio::test]
    async fn failed_query_skips_synthesis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio_query"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/synthesis"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let synth = VoicevoxSynthesizer::new(format!("{}/", server.uri()), None).unwrap();
        let err = synth.synthesize("hi", 1).await.unwrap_err();
        assert!(err.to_string().contains("audio_query failed"));
    }
}
