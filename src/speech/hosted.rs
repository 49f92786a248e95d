//! Hosted synthesis API: one `GET ?text=&speaker=&key=` returning audio.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::SpeechSynthesizer;
use crate::catalog::VoiceId;
use crate::error::{CoachError, Result};

pub struct HostedSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HostedSynthesizer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CoachError::Speech(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HostedSynthesizer {
    async fn synthesize(&self, text: &str, voice: VoiceId) -> Result<Bytes> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("text", text)])
            .query(&[("speaker", voice)])
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| CoachError::Speech(format!("hosted synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoachError::Speech(format!("hosted synthesis failed: {status}")));
        }
        // Quota and key errors come back as 200 with a JSON body.
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::Speech(format!("hosted synthesis refused: {body}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| CoachError::Speech(format!("cannot read synthesized audio: {e}")))
    }
}
