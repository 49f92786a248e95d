//! Remote form evaluation: upload a PNG frame, receive coaching text.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::{CoachError, Result};

/// Turns a captured frame into evaluation text.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate one PNG-encoded frame.
    async fn evaluate(&self, png: Vec<u8>) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct EvaluationResponse {
    evaluation: String,
}

/// HTTP client for the evaluation endpoint.
///
/// Sends `multipart/form-data` with one `image` field (`frame.png`,
/// `image/png`) and expects `{"evaluation": "..."}` back.
#[derive(Debug, Clone)]
pub struct EvaluationClient {
    client: reqwest::Client,
    url: String,
}

impl EvaluationClient {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CoachError::Evaluation(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(backend: &BackendConfig) -> Result<Self> {
        Self::new(backend.evaluate_url(), backend.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Evaluator for EvaluationClient {
    async fn evaluate(&self, png: Vec<u8>) -> Result<String> {
        let size = png.len();
        let part = Part::bytes(png)
            .file_name("frame.png")
            .mime_str("image/png")
            .map_err(|e| CoachError::Evaluation(format!("invalid part: {e}")))?;
        let form = Form::new().part("image", part);

        debug!(url = %self.url, bytes = size, "uploading frame");
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoachError::Evaluation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "evaluation endpoint returned error");
            return Err(CoachError::Evaluation(format!("server returned {status}")));
        }

        let body: EvaluationResponse = response
            .json()
            .await
            .map_err(|e| CoachError::Evaluation(format!("malformed response: {e}")))?;
        debug!(chars = body.evaluation.chars().count(), "evaluation received");
        Ok(body.evaluation)
    }
}
