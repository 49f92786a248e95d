//! Conversation with the trainer through the backend's chat endpoint.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::{CoachError, Result};

/// Who said a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Trainer,
}

/// One line of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn trainer(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Trainer,
            text: text.into(),
        }
    }
}

/// Conversation history capped at a fixed number of turns; the oldest turns
/// fall off first. A capacity of 0 keeps every turn.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: VecDeque<ChatTurn>,
    capacity: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        if self.capacity > 0 && self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    pub fn to_vec(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    history: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct ChatResponse {
    reply: String,
}

/// HTTP client for `POST /api/chat`.
#[derive(Debug, Clone)]
pub struct TrainerChatClient {
    client: reqwest::Client,
    url: String,
}

impl TrainerChatClient {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CoachError::Chat(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(backend: &BackendConfig) -> Result<Self> {
        Self::new(backend.chat_url(), backend.timeout())
    }

    /// Send the conversation so far and return the trainer's reply.
    pub async fn reply(&self, history: &[ChatTurn]) -> Result<String> {
        debug!(turns = history.len(), "requesting trainer reply");
        let response = self
            .client
            .post(&self.url)
            .json(&ChatRequest { history })
            .send()
            .await
            .map_err(|e| CoachError::Chat(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "chat endpoint returned error");
            return Err(CoachError::Chat(format!("server returned {status}")));
        }
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CoachError::Chat(format!("malformed response: {e}")))?;
        Ok(body.reply)
    }
}
