//! fitcoach: a fitness-coaching runtime with a VRM trainer avatar.
//!
//! A session replays camera frames to a remote evaluation server on a fixed
//! interval. Each evaluation becomes a trainer line: the avatar strikes a
//! random pose, the line is spoken in the trainer's voice and shown as
//! overlay text.
//!
//! # Architecture
//!
//! - **Catalog**: trainers, their models, voices, framing and poses
//! - **Viewport**: camera, lights and the posed avatar, driven by a render loop
//! - **Capture**: frame source → PNG → evaluation, latest request wins
//! - **Speech**: VOICEVOX or hosted synthesis, played through `cpal`
//! - **Shell**: the title/session state machine tying it all together
//! - **Server**: static hosting for the built web UI

pub mod capture;
pub mod catalog;
pub mod chat;
pub mod coach_dirs;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod server;
pub mod shell;
pub mod speech;
pub mod viewport;

pub use catalog::{TrainerCatalog, TrainerProfile};
pub use config::CoachConfig;
pub use error::{CoachError, Result};
pub use shell::{AppShell, ShellServices, ShellState, TrainingMenu};
pub use viewport::{AvatarViewportController, ViewportContainer, ViewportSize};
