//! Configuration types for the coaching runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// Evaluation / chat backend settings.
    pub backend: BackendConfig,
    /// Speech synthesis and playback settings.
    pub speech: SpeechConfig,
    /// Frame capture settings.
    pub capture: CaptureConfig,
    /// Avatar viewport settings.
    pub viewport: ViewportConfig,
    /// Model asset location.
    pub assets: AssetConfig,
    /// Static site server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Trainer catalog source.
    pub catalog: CatalogConfig,
}

/// Remote evaluation server (image evaluation and trainer chat).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the evaluation server.
    pub base_url: String,
    /// Path of the image evaluation endpoint.
    pub evaluate_path: String,
    /// Path of the trainer chat endpoint.
    pub chat_path: String,
    /// Maximum chat turns retained per session (0 = unbounded).
    pub max_chat_history: usize,
    /// Optional request timeout in seconds (None = wait indefinitely).
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_owned(),
            evaluate_path: "/api/post_image".to_owned(),
            chat_path: "/api/chat".to_owned(),
            max_chat_history: 20,
            timeout_secs: None,
        }
    }
}

impl BackendConfig {
    /// Client timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Full URL of the evaluation endpoint.
    pub fn evaluate_url(&self) -> String {
        join_url(&self.base_url, &self.evaluate_path)
    }

    /// Full URL of the trainer chat endpoint.
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Which speech synthesis service to call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    /// Local VOICEVOX engine (`audio_query` + `synthesis`).
    #[default]
    Voicevox,
    /// Hosted synthesis API (single GET with an API key).
    Hosted,
}

/// Speech synthesis and playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether evaluations are spoken at all.
    pub enabled: bool,
    /// Synthesis service.
    pub engine: SpeechEngine,
    /// VOICEVOX engine base URL.
    pub voicevox_url: String,
    /// Hosted synthesis endpoint.
    pub hosted_url: String,
    /// API key for the hosted endpoint.
    pub hosted_api_key: String,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// Whether synthesized audio is played through the output device.
    pub playback: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: SpeechEngine::Voicevox,
            voicevox_url: "http://localhost:50021".to_owned(),
            hosted_url: "https://deprecatedapis.tts.quest/v2/voicevox/audio/".to_owned(),
            hosted_api_key: String::new(),
            output_device: None,
            playback: true,
        }
    }
}

/// Frame capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interval between captured frames in milliseconds.
    pub interval_ms: u64,
    /// Image file or directory replayed as the camera feed.
    pub frames: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            frames: None,
        }
    }
}

impl CaptureConfig {
    /// Capture interval as a [`Duration`] (never zero).
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Avatar viewport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Render loop frequency in frames per second.
    pub frame_rate: u32,
    /// Camera near clip plane.
    pub near: f32,
    /// Camera far clip plane.
    pub far: f32,
    /// Directional light intensity.
    pub directional_intensity: f32,
    /// Ambient light intensity.
    pub ambient_intensity: f32,
    /// Initial viewport width for headless runs.
    pub width: u32,
    /// Initial viewport height for headless runs.
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            near: 0.1,
            far: 1000.0,
            directional_intensity: 1.0,
            ambient_intensity: 0.5,
            width: 640,
            height: 480,
        }
    }
}

impl ViewportConfig {
    /// Time between two render ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.frame_rate.max(1)))
    }
}

/// Model asset location.
///
/// When `base_url` is set assets are fetched over HTTP, otherwise they are
/// read from `root_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base URL model paths are resolved against.
    pub base_url: Option<String>,
    /// Local directory model paths are resolved against.
    pub root_dir: PathBuf,
    /// Largest model download accepted, in bytes.
    pub max_model_bytes: u64,
}

/// Default cap on a downloaded model (256 MiB).
pub const DEFAULT_MAX_MODEL_BYTES: u64 = 256 << 20;

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            root_dir: PathBuf::from("public"),
            max_model_bytes: DEFAULT_MAX_MODEL_BYTES,
        }
    }
}

/// Static site server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = auto-assign). The `PORT` environment variable wins.
    pub port: u16,
    /// Directory holding the built UI.
    pub dist_dir: PathBuf,
    /// Entry document served for unmatched routes.
    pub index_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            dist_dir: PathBuf::from("dist"),
            index_file: "index.html".to_owned(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write a daily-rolling log file under the logs directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fitcoach=info,tower_http=info".to_owned(),
            file: false,
        }
    }
}

/// Trainer catalog source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// External catalog file (None = built-in catalog).
    pub path: Option<PathBuf>,
}

impl CoachConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::CoachError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CoachError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::coach_dirs::config_dir().join("config.toml")
    }

    /// Load the config at `path`, or the default path if it exists, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file cannot be loaded.
    pub fn load_or_default(path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
