//! Model asset loaders: fetch VRM bytes and parse them into a [`VrmModel`].

use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::{AssetConfig, DEFAULT_MAX_MODEL_BYTES};
use crate::error::{CoachError, Result};
use crate::viewport::vrm::VrmModel;

/// Fetches and parses humanoid model assets.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the asset at catalog URL `url`.
    async fn load(&self, url: &str) -> Result<VrmModel>;
}

/// Root a catalog path: `avatars/a.vrm` becomes `/avatars/a.vrm`.
///
/// Absolute `http(s)` URLs are returned unchanged.
pub fn normalize_asset_path(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") || trimmed.starts_with('/')
    {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Upper bound on the buffer reserved from a `Content-Length` header.
const PREALLOC_LIMIT: u64 = 64 << 20;

/// Loads assets over HTTP relative to a base URL.
pub struct HttpModelLoader {
    client: reqwest::Client,
    base: Url,
    max_bytes: u64,
}

impl HttpModelLoader {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| CoachError::Config(format!("invalid asset base url {base_url}: {e}")))?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CoachError::Asset(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base,
            max_bytes: DEFAULT_MAX_MODEL_BYTES,
        })
    }

    /// Reject downloads larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, url: &Url, size: u64) -> CoachError {
        CoachError::Asset(format!(
            "{url} is {size} bytes, over the {} byte limit",
            self.max_bytes
        ))
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        let path = normalize_asset_path(url);
        self.base
            .join(&path)
            .map_err(|e| CoachError::Asset(format!("invalid asset url {url}: {e}")))
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self, url: &str) -> Result<VrmModel> {
        let resolved = self.resolve(url)?;
        info!(url = %resolved, "fetching model");

        let response = self
            .client
            .get(resolved.clone())
            .send()
            .await
            .map_err(|e| CoachError::Asset(format!("request for {resolved} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoachError::Asset(format!("{resolved} returned {status}")));
        }

        let total = response.content_length();
        if let Some(total) = total.filter(|t| *t > self.max_bytes) {
            return Err(self.too_large(&resolved, total));
        }
        let reserve = total.unwrap_or(0).min(PREALLOC_LIMIT).min(self.max_bytes);
        let mut bytes = Vec::with_capacity(usize::try_from(reserve).unwrap_or(0));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| CoachError::Asset(format!("read of {resolved} failed: {e}")))?;
            let received = bytes.len() as u64 + chunk.len() as u64;
            if received > self.max_bytes {
                return Err(self.too_large(&resolved, received));
            }
            bytes.extend_from_slice(&chunk);
            if let Some(total) = total.filter(|t| *t > 0) {
                let percent = bytes.len() as u64 * 100 / total;
                debug!(url = %resolved, received = bytes.len(), total, percent, "model download progress");
            }
        }

        let model = VrmModel::parse(&bytes)?;
        info!(
            url = %resolved,
            name = model.name.as_deref().unwrap_or("<unnamed>"),
            bones = model.bones.len(),
            "model loaded"
        );
        Ok(model)
    }
}

/// Loads assets from a local directory standing in for the web root.
pub struct FileModelLoader {
    root: PathBuf,
}

impl FileModelLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf> {
        let path = normalize_asset_path(url);
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CoachError::Asset(format!("asset path escapes root: {url}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ModelLoader for FileModelLoader {
    async fn load(&self, url: &str) -> Result<VrmModel> {
        let path = self.resolve(url)?;
        debug!(path = %path.display(), "reading model");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CoachError::Asset(format!("cannot read {}: {e}", path.display())))?;
        let model = VrmModel::parse(&bytes)?;
        info!(
            path = %path.display(),
            name = model.name.as_deref().unwrap_or("<unnamed>"),
            "model loaded"
        );
        Ok(model)
    }
}

/// HTTP loader when a base URL is configured, file loader otherwise.
pub fn loader_from_config(
    assets: &AssetConfig,
    timeout: Option<Duration>,
) -> Result<Arc<dyn ModelLoader>> {
    match &assets.base_url {
        Some(base) => Ok(Arc::new(
            HttpModelLoader::new(base, timeout)?.with_max_bytes(assets.max_model_bytes),
        )),
        None => Ok(Arc::new(FileModelLoader::new(assets.root_dir.clone()))),
    }
}
