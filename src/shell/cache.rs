//! Background preloading of trainer models.
//!
//! One slot per model path, keyed by its rooted form so `avatars/a.vrm` and
//! `/avatars/a.vrm` share a slot. A slot is `Pending` while its fetch runs, then
//! `Ready` or `Failed`. Preloading a URL whose slot is pending or ready does
//! nothing; a failed slot is fetched again.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::catalog::TrainerCatalog;
use crate::viewport::{ModelLoader, VrmModel, normalize_asset_path};

/// State of one cached model.
#[derive(Debug, Clone)]
pub enum SlotState {
    Pending,
    Ready(Arc<VrmModel>),
    Failed(String),
}

impl SlotState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Shared preload cache, keyed by model URL.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<String, watch::Sender<SlotState>>>,
    fetches: Arc<AtomicU64>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
            fetches: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<SlotState>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start fetching `url` unless it is already cached or in flight.
    ///
    /// Returns `true` when a fetch was started.
    pub fn preload(&self, url: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let url = normalize_asset_path(url);
        let tx = {
            let mut slots = self.slots();
            let reusable = slots
                .get(&url)
                .is_some_and(|existing| !matches!(*existing.borrow(), SlotState::Failed(_)));
            if reusable {
                return false;
            }
            let (tx, _) = watch::channel(SlotState::Pending);
            slots.insert(url.clone(), tx.clone());
            tx
        };

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let loader = Arc::clone(&self.loader);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            debug!(url = %url, "preloading model");
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tx.send_replace(SlotState::Failed("cancelled".into()));
                    return;
                }
                result = loader.load(&url) => result,
            };
            match result {
                Ok(model) => {
                    info!(url = %url, "model preloaded");
                    tx.send_replace(SlotState::Ready(Arc::new(model)));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "model preload failed");
                    tx.send_replace(SlotState::Failed(e.to_string()));
                }
            }
        });
        true
    }

    /// Preload every trainer in `catalog`; returns how many fetches started.
    pub fn preload_all(&self, catalog: &TrainerCatalog) -> usize {
        catalog
            .trainers()
            .filter(|t| self.preload(&t.model_url))
            .count()
    }

    pub fn state(&self, url: &str) -> Option<SlotState> {
        self.slots()
            .get(&normalize_asset_path(url))
            .map(|tx| tx.borrow().clone())
    }

    /// Resolve to the cached model once its slot settles.
    ///
    /// Resolves to `None` when the URL was never preloaded or the fetch
    /// failed.
    pub fn wait(&self, url: &str) -> BoxFuture<'static, Option<Arc<VrmModel>>> {
        let rx = self
            .slots()
            .get(&normalize_asset_path(url))
            .map(watch::Sender::subscribe);
        Box::pin(async move {
            let mut rx = rx?;
            let settled = rx.wait_for(|state| !state.is_pending()).await.ok()?.clone();
            match settled {
                SlotState::Ready(model) => Some(model),
                SlotState::Pending | SlotState::Failed(_) => None,
            }
        })
    }

    /// Fetches started since creation.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Cancel in-flight fetches and wait for them.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
