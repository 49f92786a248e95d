//! Render backend seam.
//!
//! Rasterization belongs to an external library. [`RenderBackend`] creates
//! one [`RenderSurface`] per viewport; the controller sizes it, asks it to
//! draw each tick and disposes it on teardown. [`HeadlessBackend`] draws
//! nothing and counts what it is asked to do.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use crate::error::Result;
use crate::viewport::camera::CameraRig;
use crate::viewport::container::ViewportSize;
use crate::viewport::scene::Scene;

/// A drawable surface attached to one viewport container.
pub trait RenderSurface: Send {
    /// Resize the backing buffer.
    fn set_size(&mut self, size: ViewportSize);

    /// Draw `scene` from `camera`.
    fn render(&mut self, scene: &Scene, camera: &CameraRig);

    /// Release GPU resources. Called once, before the surface is dropped.
    fn dispose(&mut self);
}

/// Factory for render surfaces.
pub trait RenderBackend: Send + Sync {
    fn create_surface(&self, size: ViewportSize) -> Result<Box<dyn RenderSurface>>;
}

/// Counters shared between a [`HeadlessBackend`] and its surfaces.
#[derive(Debug, Default)]
pub struct RenderStats {
    frames: AtomicU64,
    surfaces_created: AtomicUsize,
    surfaces_live: AtomicUsize,
}

impl RenderStats {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn surfaces_created(&self) -> usize {
        self.surfaces_created.load(Ordering::SeqCst)
    }

    pub fn surfaces_live(&self) -> usize {
        self.surfaces_live.load(Ordering::SeqCst)
    }
}

/// Backend that renders nothing; used by the headless runtime and tests.
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    stats: Arc<RenderStats>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<RenderStats> {
        Arc::clone(&self.stats)
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_surface(&self, size: ViewportSize) -> Result<Box<dyn RenderSurface>> {
        self.stats.surfaces_created.fetch_add(1, Ordering::SeqCst);
        self.stats.surfaces_live.fetch_add(1, Ordering::SeqCst);
        debug!(%size, "headless surface created");
        Ok(Box::new(HeadlessSurface {
            stats: Arc::clone(&self.stats),
            size,
            disposed: false,
        }))
    }
}

struct HeadlessSurface {
    stats: Arc<RenderStats>,
    size: ViewportSize,
    disposed: bool,
}

impl RenderSurface for HeadlessSurface {
    fn set_size(&mut self, size: ViewportSize) {
        self.size = size;
    }

    fn render(&mut self, _scene: &Scene, _camera: &CameraRig) {
        if !self.disposed && !self.size.is_empty() {
            self.stats.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.stats.surfaces_live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
