//! Viewport container: the abstract surface host that reports its size.
//!
//! The owner of the real window (or a test) holds a [`ViewportContainer`] and
//! calls [`ViewportContainer::resize`] whenever layout changes. Controllers
//! subscribe through a [`ContainerHandle`] and never assume the container is
//! laid out when they are created.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Measured container size in physical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A size with a zero dimension (not laid out yet, or collapsed).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; 1.0 for empty sizes.
    pub fn aspect(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl std::fmt::Display for ViewportSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Host side of a viewport: publishes size changes.
#[derive(Debug)]
pub struct ViewportContainer {
    size_tx: watch::Sender<ViewportSize>,
    attached: Arc<AtomicUsize>,
}

impl ViewportContainer {
    pub fn new(initial: ViewportSize) -> Self {
        let (size_tx, _) = watch::channel(initial);
        Self {
            size_tx,
            attached: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a new measured size.
    pub fn resize(&self, size: ViewportSize) {
        self.size_tx.send_replace(size);
    }

    pub fn size(&self) -> ViewportSize {
        *self.size_tx.borrow()
    }

    /// Number of render surfaces currently attached.
    pub fn attached_surfaces(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    /// Subscriber handle for a controller.
    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            size_rx: self.size_tx.subscribe(),
            attached: Arc::clone(&self.attached),
        }
    }
}

/// Controller side of a viewport: observes size changes, hosts a surface.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    size_rx: watch::Receiver<ViewportSize>,
    attached: Arc<AtomicUsize>,
}

impl ContainerHandle {
    /// Wait until the container reports a positive size.
    ///
    /// Returns `None` if the container is dropped first.
    pub async fn wait_for_layout(&mut self) -> Option<ViewportSize> {
        self.size_rx
            .wait_for(|size| !size.is_empty())
            .await
            .ok()
            .map(|size| *size)
    }

    /// Wait for the next size change.
    ///
    /// Returns `None` once the container is dropped.
    pub async fn changed(&mut self) -> Option<ViewportSize> {
        self.size_rx.changed().await.ok()?;
        Some(*self.size_rx.borrow_and_update())
    }

    pub(crate) fn attach_surface(&self) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn detach_surface(&self) {
        let _ = self
            .attached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}
