//! Trainer avatar viewport: model loading, posing, framing and rendering.

pub mod avatar;
pub mod camera;
pub mod container;
pub mod controller;
pub mod loader;
pub mod renderer;
pub mod scene;
pub mod vrm;

pub use avatar::{AvatarTransform, LoadedAvatar};
pub use camera::CameraRig;
pub use container::{ContainerHandle, ViewportContainer, ViewportSize};
pub use controller::{AvatarSnapshot, AvatarViewportController, LoadOutcome, ViewportStatus};
pub use loader::{
    FileModelLoader, HttpModelLoader, ModelLoader, loader_from_config, normalize_asset_path,
};
pub use renderer::{HeadlessBackend, RenderBackend, RenderStats, RenderSurface};
pub use scene::{Light, Scene};
pub use vrm::{VrmModel, VrmVersion};
