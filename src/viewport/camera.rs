//! Camera rig that keeps the trainer's ground line on the viewport's bottom edge.
//!
//! The camera is placed from the trainer's [`CameraConfig`]. On every resize
//! the vertical field of view is recomputed so that the ground point under the
//! model projects exactly onto the bottom edge of the frame. A perspective
//! camera's vertical angle does not depend on aspect ratio, so the ground stays
//! pinned for any container shape.

use glam::{Mat4, Vec3};

use crate::catalog::CameraConfig;
use crate::viewport::container::ViewportSize;

/// Perspective camera positioned around one trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRig {
    config: CameraConfig,
    position: Vec3,
    target: Vec3,
    /// Vertical field of view in radians.
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl CameraRig {
    /// Build a rig for `config` sized to `size`.
    pub fn new(config: CameraConfig, size: ViewportSize, near: f32, far: f32) -> Self {
        let position = Vec3::new(
            0.0,
            config.ground_y + config.camera_height_offset,
            config.distance,
        );
        let target = Vec3::new(0.0, config.ground_y + config.look_at_height_offset, 0.0);
        let mut rig = Self {
            config,
            position,
            target,
            fov_y: config.vertical_fov_degrees.to_radians(),
            aspect: 1.0,
            near,
            far,
        };
        rig.resize(size);
        rig
    }

    /// Field of view (radians) that maps the ground point to the bottom edge.
    ///
    /// With the camera `h` above ground looking at a point `l` above ground
    /// from distance `z`, the half angle is `atan(h/z) - atan((h - l)/z)`.
    /// For a level camera (`l == h`) this is `2·atan(h/z)`. Returns `None`
    /// when the framing cannot show the ground (camera at or below it, or the
    /// target below the ground point).
    pub fn ground_pinned_fov(config: &CameraConfig) -> Option<f32> {
        let h = config.camera_height_offset;
        let l = config.look_at_height_offset;
        let z = config.distance;
        if !(h > 0.0 && z > 0.0) {
            return None;
        }
        let half = (h / z).atan() - ((h - l) / z).atan();
        if half > 0.0 && half < std::f32::consts::FRAC_PI_2 {
            Some(2.0 * half)
        } else {
            None
        }
    }

    /// Adapt to a new viewport size. Empty sizes are ignored.
    pub fn resize(&mut self, size: ViewportSize) {
        if size.is_empty() {
            return;
        }
        self.aspect = size.aspect();
        self.fov_y = Self::ground_pinned_fov(&self.config)
            .unwrap_or_else(|| self.config.vertical_fov_degrees.to_radians());
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn fov_y_degrees(&self) -> f32 {
        self.fov_y.to_degrees()
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Project a world point to normalized device coordinates.
    pub fn project(&self, world: Vec3) -> Vec3 {
        let clip = self.projection_matrix() * self.view_matrix() * world.extend(1.0);
        clip.truncate() / clip.w
    }

    /// NDC height of the ground point under the model (-1 is the bottom edge).
    pub fn ground_ndc_y(&self) -> f32 {
        self.project(Vec3::new(0.0, self.config.ground_y, 0.0)).y
    }
}
