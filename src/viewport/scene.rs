//! Scene contents owned by one viewport: lights and at most one avatar.

use glam::Vec3;

use crate::viewport::avatar::LoadedAvatar;

/// A light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Parallel light arriving along `direction` (normalized).
    Directional {
        color: [f32; 3],
        intensity: f32,
        direction: Vec3,
    },
    /// Uniform fill light.
    Ambient { color: [f32; 3], intensity: f32 },
}

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

impl Light {
    /// White key light from the front-right-top.
    pub fn key(intensity: f32) -> Self {
        Self::Directional {
            color: WHITE,
            intensity,
            direction: Vec3::ONE.normalize(),
        }
    }

    pub fn ambient(intensity: f32) -> Self {
        Self::Ambient {
            color: WHITE,
            intensity,
        }
    }
}

/// Everything the renderer draws for one viewport.
#[derive(Debug, Default)]
pub struct Scene {
    lights: Vec<Light>,
    avatar: Option<LoadedAvatar>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
    }

    /// Put `avatar` in the scene, returning the one it replaces.
    pub fn attach_avatar(&mut self, avatar: LoadedAvatar) -> Option<LoadedAvatar> {
        self.avatar.replace(avatar)
    }

    /// Remove the avatar from the scene.
    pub fn detach_avatar(&mut self) -> Option<LoadedAvatar> {
        self.avatar.take()
    }

    pub fn avatar(&self) -> Option<&LoadedAvatar> {
        self.avatar.as_ref()
    }

    pub fn avatar_mut(&mut self) -> Option<&mut LoadedAvatar> {
        self.avatar.as_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.avatar.is_none()
    }
}
