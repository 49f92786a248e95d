//! A humanoid model instance placed in one viewport.

use glam::{Mat4, Quat, Vec3};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{BoneRotation, Expression, HumanoidBone, PoseDefinition};
use crate::viewport::vrm::VrmModel;

/// Placement of the avatar root in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarTransform {
    pub scale: f32,
    pub position: Vec3,
    /// Rotation about the vertical axis in radians.
    pub yaw: f32,
}

impl Default for AvatarTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            position: Vec3::ZERO,
            yaw: 0.0,
        }
    }
}

impl AvatarTransform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_rotation_y(self.yaw),
            self.position,
        )
    }
}

/// Runtime instance of a [`VrmModel`]: placement, bone rotations and
/// expression weights.
///
/// The bone table tracks exactly the bones the model rigs and the weight
/// table exactly the expressions it provides.
#[derive(Debug)]
pub struct LoadedAvatar {
    model: Arc<VrmModel>,
    source_url: String,
    transform: AvatarTransform,
    bones: BTreeMap<HumanoidBone, BoneRotation>,
    expressions: BTreeMap<Expression, f32>,
    disposed: bool,
}

impl LoadedAvatar {
    /// Instantiate `model` at rest.
    pub fn instantiate(model: Arc<VrmModel>, source_url: impl Into<String>) -> Self {
        let bones = model
            .bones
            .keys()
            .map(|bone| (*bone, BoneRotation::IDENTITY))
            .collect();
        let expressions = model.expressions.iter().map(|e| (*e, 0.0)).collect();
        Self {
            model,
            source_url: source_url.into(),
            transform: AvatarTransform::default(),
            bones,
            expressions,
            disposed: false,
        }
    }

    /// Scale, lift and turn the model to face the camera.
    pub fn place(&mut self, scale: f32, y_offset: f32) {
        self.transform = AvatarTransform {
            scale,
            position: Vec3::new(0.0, y_offset, 0.0),
            yaw: std::f32::consts::PI,
        };
    }

    /// Reset every bone and expression, then apply `pose`.
    ///
    /// Bones or expressions the model lacks are skipped.
    pub fn apply_pose(&mut self, pose: &PoseDefinition) {
        for rotation in self.bones.values_mut() {
            *rotation = BoneRotation::IDENTITY;
        }
        for (bone, rotation) in &pose.bones {
            match self.bones.get_mut(bone) {
                Some(slot) => *slot = *rotation,
                None => debug!(bone = %bone, "model does not rig bone, skipping"),
            }
        }

        for weight in self.expressions.values_mut() {
            *weight = 0.0;
        }
        if let Some(expression) = pose.expression {
            match self.expressions.get_mut(&expression) {
                Some(weight) => *weight = 1.0,
                None => debug!(expression = %expression, "model lacks expression, skipping"),
            }
        }
    }

    pub fn model(&self) -> &Arc<VrmModel> {
        &self.model
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn transform(&self) -> AvatarTransform {
        self.transform
    }

    pub fn bone_rotation(&self, bone: HumanoidBone) -> Option<BoneRotation> {
        self.bones.get(&bone).copied()
    }

    pub fn bone_rotations(&self) -> &BTreeMap<HumanoidBone, BoneRotation> {
        &self.bones
    }

    pub fn expression_weight(&self, expression: Expression) -> Option<f32> {
        self.expressions.get(&expression).copied()
    }

    pub fn expression_weights(&self) -> &BTreeMap<Expression, f32> {
        &self.expressions
    }

    /// Release the instance's per-frame state.
    ///
    /// The shared [`VrmModel`] stays valid for other instances.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.bones.clear();
        self.expressions.clear();
        self.disposed = true;
        debug!(url = %self.source_url, "avatar disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
