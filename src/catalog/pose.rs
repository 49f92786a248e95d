//! Humanoid bones, expressions and pose definitions.
//!
//! Bone and expression names follow the VRM humanoid convention so the same
//! pose table drives every trainer model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoachError, Result};

/// A VRM humanoid body bone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HumanoidBone {
    Hips,
    Spine,
    Chest,
    UpperChest,
    Neck,
    Head,
    LeftEye,
    RightEye,
    Jaw,
    LeftShoulder,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightLowerArm,
    RightHand,
    LeftUpperLeg,
    LeftLowerLeg,
    LeftFoot,
    LeftToes,
    RightUpperLeg,
    RightLowerLeg,
    RightFoot,
    RightToes,
}

impl HumanoidBone {
    /// Every body bone, in skeleton order.
    pub const ALL: [HumanoidBone; 25] = [
        Self::Hips,
        Self::Spine,
        Self::Chest,
        Self::UpperChest,
        Self::Neck,
        Self::Head,
        Self::LeftEye,
        Self::RightEye,
        Self::Jaw,
        Self::LeftShoulder,
        Self::LeftUpperArm,
        Self::LeftLowerArm,
        Self::LeftHand,
        Self::RightShoulder,
        Self::RightUpperArm,
        Self::RightLowerArm,
        Self::RightHand,
        Self::LeftUpperLeg,
        Self::LeftLowerLeg,
        Self::LeftFoot,
        Self::LeftToes,
        Self::RightUpperLeg,
        Self::RightLowerLeg,
        Self::RightFoot,
        Self::RightToes,
    ];

    /// The VRM humanoid name (`leftUpperArm`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hips => "hips",
            Self::Spine => "spine",
            Self::Chest => "chest",
            Self::UpperChest => "upperChest",
            Self::Neck => "neck",
            Self::Head => "head",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::Jaw => "jaw",
            Self::LeftShoulder => "leftShoulder",
            Self::LeftUpperArm => "leftUpperArm",
            Self::LeftLowerArm => "leftLowerArm",
            Self::LeftHand => "leftHand",
            Self::RightShoulder => "rightShoulder",
            Self::RightUpperArm => "rightUpperArm",
            Self::RightLowerArm => "rightLowerArm",
            Self::RightHand => "rightHand",
            Self::LeftUpperLeg => "leftUpperLeg",
            Self::LeftLowerLeg => "leftLowerLeg",
            Self::LeftFoot => "leftFoot",
            Self::LeftToes => "leftToes",
            Self::RightUpperLeg => "rightUpperLeg",
            Self::RightLowerLeg => "rightLowerLeg",
            Self::RightFoot => "rightFoot",
            Self::RightToes => "rightToes",
        }
    }

    /// Look up a bone by its VRM humanoid name.
    ///
    /// Finger bones and other names outside the body set return `None`.
    pub fn from_vrm_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bone| bone.as_str() == name)
    }
}

impl std::fmt::Display for HumanoidBone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A VRM facial expression preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expression {
    Happy,
    Angry,
    Sad,
    Relaxed,
    Surprised,
    Neutral,
    Aa,
    Ih,
    Ou,
    Ee,
    Oh,
    Blink,
    BlinkLeft,
    BlinkRight,
}

impl Expression {
    /// Every supported preset.
    pub const ALL: [Expression; 14] = [
        Self::Happy,
        Self::Angry,
        Self::Sad,
        Self::Relaxed,
        Self::Surprised,
        Self::Neutral,
        Self::Aa,
        Self::Ih,
        Self::Ou,
        Self::Ee,
        Self::Oh,
        Self::Blink,
        Self::BlinkLeft,
        Self::BlinkRight,
    ];

    /// The VRM 1.0 preset name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Angry => "angry",
            Self::Sad => "sad",
            Self::Relaxed => "relaxed",
            Self::Surprised => "surprised",
            Self::Neutral => "neutral",
            Self::Aa => "aa",
            Self::Ih => "ih",
            Self::Ou => "ou",
            Self::Ee => "ee",
            Self::Oh => "oh",
            Self::Blink => "blink",
            Self::BlinkLeft => "blinkLeft",
            Self::BlinkRight => "blinkRight",
        }
    }

    /// Parse a VRM 1.0 preset name.
    pub fn from_vrm_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Parse a VRM 0.x blend shape preset name.
    pub fn from_vrm0_preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "joy" => Some(Self::Happy),
            "angry" => Some(Self::Angry),
            "sorrow" => Some(Self::Sad),
            "fun" => Some(Self::Relaxed),
            "neutral" => Some(Self::Neutral),
            "a" => Some(Self::Aa),
            "i" => Some(Self::Ih),
            "u" => Some(Self::Ou),
            "e" => Some(Self::Ee),
            "o" => Some(Self::Oh),
            "blink" => Some(Self::Blink),
            "blink_l" => Some(Self::BlinkLeft),
            "blink_r" => Some(Self::BlinkRight),
            _ => None,
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local bone rotation as XYZ Euler angles in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct BoneRotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl BoneRotation {
    /// The rest rotation.
    pub const IDENTITY: BoneRotation = BoneRotation {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl From<[f32; 3]> for BoneRotation {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<BoneRotation> for [f32; 3] {
    fn from(r: BoneRotation) -> Self {
        [r.x, r.y, r.z]
    }
}

/// A named pose: bone overrides plus an optional expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseDefinition {
    pub expression: Option<Expression>,
    pub bones: BTreeMap<HumanoidBone, BoneRotation>,
}

/// Pose as written in a catalog file, before name validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub bones: BTreeMap<String, BoneRotation>,
}

impl PoseEntry {
    /// Validate bone and expression names.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Catalog`] naming the first unknown bone or expression.
    pub fn resolve(&self, pose_name: &str) -> Result<PoseDefinition> {
        let expression = match self.expression.as_deref() {
            None => None,
            Some(name) => Some(Expression::from_vrm_name(name).ok_or_else(|| {
                CoachError::Catalog(format!("pose '{pose_name}': unknown expression '{name}'"))
            })?),
        };

        let mut bones = BTreeMap::new();
        for (name, rotation) in &self.bones {
            let bone = HumanoidBone::from_vrm_name(name).ok_or_else(|| {
                CoachError::Catalog(format!("pose '{pose_name}': unknown bone '{name}'"))
            })?;
            bones.insert(bone, *rotation);
        }

        Ok(PoseDefinition { expression, bones })
    }
}
