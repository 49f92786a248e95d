//! Trainer catalog: the static list of selectable trainers.
//!
//! Each trainer names a VRM model, a voice, camera framing and a table of
//! poses. The catalog is loaded once at startup, validated, and shared
//! read-only (`Arc<TrainerProfile>`) with every component that needs it.

pub mod pose;

pub use pose::{BoneRotation, Expression, HumanoidBone, PoseDefinition, PoseEntry};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::CatalogConfig;
use crate::error::{CoachError, Result};

/// Catalog shipped with the crate.
const BUILTIN_CATALOG: &str = include_str!("../../assets/trainers.toml");

/// Speaker identifier understood by the speech backends.
pub type VoiceId = u32;

/// Camera framing for one trainer.
///
/// The camera sits `camera_height_offset` above `ground_y` at distance
/// `distance` in front of the model and looks at a point
/// `look_at_height_offset` above the ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub distance: f32,
    pub vertical_fov_degrees: f32,
    pub ground_y: f32,
    pub camera_height_offset: f32,
    pub look_at_height_offset: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 3.0,
            vertical_fov_degrees: 45.0,
            ground_y: -1.0,
            camera_height_offset: 2.0,
            look_at_height_offset: 2.0,
        }
    }
}

/// One selectable trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerProfile {
    pub id: String,
    pub name: String,
    pub model_url: String,
    pub voice_id: VoiceId,
    pub camera: CameraConfig,
    pub model_scale: f32,
    pub model_y_offset: f32,
    /// Pose applied as soon as the model is loaded.
    pub default_pose: String,
    pub poses: BTreeMap<String, PoseDefinition>,
}

impl TrainerProfile {
    /// Pose names in stable (sorted) order.
    pub fn pose_names(&self) -> Vec<&str> {
        self.poses.keys().map(String::as_str).collect()
    }

    pub fn pose(&self, name: &str) -> Option<&PoseDefinition> {
        self.poses.get(name)
    }
}

/// Trainer as written in a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainerEntry {
    id: String,
    name: String,
    model_url: String,
    voice_id: VoiceId,
    #[serde(default)]
    camera: CameraConfig,
    #[serde(default = "default_model_scale")]
    model_scale: f32,
    #[serde(default)]
    model_y_offset: f32,
    #[serde(default)]
    default_pose: Option<String>,
    #[serde(default)]
    poses: BTreeMap<String, PoseEntry>,
}

fn default_model_scale() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    trainer: Vec<TrainerEntry>,
}

impl TrainerEntry {
    fn resolve(self) -> Result<TrainerProfile> {
        let id = self.id.trim().to_owned();
        if id.is_empty() {
            return Err(CoachError::Catalog("trainer id must not be empty".into()));
        }
        if self.poses.is_empty() {
            return Err(CoachError::Catalog(format!("trainer '{id}' defines no poses")));
        }
        if !(self.model_scale.is_finite() && self.model_scale > 0.0) {
            return Err(CoachError::Catalog(format!(
                "trainer '{id}': model_scale must be positive, got {}",
                self.model_scale
            )));
        }
        if !(self.camera.distance.is_finite() && self.camera.distance > 0.0) {
            return Err(CoachError::Catalog(format!(
                "trainer '{id}': camera distance must be positive, got {}",
                self.camera.distance
            )));
        }

        let mut poses = BTreeMap::new();
        for (name, entry) in &self.poses {
            poses.insert(name.clone(), entry.resolve(name)?);
        }

        // Without an explicit default the first pose (in name order) is used.
        let default_pose = match self.default_pose {
            Some(name) if poses.contains_key(&name) => name,
            Some(name) => {
                return Err(CoachError::Catalog(format!(
                    "trainer '{id}': default pose '{name}' is not defined"
                )));
            }
            None => poses.keys().next().cloned().unwrap_or_default(),
        };

        Ok(TrainerProfile {
            id,
            name: self.name,
            model_url: self.model_url,
            voice_id: self.voice_id,
            camera: self.camera,
            model_scale: self.model_scale,
            model_y_offset: self.model_y_offset,
            default_pose,
            poses,
        })
    }
}

/// Validated, immutable trainer catalog.
#[derive(Debug, Clone)]
pub struct TrainerCatalog {
    trainers: Vec<Arc<TrainerProfile>>,
}

impl TrainerCatalog {
    /// Parse and validate a TOML catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Catalog`] on parse errors, an empty catalog,
    /// duplicate ids, or invalid trainer entries.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| CoachError::Catalog(e.to_string()))?;
        Self::from_profiles(
            file.trainer
                .into_iter()
                .map(TrainerEntry::resolve)
                .collect::<Result<Vec<_>>>()?,
        )
    }

    /// Build a catalog from already-constructed profiles.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Catalog`] for an empty list, duplicate ids, or a
    /// default pose that is not defined.
    pub fn from_profiles(profiles: Vec<TrainerProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(CoachError::Catalog("catalog contains no trainers".into()));
        }
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.id.as_str()) {
                return Err(CoachError::Catalog(format!(
                    "duplicate trainer id '{}'",
                    profile.id
                )));
            }
            if !profile.poses.contains_key(&profile.default_pose) {
                return Err(CoachError::Catalog(format!(
                    "trainer '{}': default pose '{}' is not defined",
                    profile.id, profile.default_pose
                )));
            }
        }
        Ok(Self {
            trainers: profiles.into_iter().map(Arc::new).collect(),
        })
    }

    /// The catalog embedded in the binary.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded file is invalid.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Load a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the configured catalog, or the built-in one.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured catalog cannot be loaded.
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let catalog = match &config.path {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin()?,
        };
        info!(trainers = catalog.len(), "trainer catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<TrainerProfile>> {
        self.trainers.iter().find(|t| t.id == id)
    }

    /// Trainers in catalog order.
    pub fn trainers(&self) -> impl Iterator<Item = &Arc<TrainerProfile>> {
        self.trainers.iter()
    }

    /// The first trainer (the initial selection on the title screen).
    pub fn first(&self) -> &Arc<TrainerProfile> {
        // Non-empty by construction.
        &self.trainers[0]
    }

    pub fn len(&self) -> usize {
        self.trainers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trainers.is_empty()
    }
}
