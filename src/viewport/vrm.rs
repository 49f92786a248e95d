//! VRM humanoid model parsing.
//!
//! A VRM file is a binary glTF (GLB) container whose JSON chunk carries either
//! the VRM 1.0 extension (`VRMC_vrm`) or the VRM 0.x extension (`VRM`). Only
//! what the viewport needs is extracted: the humanoid bone → node mapping and
//! the set of expression presets the model provides. Mesh and texture data
//! stay with the renderer.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Expression, HumanoidBone};
use crate::error::{CoachError, Result};

/// `glTF` in little-endian.
const GLB_MAGIC: u32 = 0x4654_6C67;
/// `JSON` chunk type.
const CHUNK_JSON: u32 = 0x4E4F_534A;
/// `BIN\0` chunk type.
const CHUNK_BIN: u32 = 0x004E_4942;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// VRM specification generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrmVersion {
    /// VRM 0.x (`extensions.VRM`).
    V0,
    /// VRM 1.0 (`extensions.VRMC_vrm`).
    V1,
}

/// A parsed humanoid model, shared between the preload cache and viewports.
#[derive(Debug, Clone, PartialEq)]
pub struct VrmModel {
    pub name: Option<String>,
    pub version: VrmVersion,
    /// Humanoid bone → glTF node index.
    pub bones: BTreeMap<HumanoidBone, usize>,
    /// Expression presets the model can show.
    pub expressions: BTreeSet<Expression>,
    pub node_count: usize,
    pub byte_len: usize,
}

#[derive(Debug, Default, Deserialize)]
struct GltfDocument {
    #[serde(default)]
    nodes: Vec<serde_json::Value>,
    #[serde(default)]
    extensions: GltfExtensions,
}

#[derive(Debug, Default, Deserialize)]
struct GltfExtensions {
    #[serde(rename = "VRMC_vrm")]
    vrm1: Option<Vrm1Extension>,
    #[serde(rename = "VRM")]
    vrm0: Option<Vrm0Extension>,
}

#[derive(Debug, Deserialize)]
struct Vrm1Extension {
    #[serde(default)]
    meta: Option<Vrm1Meta>,
    humanoid: Vrm1Humanoid,
    #[serde(default)]
    expressions: Option<Vrm1Expressions>,
}

#[derive(Debug, Deserialize)]
struct Vrm1Meta {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Vrm1Humanoid {
    #[serde(rename = "humanBones")]
    human_bones: BTreeMap<String, Vrm1Bone>,
}

#[derive(Debug, Deserialize)]
struct Vrm1Bone {
    node: usize,
}

#[derive(Debug, Deserialize)]
struct Vrm1Expressions {
    #[serde(default)]
    preset: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Vrm0Extension {
    #[serde(default)]
    meta: Option<Vrm0Meta>,
    humanoid: Vrm0Humanoid,
    #[serde(default, rename = "blendShapeMaster")]
    blend_shape_master: Option<Vrm0BlendShapeMaster>,
}

#[derive(Debug, Deserialize)]
struct Vrm0Meta {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Vrm0Humanoid {
    #[serde(rename = "humanBones")]
    human_bones: Vec<Vrm0Bone>,
}

#[derive(Debug, Deserialize)]
struct Vrm0Bone {
    bone: String,
    node: usize,
}

#[derive(Debug, Deserialize)]
struct Vrm0BlendShapeMaster {
    #[serde(default, rename = "blendShapeGroups")]
    groups: Vec<Vrm0BlendShapeGroup>,
}

#[derive(Debug, Deserialize)]
struct Vrm0BlendShapeGroup {
    #[serde(default, rename = "presetName")]
    preset_name: Option<String>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| CoachError::Asset(format!("GLB truncated at byte {offset}")))
}

/// Locate the JSON chunk of a GLB container.
fn glb_json_chunk(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < GLB_HEADER_LEN {
        return Err(CoachError::Asset(format!(
            "file too short for a GLB header ({} bytes)",
            bytes.len()
        )));
    }
    if read_u32(bytes, 0)? != GLB_MAGIC {
        return Err(CoachError::Asset("not a binary glTF file (bad magic)".into()));
    }
    let version = read_u32(bytes, 4)?;
    if version != 2 {
        return Err(CoachError::Asset(format!(
            "unsupported glTF container version {version}"
        )));
    }
    let declared = read_u32(bytes, 8)? as usize;
    if declared > bytes.len() {
        return Err(CoachError::Asset(format!(
            "GLB declares {declared} bytes but only {} are present",
            bytes.len()
        )));
    }
    let bytes = &bytes[..declared];

    let chunk_len = read_u32(bytes, GLB_HEADER_LEN)? as usize;
    let chunk_type = read_u32(bytes, GLB_HEADER_LEN + 4)?;
    if chunk_type != CHUNK_JSON {
        return Err(CoachError::Asset("first GLB chunk is not JSON".into()));
    }
    let start = GLB_HEADER_LEN + CHUNK_HEADER_LEN;
    bytes
        .get(start..start + chunk_len)
        .ok_or_else(|| CoachError::Asset("GLB JSON chunk exceeds file length".into()))
}

impl VrmModel {
    /// Parse a VRM (GLB) file.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Asset`] if the container is malformed, carries no
    /// VRM extension, references nodes that do not exist, or lacks a `hips`
    /// bone.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let json = glb_json_chunk(bytes)?;
        let doc: GltfDocument = serde_json::from_slice(json)
            .map_err(|e| CoachError::Asset(format!("invalid glTF JSON: {e}")))?;
        let node_count = doc.nodes.len();

        let (version, name, raw_bones, expressions) = if let Some(vrm) = doc.extensions.vrm1 {
            let bones: Vec<(String, usize)> = vrm
                .humanoid
                .human_bones
                .into_iter()
                .map(|(name, bone)| (name, bone.node))
                .collect();
            let expressions: BTreeSet<Expression> = vrm
                .expressions
                .map(|e| {
                    e.preset
                        .keys()
                        .filter_map(|name| Expression::from_vrm_name(name))
                        .collect()
                })
                .unwrap_or_default();
            (
                VrmVersion::V1,
                vrm.meta.and_then(|m| m.name),
                bones,
                expressions,
            )
        } else if let Some(vrm) = doc.extensions.vrm0 {
            let bones: Vec<(String, usize)> = vrm
                .humanoid
                .human_bones
                .into_iter()
                .map(|b| (b.bone, b.node))
                .collect();
            let expressions: BTreeSet<Expression> = vrm
                .blend_shape_master
                .map(|m| {
                    m.groups
                        .iter()
                        .filter_map(|g| g.preset_name.as_deref())
                        .filter_map(Expression::from_vrm0_preset)
                        .collect()
                })
                .unwrap_or_default();
            (
                VrmVersion::V0,
                vrm.meta.and_then(|m| m.title),
                bones,
                expressions,
            )
        } else {
            return Err(CoachError::Asset("glTF file has no VRM extension".into()));
        };

        let mut bones = BTreeMap::new();
        for (bone_name, node) in raw_bones {
            // Finger bones are not posed by the catalog.
            let Some(bone) = HumanoidBone::from_vrm_name(&bone_name) else {
                continue;
            };
            if node >= node_count {
                return Err(CoachError::Asset(format!(
                    "bone '{bone_name}' references node {node} but the model has {node_count} nodes"
                )));
            }
            bones.insert(bone, node);
        }
        if !bones.contains_key(&HumanoidBone::Hips) {
            return Err(CoachError::Asset("humanoid rig has no hips bone".into()));
        }

        Ok(Self {
            name: name.filter(|n| !n.trim().is_empty()),
            version,
            bones,
            expressions,
            node_count,
            byte_len: bytes.len(),
        })
    }

    pub fn has_bone(&self, bone: HumanoidBone) -> bool {
        self.bones.contains_key(&bone)
    }

    pub fn has_expression(&self, expression: Expression) -> bool {
        self.expressions.contains(&expression)
    }
}

/// Wrap a glTF JSON document (and optional binary buffer) into a GLB container.
pub fn encode_glb(json: &serde_json::Value, bin: Option<&[u8]>) -> Vec<u8> {
    let mut json_bytes = json.to_string().into_bytes();
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let mut bin_bytes = bin.map(<[u8]>::to_vec);
    if let Some(b) = bin_bytes.as_mut() {
        while b.len() % 4 != 0 {
            b.push(0);
        }
    }

    let total = GLB_HEADER_LEN
        + CHUNK_HEADER_LEN
        + json_bytes.len()
        + bin_bytes
            .as_ref()
            .map_or(0, |b| CHUNK_HEADER_LEN + b.len());

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_bytes);
    if let Some(b) = bin_bytes {
        out.extend_from_slice(&(b.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&b);
    }
    out
}

/// A minimal VRM 1.0 document rigging the given bones with the given
/// expression presets. Each bone gets its own node.
pub fn vrm1_document(
    name: &str,
    bones: &[HumanoidBone],
    expressions: &[Expression],
) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = bones
        .iter()
        .map(|b| serde_json::json!({ "name": b.as_str() }))
        .collect();
    let human_bones: serde_json::Map<String, serde_json::Value> = bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.as_str().to_owned(), serde_json::json!({ "node": i })))
        .collect();
    let preset: serde_json::Map<String, serde_json::Value> = expressions
        .iter()
        .map(|e| (e.as_str().to_owned(), serde_json::json!({})))
        .collect();
    serde_json::json!({
        "asset": { "version": "2.0" },
        "extensionsUsed": ["VRMC_vrm"],
        "nodes": nodes,
        "extensions": {
            "VRMC_vrm": {
                "specVersion": "1.0",
                "meta": { "name": name },
                "humanoid": { "humanBones": human_bones },
                "expressions": { "preset": preset }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    fn body_bones() -> Vec<HumanoidBone> {
        vec![
            HumanoidBone::Hips,
            HumanoidBone::Spine,
            HumanoidBone::Head,
            HumanoidBone::LeftUpperArm,
            HumanoidBone::RightUpperArm,
        ]
    }

    #[test]
    fn parses_vrm1_model() {
        let doc = vrm1_document(
            "Coach",
            &body_bones(),
            &[Expression::Happy, Expression::Neutral],
        );
        let bytes = encode_glb(&doc, Some(&[1, 2, 3]));
        let model = VrmModel::parse(&bytes).unwrap();
        assert_eq!(model.version, VrmVersion::V1);
        assert_eq!(model.name.as_deref(), Some("Coach"));
        assert_eq!(model.bones.len(), 5);
        assert_eq!(model.bones[&HumanoidBone::LeftUpperArm], 3);
        assert!(model.has_expression(Expression::Happy));
        assert!(!model.has_expression(Expression::Sad));
        assert_eq!(model.node_count, 5);
        assert_eq!(model.byte_len, bytes.len());
    }

    #[test]
    fn parses_vrm0_model() {
        let doc = json!({
            "nodes": [{}, {}, {}],
            "extensions": {
                "VRM": {
                    "meta": { "title": "Sport Girl" },
                    "humanoid": { "humanBones": [
                        { "bone": "hips", "node": 0 },
                        { "bone": "leftUpperArm", "node": 1 },
                        { "bone": "leftThumbProximal", "node": 2 }
                    ]},
                    "blendShapeMaster": { "blendShapeGroups": [
                        { "name": "Joy", "presetName": "joy" },
                        { "name": "A", "presetName": "a" },
                        { "name": "Custom", "presetName": "unknown" }
                    ]}
                }
            }
        });
        let model = VrmModel::parse(&encode_glb(&doc, None)).unwrap();
        assert_eq!(model.version, VrmVersion::V0);
        assert_eq!(model.name.as_deref(), Some("Sport Girl"));
        assert_eq!(model.bones.len(), 2);
        assert!(model.has_bone(HumanoidBone::LeftUpperArm));
        assert_eq!(
            model.expressions,
            BTreeSet::from([Expression::Happy, Expression::Aa])
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_glb(&vrm1_document("x", &body_bones(), &[]), None);
        bytes[0] = b'X';
        let err = VrmModel::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = encode_glb(&vrm1_document("x", &body_bones(), &[]), None);
        assert!(VrmModel::parse(&bytes[..8]).is_err());
        assert!(VrmModel::parse(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn rejects_plain_gltf() {
        let doc = json!({ "asset": { "version": "2.0" }, "nodes": [{}] });
        let err = VrmModel::parse(&encode_glb(&doc, None)).unwrap_err();
        assert!(err.to_string().contains("no VRM extension"));
    }

    #[test]
    fn rejects_out_of_range_node() {
        let mut doc = vrm1_document("x", &body_bones(), &[]);
        doc["extensions"]["VRMC_vrm"]["humanoid"]["humanBones"]["head"] = json!({ "node": 99 });
        let err = VrmModel::parse(&encode_glb(&doc, None)).unwrap_err();
        assert!(err.to_string().contains("node 99"));
    }

    #[test]
    fn rejects_rig_without_hips() {
        let doc = vrm1_document("x", &[HumanoidBone::Head], &[]);
        let err = VrmModel::parse(&encode_glb(&doc, None)).unwrap_err();
        assert!(err.to_string().contains("hips"));
    }

    #[test]
    fn encoded_chunks_are_aligned() {
        let bytes = encode_glb(&json!({"a": 1}), Some(&[9]));
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(read_u32(&bytes, 8).unwrap() as usize, bytes.len());
    }
}
