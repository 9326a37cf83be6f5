use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::convert::dae::{ConversionFailure, UpAxis};
use crate::parse::Interpolation;

/// A deduplicated triangle list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshEntry {
    /// The source geometry.
    pub id: String,
    /// Controller whose skeleton the bone indices refer to.
    pub skin: Option<String>,
    pub vertex_format: String,
    /// Three indices per triangle into `unique_vertices`.
    pub index_stream: Vec<u32>,
    pub unique_vertices: Vec<Vec<f32>>,
}

impl MeshEntry {
    pub fn triangle_count(&self) -> usize {
        self.index_stream.len() / 3
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneEntry {
    pub bone_id: String,
    pub parent_index: Option<usize>,
    /// World transform at bind time, row-major.
    pub bind_matrix: [f32; 16],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkeletonEntry {
    /// The controller the skeleton was built for.
    pub id: String,
    /// The skinned mesh.
    pub mesh: String,
    pub bones: Vec<BoneEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyframeEntry {
    pub bone_index: usize,
    pub interpolation: Interpolation,
    pub time: f32,
    /// Row-major.
    pub transform: [f32; 16],
}

/// Raw keyframes for a skeleton, grouped by bone in bone order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationEntry {
    pub id: String,
    pub start_time: f32,
    pub end_time: f32,
    pub key_frames: Vec<KeyframeEntry>,
}

/// A plain (non-joint) scene node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEntry {
    pub id: String,
    /// Row-major.
    pub local_transform: [f32; 16],
    pub children: Vec<NodeEntry>,
}

/// Everything a conversion pass produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertedScene {
    pub up_axis: UpAxis,
    pub meshes: Vec<MeshEntry>,
    pub skeletons: Vec<SkeletonEntry>,
    pub animations: Vec<AnimationEntry>,
    pub nodes: Vec<NodeEntry>,
    /// Display name to entity id.
    pub top: BTreeMap<String, String>,
    pub failures: Vec<ConversionFailure>,
}

impl ConvertedScene {
    pub fn mesh(&self, id: &str) -> Option<&MeshEntry> {
        self.meshes.iter().find(|mesh| mesh.id == id)
    }

    /// The mesh a skeleton deforms: its own skinned copy, else the unskinned one.
    pub fn skinned_mesh(&self, skeleton: &SkeletonEntry) -> Option<&MeshEntry> {
        let candidates = || self.meshes.iter().filter(|mesh| mesh.id == skeleton.mesh);
        candidates()
            .find(|mesh| mesh.skin.as_deref() == Some(skeleton.id.as_str()))
            .or_else(|| candidates().find(|mesh| mesh.skin.is_none()))
    }

    pub fn skeleton(&self, id: &str) -> Option<&SkeletonEntry> {
        self.skeletons.iter().find(|skeleton| skeleton.id == id)
    }

    pub fn animation(&self, id: &str) -> Option<&AnimationEntry> {
        self.animations.iter().find(|animation| animation.id == id)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
