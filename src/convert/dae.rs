use anyhow::{anyhow, Context};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use xmltree::Element;

use super::format::VertexFormat;
use super::mesh::{Mesh, Vertex};
use super::skeleton::Skeleton;
use crate::error::{DaeError, Result};
use crate::export::scene::serialize_display;
use crate::export::{
    AnimationEntry, BoneEntry, ConvertedScene, KeyframeEntry, MeshEntry, NodeEntry, SkeletonEntry,
};
use crate::parse::{
    Channel, Controller, Geometry, Instance, Library, NodeId, NodeType, Reference, ReferenceKind,
    VisualScene,
};
use crate::transforms::{is_identity, mat4_to_row_major};

/// Configuration for DAE conversion
#[derive(Debug, Clone)]
pub struct DaeConvertConfig {
    /// Name of a built-in vertex format such as `p3n3m2`
    pub vertex_format: String,
    /// Also emit the plain node hierarchy
    pub emit_nodes: bool,
    /// Fail the whole document on the first entity that cannot be converted
    pub strict: bool,
}

impl Default for DaeConvertConfig {
    fn default() -> Self {
        Self {
            vertex_format: VertexFormat::DEFAULT.to_string(),
            emit_nodes: false,
            strict: false,
        }
    }
}

/// Up axis declared in `<asset>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpAxis {
    XUp,
    #[default]
    YUp,
    ZUp,
}

impl UpAxis {
    pub fn from_asset(value: Option<&str>) -> Self {
        match value {
            Some("X_UP") => Self::XUp,
            Some("Z_UP") => Self::ZUp,
            _ => Self::YUp,
        }
    }
}

/// How far an instance got before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Unvisited,
    GeometryResolved,
    SkeletonResolved,
    WeightsBound,
    Emitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unvisited => "unvisited",
            Self::GeometryResolved => "geometry resolved",
            Self::SkeletonResolved => "skeleton resolved",
            Self::WeightsBound => "weights bound",
            Self::Emitted => "emitted",
        };
        f.write_str(name)
    }
}

/// A node whose subtree was left out of the output.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionFailure {
    pub node: String,
    /// Id the failing instance referred to.
    pub instance: String,
    pub stage: Stage,
    #[serde(serialize_with = "serialize_display")]
    pub error: DaeError,
}

// Output of one node, committed only once every instance on it succeeded.
#[derive(Default)]
struct Staged {
    meshes: Vec<MeshEntry>,
    skeletons: Vec<SkeletonEntry>,
    animations: Vec<AnimationEntry>,
    top: Vec<(String, String)>,
}

impl Staged {
    fn has_mesh(&self, id: &str, skin: Option<&str>) -> bool {
        self.meshes
            .iter()
            .any(|mesh| mesh.id == id && mesh.skin.as_deref() == skin)
    }

    fn has_skeleton(&self, id: &str) -> bool {
        self.skeletons.iter().any(|skeleton| skeleton.id == id)
    }
}

/// Walks every visual scene depth first, converting geometry and controller instances.
pub struct DaeConverter<'a> {
    library: &'a Library,
    config: DaeConvertConfig,
    format: VertexFormat,
    /// Animation channels by target, later declarations replacing earlier ones.
    channels: HashMap<&'a str, &'a Channel>,
    /// Emitted `(geometry, skinning controller)` pairs.
    emitted_meshes: HashSet<(String, Option<String>)>,
    emitted_skeletons: HashSet<String>,
    output: ConvertedScene,
}

impl<'a> DaeConverter<'a> {
    pub fn new(library: &'a Library, config: &DaeConvertConfig) -> Result<Self> {
        let format = VertexFormat::named(&config.vertex_format)?;

        let mut channels = HashMap::new();
        for animation in library.animations().iter() {
            for channel in animation.all_channels() {
                channels.insert(channel.target.as_str(), channel);
            }
        }

        Ok(Self {
            library,
            config: config.clone(),
            format,
            channels,
            emitted_meshes: HashSet::new(),
            emitted_skeletons: HashSet::new(),
            output: ConvertedScene::default(),
        })
    }

    pub fn convert(mut self) -> Result<ConvertedScene> {
        let library = self.library;
        self.output.up_axis = UpAxis::from_asset(library.up_axis().as_deref());

        for scene in library.visual_scenes().iter() {
            for &root in &scene.roots {
                self.visit(scene, root)?;
            }

            if self.config.emit_nodes {
                self.output.nodes.extend(node_entries(scene, &scene.roots));
            }
        }

        log::info!(
            "Converted {} meshes, {} skeletons, {} animations ({} nodes skipped)",
            self.output.meshes.len(),
            self.output.skeletons.len(),
            self.output.animations.len(),
            self.output.failures.len()
        );
        Ok(self.output)
    }

    fn visit(&mut self, scene: &'a VisualScene, id: NodeId) -> Result<()> {
        let node = scene.node(id);
        let mut staged = Staged::default();

        for instance in &node.instances {
            let mut stage = Stage::Unvisited;
            if let Err(error) = self.convert_instance(scene, instance, &mut stage, &mut staged) {
                if self.config.strict {
                    return Err(error);
                }

                log::warn!(
                    "Skipping node '{}' and its children: instance of '{}' failed ({}): {}",
                    node.label(),
                    instance.url().id,
                    stage,
                    error
                );
                self.output.failures.push(ConversionFailure {
                    node: node.label().to_string(),
                    instance: instance.url().id.clone(),
                    stage,
                    error,
                });
                return Ok(());
            }
        }

        self.commit(staged);

        for &child in &node.children {
            self.visit(scene, child)?;
        }
        Ok(())
    }

    fn convert_instance(
        &self,
        scene: &'a VisualScene,
        instance: &Instance,
        stage: &mut Stage,
        staged: &mut Staged,
    ) -> Result<()> {
        match instance {
            Instance::Geometry { url, .. } => {
                let geometry: &Geometry = url.lookup(self.library)?;
                *stage = Stage::GeometryResolved;

                if !self.mesh_emitted(&geometry.id, None, staged) {
                    staged.meshes.push(self.convert_geometry(geometry, None)?);
                }
                staged
                    .top
                    .push((geometry.label().to_string(), geometry.id.clone()));
            }
            Instance::Controller { url, skeletons, .. } => {
                self.convert_controller(scene, url, skeletons, stage, staged)?;
            }
            Instance::Node { url } => {
                let (_, node) = self.library.find_node(&url.id)?;
                log::debug!("Resolved instance_node '{}' ({:?})", url.id, node);
            }
        }

        *stage = Stage::Emitted;
        Ok(())
    }

    fn convert_controller(
        &self,
        scene: &'a VisualScene,
        url: &Reference,
        skeletons: &[Reference],
        stage: &mut Stage,
        staged: &mut Staged,
    ) -> Result<()> {
        let controller: &Controller = url.lookup(self.library)?;
        let skin = &controller.skin;
        if !is_identity(&skin.bind_shape_matrix) {
            return Err(DaeError::UnsupportedBindPose {
                controller: controller.id.clone(),
            });
        }

        let geometry: &Geometry = skin.source.lookup(self.library)?;
        *stage = Stage::GeometryResolved;

        let top = skeletons.first().ok_or_else(|| {
            DaeError::malformed(
                format!("instance_controller url=\"#{}\"", url.id),
                "missing <skeleton>",
            )
        })?;
        let top = scene
            .find(&top.id)
            .ok_or_else(|| DaeError::unresolved(ReferenceKind::Node, top.id.clone()))?;
        let skeleton = Skeleton::new(scene, top);
        *stage = Stage::SkeletonResolved;

        let weights = skeleton.indexed_weights(skin)?;
        *stage = Stage::WeightsBound;

        // Bone indices belong to this controller's skeleton, so each controller
        // gets its own copy of a shared geometry.
        let skin_id = self.format.has_bones().then_some(controller.id.as_str());
        if !self.mesh_emitted(&geometry.id, skin_id, staged) {
            let skin = skin_id.map(|id| (id, weights.as_slice()));
            staged.meshes.push(self.convert_geometry(geometry, skin)?);
        }

        if !self.emitted_skeletons.contains(&controller.id) && !staged.has_skeleton(&controller.id) {
            staged.skeletons.push(skeleton_entry(controller, geometry, &skeleton));
            if let Some(animation) = self.animation_entry(&controller.id, &skeleton)? {
                staged.animations.push(animation);
            }
        }

        staged
            .top
            .push((geometry.label().to_string(), geometry.id.clone()));
        staged
            .top
            .push((controller.label().to_string(), controller.id.clone()));
        Ok(())
    }

    fn mesh_emitted(&self, id: &str, skin: Option<&str>, staged: &Staged) -> bool {
        self.emitted_meshes
            .contains(&(id.to_string(), skin.map(str::to_string)))
            || staged.has_mesh(id, skin)
    }

    /// Interns every triangle corner of `geometry` into one index buffer.
    fn convert_geometry(
        &self,
        geometry: &Geometry,
        skin: Option<(&str, &[Vec<(usize, f32)>])>,
    ) -> Result<MeshEntry> {
        let weights = skin.map(|(_, weights)| weights);
        let mut mesh = Mesh::new(self.format.clone());
        let mut corner = 0;

        for primitives in &geometry.mesh.primitives {
            for (polygon, records) in primitives.polygon_ranges().enumerate() {
                if records.len() != 3 {
                    return Err(DaeError::NonTriangularSurface {
                        geometry: geometry.id.clone(),
                        polygon,
                        count: records.len(),
                    });
                }

                for record in records {
                    let mut vertex = Vertex::new(corner, primitives.vertex(record)?);
                    if let Some(weights) = weights {
                        let index = vertex.vertex_index().ok_or_else(|| {
                            DaeError::MissingVertexAttribute {
                                channel: "VERTEX".to_string(),
                                vertex: corner,
                            }
                        })?;
                        let influences = weights.get(index).ok_or_else(|| DaeError::IndexOutOfRange {
                            context: format!("vertex weights of '{}'", geometry.id),
                            index,
                            size: weights.len(),
                        })?;
                        vertex = vertex.with_bones(influences.clone());
                    }

                    mesh.push(&vertex)?;
                    corner += 1;
                }
            }
        }

        let (index_stream, unique_vertices) = mesh.into_parts();
        log::debug!(
            "Mesh '{}': {} corners, {} unique vertices",
            geometry.id,
            index_stream.len(),
            unique_vertices.len()
        );

        Ok(MeshEntry {
            id: geometry.id.clone(),
            skin: skin.map(|(id, _)| id.to_string()),
            vertex_format: self.format.name.clone(),
            index_stream,
            unique_vertices,
        })
    }

    /// Keyframes of every channel targeting `"{bone}/transform"`, or `None` if no bone is animated.
    fn animation_entry(&self, id: &str, skeleton: &Skeleton) -> Result<Option<AnimationEntry>> {
        let mut key_frames = Vec::new();
        let mut end_time = 0.0f32;
        let mut animated = false;

        for bone in 0..skeleton.len() {
            let target = format!("{}/transform", skeleton.bone_id(bone));
            let Some(channel) = self.channels.get(target.as_str()) else {
                continue;
            };
            animated = true;

            let keyframes = channel.source.keyframes()?;
            if let Some(last) = keyframes.last() {
                end_time = end_time.max(last.time);
            }
            key_frames.extend(keyframes.into_iter().map(|keyframe| KeyframeEntry {
                bone_index: bone,
                interpolation: keyframe.interpolation,
                time: keyframe.time,
                transform: mat4_to_row_major(&keyframe.transform),
            }));
        }

        Ok(animated.then(|| AnimationEntry {
            id: id.to_string(),
            start_time: 0.0,
            end_time,
            key_frames,
        }))
    }

    fn commit(&mut self, staged: Staged) {
        for mesh in staged.meshes {
            if self.emitted_meshes.insert((mesh.id.clone(), mesh.skin.clone())) {
                log::info!(
                    "Emitted mesh '{}'{} ({} triangles, {} vertices)",
                    mesh.id,
                    mesh.skin
                        .as_deref()
                        .map(|skin| format!(" skinned by '{skin}'"))
                        .unwrap_or_default(),
                    mesh.triangle_count(),
                    mesh.unique_vertices.len()
                );
                self.output.meshes.push(mesh);
            }
        }

        for skeleton in staged.skeletons {
            if self.emitted_skeletons.insert(skeleton.id.clone()) {
                log::info!("Emitted skeleton '{}' ({} bones)", skeleton.id, skeleton.bones.len());
                self.output.skeletons.push(skeleton);
            }
        }

        self.output.animations.extend(staged.animations);
        self.output.top.extend(staged.top);
    }
}

fn skeleton_entry(controller: &Controller, geometry: &Geometry, skeleton: &Skeleton) -> SkeletonEntry {
    let bones = skeleton
        .bones()
        .iter()
        .enumerate()
        .map(|(index, bone)| BoneEntry {
            bone_id: skeleton.bone_id(index).to_string(),
            parent_index: bone.parent,
            bind_matrix: mat4_to_row_major(&skeleton.bind_matrix(index)),
        })
        .collect();

    SkeletonEntry {
        id: controller.id.clone(),
        mesh: geometry.id.clone(),
        bones,
    }
}

// Joint nodes and everything below them belong to skeletons.
fn node_entries(scene: &VisualScene, ids: &[NodeId]) -> Vec<NodeEntry> {
    ids.iter()
        .map(|&id| scene.node(id))
        .filter(|node| node.kind == NodeType::Node)
        .map(|node| NodeEntry {
            id: node.label().to_string(),
            local_transform: mat4_to_row_major(&node.local_transform()),
            children: node_entries(scene, &node.children),
        })
        .collect()
}

/// Parse DAE file into a lazily parsed library
pub fn parse_dae_file(file_path: &Path) -> anyhow::Result<Library> {
    let content = std::fs::read_to_string(file_path)
        .map_err(|e| anyhow!("Failed to read DAE file: {}", e))?;
    parse_dae_str(&content)
}

pub fn parse_dae_str(content: &str) -> anyhow::Result<Library> {
    let root = Element::parse(content.as_bytes())
        .map_err(|e| anyhow!("Failed to parse DAE XML: {}", e))?;

    if root.name != "COLLADA" {
        return Err(anyhow!("Expected a <COLLADA> root element, found <{}>", root.name));
    }

    Ok(Library::new(root))
}

/// Convert DAE file into meshes, skeletons, and animations
pub fn convert_dae_file(
    dae_file_path: &Path,
    config: &DaeConvertConfig,
) -> anyhow::Result<ConvertedScene> {
    let library = parse_dae_file(dae_file_path)?;
    convert_library(&library, config)
        .with_context(|| format!("Failed to convert {}", dae_file_path.display()))
}

pub fn convert_dae_str(content: &str, config: &DaeConvertConfig) -> anyhow::Result<ConvertedScene> {
    let library = parse_dae_str(content)?;
    convert_library(&library, config)
}

fn convert_library(library: &Library, config: &DaeConvertConfig) -> anyhow::Result<ConvertedScene> {
    let scene = DaeConverter::new(library, config)?.convert()?;
    validate_converted_scene(&scene)?;
    Ok(scene)
}

/// Validate converted meshes and skeletons before handing them out
pub fn validate_converted_scene(scene: &ConvertedScene) -> anyhow::Result<()> {
    for mesh in &scene.meshes {
        let vertex_count = mesh.unique_vertices.len();
        for (position, &index) in mesh.index_stream.iter().enumerate() {
            if index as usize >= vertex_count {
                return Err(anyhow!(
                    "Mesh '{}' has out-of-bounds index: {} at position {} (vertex count: {})",
                    mesh.id,
                    index,
                    position,
                    vertex_count
                ));
            }
        }

        if mesh.index_stream.len() % 3 != 0 {
            return Err(anyhow!(
                "Mesh '{}' has invalid index count: {} (must be divisible by 3 for triangles)",
                mesh.id,
                mesh.index_stream.len()
            ));
        }

        if vertex_count == 0 {
            log::warn!("Mesh '{}' has no vertices", mesh.id);
        }

        log::debug!(
            "Mesh '{}': {} vertices, {} indices ({} triangles), format {}",
            mesh.id,
            vertex_count,
            mesh.index_stream.len(),
            mesh.triangle_count(),
            mesh.vertex_format
        );
    }

    for skeleton in &scene.skeletons {
        if scene.skinned_mesh(skeleton).is_none() {
            return Err(anyhow!(
                "Skeleton '{}' deforms mesh '{}', which was not emitted",
                skeleton.id,
                skeleton.mesh
            ));
        }

        for (index, bone) in skeleton.bones.iter().enumerate() {
            if bone.parent_index.map_or(false, |parent| parent >= index) {
                return Err(anyhow!(
                    "Skeleton '{}' bone '{}' is ordered before its parent",
                    skeleton.id,
                    bone.bone_id
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DaeConvertConfig::default();
        assert_eq!("p3n3m2", config.vertex_format);
        assert!(!config.emit_nodes);
        assert!(!config.strict);
    }

    #[test]
    fn up_axis_names() {
        assert_eq!(UpAxis::ZUp, UpAxis::from_asset(Some("Z_UP")));
        assert_eq!(UpAxis::XUp, UpAxis::from_asset(Some("X_UP")));
        assert_eq!(UpAxis::YUp, UpAxis::from_asset(Some("W_UP")));
        assert_eq!(UpAxis::YUp, UpAxis::from_asset(None));
    }

    #[test]
    fn unknown_vertex_format() {
        let library = parse_dae_str("<COLLADA/>").unwrap();
        let config = DaeConvertConfig {
            vertex_format: "p2".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            DaeConverter::new(&library, &config),
            Err(DaeError::UnknownVertexFormat(_))
        ));
    }

    #[test]
    fn wrong_root_element() {
        assert!(parse_dae_str("<scene/>").is_err());
        assert!(parse_dae_str("not xml").is_err());
    }

    #[test]
    fn validation_rejects_bad_indices() {
        let mut scene = ConvertedScene::default();
        scene.meshes.push(MeshEntry {
            id: "broken".to_string(),
            skin: None,
            vertex_format: "p3n3".to_string(),
            index_stream: vec![0, 1, 3],
            unique_vertices: vec![vec![0.0; 6]; 3],
        });
        let error = validate_converted_scene(&scene).unwrap_err();
        assert!(error.to_string().contains("out-of-bounds"));

        scene.meshes[0].index_stream = vec![0, 1];
        assert!(validate_converted_scene(&scene).is_err());

        scene.meshes[0].index_stream = vec![0, 1, 2];
        assert!(validate_converted_scene(&scene).is_ok());
    }

    #[test]
    fn validation_requires_the_skinned_mesh() {
        let mut scene = ConvertedScene::default();
        scene.meshes.push(MeshEntry {
            id: "body".to_string(),
            skin: Some("other-rig".to_string()),
            vertex_format: "p3n3m2b4".to_string(),
            index_stream: Vec::new(),
            unique_vertices: Vec::new(),
        });
        scene.skeletons.push(SkeletonEntry {
            id: "rig".to_string(),
            mesh: "body".to_string(),
            bones: Vec::new(),
        });
        let error = validate_converted_scene(&scene).unwrap_err();
        assert!(error.to_string().contains("not emitted"));

        scene.meshes[0].skin = Some("rig".to_string());
        assert!(validate_converted_scene(&scene).is_ok());
    }

    #[test]
    fn empty_document_converts_to_nothing() {
        let scene = convert_dae_str("<COLLADA/>", &DaeConvertConfig::default()).unwrap();
        assert!(scene.meshes.is_empty());
        assert!(scene.is_complete());
        assert_eq!(UpAxis::YUp, scene.up_axis);
    }
}
