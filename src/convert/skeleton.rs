use std::collections::HashMap;

use glam::Mat4;

use crate::error::{DaeError, Result};
use crate::parse::{NodeId, NodeType, ReferenceKind, Skin, VisualScene};

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    /// Always a smaller index than this bone's own. `None` for the top bone.
    pub parent: Option<usize>,
    pub node: NodeId,
}

/// Joints below a top node, ordered so parents precede children.
#[derive(Debug)]
pub struct Skeleton<'a> {
    scene: &'a VisualScene,
    bones: Vec<Bone>,
    indexed: HashMap<NodeId, usize>,
    names: HashMap<&'a str, usize>,
}

impl<'a> Skeleton<'a> {
    pub fn new(scene: &'a VisualScene, top: NodeId) -> Self {
        let mut bones = vec![Bone {
            parent: None,
            node: top,
        }];
        let mut indexed = HashMap::from([(top, 0)]);

        for node in scene.traverse(top).into_iter().skip(1) {
            if scene.node(node).kind != NodeType::Joint {
                continue;
            }

            // Pre-order indexes every joint ancestor below `top` first. A joint with
            // no such ancestor hangs directly off `top`.
            let parent = scene
                .parents(node, Some(NodeType::Joint))
                .into_iter()
                .find_map(|ancestor| indexed.get(&ancestor).copied())
                .unwrap_or(0);

            indexed.insert(node, bones.len());
            bones.push(Bone {
                parent: Some(parent),
                node,
            });
        }

        let mut names = HashMap::new();
        for (index, bone) in bones.iter().enumerate() {
            if let Some(id) = scene.node(bone.node).id.as_deref() {
                names.insert(id, index);
            }
        }
        for (index, bone) in bones.iter().enumerate() {
            if let Some(sid) = scene.node(bone.node).sid.as_deref() {
                names.entry(sid).or_insert(index);
            }
        }

        Self {
            scene,
            bones,
            indexed,
            names,
        }
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.indexed.get(&node).copied()
    }

    /// Bone index for a joint name, matching node ids before sids.
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn bone_id(&self, bone: usize) -> &str {
        self.scene.node(self.bones[bone].node).label()
    }

    /// World transform of a bone's node.
    pub fn bind_matrix(&self, bone: usize) -> Mat4 {
        self.scene.transform_matrix(self.bones[bone].node)
    }

    /// Per-vertex `(bone index, weight)` lists, heaviest first.
    ///
    /// Equal weights keep their document order.
    pub fn indexed_weights(&self, skin: &Skin) -> Result<Vec<Vec<(usize, f32)>>> {
        skin.raw_weights()?
            .into_iter()
            .map(|influences| {
                let mut indexed = influences
                    .into_iter()
                    .map(|(joint, weight)| {
                        self.bone_index(&joint)
                            .map(|bone| (bone, weight))
                            .ok_or_else(|| DaeError::unresolved(ReferenceKind::Joint, joint))
                    })
                    .collect::<Result<Vec<_>>>()?;
                indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
                Ok(indexed)
            })
            .collect()
    }
}
