use std::fmt;

use glam::Mat4;

use crate::document::{fragment_id, DocumentNode};
use crate::error::Result;
use crate::transforms::{compose, TransformOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Geometry,
    Controller,
    Node,
    Joint,
    Sampler,
    Animation,
    VisualScene,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Geometry => "geometry",
            Self::Controller => "controller",
            Self::Node => "node",
            Self::Joint => "joint",
            Self::Sampler => "sampler",
            Self::Animation => "animation",
            Self::VisualScene => "visual scene",
        };
        f.write_str(name)
    }
}

/// An unresolved pointer to a library entity. Resolved with `Reference::lookup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub id: String,
}

impl Reference {
    pub fn new(kind: ReferenceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    fn from_url<E: DocumentNode>(kind: ReferenceKind, element: &E) -> Result<Self> {
        Ok(Self::new(kind, fragment_id(element.required_attr("url")?)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Geometry {
        url: Reference,
        name: Option<String>,
    },
    Controller {
        url: Reference,
        name: Option<String>,
        /// Root joint nodes from `<skeleton>` children.
        skeletons: Vec<Reference>,
    },
    Node {
        url: Reference,
    },
}

impl Instance {
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Option<Self>> {
        let name = element.attr("name").map(str::to_string);
        let instance = match element.tag() {
            "instance_geometry" => Self::Geometry {
                url: Reference::from_url(ReferenceKind::Geometry, element)?,
                name,
            },
            "instance_controller" => Self::Controller {
                url: Reference::from_url(ReferenceKind::Controller, element)?,
                name,
                skeletons: element
                    .children_named("skeleton")
                    .filter_map(|skeleton| skeleton.text())
                    .map(|url| Reference::new(ReferenceKind::Node, fragment_id(url.trim())))
                    .collect(),
            },
            "instance_node" => Self::Node {
                url: Reference::from_url(ReferenceKind::Node, element)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(instance))
    }

    pub fn url(&self) -> &Reference {
        match self {
            Self::Geometry { url, .. } | Self::Controller { url, .. } | Self::Node { url } => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Node,
    Joint,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Option<String>,
    pub sid: Option<String>,
    pub name: Option<String>,
    pub kind: NodeType,
    pub transforms: Vec<TransformOp>,
    pub instances: Vec<Instance>,
    pub children: Vec<NodeId>,
    /// Navigation only; the scene owns every node.
    pub parent: Option<NodeId>,
}

impl Node {
    /// Id, then sid, then name.
    pub fn label(&self) -> &str {
        self.id
            .as_deref()
            .or(self.sid.as_deref())
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    pub fn local_transform(&self) -> Mat4 {
        compose(&self.transforms)
    }
}

/// A node hierarchy stored in an arena.
#[derive(Debug, Clone)]
pub struct VisualScene {
    pub id: Option<String>,
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    pub roots: Vec<NodeId>,
}

impl VisualScene {
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Self> {
        let mut nodes = Vec::new();
        let roots = element
            .children_named("node")
            .map(|node| parse_node(node, &mut nodes))
            .collect::<Result<_>>()?;

        Ok(Self {
            id: element.attr("id").map(str::to_string),
            name: element.attr("name").map(str::to_string),
            nodes,
            roots,
        })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Finds a node by its document id.
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.id.as_deref() == Some(id))
            .map(NodeId)
    }

    /// Ancestors from the nearest outwards, optionally only those of `kind`.
    pub fn parents(&self, id: NodeId, kind: Option<NodeType>) -> Vec<NodeId> {
        std::iter::successors(self.node(id).parent, |&parent| self.node(parent).parent)
            .filter(|&parent| kind.map_or(true, |kind| self.node(parent).kind == kind))
            .collect()
    }

    /// World transform: the parent's world transform times the local one.
    pub fn transform_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        match node.parent {
            Some(parent) => self.transform_matrix(parent) * node.local_transform(),
            None => node.local_transform(),
        }
    }

    /// Pre-order walk of `start` and its descendants.
    pub fn traverse(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut pending = vec![start];
        while let Some(id) = pending.pop() {
            order.push(id);
            pending.extend(self.node(id).children.iter().rev());
        }
        order
    }
}

// Children are parsed before their parent; back-references are attached afterwards.
fn parse_node<E: DocumentNode>(element: &E, nodes: &mut Vec<Node>) -> Result<NodeId> {
    let children: Vec<NodeId> = element
        .children_named("node")
        .map(|child| parse_node(child, nodes))
        .collect::<Result<_>>()?;

    let mut transforms = Vec::new();
    let mut instances = Vec::new();
    for child in element.element_children() {
        if let Some(op) = TransformOp::parse(child)? {
            transforms.push(op);
        } else if let Some(instance) = Instance::parse(child)? {
            instances.push(instance);
        }
    }

    let kind = match element.attr("type") {
        Some("JOINT") => NodeType::Joint,
        _ => NodeType::Node,
    };

    let id = NodeId(nodes.len());
    for child in &children {
        nodes[child.0].parent = Some(id);
    }
    nodes.push(Node {
        id: element.attr("id").map(str::to_string),
        sid: element.attr("sid").map(str::to_string),
        name: element.attr("name").map(str::to_string),
        kind,
        transforms,
        instances,
        children,
        parent: None,
    });
    Ok(id)
}
