use thiserror::Error;

use crate::parse::ReferenceKind;

pub type Result<T> = std::result::Result<T, DaeError>;

/// Structural defects found while resolving or converting a document.
///
/// None of these are transient. Each one aborts conversion of the entity it
/// was raised for.
#[derive(Debug, Clone, Error)]
pub enum DaeError {
    #[error("Accessor in source '{source_id}' cannot bind array '{array_id}'")]
    UnboundArray { source_id: String, array_id: String },

    #[error("Accessor in source '{source_id}' has stride {stride} but its parameters need {required} values")]
    StrideTooSmall {
        source_id: String,
        stride: usize,
        required: usize,
    },

    #[error("Accessor in source '{source_id}' cannot decode {kind} values from array '{array_id}'")]
    IncompatibleArray {
        source_id: String,
        array_id: String,
        kind: &'static str,
    },

    #[error("Input '{semantic}' refers to unknown source '{source_id}'")]
    UnresolvedSource { semantic: String, source_id: String },

    #[error("Unresolved {kind} reference '{id}'")]
    UnresolvedReference { kind: ReferenceKind, id: String },

    #[error("Mesh '{geometry}' contains unsupported primitive <{element}>")]
    UnsupportedPolygonShape { geometry: String, element: String },

    #[error("Mesh '{geometry}' has a polygon {polygon} with {count} vertices; only triangles are supported")]
    NonTriangularSurface {
        geometry: String,
        polygon: usize,
        count: usize,
    },

    #[error("Vertex {vertex} has no '{channel}' attribute required by the vertex format")]
    MissingVertexAttribute { channel: String, vertex: usize },

    #[error("Controller '{controller}' has a non-identity bind shape matrix")]
    UnsupportedBindPose { controller: String },

    #[error("Malformed document in <{element}>: {message}")]
    MalformedDocument { element: String, message: String },

    #[error("Index {index} is out of range for '{context}' (size {size})")]
    IndexOutOfRange {
        context: String,
        index: usize,
        size: usize,
    },

    #[error("Unknown input semantic '{0}'")]
    UnknownSemantic(String),

    #[error("Unsupported transform element <{0}>")]
    UnsupportedTransform(String),

    #[error("Unknown vertex format '{0}'")]
    UnknownVertexFormat(String),
}

impl DaeError {
    pub fn malformed(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            element: element.into(),
            message: message.into(),
        }
    }

    pub fn unresolved(kind: ReferenceKind, id: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            kind,
            id: id.into(),
        }
    }

    /// True for the binding family of failures (array lookup and layout).
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::UnboundArray { .. } | Self::StrideTooSmall { .. } | Self::IncompatibleArray { .. }
        )
    }
}
