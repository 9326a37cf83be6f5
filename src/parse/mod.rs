//! Typed views over the COLLADA element tree.

pub mod accessor;
pub mod animation;
pub mod array;
pub mod controller;
pub mod geometry;
pub mod library;
pub mod source;
pub mod visual_scene;

pub use accessor::{Accessor, ParamKind, Parameter, Record, Value};
pub use animation::{Animation, Channel, Interpolation, Keyframe, Sampler};
pub use array::{ArrayStore, DataArray};
pub use controller::{Controller, Skin, VertexWeights};
pub use geometry::{Geometry, Mesh, PolygonShape, Polygons, Vertices};
pub use library::{Library, LibraryItem, Section};
pub use source::{Attribute, Input, Provider, ReadAttributes, Semantic, Source, SourceTable};
pub use visual_scene::{Instance, Node, NodeId, NodeType, Reference, ReferenceKind, VisualScene};
