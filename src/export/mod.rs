//! Output payloads handed to an external serializer.

pub mod scene;

pub use scene::{
    AnimationEntry, BoneEntry, ConvertedScene, KeyframeEntry, MeshEntry, NodeEntry, SkeletonEntry,
};
