//! Conversion of COLLADA (.dae) scenes into indexed meshes, skeletons, and
//! raw keyframe channels.
//!
//! The pipeline reads a document into a lazily parsed [`parse::Library`],
//! then walks each visual scene with [`convert::DaeConverter`] to produce a
//! [`export::ConvertedScene`] ready for an external serializer.

pub mod convert;
pub mod document;
pub mod error;
pub mod export;
pub mod parse;
pub mod transforms;

pub use convert::dae::{convert_dae_file, convert_dae_str, DaeConvertConfig, DaeConverter};
pub use error::{DaeError, Result};
pub use export::ConvertedScene;
pub use parse::Library;
