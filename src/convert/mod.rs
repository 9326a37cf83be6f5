pub mod dae;
pub mod format;
pub mod mesh;
pub mod skeleton;

pub use dae::{ConversionFailure, DaeConvertConfig, DaeConverter, Stage, UpAxis};
pub use format::{VertexFormat, WeightFormat};
pub use mesh::{Mesh, Vertex};
pub use skeleton::{Bone, Skeleton};
