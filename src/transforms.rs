//! Node transform stacks and matrix layout helpers.
//!
//! COLLADA stores matrices row-major; glam is column-major. Everything that
//! crosses the document or payload boundary goes through [`mat4_from_row_major`]
//! or [`mat4_to_row_major`].

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

use crate::document::DocumentNode;
use crate::error::{DaeError, Result};

/// One element of a node's transform stack.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Translate(Vec3),
    /// Axis and angle in degrees.
    Rotate { axis: Vec3, angle: f32 },
    Scale(Vec3),
    Matrix(Mat4),
}

impl TransformOp {
    /// Parses a transform element, returning `None` for elements that are not transforms.
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Option<Self>> {
        let op = match element.tag() {
            "translate" => Self::Translate(Vec3::from_array(fixed_values::<_, 3>(element)?)),
            "scale" => Self::Scale(Vec3::from_array(fixed_values::<_, 3>(element)?)),
            "rotate" => {
                let [x, y, z, angle] = fixed_values::<_, 4>(element)?;
                Self::Rotate {
                    axis: Vec3::new(x, y, z),
                    angle,
                }
            }
            "matrix" => Self::Matrix(mat4_from_row_major(&fixed_values::<_, 16>(element)?)),
            "lookat" | "skew" => return Err(DaeError::UnsupportedTransform(element.tag().to_string())),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    pub fn to_mat4(&self) -> Mat4 {
        match self {
            Self::Translate(offset) => Mat4::from_translation(*offset),
            // Axis-angle formula applied to the axis as written, without normalizing.
            Self::Rotate { axis, angle } => {
                let (s, c) = angle.to_radians().sin_cos();
                let t = 1.0 - c;
                let Vec3 { x, y, z } = *axis;
                Mat4::from_cols(
                    Vec4::new(x * x * t + c, x * y * t + z * s, x * z * t - y * s, 0.0),
                    Vec4::new(x * y * t - z * s, y * y * t + c, y * z * t + x * s, 0.0),
                    Vec4::new(x * z * t + y * s, y * z * t - x * s, z * z * t + c, 0.0),
                    Vec4::W,
                )
            }
            Self::Scale(scale) => Mat4::from_scale(*scale),
            Self::Matrix(matrix) => *matrix,
        }
    }
}

/// Left-to-right product of the stack, starting from identity.
pub fn compose(ops: &[TransformOp]) -> Mat4 {
    ops.iter()
        .fold(Mat4::IDENTITY, |product, op| product * op.to_mat4())
}

pub fn mat4_from_row_major(values: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(values).transpose()
}

pub fn mat4_to_row_major(matrix: &Mat4) -> [f32; 16] {
    matrix.transpose().to_cols_array()
}

pub fn is_identity(matrix: &Mat4) -> bool {
    matrix.abs_diff_eq(Mat4::IDENTITY, 1e-6)
}

/// Translation and rotation of a rigid transform as `[tx, ty, tz, qx, qy, qz, qw]`.
pub fn extract_axis(matrix: &Mat4) -> [f32; 7] {
    let translation = matrix.w_axis.truncate();
    let rotation = Quat::from_mat3(&Mat3::from_mat4(*matrix));
    [
        translation.x,
        translation.y,
        translation.z,
        rotation.x,
        rotation.y,
        rotation.z,
        rotation.w,
    ]
}

fn fixed_values<E: DocumentNode, const N: usize>(element: &E) -> Result<[f32; N]> {
    let values = element.tokens::<f32>()?;
    let count = values.len();
    values.try_into().map_err(|_| {
        DaeError::malformed(
            element.describe(),
            format!("expected {N} values, found {count}"),
        )
    })
}
