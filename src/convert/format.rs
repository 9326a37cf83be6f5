use crate::error::{DaeError, Result};
use crate::parse::Semantic;

use super::mesh::Vertex;

/// Fixed-size bone influences for a skinned vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightFormat(pub usize);

impl WeightFormat {
    /// Splits influences into exactly `n` bones and `n` weights.
    ///
    /// Missing influences are `(0, 0.0)`. Extra influences past `n` are dropped,
    /// so the input must already be sorted by descending weight.
    pub fn extract(&self, influences: &[(usize, f32)]) -> (Vec<usize>, Vec<f32>) {
        (0..self.0)
            .map(|i| influences.get(i).copied().unwrap_or((0, 0.0)))
            .unzip()
    }
}

/// What a channel pulls out of its attribute record.
#[derive(Debug, Clone, PartialEq)]
pub enum Components {
    Fields(&'static [&'static str]),
    /// `[S, 1 - T]`, flipping the texture origin to the top left.
    FlippedTexcoord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Channel {
    Attribute(Semantic, Components),
    /// Bone indices followed by their weights.
    Bones(WeightFormat),
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attribute(semantic, _) => semantic.as_str(),
            Self::Bones(_) => "BONES",
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::Attribute(_, Components::Fields(fields)) => fields.len(),
            Self::Attribute(_, Components::FlippedTexcoord) => 2,
            Self::Bones(WeightFormat(n)) => n * 2,
        }
    }

    fn extract(&self, vertex: &Vertex, output: &mut Vec<f32>) -> Result<()> {
        let missing = || DaeError::MissingVertexAttribute {
            channel: self.name().to_string(),
            vertex: vertex.position,
        };

        match self {
            Self::Attribute(semantic, components) => {
                let record = &vertex.attribute(*semantic).ok_or_else(missing)?.value;
                let field = |name: &str| {
                    record
                        .get(name)
                        .and_then(|value| value.as_float())
                        .ok_or_else(|| DaeError::MissingVertexAttribute {
                            channel: format!("{}.{}", semantic, name),
                            vertex: vertex.position,
                        })
                };

                match components {
                    Components::Fields(fields) => {
                        for name in fields.iter().copied() {
                            output.push(field(name)?);
                        }
                    }
                    Components::FlippedTexcoord => {
                        output.push(field("S")?);
                        output.push(1.0 - field("T")?);
                    }
                }
            }
            Self::Bones(format) => {
                let influences = vertex.bones.as_deref().ok_or_else(missing)?;
                let (bones, weights) = format.extract(influences);
                output.extend(bones.into_iter().map(|bone| bone as f32));
                output.extend(weights);
            }
        }
        Ok(())
    }
}

const XYZ: &[&str] = &["X", "Y", "Z"];

/// An ordered list of channels that flattens a vertex into numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexFormat {
    pub name: String,
    pub channels: Vec<Channel>,
}

impl VertexFormat {
    pub const DEFAULT: &'static str = "p3n3m2";

    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        Self {
            name: name.into(),
            channels,
        }
    }

    /// Looks up one of the built-in formats.
    ///
    /// | name | layout |
    /// |---|---|
    /// | `p3n3` | position, normal |
    /// | `p3n3m2` | position, normal, texcoord |
    /// | `p3n3m2b2` | position, normal, texcoord, 2 bones |
    /// | `p3n3m2b4` | position, normal, texcoord, 4 bones |
    pub fn named(name: &str) -> Result<Self> {
        let position = Channel::Attribute(Semantic::Position, Components::Fields(XYZ));
        let normal = Channel::Attribute(Semantic::Normal, Components::Fields(XYZ));
        let texcoord = Channel::Attribute(Semantic::Texcoord, Components::FlippedTexcoord);

        let channels = match name {
            "p3n3" => vec![position, normal],
            "p3n3m2" => vec![position, normal, texcoord],
            "p3n3m2b2" => vec![position, normal, texcoord, Channel::Bones(WeightFormat(2))],
            "p3n3m2b4" => vec![position, normal, texcoord, Channel::Bones(WeightFormat(4))],
            other => return Err(DaeError::UnknownVertexFormat(other.to_string())),
        };
        Ok(Self::new(name, channels))
    }

    /// Values per vertex.
    pub fn width(&self) -> usize {
        self.channels.iter().map(Channel::width).sum()
    }

    pub fn has_bones(&self) -> bool {
        self.channels
            .iter()
            .any(|channel| matches!(channel, Channel::Bones(_)))
    }

    /// Flattens `vertex` in channel order.
    pub fn extract(&self, vertex: &Vertex) -> Result<Vec<f32>> {
        let mut output = Vec::with_capacity(self.width());
        for channel in &self.channels {
            channel.extract(vertex, &mut output)?;
        }
        Ok(output)
    }
}
