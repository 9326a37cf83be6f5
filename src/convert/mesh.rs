use std::collections::HashMap;

use crate::error::Result;
use crate::parse::{Attribute, Semantic, Value};

use super::format::VertexFormat;

/// One polygon corner: its attribute bundle plus optional bone influences.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Position in the flattened corner stream, for error reporting.
    pub position: usize,
    pub attributes: Vec<Attribute>,
    /// `(bone index, weight)` pairs sorted by descending weight.
    pub bones: Option<Vec<(usize, f32)>>,
}

impl Vertex {
    pub fn new(position: usize, attributes: Vec<Attribute>) -> Self {
        Self {
            position,
            attributes,
            bones: None,
        }
    }

    pub fn with_bones(mut self, bones: Vec<(usize, f32)>) -> Self {
        self.bones = Some(bones);
        self
    }

    /// The first attribute tagged with `semantic`.
    pub fn attribute(&self, semantic: Semantic) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.semantic == semantic)
    }

    /// Index into the `<vertices>` bundle this corner was read through.
    pub fn vertex_index(&self) -> Option<usize> {
        self.attribute(Semantic::Vertex)
            .and_then(|attribute| attribute.value.get("index"))
            .and_then(Value::as_index)
    }
}

/// Hashable identity of a formatted vertex.
///
/// Compares bit patterns, with `-0.0` folded into `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexKey(Vec<u32>);

impl VertexKey {
    pub fn new(values: &[f32]) -> Self {
        Self(
            values
                .iter()
                .map(|&value| if value == 0.0 { 0.0f32.to_bits() } else { value.to_bits() })
                .collect(),
        )
    }
}

/// Builds a deduplicated vertex buffer and its index stream.
#[derive(Debug)]
pub struct Mesh {
    format: VertexFormat,
    lookup: HashMap<VertexKey, u32>,
    vertices: Vec<Vec<f32>>,
    indices: Vec<u32>,
}

impl Mesh {
    pub fn new(format: VertexFormat) -> Self {
        Self {
            format,
            lookup: HashMap::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Appends a corner, reusing the index of an identical earlier vertex.
    pub fn push(&mut self, vertex: &Vertex) -> Result<u32> {
        let values = self.format.extract(vertex)?;
        let next = self.vertices.len() as u32;
        let index = *self.lookup.entry(VertexKey::new(&values)).or_insert(next);
        if index == next {
            self.vertices.push(values);
        }
        self.indices.push(index);
        Ok(index)
    }

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    /// Unique vertices in first-seen order.
    pub fn vertices(&self) -> &[Vec<f32>] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn into_parts(self) -> (Vec<u32>, Vec<Vec<f32>>) {
        (self.indices, self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Record;

    fn corner(position: usize, xyz: [f32; 3]) -> Vertex {
        let record = |fields: &[(&str, f32)]| {
            Record::new(
                fields
                    .iter()
                    .map(|(name, value)| (name.to_string(), Value::Float(*value)))
                    .collect(),
            )
        };
        Vertex::new(
            position,
            vec![
                Attribute::new(
                    Semantic::Position,
                    record(&[("X", xyz[0]), ("Y", xyz[1]), ("Z", xyz[2])]),
                ),
                Attribute::new(Semantic::Normal, record(&[("X", 0.0), ("Y", 0.0), ("Z", 1.0)])),
                Attribute::new(
                    Semantic::Vertex,
                    Record::new(vec![("index".to_string(), Value::Index(position))]),
                ),
            ],
        )
    }

    fn quad() -> Vec<Vertex> {
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        corners
            .iter()
            .enumerate()
            .map(|(i, &xyz)| corner(i, xyz))
            .collect()
    }

    fn build(vertices: &[Vertex]) -> Mesh {
        let mut mesh = Mesh::new(VertexFormat::named("p3n3").unwrap());
        for vertex in vertices {
            mesh.push(vertex).unwrap();
        }
        mesh
    }

    #[test]
    fn shared_corners_are_interned() {
        let mesh = build(&quad());
        assert_eq!(vec![0, 1, 2, 0, 2, 3], mesh.indices().to_vec());
        assert_eq!(4, mesh.vertices().len());
        assert_eq!(vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0], mesh.vertices()[3]);
    }

    #[test]
    fn interning_is_deterministic() {
        let first = build(&quad()).into_parts();
        let second = build(&quad()).into_parts();
        assert_eq!(first, second);
        assert!(first.1.len() <= first.0.len());
    }

    #[test]
    fn negative_zero_matches_zero() {
        let mesh = build(&[corner(0, [0.0, 0.0, 0.0]), corner(1, [-0.0, 0.0, 0.0])]);
        assert_eq!(vec![0, 0], mesh.indices().to_vec());
    }

    #[test]
    fn vertex_index_tag() {
        assert_eq!(Some(4), corner(4, [0.0; 3]).vertex_index());
        assert_eq!(None, Vertex::new(0, Vec::new()).vertex_index());
    }
}
