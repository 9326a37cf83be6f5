use std::ops::Range;
use std::rc::Rc;

use super::accessor::{Record, Value};
use super::array::ArrayStore;
use super::source::{Attribute, Input, Provider, ReadAttributes, Semantic, SourceTable};
use crate::document::DocumentNode;
use crate::error::{DaeError, Result};

/// Inputs sharing one element index, typically the canonical POSITION binding.
#[derive(Debug, Clone)]
pub struct Vertices {
    pub id: String,
    pub inputs: Vec<Input>,
}

impl Vertices {
    pub fn parse<E: DocumentNode>(element: &E, sources: &SourceTable) -> Result<Self> {
        Ok(Self {
            id: element.required_attr("id")?.to_string(),
            inputs: Input::parse_all(element, sources)?,
        })
    }
}

impl ReadAttributes for Vertices {
    /// All input attributes plus a `VERTEX` attribute carrying `index`.
    fn read(&self, index: usize) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::with_capacity(self.inputs.len() + 1);
        for input in &self.inputs {
            attributes.extend(input.read(index)?);
        }
        attributes.push(Attribute::new(
            Semantic::Vertex,
            Record::new(vec![("index".to_string(), Value::Index(index))]),
        ));
        Ok(attributes)
    }

    fn len(&self) -> usize {
        self.inputs.iter().map(Input::len).max().unwrap_or(0)
    }
}

/// How many vertex records each polygon consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonShape {
    Triangles,
    /// Per-polygon vertex counts from `<vcount>`.
    PolyList(Vec<usize>),
}

impl PolygonShape {
    pub fn vertex_count(&self, polygon: usize) -> usize {
        match self {
            Self::Triangles => 3,
            Self::PolyList(counts) => counts.get(polygon).copied().unwrap_or(0),
        }
    }

    /// Vertex records consumed by the first `count` polygons, `None` on overflow.
    fn vertex_total(&self, count: usize) -> Option<usize> {
        match self {
            Self::Triangles => count.checked_mul(3),
            Self::PolyList(counts) => counts
                .iter()
                .take(count)
                .try_fold(0usize, |total, &vertices| total.checked_add(vertices)),
        }
    }
}

/// An index buffer plus the inputs its index tuples address.
#[derive(Debug, Clone)]
pub struct Polygons {
    pub inputs: Vec<Input>,
    pub indices: Vec<usize>,
    pub count: usize,
    pub shape: PolygonShape,
    pub material: Option<String>,
    stride: usize,
}

impl Polygons {
    pub fn new(
        inputs: Vec<Input>,
        indices: Vec<usize>,
        count: usize,
        shape: PolygonShape,
    ) -> Result<Self> {
        let stride = inputs
            .iter()
            .map(|input| input.offset)
            .max()
            .map(|offset| offset + 1)
            .ok_or_else(|| DaeError::malformed("polygons", "no inputs"))?;

        if let PolygonShape::PolyList(counts) = &shape {
            if counts.len() < count {
                return Err(DaeError::malformed(
                    "vcount",
                    format!("{} counts for {} polygons", counts.len(), count),
                ));
            }
        }

        let fits = shape
            .vertex_total(count)
            .and_then(|total| total.checked_mul(stride))
            .is_some_and(|required| required <= indices.len());
        if !fits {
            return Err(DaeError::malformed(
                "p",
                format!("{} polygons need more than {} indices", count, indices.len()),
            ));
        }

        Ok(Self {
            inputs,
            indices,
            count,
            shape,
            material: None,
            stride,
        })
    }

    /// Parses `<triangles>` or `<polylist>`.
    pub fn parse<E: DocumentNode>(element: &E, sources: &SourceTable, geometry: &str) -> Result<Self> {
        let shape = match element.tag() {
            "triangles" => PolygonShape::Triangles,
            "polylist" => PolygonShape::PolyList(match element.child("vcount") {
                Some(vcount) => vcount.tokens()?,
                None => Vec::new(),
            }),
            other => {
                return Err(DaeError::UnsupportedPolygonShape {
                    geometry: geometry.to_string(),
                    element: other.to_string(),
                })
            }
        };

        let inputs = Input::parse_all(element, sources)?;
        let count = element.parse_attr("count")?.ok_or_else(|| {
            DaeError::malformed(element.describe(), "missing required attribute 'count'")
        })?;
        let indices = match element.child("p") {
            Some(p) => p.tokens()?,
            None => Vec::new(),
        };

        let mut polygons = Self::new(inputs, indices, count, shape)?;
        polygons.material = element.attr("material").map(str::to_string);
        Ok(polygons)
    }

    /// Indices consumed per vertex record.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn vertex_count(&self, polygon: usize) -> usize {
        self.shape.vertex_count(polygon)
    }

    /// Reads vertex record `vertex` of the flattened index stream.
    pub fn vertex(&self, vertex: usize) -> Result<Vec<Attribute>> {
        let base = self.stride * vertex;
        let mut attributes = Vec::new();
        for input in &self.inputs {
            let position = base + input.offset;
            let index = *self.indices.get(position).ok_or(DaeError::IndexOutOfRange {
                context: "p".to_string(),
                index: position,
                size: self.indices.len(),
            })?;
            attributes.extend(input.read(index)?);
        }
        Ok(attributes)
    }

    /// Ranges of vertex records, one per polygon.
    pub fn polygon_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.count).scan(0, |start, polygon| {
            let end = *start + self.vertex_count(polygon);
            let range = *start..end;
            *start = end;
            Some(range)
        })
    }
}

#[derive(Debug)]
pub struct Mesh {
    pub sources: SourceTable,
    pub vertices: Option<Rc<Vertices>>,
    /// Primitive elements in document order.
    pub primitives: Vec<Polygons>,
}

impl Mesh {
    pub fn parse<E: DocumentNode>(element: &E, geometry: &str) -> Result<Self> {
        let arrays = ArrayStore::parse(element)?;
        let mut sources = SourceTable::parse(element, &arrays)?;

        let vertices = match element.child("vertices") {
            Some(vertices) => {
                let vertices = Rc::new(Vertices::parse(vertices, &sources)?);
                sources.insert(Provider::Vertices(vertices.clone()));
                Some(vertices)
            }
            None => None,
        };

        let mut primitives = Vec::new();
        for child in element.element_children() {
            match child.tag() {
                "triangles" | "polylist" => primitives.push(Polygons::parse(child, &sources, geometry)?),
                "lines" | "linestrips" | "polygons" | "trifans" | "tristrips" => {
                    return Err(DaeError::UnsupportedPolygonShape {
                        geometry: geometry.to_string(),
                        element: child.tag().to_string(),
                    })
                }
                _ => {}
            }
        }

        Ok(Self {
            sources,
            vertices,
            primitives,
        })
    }
}

#[derive(Debug)]
pub struct Geometry {
    pub id: String,
    pub name: Option<String>,
    pub mesh: Mesh,
}

impl Geometry {
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Self> {
        let id = element.required_attr("id")?.to_string();
        let mesh = element.child("mesh").ok_or_else(|| {
            DaeError::malformed(element.describe(), "only <mesh> geometry is supported")
        })?;

        Ok(Self {
            mesh: Mesh::parse(mesh, &id)?,
            name: element.attr("name").map(str::to_string),
            id,
        })
    }

    /// Name used in the top-level table, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
