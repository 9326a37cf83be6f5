use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use super::accessor::{Accessor, Record};
use super::animation::Sampler;
use super::array::ArrayStore;
use super::geometry::Vertices;
use crate::document::{fragment_id, DocumentNode};
use crate::error::{DaeError, Result};

/// Input semantics understood by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Binormal,
    Color,
    Continuity,
    Image,
    Input,
    InTangent,
    Interpolation,
    InvBindMatrix,
    Joint,
    LinearSteps,
    MorphTarget,
    MorphWeight,
    Normal,
    Output,
    OutTangent,
    Position,
    Tangent,
    Texbinormal,
    Texcoord,
    Textangent,
    Uv,
    Vertex,
    Weight,
}

impl Semantic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binormal => "BINORMAL",
            Self::Color => "COLOR",
            Self::Continuity => "CONTINUITY",
            Self::Image => "IMAGE",
            Self::Input => "INPUT",
            Self::InTangent => "IN_TANGENT",
            Self::Interpolation => "INTERPOLATION",
            Self::InvBindMatrix => "INV_BIND_MATRIX",
            Self::Joint => "JOINT",
            Self::LinearSteps => "LINEAR_STEPS",
            Self::MorphTarget => "MORPH_TARGET",
            Self::MorphWeight => "MORPH_WEIGHT",
            Self::Normal => "NORMAL",
            Self::Output => "OUTPUT",
            Self::OutTangent => "OUT_TANGENT",
            Self::Position => "POSITION",
            Self::Tangent => "TANGENT",
            Self::Texbinormal => "TEXBINORMAL",
            Self::Texcoord => "TEXCOORD",
            Self::Textangent => "TEXTANGENT",
            Self::Uv => "UV",
            Self::Vertex => "VERTEX",
            Self::Weight => "WEIGHT",
        }
    }
}

impl FromStr for Semantic {
    type Err = DaeError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "BINORMAL" => Self::Binormal,
            "COLOR" => Self::Color,
            "CONTINUITY" => Self::Continuity,
            "IMAGE" => Self::Image,
            "INPUT" => Self::Input,
            "IN_TANGENT" => Self::InTangent,
            "INTERPOLATION" => Self::Interpolation,
            "INV_BIND_MATRIX" => Self::InvBindMatrix,
            "JOINT" => Self::Joint,
            "LINEAR_STEPS" => Self::LinearSteps,
            "MORPH_TARGET" => Self::MorphTarget,
            "MORPH_WEIGHT" => Self::MorphWeight,
            "NORMAL" => Self::Normal,
            "OUTPUT" => Self::Output,
            "OUT_TANGENT" => Self::OutTangent,
            "POSITION" => Self::Position,
            "TANGENT" => Self::Tangent,
            "TEXBINORMAL" => Self::Texbinormal,
            "TEXCOORD" => Self::Texcoord,
            "TEXTANGENT" => Self::Textangent,
            "UV" => Self::Uv,
            "VERTEX" => Self::Vertex,
            "WEIGHT" => Self::Weight,
            other => return Err(DaeError::UnknownSemantic(other.to_string())),
        })
    }
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record tagged with the semantic it was read through.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub semantic: Semantic,
    pub set: Option<u32>,
    pub value: Record,
}

impl Attribute {
    pub fn new(semantic: Semantic, value: Record) -> Self {
        Self {
            semantic,
            set: None,
            value,
        }
    }
}

/// Something that yields tagged attributes for an element index.
pub trait ReadAttributes {
    fn read(&self, index: usize) -> Result<Vec<Attribute>>;

    /// Number of readable elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named handle to an accessor.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub accessor: Accessor,
}

impl Source {
    pub fn parse<E: DocumentNode>(element: &E, arrays: &ArrayStore) -> Result<Self> {
        let id = element.required_attr("id")?.to_string();

        // An accessor without `source` binds the array declared in this element.
        let fallback = element
            .element_children()
            .filter(|child| child.tag().ends_with("_array"))
            .find_map(|child| child.attr("id").and_then(|id| arrays.get(id)));

        let accessor = element
            .find("technique_common/accessor")
            .ok_or_else(|| DaeError::malformed(element.describe(), "missing technique_common/accessor"))?;
        let accessor = Accessor::parse(accessor, &id, arrays, fallback)?;

        Ok(Self { id, accessor })
    }

    pub fn read(&self, index: usize) -> Result<Record> {
        self.accessor.read(index)
    }

    pub fn len(&self) -> usize {
        self.accessor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessor.is_empty()
    }
}

/// Anything an input may bind to.
#[derive(Debug, Clone)]
pub enum Provider {
    Source(Rc<Source>),
    Vertices(Rc<Vertices>),
    Sampler(Rc<Sampler>),
}

impl Provider {
    pub fn id(&self) -> &str {
        match self {
            Self::Source(source) => &source.id,
            Self::Vertices(vertices) => &vertices.id,
            Self::Sampler(sampler) => &sampler.id,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Source(source) => source.len(),
            Self::Vertices(vertices) => vertices.len(),
            Self::Sampler(sampler) => sampler.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Binds a semantic to a provider at a given offset within an index tuple.
#[derive(Debug, Clone)]
pub struct Input {
    pub semantic: Semantic,
    pub source: Provider,
    pub offset: usize,
    pub set: Option<u32>,
}

impl Input {
    pub fn new(semantic: Semantic, source: Provider, offset: usize) -> Self {
        Self {
            semantic,
            source,
            offset,
            set: None,
        }
    }

    /// Parses `<input>`, resolving its source immediately.
    pub fn parse<E: DocumentNode>(element: &E, sources: &SourceTable) -> Result<Self> {
        let semantic: Semantic = element.required_attr("semantic")?.parse()?;
        let source_id = fragment_id(element.required_attr("source")?);
        let source = sources
            .get(source_id)
            .ok_or_else(|| DaeError::UnresolvedSource {
                semantic: semantic.to_string(),
                source_id: source_id.to_string(),
            })?;

        Ok(Self {
            semantic,
            source,
            offset: element.parse_attr("offset")?.unwrap_or(0),
            set: element.parse_attr("set")?,
        })
    }

    /// Every `<input>` child of `element`, in document order.
    pub fn parse_all<E: DocumentNode>(element: &E, sources: &SourceTable) -> Result<Vec<Self>> {
        element
            .children_named("input")
            .map(|input| Self::parse(input, sources))
            .collect()
    }
}

impl ReadAttributes for Input {
    fn read(&self, index: usize) -> Result<Vec<Attribute>> {
        match &self.source {
            Provider::Source(source) => Ok(vec![Attribute {
                semantic: self.semantic,
                set: self.set,
                value: source.read(index)?,
            }]),
            Provider::Vertices(vertices) => vertices.read(index),
            Provider::Sampler(sampler) => sampler.read(index),
        }
    }

    fn len(&self) -> usize {
        self.source.len()
    }
}

/// Providers visible to inputs in one scope, by id.
#[derive(Debug, Default)]
pub struct SourceTable {
    providers: HashMap<String, Provider>,
}

impl SourceTable {
    /// Parses every `<source>` child of `scope`.
    pub fn parse<E: DocumentNode>(scope: &E, arrays: &ArrayStore) -> Result<Self> {
        let mut table = Self::default();
        for element in scope.children_named("source") {
            let source = Source::parse(element, arrays)?;
            table.insert(Provider::Source(Rc::new(source)));
        }
        Ok(table)
    }

    pub fn insert(&mut self, provider: Provider) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, id: &str) -> Option<Provider> {
        self.providers.get(id).cloned()
    }

    pub fn source(&self, id: &str) -> Option<Rc<Source>> {
        match self.providers.get(id) {
            Some(Provider::Source(source)) => Some(source.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::accessor::Value;
    use xmltree::Element;

    const SOURCES: &str = r##"<mesh>
        <source id="position">
            <float_array id="values" count="6">1 2 3 4 5 6</float_array>
            <technique_common>
                <accessor source="#values" count="2" stride="3">
                    <param name="X" type="float"/>
                    <param name="Y" type="float"/>
                    <param name="Z" type="float"/>
                </accessor>
            </technique_common>
        </source>
        <source id="implicit">
            <float_array id="implicit-array" count="2">7 8</float_array>
            <technique_common>
                <accessor count="2"><param name="W" type="float"/></accessor>
            </technique_common>
        </source>
    </mesh>"##;

    fn table() -> SourceTable {
        let mesh = Element::parse(SOURCES.as_bytes()).unwrap();
        let arrays = ArrayStore::parse(&mesh).unwrap();
        SourceTable::parse(&mesh, &arrays).unwrap()
    }

    #[test]
    fn inputs_tag_source_records() {
        let table = table();
        let input = Element::parse(r##"<input semantic="NORMAL" source="#position" offset="1" set="0"/>"##.as_bytes())
            .unwrap();
        let input = Input::parse(&input, &table).unwrap();

        assert_eq!(Semantic::Normal, input.semantic);
        assert_eq!(1, input.offset);
        assert_eq!(Some(0), input.set);

        let attributes = input.read(1).unwrap();
        assert_eq!(1, attributes.len());
        assert_eq!(Semantic::Normal, attributes[0].semantic);
        assert_eq!(Some(&Value::Float(5.0)), attributes[0].value.get("Y"));
    }

    #[test]
    fn accessor_without_source_binds_local_array() {
        let table = table();
        let source = table.source("implicit").unwrap();
        assert_eq!(2, source.len());
        assert_eq!(Some(&Value::Float(8.0)), source.read(1).unwrap().get("W"));
    }

    #[test]
    fn unresolved_source_fails_at_parse() {
        let table = table();
        let input = Element::parse(r##"<input semantic="TEXCOORD" source="#uv"/>"##.as_bytes()).unwrap();
        let error = Input::parse(&input, &table).unwrap_err();
        assert!(matches!(
            error,
            DaeError::UnresolvedSource { ref semantic, ref source_id } if semantic == "TEXCOORD" && source_id == "uv"
        ));
    }

    #[test]
    fn unknown_semantic() {
        let table = table();
        let input = Element::parse(r##"<input semantic="SPARKLE" source="#position"/>"##.as_bytes()).unwrap();
        assert!(matches!(
            Input::parse(&input, &table),
            Err(DaeError::UnknownSemantic(_))
        ));
    }

    #[test]
    fn unbound_array() {
        let mesh = Element::parse(
            r##"<mesh><source id="s"><technique_common><accessor source="#nowhere"><param name="X" type="float"/></accessor></technique_common></source></mesh>"##
                .as_bytes(),
        )
        .unwrap();
        let arrays = ArrayStore::parse(&mesh).unwrap();
        let error = SourceTable::parse(&mesh, &arrays).unwrap_err();
        assert!(matches!(error, DaeError::UnboundArray { ref array_id, .. } if array_id == "nowhere"));
    }
}
