use std::collections::HashMap;
use std::rc::Rc;

use crate::document::DocumentNode;
use crate::error::Result;

/// Flat data parsed from one `*_array` element. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    Float(Vec<f32>),
    Int(Vec<i64>),
    Name(Vec<String>),
}

impl DataArray {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(values) => values.len(),
            Self::Int(values) => values.len(),
            Self::Name(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Name(_) => "name",
        }
    }

    /// Numeric values in `start..start + count`, or `None` for name arrays or short reads.
    pub fn numbers(&self, start: usize, count: usize) -> Option<Vec<f32>> {
        let end = start.checked_add(count)?;
        match self {
            Self::Float(values) => values.get(start..end).map(<[f32]>::to_vec),
            Self::Int(values) => values
                .get(start..end)
                .map(|values| values.iter().map(|&v| v as f32).collect()),
            Self::Name(_) => None,
        }
    }

    pub fn parse<E: DocumentNode>(element: &E) -> Result<Option<Self>> {
        let array = match element.tag() {
            "float_array" => Self::Float(element.tokens()?),
            "int_array" => Self::Int(element.tokens()?),
            "Name_array" | "IDREF_array" => Self::Name(element.tokens()?),
            _ => return Ok(None),
        };
        Ok(Some(array))
    }
}

/// Arrays declared under one scope (a mesh, skin, or animation), by id.
#[derive(Debug, Default)]
pub struct ArrayStore {
    arrays: HashMap<String, Rc<DataArray>>,
}

impl ArrayStore {
    /// Collects every array in the `<source>` children of `scope`.
    pub fn parse<E: DocumentNode>(scope: &E) -> Result<Self> {
        let mut arrays = HashMap::new();
        for source in scope.children_named("source") {
            for element in source.element_children() {
                if let (Some(id), Some(array)) = (element.attr("id"), DataArray::parse(element)?) {
                    arrays.insert(id.to_string(), Rc::new(array));
                }
            }
        }
        Ok(Self { arrays })
    }

    pub fn get(&self, id: &str) -> Option<Rc<DataArray>> {
        self.arrays.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}
