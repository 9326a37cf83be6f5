use std::rc::Rc;

use glam::Mat4;

use super::array::{ArrayStore, DataArray};
use crate::document::{fragment_id, DocumentNode};
use crate::error::{DaeError, Result};
use crate::transforms::mat4_from_row_major;

/// Shape of the values a parameter decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    Vector(usize),
    Matrix(usize, usize),
}

impl ParamKind {
    /// Interprets a declared type such as `float`, `float3`, or `float4x4`.
    ///
    /// Anything unrecognized reads as a scalar.
    pub fn from_type(ty: &str) -> Self {
        let dims = ty.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        if dims.is_empty() {
            return Self::Scalar;
        }

        match dims.split_once('x') {
            Some((rows, cols)) => match (rows.parse(), cols.parse()) {
                (Ok(rows), Ok(cols)) if rows > 0 && cols > 0 => Self::Matrix(rows, cols),
                _ => Self::Scalar,
            },
            None => match dims.parse() {
                Ok(n) if n > 0 => Self::Vector(n),
                _ => Self::Scalar,
            },
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector(n) => n,
            Self::Matrix(rows, cols) => rows * cols,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Anonymous parameters skip array values without producing a field.
    pub name: Option<String>,
    pub kind: ParamKind,
}

impl Parameter {
    pub fn new(name: Option<&str>, kind: ParamKind) -> Self {
        Self {
            name: name.map(str::to_string),
            kind,
        }
    }

    pub fn parse<E: DocumentNode>(element: &E) -> Self {
        let kind = element
            .attr("type")
            .map(ParamKind::from_type)
            .unwrap_or(ParamKind::Scalar);
        Self {
            name: element.attr("name").map(str::to_string),
            kind,
        }
    }
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f32),
    Vector(Vec<f32>),
    /// Row-major values.
    Matrix {
        rows: usize,
        cols: usize,
        values: Vec<f32>,
    },
    Name(String),
    Index(usize),
}

impl Value {
    /// Numeric components in storage order. Names have none.
    pub fn components(&self) -> Vec<f32> {
        match self {
            Self::Float(v) => vec![*v],
            Self::Vector(values) | Self::Matrix { values, .. } => values.clone(),
            Self::Index(i) => vec![*i as f32],
            Self::Name(_) => Vec::new(),
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Index(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            Self::Matrix {
                rows: 4,
                cols: 4,
                values,
            } => values
                .as_slice()
                .try_into()
                .ok()
                .map(|values: &[f32; 16]| mat4_from_row_major(values)),
            _ => None,
        }
    }
}

/// Named fields of one accessor element, in parameter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// The first field, for single-parameter sources such as joints and weights.
    pub fn first(&self) -> Option<&Value> {
        self.fields.first().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Strided, typed view over a data array.
#[derive(Debug, Clone)]
pub struct Accessor {
    source_id: String,
    array: Rc<DataArray>,
    parameters: Vec<Parameter>,
    offset: usize,
    stride: usize,
}

impl Accessor {
    /// `stride` defaults to the combined parameter width.
    pub fn new(
        source_id: impl Into<String>,
        array: Rc<DataArray>,
        parameters: Vec<Parameter>,
        offset: usize,
        stride: Option<usize>,
    ) -> Result<Self> {
        let source_id = source_id.into();
        let required: usize = parameters.iter().map(|p| p.kind.arity()).sum();
        let stride = stride.unwrap_or(required.max(1));

        if stride == 0 || stride < required {
            return Err(DaeError::StrideTooSmall {
                source_id,
                stride,
                required,
            });
        }

        if matches!(*array, DataArray::Name(_))
            && parameters.iter().any(|p| p.kind != ParamKind::Scalar)
        {
            return Err(DaeError::IncompatibleArray {
                source_id,
                array_id: String::new(),
                kind: "vector or matrix",
            });
        }

        Ok(Self {
            source_id,
            array,
            parameters,
            offset,
            stride,
        })
    }

    /// Parses `<accessor>`, binding its `source` against `arrays`.
    ///
    /// Without a `source` attribute the accessor binds `fallback`, the array
    /// declared inside the enclosing `<source>`.
    pub fn parse<E: DocumentNode>(
        element: &E,
        source_id: &str,
        arrays: &ArrayStore,
        fallback: Option<Rc<DataArray>>,
    ) -> Result<Self> {
        let array_id = element.attr("source").map(fragment_id);
        let array = match array_id {
            Some(id) => arrays.get(id),
            None => fallback,
        }
        .ok_or_else(|| DaeError::UnboundArray {
            source_id: source_id.to_string(),
            array_id: array_id.unwrap_or_default().to_string(),
        })?;

        let parameters = element.children_named("param").map(Parameter::parse).collect();
        let offset = element.parse_attr("offset")?.unwrap_or(0);
        let stride = element.parse_attr("stride")?;

        Self::new(source_id, array, parameters, offset, stride).map_err(|error| match error {
            DaeError::IncompatibleArray {
                source_id, kind, ..
            } => DaeError::IncompatibleArray {
                source_id,
                array_id: array_id.unwrap_or_default().to_string(),
                kind,
            },
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.array.len().saturating_sub(self.offset) / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn array(&self) -> &DataArray {
        &self.array
    }

    /// Decodes element `index` into its named fields.
    pub fn read(&self, index: usize) -> Result<Record> {
        let size = self.len();
        if index >= size {
            return Err(DaeError::IndexOutOfRange {
                context: self.source_id.clone(),
                index,
                size,
            });
        }

        let mut cursor = self.offset + index * self.stride;
        let mut fields = Vec::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            let arity = parameter.kind.arity();
            if let Some(name) = &parameter.name {
                fields.push((name.clone(), self.decode(parameter.kind, cursor)?));
            }
            cursor += arity;
        }

        Ok(Record::new(fields))
    }

    fn decode(&self, kind: ParamKind, start: usize) -> Result<Value> {
        let out_of_range = || DaeError::IndexOutOfRange {
            context: self.source_id.clone(),
            index: start + kind.arity() - 1,
            size: self.array.len(),
        };

        if let DataArray::Name(names) = &*self.array {
            return names
                .get(start)
                .map(|name| Value::Name(name.clone()))
                .ok_or_else(out_of_range);
        }

        let values = self
            .array
            .numbers(start, kind.arity())
            .ok_or_else(out_of_range)?;
        Ok(match kind {
            ParamKind::Scalar => Value::Float(values[0]),
            ParamKind::Vector(_) => Value::Vector(values),
            ParamKind::Matrix(rows, cols) => Value::Matrix { rows, cols, values },
        })
    }
}
