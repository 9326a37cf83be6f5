use glam::Mat4;

use super::accessor::Value;
use super::array::ArrayStore;
use super::source::{Attribute, Input, ReadAttributes, Semantic, SourceTable};
use super::visual_scene::{Reference, ReferenceKind};
use crate::document::{fragment_id, DocumentNode};
use crate::error::{DaeError, Result};
use crate::transforms::mat4_from_row_major;

/// Per-vertex joint influences from `<vertex_weights>`.
#[derive(Debug, Clone)]
pub struct VertexWeights {
    pub inputs: Vec<Input>,
    /// Influence count per skinned vertex.
    pub counts: Vec<usize>,
    /// Index tuples for every influence, consumed in `counts` order.
    pub indices: Vec<usize>,
    stride: usize,
}

impl VertexWeights {
    pub fn new(inputs: Vec<Input>, counts: Vec<usize>, indices: Vec<usize>) -> Result<Self> {
        let stride = inputs
            .iter()
            .map(|input| input.offset + 1)
            .max()
            .ok_or_else(|| DaeError::malformed("vertex_weights", "no inputs"))?;

        let fits = counts
            .iter()
            .try_fold(0usize, |total, &influences| total.checked_add(influences))
            .and_then(|total| total.checked_mul(stride))
            .is_some_and(|required| required <= indices.len());
        if !fits {
            return Err(DaeError::malformed(
                "vertex_weights",
                format!("influences need more than {} indices", indices.len()),
            ));
        }

        Ok(Self {
            inputs,
            counts,
            indices,
            stride,
        })
    }

    pub fn parse<E: DocumentNode>(element: &E, sources: &SourceTable) -> Result<Self> {
        let inputs = Input::parse_all(element, sources)?;
        let counts = match element.child("vcount") {
            Some(vcount) => vcount.tokens()?,
            None => Vec::new(),
        };
        let indices = match element.child("v") {
            Some(v) => v.tokens()?,
            None => Vec::new(),
        };
        Self::new(inputs, counts, indices)
    }

    /// Number of skinned vertices.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Reads influence record `influence` of the flattened index stream.
    pub fn influence(&self, influence: usize) -> Result<Vec<Attribute>> {
        let base = self.stride * influence;
        let mut attributes = Vec::new();
        for input in &self.inputs {
            let position = base + input.offset;
            let index = *self.indices.get(position).ok_or(DaeError::IndexOutOfRange {
                context: "v".to_string(),
                index: position,
                size: self.indices.len(),
            })?;
            attributes.extend(input.read(index)?);
        }
        Ok(attributes)
    }

    /// Influence bundles grouped per vertex.
    pub fn vertices(&self) -> impl Iterator<Item = Result<Vec<Vec<Attribute>>>> + '_ {
        self.counts.iter().scan(0, move |start, &count| {
            let range = *start..*start + count;
            *start += count;
            Some(range.map(|influence| self.influence(influence)).collect())
        })
    }
}

#[derive(Debug)]
pub struct Skin {
    /// The geometry this skin deforms.
    pub source: Reference,
    pub bind_shape_matrix: Mat4,
    pub sources: SourceTable,
    pub joints: Vec<Input>,
    pub weights: VertexWeights,
}

impl Skin {
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Self> {
        let source = Reference::new(
            ReferenceKind::Geometry,
            fragment_id(element.required_attr("source")?),
        );

        let bind_shape_matrix = match element.child("bind_shape_matrix") {
            Some(matrix) => {
                let values: Vec<f32> = matrix.tokens()?;
                let values: [f32; 16] = values.try_into().map_err(|values: Vec<f32>| {
                    DaeError::malformed(
                        "bind_shape_matrix",
                        format!("expected 16 values, found {}", values.len()),
                    )
                })?;
                mat4_from_row_major(&values)
            }
            None => Mat4::IDENTITY,
        };

        let arrays = ArrayStore::parse(element)?;
        let sources = SourceTable::parse(element, &arrays)?;
        let joints = Input::parse_all(element.required_child("joints")?, &sources)?;
        let weights = VertexWeights::parse(element.required_child("vertex_weights")?, &sources)?;

        Ok(Self {
            source,
            bind_shape_matrix,
            sources,
            joints,
            weights,
        })
    }

    /// `(joint name, weight)` lists per vertex, in document order.
    pub fn raw_weights(&self) -> Result<Vec<Vec<(String, f32)>>> {
        let mut weights = Vec::with_capacity(self.weights.len());
        for influences in self.weights.vertices() {
            let mut vertex = Vec::new();
            for influence in influences? {
                let joint = find_value(&influence, Semantic::Joint)
                    .and_then(Value::as_name)
                    .ok_or_else(|| DaeError::malformed("vertex_weights", "influence has no JOINT"))?;
                let weight = find_value(&influence, Semantic::Weight)
                    .and_then(Value::as_float)
                    .ok_or_else(|| DaeError::malformed("vertex_weights", "influence has no WEIGHT"))?;
                vertex.push((joint.to_string(), weight));
            }
            weights.push(vertex);
        }
        Ok(weights)
    }
}

fn find_value(attributes: &[Attribute], semantic: Semantic) -> Option<&Value> {
    attributes
        .iter()
        .find(|attribute| attribute.semantic == semantic)
        .and_then(|attribute| attribute.value.first())
}

#[derive(Debug)]
pub struct Controller {
    pub id: String,
    pub name: Option<String>,
    pub skin: Skin,
}

impl Controller {
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Self> {
        let id = element.required_attr("id")?.to_string();
        let skin = element.child("skin").ok_or_else(|| {
            DaeError::malformed(element.describe(), "only <skin> controllers are supported")
        })?;

        Ok(Self {
            skin: Skin::parse(skin)?,
            name: element.attr("name").map(str::to_string),
            id,
        })
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmltree::Element;

    const SKIN: &str = r##"<controller id="rig" name="Rig">
        <skin source="#body">
            <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
            <source id="rig-joints">
                <Name_array id="rig-joints-array" count="3">Hip Knee Foot</Name_array>
                <technique_common>
                    <accessor source="#rig-joints-array" count="3"><param name="JOINT" type="name"/></accessor>
                </technique_common>
            </source>
            <source id="rig-weights">
                <float_array id="rig-weights-array" count="4">1 0.25 0.75 0.5</float_array>
                <technique_common>
                    <accessor source="#rig-weights-array" count="4"><param name="WEIGHT" type="float"/></accessor>
                </technique_common>
            </source>
            <joints>
                <input semantic="JOINT" source="#rig-joints"/>
            </joints>
            <vertex_weights count="2">
                <input semantic="JOINT" source="#rig-joints" offset="0"/>
                <input semantic="WEIGHT" source="#rig-weights" offset="1"/>
                <vcount>1 3</vcount>
                <v>0 0  0 1 1 2 2 3</v>
            </vertex_weights>
        </skin>
    </controller>"##;

    fn controller(xml: &str) -> Result<Controller> {
        Controller::parse(&Element::parse(xml.as_bytes()).unwrap())
    }

    #[test]
    fn skin_weights_by_joint_name() {
        let controller = controller(SKIN).unwrap();
        assert_eq!("Rig", controller.label());

        let skin = &controller.skin;
        assert_eq!("body", skin.source.id);
        assert_eq!(Mat4::IDENTITY, skin.bind_shape_matrix);
        assert_eq!(2, skin.weights.len());

        let weights = skin.raw_weights().unwrap();
        assert_eq!(vec![("Hip".to_string(), 1.0)], weights[0]);
        assert_eq!(
            vec![
                ("Hip".to_string(), 0.25),
                ("Knee".to_string(), 0.75),
                ("Foot".to_string(), 0.5)
            ],
            weights[1]
        );
    }

    #[test]
    fn bind_shape_is_row_major() {
        let xml = SKIN.replace(
            "<bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>",
            "<bind_shape_matrix>1 0 0 3 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>",
        );
        let controller = controller(&xml).unwrap();
        assert_eq!(3.0, controller.skin.bind_shape_matrix.w_axis.x);
    }

    #[test]
    fn short_influence_stream() {
        let xml = SKIN.replace("<v>0 0  0 1 1 2 2 3</v>", "<v>0 0  0 1</v>");
        assert!(matches!(controller(&xml), Err(DaeError::MalformedDocument { .. })));
    }

    #[test]
    fn overflowing_influence_counts() {
        let xml = SKIN.replace("<vcount>1 3</vcount>", "<vcount>1 18446744073709551615</vcount>");
        assert!(matches!(controller(&xml), Err(DaeError::MalformedDocument { .. })));
    }

    #[test]
    fn morph_controllers_are_rejected() {
        let error = controller(r##"<controller id="m"><morph source="#body"/></controller>"##).unwrap_err();
        assert!(error.to_string().contains("skin"));
    }
}
