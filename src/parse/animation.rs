use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use glam::Mat4;
use serde::Serialize;

use super::accessor::Value;
use super::array::ArrayStore;
use super::source::{Attribute, Input, Provider, ReadAttributes, Semantic, SourceTable};
use super::visual_scene::ReferenceKind;
use crate::document::{fragment_id, DocumentNode};
use crate::error::{DaeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpolation {
    Linear,
    Step,
    Bezier,
    Hermite,
    Cardinal,
    Bspline,
}

impl FromStr for Interpolation {
    type Err = DaeError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "LINEAR" => Self::Linear,
            "STEP" => Self::Step,
            "BEZIER" => Self::Bezier,
            "HERMITE" => Self::Hermite,
            "CARDINAL" => Self::Cardinal,
            "BSPLINE" => Self::Bspline,
            other => {
                return Err(DaeError::malformed(
                    "sampler",
                    format!("unknown interpolation '{other}'"),
                ))
            }
        })
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "LINEAR",
            Self::Step => "STEP",
            Self::Bezier => "BEZIER",
            Self::Hermite => "HERMITE",
            Self::Cardinal => "CARDINAL",
            Self::Bspline => "BSPLINE",
        };
        f.write_str(name)
    }
}

/// One decoded sample of a transform curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub interpolation: Interpolation,
    pub time: f32,
    pub transform: Mat4,
}

/// Inputs sharing one key index: times, values and interpolation modes.
#[derive(Debug, Clone)]
pub struct Sampler {
    pub id: String,
    pub inputs: Vec<Input>,
}

impl Sampler {
    pub fn parse<E: DocumentNode>(element: &E, sources: &SourceTable) -> Result<Self> {
        Ok(Self {
            id: element.required_attr("id")?.to_string(),
            inputs: Input::parse_all(element, sources)?,
        })
    }

    fn input(&self, semantic: Semantic) -> Option<&Input> {
        self.inputs.iter().find(|input| input.semantic == semantic)
    }

    /// Decodes every key as a time and a 4x4 transform.
    ///
    /// Keys without an INTERPOLATION input are linear.
    pub fn keyframes(&self) -> Result<Vec<Keyframe>> {
        let times = self.input(Semantic::Input).ok_or_else(|| {
            DaeError::malformed(format!("sampler id=\"{}\"", self.id), "missing INPUT")
        })?;
        let values = self.input(Semantic::Output).ok_or_else(|| {
            DaeError::malformed(format!("sampler id=\"{}\"", self.id), "missing OUTPUT")
        })?;
        let modes = self.input(Semantic::Interpolation);

        (0..times.len())
            .map(|key| {
                let time = first_value(times, key)?.as_float().ok_or_else(|| {
                    DaeError::malformed(format!("sampler id=\"{}\"", self.id), "INPUT is not a scalar")
                })?;
                let transform = first_value(values, key)?.as_mat4().ok_or_else(|| {
                    DaeError::malformed(format!("sampler id=\"{}\"", self.id), "OUTPUT is not a float4x4")
                })?;
                let interpolation = match modes {
                    Some(modes) => match first_value(modes, key)?.as_name() {
                        Some(name) => name.parse()?,
                        None => Interpolation::Linear,
                    },
                    None => Interpolation::Linear,
                };

                Ok(Keyframe {
                    interpolation,
                    time,
                    transform,
                })
            })
            .collect()
    }
}

fn first_value(input: &Input, index: usize) -> Result<Value> {
    input
        .read(index)?
        .into_iter()
        .next()
        .and_then(|attribute| attribute.value.first().cloned())
        .ok_or_else(|| DaeError::malformed(input.source.id(), "empty sampler input"))
}

impl ReadAttributes for Sampler {
    fn read(&self, index: usize) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            attributes.extend(input.read(index)?);
        }
        Ok(attributes)
    }

    fn len(&self) -> usize {
        self.inputs.iter().map(Input::len).max().unwrap_or(0)
    }
}

/// Routes a sampler's output to a target such as `"Bone/transform"`.
#[derive(Debug, Clone)]
pub struct Channel {
    pub source: Rc<Sampler>,
    pub target: String,
}

impl Channel {
    pub fn parse<E: DocumentNode>(element: &E, samplers: &SourceTable) -> Result<Self> {
        let source_id = fragment_id(element.required_attr("source")?);
        let source = match samplers.get(source_id) {
            Some(Provider::Sampler(sampler)) => sampler,
            _ => return Err(DaeError::unresolved(ReferenceKind::Sampler, source_id)),
        };

        Ok(Self {
            source,
            target: element.required_attr("target")?.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct Animation {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sources: SourceTable,
    pub samplers: Vec<Rc<Sampler>>,
    pub channels: Vec<Channel>,
    pub children: Vec<Animation>,
}

impl Animation {
    pub fn parse<E: DocumentNode>(element: &E) -> Result<Self> {
        let arrays = ArrayStore::parse(element)?;
        let mut sources = SourceTable::parse(element, &arrays)?;

        let mut samplers = Vec::new();
        for sampler in element.children_named("sampler") {
            let sampler = Rc::new(Sampler::parse(sampler, &sources)?);
            sources.insert(Provider::Sampler(sampler.clone()));
            samplers.push(sampler);
        }

        let channels = element
            .children_named("channel")
            .map(|channel| Channel::parse(channel, &sources))
            .collect::<Result<_>>()?;

        let children = element
            .children_named("animation")
            .map(Self::parse)
            .collect::<Result<_>>()?;

        Ok(Self {
            id: element.attr("id").map(str::to_string),
            name: element.attr("name").map(str::to_string),
            sources,
            samplers,
            channels,
            children,
        })
    }

    /// Channels of this animation and every nested one, depth first.
    pub fn all_channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> = self.channels.iter().collect();
        for child in &self.children {
            channels.extend(child.all_channels());
        }
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmltree::Element;

    const WAVE: &str = r##"<animation id="wave">
        <animation id="arm">
            <source id="arm-input">
                <float_array id="arm-input-array" count="2">0 0.5</float_array>
                <technique_common>
                    <accessor source="#arm-input-array" count="2"><param name="TIME" type="float"/></accessor>
                </technique_common>
            </source>
            <source id="arm-output">
                <float_array id="arm-output-array" count="32">
                    1 0 0 0  0 1 0 0  0 0 1 0  0 0 0 1
                    1 0 0 2  0 1 0 0  0 0 1 0  0 0 0 1
                </float_array>
                <technique_common>
                    <accessor source="#arm-output-array" count="2" stride="16">
                        <param name="TRANSFORM" type="float4x4"/>
                    </accessor>
                </technique_common>
            </source>
            <source id="arm-interpolation">
                <Name_array id="arm-interpolation-array" count="2">LINEAR STEP</Name_array>
                <technique_common>
                    <accessor source="#arm-interpolation-array" count="2">
                        <param name="INTERPOLATION" type="name"/>
                    </accessor>
                </technique_common>
            </source>
            <sampler id="arm-sampler">
                <input semantic="INPUT" source="#arm-input"/>
                <input semantic="OUTPUT" source="#arm-output"/>
                <input semantic="INTERPOLATION" source="#arm-interpolation"/>
            </sampler>
            <channel source="#arm-sampler" target="Arm/transform"/>
        </animation>
    </animation>"##;

    #[test]
    fn nested_channels_decode_keyframes() {
        let animation = Animation::parse(&Element::parse(WAVE.as_bytes()).unwrap()).unwrap();
        assert_eq!(Some("wave"), animation.id.as_deref());
        assert!(animation.channels.is_empty());

        let channels = animation.all_channels();
        assert_eq!(1, channels.len());
        assert_eq!("Arm/transform", channels[0].target);

        let sampler = &channels[0].source;
        assert_eq!(2, sampler.len());
        assert_eq!(3, sampler.read(1).unwrap().len());

        let keyframes = sampler.keyframes().unwrap();
        assert_eq!(2, keyframes.len());
        assert_eq!(Interpolation::Linear, keyframes[0].interpolation);
        assert_eq!(Interpolation::Step, keyframes[1].interpolation);
        assert_eq!(0.5, keyframes[1].time);
        assert_eq!(2.0, keyframes[1].transform.w_axis.x);
    }

    #[test]
    fn channel_with_unknown_sampler() {
        let xml = WAVE.replace(r##"<channel source="#arm-sampler""##, r##"<channel source="#leg-sampler""##);
        let error = Animation::parse(&Element::parse(xml.as_bytes()).unwrap()).unwrap_err();
        assert!(matches!(
            error,
            DaeError::UnresolvedReference { kind: ReferenceKind::Sampler, ref id } if id == "leg-sampler"
        ));
    }

    #[test]
    fn interpolation_names() {
        assert_eq!(Interpolation::Bspline, "BSPLINE".parse().unwrap());
        assert!("SMOOTH".parse::<Interpolation>().is_err());
        assert_eq!("HERMITE", Interpolation::Hermite.to_string());
    }
}
