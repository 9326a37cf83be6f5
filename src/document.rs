//! Read access to the COLLADA element tree.
//!
//! The converter never walks raw XML nodes itself; it goes through
//! [`DocumentNode`], which `xmltree::Element` implements.

use std::borrow::Cow;
use std::str::FromStr;

use xmltree::{Element, XMLNode};

use crate::error::{DaeError, Result};

pub trait DocumentNode {
    fn tag(&self) -> &str;

    fn attr(&self, name: &str) -> Option<&str>;

    fn element_children(&self) -> Box<dyn Iterator<Item = &Self> + '_>;

    /// Concatenated text content, if any.
    fn text(&self) -> Option<Cow<'_, str>>;

    fn child(&self, name: &str) -> Option<&Self> {
        self.element_children().find(|child| child.tag() == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> Box<dyn Iterator<Item = &'a Self> + 'a> {
        Box::new(self.element_children().filter(move |child| child.tag() == name))
    }

    /// Follows a slash separated path of element names, taking the first match at each step.
    fn find(&self, path: &str) -> Option<&Self> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |element, segment| element.child(segment))
    }

    /// All elements reached by `path`, following every matching element at each step.
    fn find_all<'a>(&'a self, path: &'a str) -> Box<dyn Iterator<Item = &'a Self> + 'a> {
        let start: Box<dyn Iterator<Item = &'a Self> + 'a> = Box::new(std::iter::once(self));
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(start, |matches, segment| {
                Box::new(matches.flat_map(move |element| element.children_named(segment)))
            })
    }

    fn required_child(&self, name: &str) -> Result<&Self> {
        self.child(name).ok_or_else(|| {
            DaeError::malformed(self.describe(), format!("missing required child <{name}>"))
        })
    }

    fn required_attr(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            DaeError::malformed(self.describe(), format!("missing required attribute '{name}'"))
        })
    }

    /// Parses an optional attribute, reporting unparseable values.
    fn parse_attr<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.attr(name)
            .map(|value| {
                value.trim().parse().map_err(|_| {
                    DaeError::malformed(
                        self.describe(),
                        format!("attribute '{name}' has invalid value '{value}'"),
                    )
                })
            })
            .transpose()
    }

    /// Whitespace separated tokens of the text content. Empty text yields no tokens.
    fn tokens<T: FromStr>(&self) -> Result<Vec<T>> {
        let Some(text) = self.text() else {
            return Ok(Vec::new());
        };

        text.split_whitespace()
            .map(|token| {
                token.parse().map_err(|_| {
                    DaeError::malformed(self.describe(), format!("invalid token '{token}'"))
                })
            })
            .collect()
    }

    /// Tag name plus id (when present), for error messages.
    fn describe(&self) -> String {
        match self.attr("id") {
            Some(id) => format!("{} id=\"{}\"", self.tag(), id),
            None => self.tag().to_string(),
        }
    }
}

impl DocumentNode for Element {
    fn tag(&self) -> &str {
        &self.name
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn element_children(&self) -> Box<dyn Iterator<Item = &Self> + '_> {
        Box::new(self.children.iter().filter_map(|node| match node {
            XMLNode::Element(child) => Some(child),
            _ => None,
        }))
    }

    fn text(&self) -> Option<Cow<'_, str>> {
        self.get_text()
    }
}

/// Strips the leading `#` of a URI fragment reference.
pub fn fragment_id(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}
