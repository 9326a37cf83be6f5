use std::collections::HashMap;
use std::io::Read;

use once_cell::unsync::OnceCell;
use xmltree::Element;

use super::animation::Animation;
use super::controller::Controller;
use super::geometry::Geometry;
use super::visual_scene::{NodeId, Reference, ReferenceKind, VisualScene};
use crate::document::DocumentNode;
use crate::error::{DaeError, Result};

/// A top-level entity stored in one library section.
pub trait LibraryItem: Sized {
    /// Path of the item elements below `<COLLADA>`.
    const PATH: &'static str;
    const KIND: ReferenceKind;

    fn parse_item(element: &Element) -> Result<Self>;

    fn item_id(&self) -> Option<&str>;

    fn section(library: &Library) -> &OnceCell<Section<Self>>;
}

/// Parsed items of one section with an id index.
///
/// An item that fails to parse is left out; looking it up returns its error.
#[derive(Debug)]
pub struct Section<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
    failed: HashMap<String, DaeError>,
}

impl<T: LibraryItem> Section<T> {
    pub fn parse(root: &Element) -> Self {
        let mut items = Vec::new();
        let mut index = HashMap::new();
        let mut failed = HashMap::new();

        for element in root.find_all(T::PATH) {
            match T::parse_item(element) {
                Ok(item) => {
                    if let Some(id) = item.item_id() {
                        // First declaration wins.
                        index.entry(id.to_string()).or_insert(items.len());
                    }
                    items.push(item);
                }
                Err(error) => {
                    log::warn!("Skipping <{}>: {}", element.describe(), error);
                    if let Some(id) = element.attr("id") {
                        failed.entry(id.to_string()).or_insert(error);
                    }
                }
            }
        }

        log::debug!(
            "Parsed {} items from {} ({} failed)",
            items.len(),
            T::PATH,
            failed.len()
        );
        Self {
            items,
            index,
            failed,
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&position| &self.items[position])
    }

    /// Like `get`, but reports why an item is unavailable.
    pub fn lookup(&self, id: &str) -> Result<&T> {
        match self.get(id) {
            Some(item) => Ok(item),
            None => Err(self
                .failed
                .get(id)
                .cloned()
                .unwrap_or_else(|| DaeError::unresolved(T::KIND, id))),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazily parsed view over a COLLADA document.
///
/// Each section is parsed the first time it is requested and kept for the
/// lifetime of the library.
#[derive(Debug)]
pub struct Library {
    root: Element,
    geometries: OnceCell<Section<Geometry>>,
    controllers: OnceCell<Section<Controller>>,
    visual_scenes: OnceCell<Section<VisualScene>>,
    animations: OnceCell<Section<Animation>>,
}

impl Library {
    pub fn new(root: Element) -> Self {
        Self {
            root,
            geometries: OnceCell::new(),
            controllers: OnceCell::new(),
            visual_scenes: OnceCell::new(),
            animations: OnceCell::new(),
        }
    }

    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let root = Element::parse(reader)
            .map_err(|e| DaeError::malformed("COLLADA", e.to_string()))?;
        Ok(Self::new(root))
    }

    /// The section holding `T`, parsed on first access.
    pub fn section<T: LibraryItem>(&self) -> &Section<T> {
        T::section(self).get_or_init(|| Section::parse(&self.root))
    }

    pub fn visual_scenes(&self) -> &Section<VisualScene> {
        self.section()
    }

    pub fn animations(&self) -> &Section<Animation> {
        self.section()
    }

    /// Finds a node by id across all visual scenes.
    pub fn find_node(&self, id: &str) -> Result<(&VisualScene, NodeId)> {
        self.visual_scenes()
            .iter()
            .find_map(|scene| scene.find(id).map(|node| (scene, node)))
            .ok_or_else(|| DaeError::unresolved(ReferenceKind::Node, id))
    }

    /// The `<asset><up_axis>` value, if declared.
    pub fn up_axis(&self) -> Option<String> {
        self.root
            .find("asset/up_axis")
            .and_then(|axis| axis.text())
            .map(|axis| axis.trim().to_string())
    }
}

impl Reference {
    /// Resolves this reference against the section holding `T`.
    ///
    /// A reference of another kind never resolves, even if the id exists there.
    pub fn lookup<'a, T: LibraryItem>(&self, library: &'a Library) -> Result<&'a T> {
        if self.kind != T::KIND {
            return Err(DaeError::unresolved(self.kind, self.id.clone()));
        }
        library.section::<T>().lookup(&self.id)
    }
}

impl LibraryItem for Geometry {
    const PATH: &'static str = "library_geometries/geometry";
    const KIND: ReferenceKind = ReferenceKind::Geometry;

    fn parse_item(element: &Element) -> Result<Self> {
        Self::parse(element)
    }

    fn item_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn section(library: &Library) -> &OnceCell<Section<Self>> {
        &library.geometries
    }
}

impl LibraryItem for Controller {
    const PATH: &'static str = "library_controllers/controller";
    const KIND: ReferenceKind = ReferenceKind::Controller;

    fn parse_item(element: &Element) -> Result<Self> {
        Self::parse(element)
    }

    fn item_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn section(library: &Library) -> &OnceCell<Section<Self>> {
        &library.controllers
    }
}

impl LibraryItem for VisualScene {
    const PATH: &'static str = "library_visual_scenes/visual_scene";
    const KIND: ReferenceKind = ReferenceKind::VisualScene;

    fn parse_item(element: &Element) -> Result<Self> {
        Self::parse(element)
    }

    fn item_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn section(library: &Library) -> &OnceCell<Section<Self>> {
        &library.visual_scenes
    }
}

impl LibraryItem for Animation {
    const PATH: &'static str = "library_animations/animation";
    const KIND: ReferenceKind = ReferenceKind::Animation;

    fn parse_item(element: &Element) -> Result<Self> {
        Self::parse(element)
    }

    fn item_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn section(library: &Library) -> &OnceCell<Section<Self>> {
        &library.animations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r##"<COLLADA>
        <asset><up_axis> Z_UP </up_axis></asset>
        <library_geometries>
            <geometry id="empty"><mesh/></geometry>
            <geometry id="curve"><spline/></geometry>
        </library_geometries>
        <library_visual_scenes>
            <visual_scene id="first"><node id="Ignored"/></visual_scene>
            <visual_scene id="main"><node id="Root"/></visual_scene>
        </library_visual_scenes>
        <library_geometries>
            <geometry id="late"><mesh/></geometry>
        </library_geometries>
    </COLLADA>"##;

    fn library() -> Library {
        Library::parse(DOCUMENT.as_bytes()).unwrap()
    }

    #[test]
    fn sections_are_memoized() {
        let library = library();
        let first = library.section::<Geometry>() as *const _;
        let second = library.section::<Geometry>() as *const _;
        assert_eq!(first, second);
        assert!(library.section::<Controller>().is_empty());
    }

    #[test]
    fn references_resolve_by_id() {
        let library = library();
        let geometry: &Geometry = Reference::new(ReferenceKind::Geometry, "empty")
            .lookup(&library)
            .unwrap();
        assert_eq!("empty", geometry.id);

        let error = Reference::new(ReferenceKind::Controller, "missing")
            .lookup::<Controller>(&library)
            .unwrap_err();
        assert!(matches!(
            error,
            DaeError::UnresolvedReference { kind: ReferenceKind::Controller, ref id } if id == "missing"
        ));
    }

    #[test]
    fn repeated_sections_are_merged() {
        let library = library();
        let ids: Vec<_> = library.section::<Geometry>().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(vec!["empty", "late"], ids);

        let late: &Geometry = Reference::new(ReferenceKind::Geometry, "late")
            .lookup(&library)
            .unwrap();
        assert_eq!("late", late.id);
    }

    #[test]
    fn reference_kind_must_match_section() {
        let library = library();
        let error = Reference::new(ReferenceKind::Controller, "empty")
            .lookup::<Geometry>(&library)
            .unwrap_err();
        assert!(matches!(
            error,
            DaeError::UnresolvedReference { kind: ReferenceKind::Controller, ref id } if id == "empty"
        ));
    }

    #[test]
    fn broken_items_keep_their_error() {
        let library = library();
        let error = Reference::new(ReferenceKind::Geometry, "curve")
            .lookup::<Geometry>(&library)
            .unwrap_err();
        assert!(matches!(error, DaeError::MalformedDocument { .. }));
    }

    #[test]
    fn nodes_are_found_across_scenes() {
        let library = library();
        assert_eq!(2, library.visual_scenes().len());
        assert_eq!("main", library.find_node("Root").unwrap().0.id.as_deref().unwrap());
        assert!(library.find_node("Nowhere").is_err());
        assert_eq!(Some("Z_UP".to_string()), library.up_axis());
    }

    #[test]
    fn invalid_xml() {
        assert!(matches!(
            Library::parse("<COLLADA>".as_bytes()),
            Err(DaeError::MalformedDocument { .. })
        ));
    }
}
