//! # Document model
//!
//! A document is a flat table of nodes plus a list of scenes. Tree structure
//! lives in the `children` lists; [`DocumentContext`] is the reverse index
//! (node → parent, node → scene) rebuilt from those lists.

use crate::{Result, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type NodeId = String;
pub type SceneId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba { r: 0, g: 0, b: 0, a: 1.0 };
    pub const WHITE: Rgba = Rgba { r: 255, g: 255, b: 255, a: 1.0 };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Paint {
    Solid { color: Rgba },
    LinearGradient { stops: Vec<GradientStop> },
}

impl Paint {
    pub fn solid(color: Rgba) -> Self {
        Paint::Solid { color }
    }
}

/// Font properties of a text node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: u16,
    #[serde(default)]
    pub font_style_italic: bool,
    #[serde(default)]
    pub font_postscript_name: Option<String>,
    #[serde(default)]
    pub font_instance_postscript_name: Option<String>,
    #[serde(default)]
    pub font_variations: BTreeMap<String, f32>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Inter".to_string(),
            font_size: 14.0,
            font_weight: 400,
            font_style_italic: false,
            font_postscript_name: None,
            font_instance_postscript_name: None,
            font_variations: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Rectangle {
        #[serde(default)]
        corner_radius: f64,
        #[serde(default)]
        fill: Option<Paint>,
    },
    Ellipse {
        #[serde(default)]
        fill: Option<Paint>,
    },
    Text {
        text: String,
        #[serde(default)]
        style: TextStyle,
        #[serde(default)]
        fill: Option<Paint>,
    },
    Container {
        #[serde(default)]
        fill: Option<Paint>,
        #[serde(default)]
        clips_content: bool,
    },
    Image {
        src: String,
    },
    Vector {
        path_data: String,
        #[serde(default)]
        fill: Option<Paint>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Rectangle { .. } => "rectangle",
            NodeKind::Ellipse { .. } => "ellipse",
            NodeKind::Text { .. } => "text",
            NodeKind::Container { .. } => "container",
            NodeKind::Image { .. } => "image",
            NodeKind::Vector { .. } => "vector",
        }
    }

    pub fn fill_mut(&mut self) -> Option<&mut Option<Paint>> {
        match self {
            NodeKind::Rectangle { fill, .. }
            | NodeKind::Ellipse { fill }
            | NodeKind::Text { fill, .. }
            | NodeKind::Container { fill, .. }
            | NodeKind::Vector { fill, .. } => Some(fill),
            NodeKind::Image { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub locked: bool,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            name: kind.name().to_string(),
            id,
            active: true,
            locked: false,
            left: 0.0,
            top: 0.0,
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            opacity: 1.0,
            children: Vec::new(),
            kind,
        }
    }

    pub fn rectangle(id: impl Into<NodeId>) -> Self {
        Self::new(
            id,
            NodeKind::Rectangle {
                corner_radius: 0.0,
                fill: Some(Paint::solid(Rgba::BLACK)),
            },
        )
    }

    pub fn container(id: impl Into<NodeId>) -> Self {
        Self::new(
            id,
            NodeKind::Container {
                fill: Some(Paint::solid(Rgba::WHITE)),
                clips_content: false,
            },
        )
    }

    pub fn text(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Text {
                text: text.into(),
                style: TextStyle::default(),
                fill: Some(Paint::solid(Rgba::BLACK)),
            },
        )
    }

    pub fn at(mut self, left: f64, top: f64) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    pub fn can_have_children(&self) -> bool {
        matches!(self.kind, NodeKind::Container { .. })
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

/// Axis-aligned rectangle in canvas space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two corner points in any order
    pub fn from_points(a: [f64; 2], b: [f64; 2]) -> Self {
        let x = a[0].min(b[0]);
        let y = a[1].min(b[1]);
        Self::new(x, y, (a[0] - b[0]).abs(), (a[1] - b[1]).abs())
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains_point(&self, point: [f64; 2]) -> bool {
        point[0] >= self.x && point[0] <= self.right() && point[1] >= self.y && point[1] <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn center(&self) -> [f64; 2] {
        [self.x + self.width / 2.0, self.y + self.height / 2.0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub background_color: Option<Rgba>,
}

impl Scene {
    pub fn new(id: impl Into<SceneId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order: 0,
            children: Vec::new(),
            background_color: None,
        }
    }
}

/// Where a node hangs in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Node(NodeId),
    Scene(SceneId),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    pub scenes: BTreeMap<SceneId, Scene>,
    #[serde(default)]
    pub entry_scene_id: Option<SceneId>,
}

impl Document {
    /// Empty document with a single scene as entry
    pub fn with_scene(id: impl Into<SceneId>, name: impl Into<String>) -> Self {
        let scene = Scene::new(id, name);
        let mut doc = Self {
            entry_scene_id: Some(scene.id.clone()),
            ..Self::default()
        };
        doc.scenes.insert(scene.id.clone(), scene);
        doc
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    /// Scenes sorted by `order`, ties broken by id
    pub fn scenes_ordered(&self) -> Vec<&Scene> {
        let mut scenes: Vec<&Scene> = self.scenes.values().collect();
        scenes.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        scenes
    }

    /// All nodes below `id`, depth first, excluding `id` itself
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        self.collect_descendants(id, &mut out, &mut seen);
        out
    }

    fn collect_descendants(&self, id: &str, out: &mut Vec<NodeId>, seen: &mut BTreeSet<NodeId>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for child in &node.children {
            if seen.insert(child.clone()) {
                out.push(child.clone());
                self.collect_descendants(child, out, seen);
            }
        }
    }

    /// Insert a node under `parent` at `index` (appended when `None`)
    pub fn attach(&mut self, node: Node, parent: &ParentRef, index: Option<usize>) -> Result<()> {
        let id = node.id.clone();
        if self.nodes.contains_key(&id) {
            return Err(SchemaError::invariant(format!("node '{id}' already exists")));
        }
        self.nodes.insert(id.clone(), node);
        if let Err(err) = self.link(&id, parent, index) {
            self.nodes.remove(&id);
            return Err(err);
        }
        Ok(())
    }

    /// Add an existing node id to the children list of `parent`
    pub fn link(&mut self, id: &str, parent: &ParentRef, index: Option<usize>) -> Result<()> {
        let children = match parent {
            ParentRef::Scene(scene_id) => {
                &mut self
                    .scenes
                    .get_mut(scene_id)
                    .ok_or_else(|| SchemaError::invariant(format!("scene '{scene_id}' not found")))?
                    .children
            }
            ParentRef::Node(parent_id) => {
                let parent = self
                    .nodes
                    .get_mut(parent_id)
                    .ok_or_else(|| SchemaError::invariant(format!("node '{parent_id}' not found")))?;
                if !parent.can_have_children() {
                    return Err(SchemaError::invariant(format!(
                        "node '{parent_id}' cannot have children"
                    )));
                }
                &mut parent.children
            }
        };
        let at = index.unwrap_or(children.len()).min(children.len());
        children.insert(at, id.to_string());
        Ok(())
    }

    /// Remove `id` from its parent's children list, returning where it was
    pub fn unlink(&mut self, id: &str) -> Option<(ParentRef, usize)> {
        for scene in self.scenes.values_mut() {
            if let Some(at) = scene.children.iter().position(|c| c == id) {
                scene.children.remove(at);
                return Some((ParentRef::Scene(scene.id.clone()), at));
            }
        }
        for node in self.nodes.values_mut() {
            if let Some(at) = node.children.iter().position(|c| c == id) {
                node.children.remove(at);
                return Some((ParentRef::Node(node.id.clone()), at));
            }
        }
        None
    }

    /// Detach `id` and drop it with its whole subtree. Returns removed ids.
    pub fn remove_subtree(&mut self, id: &str) -> Vec<NodeId> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        self.unlink(id);
        let mut removed = vec![id.to_string()];
        removed.extend(self.descendants(id));
        for node_id in &removed {
            self.nodes.remove(node_id);
        }
        removed
    }

    /// Structural checks: dangling children, multiple parents, cycles,
    /// children on leaf nodes, unknown entry scene.
    pub fn validate(&self) -> Result<()> {
        let mut parents: BTreeMap<&str, &str> = BTreeMap::new();

        let scene_links = self
            .scenes
            .values()
            .flat_map(|s| s.children.iter().map(move |c| (s.id.as_str(), c)));
        let node_links = self
            .nodes
            .values()
            .flat_map(|n| n.children.iter().map(move |c| (n.id.as_str(), c)));

        for (owner, child) in scene_links.chain(node_links) {
            if !self.nodes.contains_key(child) {
                return Err(SchemaError::invariant(format!(
                    "'{owner}' references missing child '{child}'"
                )));
            }
            if let Some(previous) = parents.insert(child.as_str(), owner) {
                return Err(SchemaError::invariant(format!(
                    "node '{child}' has two parents ('{previous}', '{owner}')"
                )));
            }
        }

        for node in self.nodes.values() {
            if !node.children.is_empty() && !node.can_have_children() {
                return Err(SchemaError::invariant(format!(
                    "{} node '{}' cannot have children",
                    node.kind.name(),
                    node.id
                )));
            }
            if self.descendants(&node.id).contains(&node.id) {
                return Err(SchemaError::invariant(format!(
                    "node '{}' is its own ancestor",
                    node.id
                )));
            }
        }

        if let Some(entry) = &self.entry_scene_id {
            if !self.scenes.contains_key(entry) {
                return Err(SchemaError::invariant(format!(
                    "entry scene '{entry}' not found"
                )));
            }
        }
        Ok(())
    }
}

/// Reverse index over the children lists of a [`Document`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentContext {
    pub parent_of: BTreeMap<NodeId, ParentRef>,
    pub scene_of: BTreeMap<NodeId, SceneId>,
}

impl DocumentContext {
    pub fn build(document: &Document) -> Self {
        let mut ctx = Self::default();
        for scene in document.scenes.values() {
            for child in &scene.children {
                ctx.walk(document, child, ParentRef::Scene(scene.id.clone()), &scene.id);
            }
        }
        ctx
    }

    fn walk(&mut self, document: &Document, id: &str, parent: ParentRef, scene_id: &str) {
        if self.parent_of.contains_key(id) || !document.nodes.contains_key(id) {
            return;
        }
        self.parent_of.insert(id.to_string(), parent);
        self.scene_of.insert(id.to_string(), scene_id.to_string());
        if let Some(node) = document.nodes.get(id) {
            for child in &node.children {
                self.walk(document, child, ParentRef::Node(id.to_string()), scene_id);
            }
        }
    }

    pub fn parent(&self, id: &str) -> Option<&ParentRef> {
        self.parent_of.get(id)
    }

    pub fn scene_of(&self, id: &str) -> Option<&SceneId> {
        self.scene_of.get(id)
    }

    /// Ancestor chain from the direct parent up to the top-level node
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(ParentRef::Node(parent)) = self.parent_of.get(current) {
            if out.contains(parent) {
                break;
            }
            out.push(parent.clone());
            current = parent;
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let mut doc = Document::with_scene("main", "Main");
        let scene = ParentRef::Scene("main".to_string());
        doc.attach(Node::container("frame"), &scene, None).unwrap();
        doc.attach(
            Node::rectangle("rect"),
            &ParentRef::Node("frame".to_string()),
            None,
        )
        .unwrap();
        doc.attach(Node::text("label", "hi"), &scene, None).unwrap();
        doc
    }

    #[test]
    fn test_context_links() {
        let doc = sample();
        let ctx = DocumentContext::build(&doc);
        assert_eq!(ctx.parent("rect"), Some(&ParentRef::Node("frame".into())));
        assert_eq!(ctx.parent("frame"), Some(&ParentRef::Scene("main".into())));
        assert_eq!(ctx.scene_of("rect").map(String::as_str), Some("main"));
        assert_eq!(ctx.ancestors("rect"), vec!["frame".to_string()]);
        assert!(ctx.is_ancestor("frame", "rect"));
    }

    #[test]
    fn test_leaf_cannot_take_children() {
        let mut doc = sample();
        let err = doc
            .attach(Node::rectangle("x"), &ParentRef::Node("rect".into()), None)
            .unwrap_err();
        assert!(matches!(err, SchemaError::Invariant(_)));
        assert!(doc.node("x").is_none());
    }

    #[test]
    fn test_remove_subtree() {
        let mut doc = sample();
        let removed = doc.remove_subtree("frame");
        assert_eq!(removed, vec!["frame".to_string(), "rect".to_string()]);
        assert_eq!(doc.scene("main").unwrap().children, vec!["label".to_string()]);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_validate_dangling_child() {
        let mut doc = sample();
        doc.nodes.get_mut("frame").unwrap().children.push("ghost".into());
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_validate_cycle() {
        let mut doc = sample();
        doc.nodes.insert("inner".into(), Node::container("inner").with_children(vec!["frame".into()]));
        doc.unlink("frame");
        doc.nodes.get_mut("frame").unwrap().children.push("inner".into());
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_node_json_shape() {
        let node = Node::rectangle("r1").at(10.0, 20.0);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], json!("rectangle"));
        assert_eq!(value["left"], json!(10.0));

        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_rect_helpers() {
        let a = Rect::from_points([10.0, 10.0], [0.0, 0.0]);
        assert_eq!(a, Rect::new(0.0, 0.0, 10.0, 10.0));
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!(a.intersects(&b));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
        assert!(b.contains_point([6.0, 14.0]));
    }
}
