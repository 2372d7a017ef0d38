//! # Editor state
//!
//! The complete session state managed by the store. Only the fields named in
//! [`HISTORY_KEYS`] take part in undo/redo; camera, pointer, tool and
//! gesture are volatile.

use crate::{Document, DocumentContext, NodeId, Rect, Result, SceneId, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Top-level state fields tracked by history
pub const HISTORY_KEYS: [&str; 6] = [
    "selection",
    "scene_id",
    "document",
    "document_ctx",
    "content_edit_mode",
    "document_key",
];

pub type Vector2 = [f64; 2];

/// 2×3 affine matrix mapping canvas space to viewport space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform(pub [[f64; 3]; 2]);

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);

    pub fn translation(&self) -> Vector2 {
        [self.0[0][2], self.0[1][2]]
    }

    pub fn scale_x(&self) -> f64 {
        self.0[0][0]
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let mut m = self.0;
        m[0][2] += dx;
        m[1][2] += dy;
        Transform(m)
    }

    /// Canvas point to viewport point
    pub fn apply(&self, point: Vector2) -> Vector2 {
        let [[a, b, tx], [c, d, ty]] = self.0;
        [a * point[0] + b * point[1] + tx, c * point[0] + d * point[1] + ty]
    }

    pub fn inverse(&self) -> Option<Self> {
        let [[a, b, tx], [c, d, ty]] = self.0;
        let det = a * d - b * c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(Transform([
            [ia, ib, -(ia * tx + ib * ty)],
            [ic, id, -(ic * tx + id * ty)],
        ]))
    }

    /// Uniform scale + translation that centers `area` inside a viewport
    pub fn fit(area: &Rect, viewport: Vector2, margin: f64) -> Self {
        let avail_w = (viewport[0] - margin * 2.0).max(1.0);
        let avail_h = (viewport[1] - margin * 2.0).max(1.0);
        let scale = if area.width > 0.0 && area.height > 0.0 {
            (avail_w / area.width).min(avail_h / area.height)
        } else {
            1.0
        };
        let [cx, cy] = area.center();
        Transform([
            [scale, 0.0, viewport[0] / 2.0 - cx * scale],
            [0.0, scale, viewport[1] / 2.0 - cy * scale],
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEditMode {
    Text { node_id: NodeId },
    Vector { node_id: NodeId },
}

impl ContentEditMode {
    pub fn node_id(&self) -> &str {
        match self {
            ContentEditMode::Text { node_id } | ContentEditMode::Vector { node_id } => node_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertKind {
    Rectangle,
    Ellipse,
    Text,
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Cursor,
    Hand,
    Zoom,
    Insert { node: InsertKind },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
    #[default]
    Idle,
    Translate {
        origins: BTreeMap<NodeId, Vector2>,
        movement: Vector2,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marquee {
    pub anchor: Vector2,
    pub position: Vector2,
}

impl Marquee {
    pub fn rect(&self) -> Rect {
        Rect::from_points(self.anchor, self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub document: Document,
    pub document_ctx: DocumentContext,
    #[serde(default)]
    pub document_key: Option<String>,
    #[serde(default)]
    pub selection: Vec<NodeId>,
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub content_edit_mode: Option<ContentEditMode>,

    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub tool: Tool,
    #[serde(default)]
    pub gesture: Gesture,
    #[serde(default)]
    pub hovered_node_id: Option<NodeId>,
    #[serde(default)]
    pub pointer: Vector2,
    #[serde(default)]
    pub marquee: Option<Marquee>,

    #[serde(default = "default_editable")]
    pub editable: bool,
    #[serde(default)]
    pub transaction_id: u64,
}

fn default_editable() -> bool {
    true
}

impl EditorState {
    /// Fresh state over `document`, opened on its entry scene
    pub fn new(document: Document) -> Result<Self> {
        let scene_id = document
            .entry_scene_id
            .clone()
            .or_else(|| document.scenes_ordered().first().map(|s| s.id.clone()));
        let state = Self {
            document_ctx: DocumentContext::build(&document),
            document,
            document_key: None,
            selection: Vec::new(),
            scene_id,
            content_edit_mode: None,
            transform: Transform::IDENTITY,
            tool: Tool::Cursor,
            gesture: Gesture::Idle,
            hovered_node_id: None,
            pointer: [0.0, 0.0],
            marquee: None,
            editable: true,
            transaction_id: 0,
        };
        state.validate()?;
        Ok(state)
    }

    pub fn with_document_key(mut self, key: impl Into<String>) -> Self {
        self.document_key = Some(key.into());
        self
    }

    pub fn rebuild_context(&mut self) {
        self.document_ctx = DocumentContext::build(&self.document);
    }

    /// Reject states whose ids point at nodes or scenes that do not exist
    pub fn validate(&self) -> Result<()> {
        self.document.validate()?;

        let mut seen = BTreeSet::new();
        for id in &self.selection {
            if !self.document.nodes.contains_key(id) {
                return Err(SchemaError::invariant(format!("selected node '{id}' not found")));
            }
            if !seen.insert(id) {
                return Err(SchemaError::invariant(format!("node '{id}' selected twice")));
            }
        }
        if let Some(id) = &self.hovered_node_id {
            if !self.document.nodes.contains_key(id) {
                return Err(SchemaError::invariant(format!("hovered node '{id}' not found")));
            }
        }
        if let Some(mode) = &self.content_edit_mode {
            if !self.document.nodes.contains_key(mode.node_id()) {
                return Err(SchemaError::invariant(format!(
                    "content edit target '{}' not found",
                    mode.node_id()
                )));
            }
        }
        if let Some(id) = self
            .document_ctx
            .parent_of
            .keys()
            .chain(self.document_ctx.scene_of.keys())
            .find(|id| !self.document.nodes.contains_key(*id))
        {
            return Err(SchemaError::invariant(format!(
                "link table references missing node '{id}'"
            )));
        }
        if let Some(scene_id) = &self.scene_id {
            if !self.document.scenes.contains_key(scene_id) {
                return Err(SchemaError::invariant(format!("scene '{scene_id}' not found")));
            }
        }
        Ok(())
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Top-level nodes of the current scene
    pub fn scene_children(&self) -> &[NodeId] {
        self.scene_id
            .as_deref()
            .and_then(|id| self.document.scene(id))
            .map(|scene| scene.children.as_slice())
            .unwrap_or(&[])
    }
}

/// The history-tracked part of [`EditorState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryProjection {
    pub selection: Vec<NodeId>,
    pub scene_id: Option<SceneId>,
    pub document: Document,
    pub document_ctx: DocumentContext,
    pub content_edit_mode: Option<ContentEditMode>,
    pub document_key: Option<String>,
}

impl HistoryProjection {
    pub fn of(state: &EditorState) -> Self {
        Self {
            selection: state.selection.clone(),
            scene_id: state.scene_id.clone(),
            document: state.document.clone(),
            document_ctx: state.document_ctx.clone(),
            content_edit_mode: state.content_edit_mode.clone(),
            document_key: state.document_key.clone(),
        }
    }

    pub fn write_into(self, state: &mut EditorState) {
        state.selection = self.selection;
        state.scene_id = self.scene_id;
        state.document = self.document;
        state.document_ctx = self.document_ctx;
        state.content_edit_mode = self.content_edit_mode;
        state.document_key = self.document_key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Node, ParentRef};

    fn state() -> EditorState {
        let mut doc = Document::with_scene("main", "Main");
        doc.attach(Node::rectangle("a"), &ParentRef::Scene("main".into()), None)
            .unwrap();
        EditorState::new(doc).unwrap()
    }

    #[test]
    fn test_new_state_opens_entry_scene() {
        let state = state();
        assert_eq!(state.scene_id.as_deref(), Some("main"));
        assert_eq!(state.scene_children(), ["a".to_string()]);
        assert_eq!(state.transaction_id, 0);
    }

    #[test]
    fn test_validate_rejects_dangling_ids() {
        let mut s = state();
        s.selection = vec!["missing".into()];
        assert!(s.validate().is_err());

        let mut s = state();
        s.selection = vec!["a".into(), "a".into()];
        assert!(s.validate().is_err());

        let mut s = state();
        s.content_edit_mode = Some(ContentEditMode::Text { node_id: "x".into() });
        assert!(s.validate().is_err());

        let mut s = state();
        s.scene_id = Some("nope".into());
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_projection_fields_match_history_keys() {
        let value = serde_json::to_value(HistoryProjection::of(&state())).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        let mut expected = HISTORY_KEYS.to_vec();
        keys.sort();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_transform_inverse() {
        let t = Transform([[2.0, 0.0, 10.0], [0.0, 2.0, -4.0]]);
        let p = t.apply([3.0, 5.0]);
        assert_eq!(p, [16.0, 6.0]);
        assert_eq!(t.inverse().unwrap().apply(p), [3.0, 5.0]);
    }
}
