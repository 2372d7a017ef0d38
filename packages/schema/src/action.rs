//! # Actions
//!
//! Serializable intents dispatched to the store. The `type` tag doubles as
//! the history entry label.

use crate::state::InsertKind;
use crate::{NodeId, Paint, ParentRef, Rect, SceneId, Tool, Transform, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nodes an action applies to: the current selection or explicit ids
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "TargetRepr", into = "TargetRepr")]
pub enum Target {
    #[default]
    Selection,
    Nodes(Vec<NodeId>),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TargetRepr {
    Keyword(TargetKeyword),
    Nodes(Vec<NodeId>),
}

#[derive(Clone, Serialize, Deserialize)]
enum TargetKeyword {
    #[serde(rename = "selection")]
    Selection,
}

impl From<TargetRepr> for Target {
    fn from(repr: TargetRepr) -> Self {
        match repr {
            TargetRepr::Keyword(TargetKeyword::Selection) => Target::Selection,
            TargetRepr::Nodes(ids) => Target::Nodes(ids),
        }
    }
}

impl From<Target> for TargetRepr {
    fn from(target: Target) -> Self {
        match target {
            Target::Selection => TargetRepr::Keyword(TargetKeyword::Selection),
            Target::Nodes(ids) => TargetRepr::Nodes(ids),
        }
    }
}

impl Target {
    pub fn nodes<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Target::Nodes(ids.into_iter().map(Into::into).collect())
    }

    /// Resolve against the current selection
    pub fn resolve(&self, selection: &[NodeId]) -> Vec<NodeId> {
        match self {
            Target::Selection => selection.to_vec(),
            Target::Nodes(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    #[default]
    Reset,
    Add,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    Front,
    Back,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertNode {
    pub kind: InsertKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Container to insert into; the current scene when absent
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub text: Option<String>,
}

impl InsertNode {
    pub fn new(kind: InsertKind) -> Self {
        Self {
            kind,
            name: None,
            rect: None,
            parent: None,
            text: None,
        }
    }

    pub fn at(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn inside(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Resolved font style applied to a text node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyleChange {
    pub font_family: String,
    pub font_weight: u16,
    pub font_style_italic: bool,
    #[serde(default)]
    pub font_postscript_name: Option<String>,
    #[serde(default)]
    pub font_instance_postscript_name: Option<String>,
    #[serde(default)]
    pub font_variations: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "property", content = "value", rename_all = "snake_case")]
pub enum NodeChange {
    Name(String),
    Active(bool),
    Locked(bool),
    Opacity(f64),
    Rotation(f64),
    Left(f64),
    Top(f64),
    Width(f64),
    Height(f64),
    CornerRadius(f64),
    Fill(Option<Paint>),
    Text(String),
    FontSize(f64),
    FontStyle(TextStyleChange),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "insert")]
    Insert(InsertNode),
    #[serde(rename = "delete")]
    Delete {
        #[serde(default)]
        target: Target,
    },
    #[serde(rename = "duplicate")]
    Duplicate {
        #[serde(default)]
        target: Target,
    },
    #[serde(rename = "move")]
    Move {
        #[serde(default)]
        target: Target,
        parent: ParentRef,
        #[serde(default)]
        index: Option<usize>,
    },
    #[serde(rename = "order")]
    Order {
        #[serde(default)]
        target: Target,
        order: OrderDirection,
    },
    #[serde(rename = "nudge")]
    Nudge {
        #[serde(default)]
        target: Target,
        axis: Axis,
        delta: f64,
    },
    #[serde(rename = "node/change")]
    NodeChange { node_id: NodeId, change: NodeChange },
    #[serde(rename = "select")]
    Select {
        selection: Vec<NodeId>,
        #[serde(default)]
        mode: SelectMode,
    },
    #[serde(rename = "blur")]
    Blur,
    #[serde(rename = "hover")]
    Hover { node_id: Option<NodeId> },
    /// Pointer position in canvas space
    #[serde(rename = "pointer/move")]
    PointerMove { position: Vector2 },
    #[serde(rename = "marquee/start")]
    MarqueeStart { position: Vector2 },
    #[serde(rename = "marquee/end")]
    MarqueeEnd {
        #[serde(default)]
        additive: bool,
    },
    #[serde(rename = "drag/start")]
    DragStart,
    /// Total movement since `drag/start`
    #[serde(rename = "drag")]
    Drag { movement: Vector2 },
    #[serde(rename = "drag/end")]
    DragEnd,
    #[serde(rename = "camera/transform")]
    CameraTransform { transform: Transform },
    #[serde(rename = "camera/pan")]
    CameraPan { delta: Vector2 },
    #[serde(rename = "camera/fit")]
    CameraFit {
        #[serde(default)]
        target: Option<Target>,
        #[serde(default)]
        margin: f64,
    },
    #[serde(rename = "tool")]
    SetTool { tool: Tool },
    #[serde(rename = "scenes/new")]
    SceneNew {
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "scenes/delete")]
    SceneDelete { scene_id: SceneId },
    #[serde(rename = "scenes/rename")]
    SceneRename { scene_id: SceneId, name: String },
    #[serde(rename = "scenes/load")]
    SceneLoad { scene_id: SceneId },
    #[serde(rename = "content-edit-mode/try-enter")]
    ContentEditEnter,
    #[serde(rename = "content-edit-mode/try-exit")]
    ContentEditExit,
    #[serde(rename = "undo")]
    Undo,
    #[serde(rename = "redo")]
    Redo,
}

impl Action {
    pub fn select<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Action::Select {
            selection: ids.into_iter().map(Into::into).collect(),
            mode: SelectMode::Reset,
        }
    }

    pub fn change(node_id: impl Into<NodeId>, change: NodeChange) -> Self {
        Action::NodeChange {
            node_id: node_id.into(),
            change,
        }
    }

    /// Wire tag of this action
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Insert(_) => "insert",
            Action::Delete { .. } => "delete",
            Action::Duplicate { .. } => "duplicate",
            Action::Move { .. } => "move",
            Action::Order { .. } => "order",
            Action::Nudge { .. } => "nudge",
            Action::NodeChange { .. } => "node/change",
            Action::Select { .. } => "select",
            Action::Blur => "blur",
            Action::Hover { .. } => "hover",
            Action::PointerMove { .. } => "pointer/move",
            Action::MarqueeStart { .. } => "marquee/start",
            Action::MarqueeEnd { .. } => "marquee/end",
            Action::DragStart => "drag/start",
            Action::Drag { .. } => "drag",
            Action::DragEnd => "drag/end",
            Action::CameraTransform { .. } => "camera/transform",
            Action::CameraPan { .. } => "camera/pan",
            Action::CameraFit { .. } => "camera/fit",
            Action::SetTool { .. } => "tool",
            Action::SceneNew { .. } => "scenes/new",
            Action::SceneDelete { .. } => "scenes/delete",
            Action::SceneRename { .. } => "scenes/rename",
            Action::SceneLoad { .. } => "scenes/load",
            Action::ContentEditEnter => "content-edit-mode/try-enter",
            Action::ContentEditExit => "content-edit-mode/try-exit",
            Action::Undo => "undo",
            Action::Redo => "redo",
        }
    }

    /// `undo`/`redo` are served by the history, not the reducer
    pub fn is_history_navigation(&self) -> bool {
        matches!(self, Action::Undo | Action::Redo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_forms() {
        let t: Target = serde_json::from_value(json!("selection")).unwrap();
        assert_eq!(t, Target::Selection);
        let t: Target = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(t, Target::nodes(["a", "b"]));
        assert_eq!(serde_json::to_value(Target::Selection).unwrap(), json!("selection"));
    }

    #[test]
    fn test_action_wire_shape() {
        let action: Action = serde_json::from_value(json!({
            "type": "delete",
            "target": "selection"
        }))
        .unwrap();
        assert_eq!(action, Action::Delete { target: Target::Selection });
        assert_eq!(action.kind(), "delete");

        let action: Action = serde_json::from_value(json!({
            "type": "node/change",
            "node_id": "a",
            "change": {"property": "name", "value": "Hero"}
        }))
        .unwrap();
        assert_eq!(action, Action::change("a", NodeChange::Name("Hero".into())));

        let action: Action = serde_json::from_value(json!({"type": "blur"})).unwrap();
        assert_eq!(action.kind(), "blur");

        let value = serde_json::to_value(Action::select(["a"])).unwrap();
        assert_eq!(value, json!({"type": "select", "selection": ["a"], "mode": "reset"}));
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let actions = vec![
            Action::Undo,
            Action::DragStart,
            Action::ContentEditEnter,
            Action::SceneNew { name: None },
            Action::PointerMove { position: [1.0, 2.0] },
            Action::Insert(InsertNode::new(InsertKind::Rectangle)),
        ];
        for action in actions {
            let value = serde_json::to_value(&action).unwrap();
            assert_eq!(value["type"], json!(action.kind()));
        }
    }
}
