//! Document-mutating actions. Ignored entirely when the state is not editable.

use crate::context::{IdGenerator, ReducerContext};
use canvas_schema::{
    Action, Axis, ContentEditMode, Document, EditorState, Gesture, InsertKind, InsertNode, Node,
    NodeChange, NodeId, NodeKind, OrderDirection, Paint, ParentRef, Rect, Rgba, Scene, SchemaError,
    Target,
};
use std::collections::BTreeMap;

pub(super) fn handles(action: &Action) -> bool {
    matches!(
        action,
        Action::Insert(_)
            | Action::Delete { .. }
            | Action::Duplicate { .. }
            | Action::Move { .. }
            | Action::Order { .. }
            | Action::Nudge { .. }
            | Action::NodeChange { .. }
            | Action::DragStart
            | Action::Drag { .. }
            | Action::DragEnd
            | Action::SceneNew { .. }
            | Action::SceneDelete { .. }
            | Action::SceneRename { .. }
            | Action::ContentEditEnter
    )
}

pub(super) fn reduce(
    state: &mut EditorState,
    action: &Action,
    ctx: &ReducerContext,
) -> Result<(), SchemaError> {
    match action {
        Action::Insert(insert) => insert_node(state, insert, ctx)?,
        Action::Delete { target } => delete(state, target),
        Action::Duplicate { target } => duplicate(state, target, ctx.ids.as_ref())?,
        Action::Move {
            target,
            parent,
            index,
        } => move_nodes(state, target, parent, *index)?,
        Action::Order { target, order } => reorder(state, target, *order),
        Action::Nudge {
            target,
            axis,
            delta,
        } => nudge(state, target, *axis, *delta),
        Action::NodeChange { node_id, change } => change_node(state, node_id, change)?,
        Action::DragStart => drag_start(state),
        Action::Drag { movement } => {
            let EditorState {
                gesture, document, ..
            } = state;
            if let Gesture::Translate {
                origins,
                movement: current,
            } = gesture
            {
                *current = *movement;
                for (id, origin) in origins.iter() {
                    if let Some(node) = document.node_mut(id) {
                        node.left = origin[0] + movement[0];
                        node.top = origin[1] + movement[1];
                    }
                }
            }
        }
        Action::DragEnd => state.gesture = Gesture::Idle,
        Action::SceneNew { name } => new_scene(state, name.as_deref(), ctx.ids.as_ref())?,
        Action::SceneDelete { scene_id } => delete_scene(state, scene_id)?,
        Action::SceneRename { scene_id, name } => {
            let scene = state
                .document
                .scenes
                .get_mut(scene_id)
                .ok_or_else(|| SchemaError::invariant(format!("scene '{scene_id}' not found")))?;
            scene.name = name.clone();
        }
        Action::ContentEditEnter => {
            if let [only] = state.selection.as_slice() {
                let mode = match state.document.node(only).map(|n| &n.kind) {
                    Some(NodeKind::Text { .. }) => Some(ContentEditMode::Text {
                        node_id: only.clone(),
                    }),
                    Some(NodeKind::Vector { .. }) => Some(ContentEditMode::Vector {
                        node_id: only.clone(),
                    }),
                    _ => None,
                };
                if mode.is_some() {
                    state.content_edit_mode = mode;
                }
            }
        }
        Action::Select { .. }
        | Action::Blur
        | Action::Hover { .. }
        | Action::PointerMove { .. }
        | Action::MarqueeStart { .. }
        | Action::MarqueeEnd { .. }
        | Action::CameraTransform { .. }
        | Action::CameraPan { .. }
        | Action::CameraFit { .. }
        | Action::SetTool { .. }
        | Action::SceneLoad { .. }
        | Action::ContentEditExit
        | Action::Undo
        | Action::Redo => return Ok(()),
    }
    state.rebuild_context();
    Ok(())
}

fn insert_node(
    state: &mut EditorState,
    insert: &InsertNode,
    ctx: &ReducerContext,
) -> Result<(), SchemaError> {
    let id = fresh_id(&state.document, ctx.ids.as_ref())?;
    let rect = insert.rect.unwrap_or_else(|| {
        let [cx, cy] = state
            .transform
            .inverse()
            .map(|t| t.apply([ctx.viewport[0] / 2.0, ctx.viewport[1] / 2.0]))
            .unwrap_or([0.0, 0.0]);
        Rect::new(cx - 50.0, cy - 50.0, 100.0, 100.0)
    });

    let node = match insert.kind {
        InsertKind::Rectangle => Node::rectangle(&id),
        InsertKind::Ellipse => Node::new(
            &id,
            NodeKind::Ellipse {
                fill: Some(Paint::solid(Rgba::BLACK)),
            },
        ),
        InsertKind::Text => Node::text(&id, insert.text.clone().unwrap_or_else(|| "Text".into())),
        InsertKind::Container => Node::container(&id),
    };
    let mut node = node.at(rect.x, rect.y).sized(rect.width, rect.height);
    if let Some(name) = &insert.name {
        node.name = name.clone();
    }

    let parent = match &insert.parent {
        Some(parent_id) => ParentRef::Node(parent_id.clone()),
        None => ParentRef::Scene(
            state
                .scene_id
                .clone()
                .ok_or_else(|| SchemaError::invariant("no active scene to insert into"))?,
        ),
    };
    state.document.attach(node, &parent, None)?;
    state.selection = vec![id];
    Ok(())
}

fn delete(state: &mut EditorState, target: &Target) {
    for id in target.resolve(&state.selection) {
        match state.document.node(&id) {
            Some(node) if !node.locked => {
                state.document.remove_subtree(&id);
            }
            _ => {}
        }
    }
    prune_dangling(state);
}

fn duplicate(
    state: &mut EditorState,
    target: &Target,
    ids: &dyn IdGenerator,
) -> Result<(), SchemaError> {
    let mut created = Vec::new();
    for id in target.resolve(&state.selection) {
        let Some(parent) = state.document_ctx.parent(&id).cloned() else {
            continue;
        };
        let Some(index) = children_of(&state.document, &parent)
            .and_then(|children| children.iter().position(|c| c == &id))
        else {
            continue;
        };
        let Some(copy) = clone_subtree(&mut state.document, &id, ids)? else {
            continue;
        };
        state.document.link(&copy, &parent, Some(index + 1))?;
        created.push(copy);
    }
    if !created.is_empty() {
        state.selection = created;
    }
    Ok(())
}

const MAX_ID_ATTEMPTS: usize = 1024;

/// Next generated id not taken by a node or scene. A counter that starts
/// below the ids of a loaded document skips past them.
fn fresh_id(document: &Document, ids: &dyn IdGenerator) -> Result<NodeId, SchemaError> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = ids.next_id();
        if !document.nodes.contains_key(&id) && !document.scenes.contains_key(&id) {
            return Ok(id);
        }
    }
    Err(SchemaError::invariant(
        "id generator keeps producing ids already in the document",
    ))
}

fn clone_subtree(
    document: &mut Document,
    id: &str,
    ids: &dyn IdGenerator,
) -> Result<Option<NodeId>, SchemaError> {
    let Some(mut copy) = document.node(id).cloned() else {
        return Ok(None);
    };
    copy.id = fresh_id(document, ids)?;
    let mut children = Vec::with_capacity(copy.children.len());
    for child in &copy.children {
        if let Some(child_copy) = clone_subtree(document, child, ids)? {
            children.push(child_copy);
        }
    }
    copy.children = children;
    let copy_id = copy.id.clone();
    if document.nodes.contains_key(&copy_id) {
        return Err(SchemaError::invariant(format!(
            "duplicate id '{copy_id}' is already taken"
        )));
    }
    document.nodes.insert(copy_id.clone(), copy);
    Ok(Some(copy_id))
}

fn move_nodes(
    state: &mut EditorState,
    target: &Target,
    parent: &ParentRef,
    index: Option<usize>,
) -> Result<(), SchemaError> {
    let ids = target.resolve(&state.selection);
    if let ParentRef::Node(parent_id) = parent {
        if let Some(id) = ids
            .iter()
            .find(|id| *id == parent_id || state.document_ctx.is_ancestor(id, parent_id))
        {
            return Err(SchemaError::invariant(format!(
                "cannot move '{id}' into itself or its descendant '{parent_id}'"
            )));
        }
    }

    let mut at = index;
    for id in ids {
        if !state.document.nodes.contains_key(&id) {
            continue;
        }
        state.document.unlink(&id);
        state.document.link(&id, parent, at)?;
        if let Some(i) = at.as_mut() {
            *i += 1;
        }
    }
    Ok(())
}

fn reorder(state: &mut EditorState, target: &Target, order: OrderDirection) {
    for id in target.resolve(&state.selection) {
        let Some(parent) = state.document_ctx.parent(&id).cloned() else {
            continue;
        };
        let Some(children) = children_of_mut(&mut state.document, &parent) else {
            continue;
        };
        let Some(pos) = children.iter().position(|c| c == &id) else {
            continue;
        };
        let last = children.len() - 1;
        let next = match order {
            OrderDirection::Front => last,
            OrderDirection::Back => 0,
            OrderDirection::Forward => (pos + 1).min(last),
            OrderDirection::Backward => pos.saturating_sub(1),
        };
        let item = children.remove(pos);
        children.insert(next, item);
    }
}

fn nudge(state: &mut EditorState, target: &Target, axis: Axis, delta: f64) {
    for id in target.resolve(&state.selection) {
        let Some(node) = state.document.node_mut(&id) else {
            continue;
        };
        if node.locked {
            continue;
        }
        match axis {
            Axis::X => node.left += delta,
            Axis::Y => node.top += delta,
        }
    }
}

fn change_node(
    state: &mut EditorState,
    node_id: &str,
    change: &NodeChange,
) -> Result<(), SchemaError> {
    let node = state
        .document
        .node_mut(node_id)
        .ok_or_else(|| SchemaError::invariant(format!("node '{node_id}' not found")))?;
    let unsupported = |property: &str, kind: &NodeKind| {
        SchemaError::invariant(format!("{} node '{node_id}' has no {property}", kind.name()))
    };

    match change {
        NodeChange::Name(name) => node.name = name.clone(),
        NodeChange::Active(active) => node.active = *active,
        NodeChange::Locked(locked) => node.locked = *locked,
        NodeChange::Opacity(opacity) => node.opacity = opacity.clamp(0.0, 1.0),
        NodeChange::Rotation(rotation) => node.rotation = *rotation,
        NodeChange::Left(left) => node.left = *left,
        NodeChange::Top(top) => node.top = *top,
        NodeChange::Width(width) => node.width = width.max(0.0),
        NodeChange::Height(height) => node.height = height.max(0.0),
        NodeChange::CornerRadius(radius) => match &mut node.kind {
            NodeKind::Rectangle { corner_radius, .. } => *corner_radius = radius.max(0.0),
            kind => return Err(unsupported("corner radius", kind)),
        },
        NodeChange::Fill(paint) => {
            if matches!(node.kind, NodeKind::Image { .. }) {
                return Err(unsupported("fill", &node.kind));
            }
            if let Some(fill) = node.kind.fill_mut() {
                *fill = paint.clone();
            }
        }
        NodeChange::Text(value) => match &mut node.kind {
            NodeKind::Text { text, .. } => *text = value.clone(),
            kind => return Err(unsupported("text", kind)),
        },
        NodeChange::FontSize(size) => match &mut node.kind {
            NodeKind::Text { style, .. } => style.font_size = size.max(0.0),
            kind => return Err(unsupported("font size", kind)),
        },
        NodeChange::FontStyle(change) => match &mut node.kind {
            NodeKind::Text { style, .. } => {
                style.font_family = change.font_family.clone();
                style.font_weight = change.font_weight;
                style.font_style_italic = change.font_style_italic;
                style.font_postscript_name = change.font_postscript_name.clone();
                style.font_instance_postscript_name = change.font_instance_postscript_name.clone();
                style.font_variations = change.font_variations.clone();
            }
            kind => return Err(unsupported("font style", kind)),
        },
    }
    Ok(())
}

fn drag_start(state: &mut EditorState) {
    let origins: BTreeMap<NodeId, [f64; 2]> = state
        .selection
        .iter()
        .filter_map(|id| state.document.node(id))
        .filter(|node| !node.locked)
        .map(|node| (node.id.clone(), [node.left, node.top]))
        .collect();
    if !origins.is_empty() {
        state.gesture = Gesture::Translate {
            origins,
            movement: [0.0, 0.0],
        };
    }
}

fn new_scene(
    state: &mut EditorState,
    name: Option<&str>,
    ids: &dyn IdGenerator,
) -> Result<(), SchemaError> {
    let id = fresh_id(&state.document, ids)?;
    let order = state
        .document
        .scenes
        .values()
        .map(|s| s.order)
        .max()
        .map_or(0, |max| max + 1);
    let mut scene = Scene::new(
        id.clone(),
        name.map(str::to_string)
            .unwrap_or_else(|| format!("Scene {}", state.document.scenes.len() + 1)),
    );
    scene.order = order;
    state.document.scenes.insert(id.clone(), scene);
    state.scene_id = Some(id);
    state.selection.clear();
    state.hovered_node_id = None;
    state.content_edit_mode = None;
    Ok(())
}

fn delete_scene(state: &mut EditorState, scene_id: &str) -> Result<(), SchemaError> {
    let scene = state
        .document
        .scenes
        .remove(scene_id)
        .ok_or_else(|| SchemaError::invariant(format!("scene '{scene_id}' not found")))?;
    for child in &scene.children {
        let mut removed = vec![child.clone()];
        removed.extend(state.document.descendants(child));
        for id in removed {
            state.document.nodes.remove(&id);
        }
    }

    let fallback = state.document.scenes_ordered().first().map(|s| s.id.clone());
    if state.document.entry_scene_id.as_deref() == Some(scene_id) {
        state.document.entry_scene_id = fallback.clone();
    }
    if state.scene_id.as_deref() == Some(scene_id) {
        state.scene_id = fallback;
    }
    prune_dangling(state);
    Ok(())
}

fn prune_dangling(state: &mut EditorState) {
    let nodes = &state.document.nodes;
    state.selection.retain(|id| nodes.contains_key(id));
    if state
        .hovered_node_id
        .as_ref()
        .is_some_and(|id| !nodes.contains_key(id))
    {
        state.hovered_node_id = None;
    }
    if state
        .content_edit_mode
        .as_ref()
        .is_some_and(|mode| !nodes.contains_key(mode.node_id()))
    {
        state.content_edit_mode = None;
    }
}

fn children_of<'a>(document: &'a Document, parent: &ParentRef) -> Option<&'a Vec<NodeId>> {
    match parent {
        ParentRef::Scene(id) => document.scenes.get(id).map(|s| &s.children),
        ParentRef::Node(id) => document.nodes.get(id).map(|n| &n.children),
    }
}

fn children_of_mut<'a>(
    document: &'a mut Document,
    parent: &ParentRef,
) -> Option<&'a mut Vec<NodeId>> {
    match parent {
        ParentRef::Scene(id) => document.scenes.get_mut(id).map(|s| &mut s.children),
        ParentRef::Node(id) => document.nodes.get_mut(id).map(|n| &mut n.children),
    }
}
