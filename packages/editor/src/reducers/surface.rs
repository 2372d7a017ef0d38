//! Selection, camera, pointer and navigation actions

use crate::context::ReducerContext;
use canvas_schema::{
    Action, EditorState, Gesture, Marquee, NodeId, SchemaError, SelectMode, Transform,
};

pub(super) fn reduce(
    state: &mut EditorState,
    action: &Action,
    ctx: &ReducerContext,
) -> Result<(), SchemaError> {
    match action {
        Action::Select { selection, mode } => select(state, selection, *mode),
        Action::Blur => state.selection.clear(),
        Action::Hover { node_id } => {
            state.hovered_node_id = node_id
                .clone()
                .filter(|id| state.document.nodes.contains_key(id));
        }
        Action::PointerMove { position } => {
            state.pointer = *position;
            if let Some(marquee) = state.marquee.as_mut() {
                marquee.position = *position;
            } else if state.gesture == Gesture::Idle {
                state.hovered_node_id = ctx
                    .geometry
                    .node_ids_at_point(state, *position)
                    .into_iter()
                    .next();
            }
        }
        Action::MarqueeStart { position } => {
            state.marquee = Some(Marquee {
                anchor: *position,
                position: *position,
            });
        }
        Action::MarqueeEnd { additive } => {
            if let Some(marquee) = state.marquee.take() {
                let hits: Vec<NodeId> = ctx
                    .geometry
                    .node_ids_in_envelope(state, &marquee.rect())
                    .into_iter()
                    .filter(|id| state.document.node(id).is_some_and(|n| !n.locked))
                    .collect();
                let mode = if *additive {
                    SelectMode::Add
                } else {
                    SelectMode::Reset
                };
                select(state, &hits, mode);
            }
        }
        Action::CameraTransform { transform } => state.transform = *transform,
        Action::CameraPan { delta } => {
            state.transform = state.transform.translated(delta[0], delta[1]);
        }
        Action::CameraFit { target, margin } => {
            let ids = match target {
                Some(target) => target.resolve(&state.selection),
                None => state.scene_children().to_vec(),
            };
            let area = ids
                .iter()
                .filter_map(|id| ctx.geometry.bounding_rect(state, id))
                .reduce(|a, b| a.union(&b));
            if let Some(area) = area {
                state.transform = Transform::fit(&area, ctx.viewport, *margin);
            }
        }
        Action::SetTool { tool } => state.tool = tool.clone(),
        Action::SceneLoad { scene_id } => {
            if !state.document.scenes.contains_key(scene_id) {
                return Err(SchemaError::invariant(format!("scene '{scene_id}' not found")));
            }
            if state.scene_id.as_ref() != Some(scene_id) {
                state.scene_id = Some(scene_id.clone());
                state.selection.clear();
                state.hovered_node_id = None;
                state.content_edit_mode = None;
            }
        }
        Action::ContentEditExit => state.content_edit_mode = None,
        _ => {}
    }
    Ok(())
}

/// Unknown ids are dropped, duplicates collapse to their first occurrence
fn select(state: &mut EditorState, ids: &[NodeId], mode: SelectMode) {
    let known: Vec<NodeId> = ids
        .iter()
        .filter(|id| state.document.nodes.contains_key(*id))
        .cloned()
        .collect();
    match mode {
        SelectMode::Reset => {
            state.selection.clear();
            for id in known {
                if !state.selection.contains(&id) {
                    state.selection.push(id);
                }
            }
        }
        SelectMode::Add => {
            for id in known {
                if !state.selection.contains(&id) {
                    state.selection.push(id);
                }
            }
        }
        SelectMode::Toggle => {
            for id in known {
                match state.selection.iter().position(|s| s == &id) {
                    Some(pos) => {
                        state.selection.remove(pos);
                    }
                    None => state.selection.push(id),
                }
            }
        }
    }
}
