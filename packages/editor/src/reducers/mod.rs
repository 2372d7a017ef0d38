//! # Reducers
//!
//! Pure `(state, action, context) -> state` transitions. Each call works on
//! a draft copy, validates it and derives the patch pair by diffing the JSON
//! forms, so every transition is fully described by its patches.

mod document;
mod surface;

use crate::context::ReducerContext;
use canvas_schema::{diff, Action, EditorState, Patch, SchemaError};

#[derive(Debug, Clone)]
pub struct Transition {
    pub state: EditorState,
    pub patches: Vec<Patch>,
    pub inverse_patches: Vec<Patch>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.patches.is_empty()
    }
}

pub fn reduce(
    state: &EditorState,
    action: &Action,
    ctx: &ReducerContext,
) -> Result<Transition, SchemaError> {
    let mut draft = state.clone();

    if document::handles(action) {
        if state.editable {
            document::reduce(&mut draft, action, ctx)?;
        }
    } else if action.is_history_navigation() {
        return Err(SchemaError::invariant(format!(
            "'{}' is served by the history, not the reducer",
            action.kind()
        )));
    } else {
        surface::reduce(&mut draft, action, ctx)?;
    }

    draft.validate()?;
    let (patches, inverse_patches) = diff(&state.to_value()?, &draft.to_value()?);
    Ok(Transition {
        state: draft,
        patches,
        inverse_patches,
    })
}
