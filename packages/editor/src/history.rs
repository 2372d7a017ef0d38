//! # Undo/Redo History
//!
//! Records the patch pair of every dispatched action and replays it over
//! the history-tracked projection of the state.
//!
//! ## Design
//!
//! - Patches outside [`HISTORY_KEYS`] (camera, hover, gesture) are dropped
//!   before recording; an action that only touched those records nothing
//! - A record landing within the merge window of the previous entry is
//!   folded into it, so a drag collapses into one undo step
//! - Recording clears the redo stack
//! - The past stack is bounded; the oldest entry is evicted on overflow
//! - Undo/redo return the *same* `Arc` when there is nothing to do
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = History::new(Arc::new(SystemClock));
//! history.record("node/change", patches, inverse_patches);
//!
//! let (state, _) = history.undo(&state)?;
//! let (state, _) = history.redo(&state)?;
//! ```

use crate::clock::Clock;
use crate::config::EditorConfig;
use crate::errors::HistoryError;
use canvas_schema::{apply_patches, EditorState, HistoryProjection, Patch, HISTORY_KEYS};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_MERGE_WINDOW_MS: i64 = 300;

/// One undo step
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub action_type: String,
    /// Milliseconds since epoch of the newest record folded into this entry
    pub timestamp: i64,
    /// In application order
    pub patches: Vec<Patch>,
    /// In undo order
    pub inverse_patches: Vec<Patch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub past: Vec<HistoryEntry>,
    pub future: Vec<HistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct History {
    /// Most recent last
    past: VecDeque<HistoryEntry>,

    /// Most recently undone last
    future: Vec<HistoryEntry>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    merge_window_ms: i64,

    clock: Arc<dyn Clock>,
}

impl History {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(clock, DEFAULT_CAPACITY, DEFAULT_MERGE_WINDOW_MS)
    }

    pub fn with_limits(clock: Arc<dyn Clock>, max_levels: usize, merge_window_ms: i64) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            max_levels,
            merge_window_ms,
            clock,
        }
    }

    pub fn from_config(config: &EditorConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(
            clock,
            config.history_capacity,
            config.history_merge_window_ms,
        )
    }

    /// Record at the clock's current time. Returns whether anything was kept.
    pub fn record(
        &mut self,
        action_type: &str,
        patches: Vec<Patch>,
        inverse_patches: Vec<Patch>,
    ) -> bool {
        let now = self.clock.now_ms();
        self.record_at(action_type, patches, inverse_patches, now)
    }

    pub fn record_at(
        &mut self,
        action_type: &str,
        patches: Vec<Patch>,
        inverse_patches: Vec<Patch>,
        timestamp: i64,
    ) -> bool {
        let patches = history_relevant(patches);
        if patches.is_empty() {
            trace!("[History] '{}' touched no tracked fields", action_type);
            return false;
        }
        let inverse_patches = history_relevant(inverse_patches);

        self.future.clear();

        if let Some(last) = self.past.back_mut() {
            if timestamp - last.timestamp < self.merge_window_ms {
                last.patches.extend(patches);
                let mut inverse = inverse_patches;
                inverse.append(&mut last.inverse_patches);
                last.inverse_patches = inverse;
                last.timestamp = timestamp;
                trace!("[History] merged '{}' into '{}'", action_type, last.action_type);
                return true;
            }
        }

        self.past.push_back(HistoryEntry {
            action_type: action_type.to_string(),
            timestamp,
            patches,
            inverse_patches,
        });
        if self.max_levels > 0 && self.past.len() > self.max_levels {
            self.past.pop_front();
        }
        true
    }

    /// Revert the last entry. Returns the same `Arc` when there is nothing to undo.
    pub fn undo(
        &mut self,
        state: &Arc<EditorState>,
    ) -> Result<(Arc<EditorState>, Vec<Patch>), HistoryError> {
        let Some(entry) = self.past.back() else {
            return Ok((Arc::clone(state), Vec::new()));
        };
        let next = replay(state, &entry.action_type, &entry.inverse_patches)?;
        let patches = entry.inverse_patches.clone();

        if let Some(mut entry) = self.past.pop_back() {
            debug!("[History] undo '{}'", entry.action_type);
            entry.timestamp = self.clock.now_ms();
            self.future.push(entry);
        }
        Ok((Arc::new(next), patches))
    }

    /// Reapply the last undone entry. Returns the same `Arc` when there is nothing to redo.
    pub fn redo(
        &mut self,
        state: &Arc<EditorState>,
    ) -> Result<(Arc<EditorState>, Vec<Patch>), HistoryError> {
        let Some(entry) = self.future.last() else {
            return Ok((Arc::clone(state), Vec::new()));
        };
        let next = replay(state, &entry.action_type, &entry.patches)?;
        let patches = entry.patches.clone();

        if let Some(mut entry) = self.future.pop() {
            debug!("[History] redo '{}'", entry.action_type);
            entry.timestamp = self.clock.now_ms();
            self.past.push_back(entry);
        }
        Ok((Arc::new(next), patches))
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.past.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.future.len()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            past: self.past.iter().cloned().collect(),
            future: self.future.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}

fn history_relevant(patches: Vec<Patch>) -> Vec<Patch> {
    patches
        .into_iter()
        .filter(|p| p.root_key().is_some_and(|key| HISTORY_KEYS.contains(&key)))
        .collect()
}

/// Apply `patches` to the tracked projection of `state` and write it back
fn replay(
    state: &EditorState,
    action_type: &str,
    patches: &[Patch],
) -> Result<EditorState, HistoryError> {
    let fail = |source| HistoryError::Replay {
        action: action_type.to_string(),
        source,
    };

    let mut projection = serde_json::to_value(HistoryProjection::of(state))
        .map_err(|e| fail(e.into()))?;
    apply_patches(&mut projection, patches).map_err(fail)?;
    let projection: HistoryProjection =
        serde_json::from_value(projection).map_err(|e| fail(e.into()))?;

    let mut next = state.clone();
    projection.write_into(&mut next);
    next.hovered_node_id = None;
    next.rebuild_context();
    next.validate().map_err(fail)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use canvas_schema::{diff, Document, Node, ParentRef, PathSegment};
    use serde_json::json;

    fn history() -> History {
        History::new(Arc::new(ManualClock::new(0)))
    }

    fn state() -> Arc<EditorState> {
        let mut doc = Document::with_scene("main", "Main");
        doc.attach(Node::rectangle("a"), &ParentRef::Scene("main".into()), None)
            .unwrap();
        doc.attach(Node::rectangle("b"), &ParentRef::Scene("main".into()), None)
            .unwrap();
        Arc::new(EditorState::new(doc).unwrap())
    }

    fn transition(before: &EditorState, edit: impl FnOnce(&mut EditorState)) -> (EditorState, Vec<Patch>, Vec<Patch>) {
        let mut after = before.clone();
        edit(&mut after);
        let (patches, inverse) = diff(&before.to_value().unwrap(), &after.to_value().unwrap());
        (after, patches, inverse)
    }

    fn name_patch(value: &str) -> Patch {
        Patch::replace(
            vec![
                PathSegment::key("document"),
                PathSegment::key("nodes"),
                PathSegment::key("a"),
                PathSegment::key("name"),
            ],
            json!(value),
        )
    }

    #[test]
    fn test_volatile_patches_are_not_recorded() {
        let mut h = history();
        let camera = Patch::replace(vec![PathSegment::key("transform")], json!([[1, 0, 5], [0, 1, 5]]));
        let hover = Patch::replace(vec![PathSegment::key("hovered_node_id")], json!("a"));
        assert!(!h.record_at("camera/pan", vec![camera.clone(), hover.clone()], vec![camera, hover], 0));
        assert!(!h.can_undo());
    }

    #[test]
    fn test_records_within_window_merge() {
        let mut h = history();
        h.record_at("node/change", vec![name_patch("one")], vec![name_patch("a")], 0);
        h.record_at("node/change", vec![name_patch("two")], vec![name_patch("one")], 100);

        assert_eq!(h.undo_levels(), 1);
        let entry = &h.snapshot().past[0];
        assert_eq!(entry.patches, vec![name_patch("one"), name_patch("two")]);
        assert_eq!(entry.inverse_patches, vec![name_patch("one"), name_patch("a")]);
        assert_eq!(entry.timestamp, 100);
    }

    #[test]
    fn test_window_slides_with_newest_record() {
        let mut h = history();
        for (i, t) in [0, 250, 500, 750].into_iter().enumerate() {
            h.record_at("drag", vec![name_patch(&i.to_string())], vec![], t);
        }
        assert_eq!(h.undo_levels(), 1);

        h.record_at("drag", vec![name_patch("late")], vec![], 1_050);
        assert_eq!(h.undo_levels(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut h = History::with_limits(Arc::new(ManualClock::new(0)), 3, 300);
        for i in 0..5 {
            h.record_at(&format!("step-{i}"), vec![name_patch("x")], vec![name_patch("y")], i * 1_000);
        }
        let past = h.snapshot().past;
        assert_eq!(past.len(), 3);
        assert_eq!(past[0].action_type, "step-2");
        assert_eq!(past[2].action_type, "step-4");
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let mut h = History::with_limits(Arc::new(ManualClock::new(0)), 0, 300);
        for i in 0..250 {
            h.record_at("step", vec![name_patch("x")], vec![name_patch("y")], i * 1_000);
        }
        assert_eq!(h.undo_levels(), 250);
    }

    #[test]
    fn test_record_clears_future() {
        let base = state();
        let mut h = history();
        let (_, p, i) = transition(&base, |s| s.selection = vec!["a".into()]);
        h.record_at("select", p, i, 0);
        let (after_undo, _) = h.undo(&base).unwrap();
        assert!(h.can_redo());

        let (_, p, i) = transition(&after_undo, |s| s.selection = vec!["b".into()]);
        h.record_at("select", p, i, 5_000);
        assert!(!h.can_redo());
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let base = state();
        let mut h = history();
        let (after, p, i) = transition(&base, |s| {
            s.selection = vec!["a".into()];
            s.document.node_mut("a").unwrap().left = 42.0;
        });
        h.record_at("nudge", p, i, 0);

        let mut current = after.clone();
        current.hovered_node_id = Some("b".into());
        current.transform = current.transform.translated(9.0, 9.0);
        let current = Arc::new(current);

        let (undone, _) = h.undo(&current).unwrap();
        assert_eq!(undone.selection, base.selection);
        assert_eq!(undone.document, base.document);
        assert_eq!(undone.hovered_node_id, None);
        assert_eq!(undone.transform, current.transform);

        let (redone, _) = h.redo(&undone).unwrap();
        assert_eq!(redone.document, after.document);
        assert_eq!(redone.selection, after.selection);
    }

    #[test]
    fn test_empty_stacks_return_same_state() {
        let base = state();
        let mut h = history();
        let (same, patches) = h.undo(&base).unwrap();
        assert!(Arc::ptr_eq(&same, &base));
        assert!(patches.is_empty());
        let (same, _) = h.redo(&base).unwrap();
        assert!(Arc::ptr_eq(&same, &base));
    }

    #[test]
    fn test_failed_replay_keeps_entry() {
        let base = state();
        let mut h = history();
        let bogus = Patch::remove(vec![
            PathSegment::key("document"),
            PathSegment::key("nodes"),
            PathSegment::key("ghost"),
        ]);
        h.record_at("delete", vec![name_patch("x")], vec![bogus], 0);
        assert!(h.undo(&base).is_err());
        assert_eq!(h.undo_levels(), 1);
    }
}
