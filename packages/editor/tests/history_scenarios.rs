//! History behavior through the store, end to end

use canvas_editor::{
    EditorStore, History, ManualClock, ReducerContext, SequentialIds,
};
use canvas_schema::{
    Action, Document, EditorState, HistoryProjection, InsertKind, InsertNode, NodeChange, Node,
    ParentRef, Rect, Target,
};
use std::sync::Arc;

fn store() -> (EditorStore, Arc<ManualClock>) {
    let mut doc = Document::with_scene("main", "Main");
    doc.attach(Node::rectangle("base"), &ParentRef::Scene("main".into()), None)
        .unwrap();
    let clock = Arc::new(ManualClock::new(10_000));
    let store = EditorStore::with_parts(
        EditorState::new(doc).unwrap(),
        History::new(clock.clone()),
        ReducerContext::default().with_ids(Arc::new(SequentialIds::new("n"))),
    );
    (store, clock)
}

fn insert(kind: InsertKind) -> Action {
    Action::Insert(InsertNode::new(kind).at(Rect::new(0.0, 0.0, 10.0, 10.0)))
}

#[test]
fn test_quick_burst_undoes_as_one_step() {
    let (mut store, clock) = store();

    store.dispatch(insert(InsertKind::Rectangle)).unwrap();
    clock.advance(20);
    store.dispatch(insert(InsertKind::Ellipse)).unwrap();
    clock.advance(20);
    store.dispatch(Action::select(["n1", "n2"])).unwrap();

    assert_eq!(store.history().undo_levels(), 1);
    assert_eq!(store.state().selection, vec!["n1".to_string(), "n2".to_string()]);

    store.dispatch(Action::Undo).unwrap();
    let state = store.state();
    assert!(state.selection.is_empty());
    assert!(state.document.node("n1").is_none());
    assert!(state.document.node("n2").is_none());
    assert!(state.document.node("base").is_some());
}

#[test]
fn test_undo_restores_projection_for_mixed_sequences() {
    let sequences: Vec<Vec<Action>> = vec![
        vec![insert(InsertKind::Container)],
        vec![Action::change("base", NodeChange::Name("Renamed".into()))],
        vec![
            Action::select(["base"]),
            Action::Nudge {
                target: Target::Selection,
                axis: canvas_schema::Axis::X,
                delta: 12.0,
            },
        ],
        vec![
            Action::Duplicate {
                target: Target::nodes(["base"]),
            },
            Action::Delete {
                target: Target::nodes(["base"]),
            },
        ],
        vec![Action::SceneNew {
            name: Some("Second".into()),
        }],
    ];

    for actions in sequences {
        let (mut store, _clock) = store();
        let before = HistoryProjection::of(&store.state());
        store.dispatch_all(actions.clone()).unwrap();
        assert_ne!(HistoryProjection::of(&store.state()), before, "{actions:?}");

        store.dispatch(Action::Undo).unwrap();
        assert_eq!(HistoryProjection::of(&store.state()), before, "{actions:?}");
    }
}

#[test]
fn test_separate_edits_undo_one_at_a_time() {
    let (mut store, clock) = store();

    store
        .dispatch(Action::change("base", NodeChange::Width(50.0)))
        .unwrap();
    clock.advance(1_000);
    store
        .dispatch(Action::change("base", NodeChange::Height(70.0)))
        .unwrap();
    assert_eq!(store.history().undo_levels(), 2);

    store.dispatch(Action::Undo).unwrap();
    let node = store.state().document.nodes["base"].clone();
    assert_eq!((node.width, node.height), (50.0, 100.0));

    store.dispatch(Action::Redo).unwrap();
    assert_eq!(store.state().document.nodes["base"].height, 70.0);
    assert!(!store.history().can_redo());
}

#[test]
fn test_camera_and_hover_are_not_history() {
    let (mut store, _clock) = store();
    store
        .dispatch(Action::CameraPan { delta: [30.0, 0.0] })
        .unwrap();
    store
        .dispatch(Action::Hover {
            node_id: Some("base".into()),
        })
        .unwrap();

    assert_eq!(store.history().undo_levels(), 0);
    assert_eq!(store.transaction_id(), 2);
}

#[test]
fn test_reset_forgets_everything() {
    let (mut store, clock) = store();
    store.dispatch(insert(InsertKind::Text)).unwrap();
    clock.advance(1_000);
    store.dispatch(insert(InsertKind::Text)).unwrap();
    store.dispatch(Action::Undo).unwrap();
    assert!(store.history().can_redo());

    let fresh = EditorState::new(Document::with_scene("other", "Other")).unwrap();
    store.reset(fresh, Some("doc-2".into()), false).unwrap();

    assert_eq!(store.transaction_id(), 0);
    assert!(!store.history().can_undo());
    assert!(!store.history().can_redo());
    assert_eq!(store.state().document_key.as_deref(), Some("doc-2"));
}
