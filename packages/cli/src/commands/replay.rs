use super::read_snapshot;
use anyhow::{Context, Result};
use canvas_editor::{
    Clock, EditorConfig, EditorStore, History, ManualClock, ReducerContext, SequentialIds,
    StoreEvent,
};
use canvas_schema::{Action, DocumentSnapshot, EditorState, Patch};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Snapshot to start from
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// JSON array of actions
    #[arg(short, long)]
    pub actions: PathBuf,

    /// Undo this many steps after replaying
    #[arg(long, default_value_t = 0)]
    pub undo: usize,

    /// Simulated time between actions; below the merge window, actions coalesce
    #[arg(long, default_value_t = 1_000)]
    pub step_ms: i64,

    /// Write the resulting snapshot here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print emitted patches instead of the snapshot
    #[arg(long)]
    pub patches: bool,
}

#[derive(Debug)]
pub struct ReplayOutcome {
    pub state: Arc<EditorState>,
    pub patches: Vec<Patch>,
    pub undone: usize,
    pub undo_levels: usize,
}

/// Run `actions` through a locked store, one forced dispatch per action.
/// New nodes get `node-N` ids, skipping any the snapshot already holds, so
/// the same inputs always replay to the same output.
pub fn replay_actions(
    snapshot: DocumentSnapshot,
    actions: Vec<Action>,
    undo: usize,
    step_ms: i64,
    config: &EditorConfig,
) -> Result<ReplayOutcome> {
    let clock = Arc::new(ManualClock::new(0));
    let history_clock: Arc<dyn Clock> = clock.clone();
    let mut store = EditorStore::with_parts(
        EditorState::new(snapshot.document)?,
        History::from_config(config, history_clock),
        ReducerContext::from_config(config, Arc::new(SequentialIds::new("node-"))),
    );

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    store.subscribe(Box::new(move |event| {
        if let StoreEvent::Dispatched { patches, .. } = event {
            if let Ok(mut sink) = sink.lock() {
                sink.extend(patches.iter().cloned());
            }
        }
    }));
    store.lock();

    for (index, action) in actions.into_iter().enumerate() {
        let kind = action.kind();
        store
            .dispatch_forced(vec![action])
            .with_context(|| format!("action #{index} ({kind}) failed"))?;
        clock.advance(step_ms);
    }

    let mut undone = 0;
    while undone < undo && store.history().can_undo() {
        store.dispatch_forced(vec![Action::Undo])?;
        undone += 1;
    }

    let patches = emitted.lock().map(|p| p.clone()).unwrap_or_default();
    Ok(ReplayOutcome {
        state: store.state(),
        patches,
        undone,
        undo_levels: store.history().undo_levels(),
    })
}

pub fn replay(args: ReplayArgs, config: &EditorConfig) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let source = fs::read_to_string(&args.actions)
        .with_context(|| format!("reading {}", args.actions.display()))?;
    let actions: Vec<Action> = serde_json::from_str(&source)
        .with_context(|| format!("parsing {}", args.actions.display()))?;
    let count = actions.len();

    let outcome = replay_actions(snapshot, actions, args.undo, args.step_ms, config)?;
    info!(
        "[Replay] {} action(s), transaction {}",
        count, outcome.state.transaction_id
    );

    let output = if args.patches {
        serde_json::to_string_pretty(&canvas_schema::patch::to_json_patches(&outcome.patches))?
    } else {
        DocumentSnapshot::new(outcome.state.document.clone()).to_json()?
    };

    match &args.out {
        Some(path) => {
            fs::write(path, output).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("  {} wrote {}", "✓".green(), path.display());
        }
        None => println!("{}", output),
    }

    eprintln!(
        "{} replayed {} action(s), undid {}, {} undo level(s) left",
        "✨".bright_blue(),
        count,
        outcome.undone,
        outcome.undo_levels
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_schema::{Document, InsertKind, InsertNode, Node, NodeChange, ParentRef, Target};

    fn snapshot() -> DocumentSnapshot {
        let mut doc = Document::with_scene("main", "Main");
        doc.attach(Node::rectangle("a"), &ParentRef::Scene("main".into()), None)
            .unwrap();
        DocumentSnapshot::new(doc)
    }

    #[test]
    fn test_replay_with_spaced_steps() {
        let actions = vec![
            Action::Insert(InsertNode::new(InsertKind::Text)),
            Action::change("a", NodeChange::Width(12.0)),
        ];
        let outcome =
            replay_actions(snapshot(), actions, 1, 1_000, &EditorConfig::default()).unwrap();

        assert_eq!(outcome.undone, 1);
        assert_eq!(outcome.undo_levels, 1);
        assert!(outcome.state.document.nodes.contains_key("node-1"));
        assert_eq!(outcome.state.document.nodes["a"].width, 100.0);
        assert!(!outcome.patches.is_empty());
    }

    #[test]
    fn test_replay_on_snapshot_with_generated_ids() {
        let mut doc = Document::with_scene("main", "Main");
        doc.attach(Node::rectangle("node-1"), &ParentRef::Scene("main".into()), None)
            .unwrap();
        let actions = vec![
            Action::Insert(InsertNode::new(InsertKind::Rectangle)),
            Action::Duplicate {
                target: Target::nodes(["node-1"]),
            },
        ];
        let outcome = replay_actions(
            DocumentSnapshot::new(doc),
            actions,
            0,
            1_000,
            &EditorConfig::default(),
        )
        .unwrap();

        let nodes = &outcome.state.document.nodes;
        assert_eq!(nodes.len(), 3);
        assert!(nodes.contains_key("node-2"));
        assert!(nodes.contains_key("node-3"));
    }

    #[test]
    fn test_replay_with_close_steps_coalesces() {
        let actions = vec![
            Action::change("a", NodeChange::Width(12.0)),
            Action::change("a", NodeChange::Height(12.0)),
        ];
        let outcome =
            replay_actions(snapshot(), actions, 5, 10, &EditorConfig::default()).unwrap();

        assert_eq!(outcome.undone, 1);
        assert_eq!(outcome.state.document.nodes["a"].height, 100.0);
    }

    #[test]
    fn test_replay_reports_failing_action() {
        let actions = vec![Action::change("missing", NodeChange::Width(1.0))];
        let err = replay_actions(snapshot(), actions, 0, 1_000, &EditorConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("action #0"));
    }
}
