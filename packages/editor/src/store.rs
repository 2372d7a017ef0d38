//! # State Store
//!
//! Owns the [`EditorState`] and is the only place it changes.
//!
//! - `dispatch*` runs actions through the reducers (or the history for
//!   `undo`/`redo`), records every patch pair, bumps the transaction
//!   counter once per batch and notifies listeners once
//! - a batch is atomic: any failing action leaves state and history as they were
//! - `apply` is a silent, unrecorded change (used for remote imports)
//! - `reset` swaps in a whole new state and forgets history

use crate::clock::{Clock, SystemClock};
use crate::config::EditorConfig;
use crate::context::{default_ids, ReducerContext};
use crate::history::History;
use crate::reducers::reduce;
use crate::EditorError;
use canvas_schema::{diff, Action, EditorState, Patch};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum StoreEvent {
    Dispatched {
        state: Arc<EditorState>,
        actions: Vec<&'static str>,
        patches: Vec<Patch>,
    },
    Applied {
        state: Arc<EditorState>,
        patches: Vec<Patch>,
    },
    Reset {
        state: Arc<EditorState>,
    },
}

impl StoreEvent {
    pub fn state(&self) -> &Arc<EditorState> {
        match self {
            StoreEvent::Dispatched { state, .. }
            | StoreEvent::Applied { state, .. }
            | StoreEvent::Reset { state } => state,
        }
    }

    /// Whether the event changed anything under `document`
    pub fn touches_document(&self) -> bool {
        match self {
            StoreEvent::Dispatched { patches, .. } | StoreEvent::Applied { patches, .. } => {
                patches.iter().any(|p| p.root_key() == Some("document"))
            }
            StoreEvent::Reset { .. } => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Called synchronously after each change. Must not call back into the store.
pub type Listener = Box<dyn Fn(&StoreEvent) + Send + Sync>;

/// The store as shared between the facade, the replica bridge and drivers
pub type SharedStore = Arc<RwLock<EditorStore>>;

pub struct EditorStore {
    state: Arc<EditorState>,
    history: History,
    ctx: ReducerContext,
    locked: bool,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_listener: u64,
}

impl EditorStore {
    pub fn new(state: EditorState, config: &EditorConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_parts(
            state,
            History::from_config(config, clock),
            ReducerContext::from_config(config, default_ids()),
        )
    }

    pub fn with_parts(state: EditorState, history: History, ctx: ReducerContext) -> Self {
        Self {
            state: Arc::new(state),
            history,
            ctx,
            locked: false,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn state(&self) -> Arc<EditorState> {
        Arc::clone(&self.state)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn context(&self) -> &ReducerContext {
        &self.ctx
    }

    pub fn transaction_id(&self) -> u64 {
        self.state.transaction_id
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn dispatch(&mut self, action: Action) -> Result<(), EditorError> {
        self.dispatch_all(vec![action])
    }

    /// No-op while the store is locked
    pub fn dispatch_all(&mut self, actions: Vec<Action>) -> Result<(), EditorError> {
        if self.locked {
            debug!("[Store] locked, dropping {} action(s)", actions.len());
            return Ok(());
        }
        self.run(actions)
    }

    /// Dispatch even while locked (programmatic replay)
    pub fn dispatch_forced(&mut self, actions: Vec<Action>) -> Result<(), EditorError> {
        self.run(actions)
    }

    fn run(&mut self, actions: Vec<Action>) -> Result<(), EditorError> {
        if actions.is_empty() {
            return Ok(());
        }

        let backup = actions
            .iter()
            .any(Action::is_history_navigation)
            .then(|| self.history.clone());
        let mut state = Arc::clone(&self.state);
        let mut pending: Vec<(&'static str, Vec<Patch>, Vec<Patch>)> = Vec::new();
        let mut patches = Vec::new();

        for action in &actions {
            let step = if action.is_history_navigation() {
                for (kind, forward, inverse) in pending.drain(..) {
                    self.history.record(kind, forward, inverse);
                }
                let replayed = match action {
                    Action::Undo => self.history.undo(&state),
                    _ => self.history.redo(&state),
                };
                replayed.map_err(EditorError::from).map(|(next, replayed)| {
                    patches.extend(replayed);
                    next
                })
            } else {
                reduce(&state, action, &self.ctx)
                    .map_err(EditorError::from)
                    .map(|transition| {
                        patches.extend(transition.patches.iter().cloned());
                        pending.push((
                            action.kind(),
                            transition.patches,
                            transition.inverse_patches,
                        ));
                        Arc::new(transition.state)
                    })
            };

            match step {
                Ok(next) => state = next,
                Err(err) => {
                    if let Some(history) = backup {
                        self.history = history;
                    }
                    warn!("[Store] '{}' failed, batch discarded: {}", action.kind(), err);
                    return Err(err);
                }
            }
        }

        for (kind, forward, inverse) in pending {
            self.history.record(kind, forward, inverse);
        }
        Arc::make_mut(&mut state).transaction_id += 1;
        self.state = state;

        let event = StoreEvent::Dispatched {
            state: Arc::clone(&self.state),
            actions: actions.iter().map(Action::kind).collect(),
            patches,
        };
        self.emit(&event);
        Ok(())
    }

    /// Change state without recording history or advancing the transaction counter
    pub fn apply<F>(&mut self, mutator: F) -> Result<Vec<Patch>, EditorError>
    where
        F: FnOnce(&mut EditorState),
    {
        let mut draft = EditorState::clone(&self.state);
        mutator(&mut draft);
        draft.validate()?;

        let (patches, _) = diff(&self.state.to_value()?, &draft.to_value()?);
        if patches.is_empty() {
            return Ok(patches);
        }
        self.state = Arc::new(draft);

        let event = StoreEvent::Applied {
            state: Arc::clone(&self.state),
            patches: patches.clone(),
        };
        self.emit(&event);
        Ok(patches)
    }

    /// Replace the whole state, keeping the camera. Clears history and the
    /// transaction counter. Ignored while locked unless `force` is set.
    pub fn reset(
        &mut self,
        mut state: EditorState,
        document_key: Option<String>,
        force: bool,
    ) -> Result<(), EditorError> {
        if self.locked && !force {
            debug!("[Store] locked, reset ignored");
            return Ok(());
        }
        state.transform = self.state.transform;
        if document_key.is_some() {
            state.document_key = document_key;
        }
        state.transaction_id = 0;
        state.rebuild_context();
        state.validate()?;

        self.history.clear();
        self.state = Arc::new(state);

        let event = StoreEvent::Reset {
            state: Arc::clone(&self.state),
        };
        self.emit(&event);
        Ok(())
    }

    fn emit(&self, event: &StoreEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EditorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorStore")
            .field("transaction_id", &self.state.transaction_id)
            .field("locked", &self.locked)
            .field("undo_levels", &self.history.undo_levels())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
