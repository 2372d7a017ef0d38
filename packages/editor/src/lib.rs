//! # Canvas Editor
//!
//! State management core for a collaborative canvas editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ schema: EditorState, Document, Action, Patch│
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: state lifecycle                     │
//! │  - Store: dispatch → reducers → patches     │
//! │  - History: patch pairs, undo/redo          │
//! │  - Replica sync (optional, Yjs-backed)      │
//! │  - Presence: ephemeral cursors              │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ fonts: family records → style resolution    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **One writer**: only the store replaces state, and only whole batches
//! 2. **Patches, not snapshots**: history keeps forward/inverse patches and
//!    replays them against the document projection
//! 3. **Echo suppression**: replica writes are origin-tagged and guarded by a
//!    reentrancy mutex
//! 4. **Presence is disposable**: last writer wins, nothing persists
//!
//! ## Usage
//!
//! ```rust,ignore
//! use canvas_editor::{EditorConfig, EditorStore};
//! use canvas_schema::{Action, Document, EditorState};
//!
//! let state = EditorState::new(Document::with_scene("main", "Main"))?;
//! let mut store = EditorStore::new(state, &EditorConfig::default());
//!
//! store.dispatch(Action::Insert(InsertNode::new(InsertKind::Rectangle)))?;
//! store.dispatch(Action::Undo)?;
//! ```

mod clock;
mod config;
mod context;
mod editor;
mod errors;
mod history;
mod mutex;
mod presence;
mod providers;
mod reducers;
mod store;
mod throttle;

#[cfg(feature = "collaboration")]
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Backend, EditorConfig, Viewport, DEFAULT_CONFIG_NAME};
pub use context::{
    default_ids, DocumentGeometry, GeometryQuery, IdGenerator, ReducerContext, SequentialIds,
};
pub use editor::Editor;
pub use errors::{EditorError, HistoryError};
pub use history::{History, HistoryEntry, HistorySnapshot, DEFAULT_CAPACITY, DEFAULT_MERGE_WINDOW_MS};
pub use mutex::ReentrancyMutex;
pub use presence::{
    CursorChat, FocusSlice, GeometrySlice, PresenceChannel, PresenceProfile, PresenceRecord,
    PresenceTransport,
};
pub use providers::{
    BoxOutlineProvider, ExportFormat, Exporter, VectorNetwork, VectorProvider, VectorSegment,
};
pub use reducers::{reduce, Transition};
pub use store::{EditorStore, Listener, SharedStore, StoreEvent, SubscriptionId};
pub use throttle::Throttle;

#[cfg(feature = "collaboration")]
pub use context::UuidIds;

#[cfg(feature = "collaboration")]
pub use sync::{Replica, ReplicaError, ReplicaSyncBridge};
