//! # Canvas Schema
//!
//! Data model shared by the editing core: the document tree, the editor
//! state that wraps it, the action vocabulary and the patch format.
//!
//! ```text
//! Action ──reduce──▶ EditorState ──diff──▶ (patches, inverse patches)
//! ```
//!
//! Patches follow the immer shape (`op`, `path`, `value`) and convert to
//! JSON-pointer form for transport, see [`patch`].

pub mod action;
pub mod document;
pub mod error;
pub mod patch;
pub mod snapshot;
pub mod state;

pub use action::{
    Action, Axis, InsertNode, NodeChange, OrderDirection, SelectMode, Target, TextStyleChange,
};
pub use document::{
    Document, DocumentContext, GradientStop, Node, NodeId, NodeKind, Paint, ParentRef, Rect, Rgba,
    Scene, SceneId, TextStyle,
};
pub use error::SchemaError;
pub use patch::{apply_patches, diff, JsonPatch, Patch, PatchOp, PathSegment};
pub use snapshot::{DocumentSnapshot, SNAPSHOT_VERSION};
pub use state::{
    ContentEditMode, EditorState, Gesture, HistoryProjection, InsertKind, Marquee, Tool, Transform,
    Vector2, HISTORY_KEYS,
};

pub type Result<T, E = SchemaError> = std::result::Result<T, E>;
