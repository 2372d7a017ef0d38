//! # Reducer context
//!
//! Everything a reducer may consult besides the state it is given:
//! geometry queries, id generation, viewport size and backend flavor.

use crate::config::{Backend, EditorConfig};
use canvas_schema::{EditorState, NodeId, ParentRef, Rect, Vector2};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> NodeId;
}

/// `"{prefix}{n}"` with a process-local counter
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> NodeId {
        format!("{}{}", self.prefix, self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(feature = "collaboration")]
#[derive(Debug, Default)]
pub struct UuidIds;

#[cfg(feature = "collaboration")]
impl IdGenerator for UuidIds {
    fn next_id(&self) -> NodeId {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Random ids with the `collaboration` feature so peers never mint the same
/// id, otherwise a `node-` counter.
pub fn default_ids() -> Arc<dyn IdGenerator> {
    #[cfg(feature = "collaboration")]
    {
        Arc::new(UuidIds)
    }
    #[cfg(not(feature = "collaboration"))]
    {
        Arc::new(SequentialIds::new("node-"))
    }
}

/// Spatial queries answered by the rendering backend
pub trait GeometryQuery: Send + Sync + Debug {
    /// Nodes under `point` (canvas space), topmost first
    fn node_ids_at_point(&self, state: &EditorState, point: Vector2) -> Vec<NodeId>;

    /// Top-level nodes of the current scene intersecting `envelope`
    fn node_ids_in_envelope(&self, state: &EditorState, envelope: &Rect) -> Vec<NodeId>;

    /// Absolute bounds of a node
    fn bounding_rect(&self, state: &EditorState, node_id: &str) -> Option<Rect>;
}

/// Geometry computed from node boxes. Rotation is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentGeometry;

impl DocumentGeometry {
    fn hit(&self, state: &EditorState, id: &str, point: Vector2, out: &mut Vec<NodeId>) {
        let Some(node) = state.document.node(id) else {
            return;
        };
        if !node.active {
            return;
        }
        for child in node.children.iter().rev() {
            self.hit(state, child, point, out);
        }
        if self
            .bounding_rect(state, id)
            .is_some_and(|rect| rect.contains_point(point))
        {
            out.push(id.to_string());
        }
    }
}

impl GeometryQuery for DocumentGeometry {
    fn node_ids_at_point(&self, state: &EditorState, point: Vector2) -> Vec<NodeId> {
        let mut out = Vec::new();
        for id in state.scene_children().iter().rev() {
            self.hit(state, id, point, &mut out);
        }
        out
    }

    fn node_ids_in_envelope(&self, state: &EditorState, envelope: &Rect) -> Vec<NodeId> {
        state
            .scene_children()
            .iter()
            .filter(|id| state.document.node(id).is_some_and(|n| n.active))
            .filter(|id| {
                self.bounding_rect(state, id)
                    .is_some_and(|rect| rect.intersects(envelope))
            })
            .cloned()
            .collect()
    }

    fn bounding_rect(&self, state: &EditorState, node_id: &str) -> Option<Rect> {
        let node = state.document.node(node_id)?;
        let mut rect = node.bounds();
        let mut current = node_id;
        while let Some(ParentRef::Node(parent_id)) = state.document_ctx.parent(current) {
            let parent = state.document.node(parent_id)?;
            rect.x += parent.left;
            rect.y += parent.top;
            current = parent_id;
        }
        Some(rect)
    }
}

#[derive(Debug, Clone)]
pub struct ReducerContext {
    pub geometry: Arc<dyn GeometryQuery>,
    pub ids: Arc<dyn IdGenerator>,
    pub viewport: Vector2,
    pub backend: Backend,
}

impl ReducerContext {
    pub fn new(geometry: Arc<dyn GeometryQuery>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            geometry,
            ids,
            viewport: [1000.0, 1000.0],
            backend: Backend::Dom,
        }
    }

    pub fn from_config(config: &EditorConfig, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            geometry: Arc::new(DocumentGeometry),
            ids,
            viewport: [config.viewport.width, config.viewport.height],
            backend: config.backend,
        }
    }

    pub fn with_geometry(mut self, geometry: Arc<dyn GeometryQuery>) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl Default for ReducerContext {
    fn default() -> Self {
        Self::new(Arc::new(DocumentGeometry), default_ids())
    }
}
