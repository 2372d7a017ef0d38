//! # Editor facade
//!
//! Bundles the shared store with the font engine and the host's optional
//! capability providers. Store locks are never held across an `.await`.

use crate::presence::{PresenceChannel, PresenceRecord, PresenceTransport};
use crate::providers::{ExportFormat, Exporter, VectorNetwork, VectorProvider};
use crate::store::{EditorStore, SharedStore};
use crate::EditorError;
use canvas_fonts::{FontRegistry, FontStyleKey, FontStyleRequest};
use canvas_schema::{
    Action, DocumentSnapshot, EditorState, NodeChange, NodeKind, TextStyleChange,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

pub struct Editor {
    store: SharedStore,
    fonts: Arc<FontRegistry>,
    exporter: Option<Arc<dyn Exporter>>,
    vector: Option<Arc<dyn VectorProvider>>,
}

impl Editor {
    pub fn new(store: EditorStore, fonts: Arc<FontRegistry>) -> Self {
        Self::from_shared(Arc::new(RwLock::new(store)), fonts)
    }

    pub fn from_shared(store: SharedStore, fonts: Arc<FontRegistry>) -> Self {
        Self {
            store,
            fonts,
            exporter: None,
            vector: None,
        }
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_vector_provider(mut self, vector: Arc<dyn VectorProvider>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Shared handle, e.g. for a [`crate::ReplicaSyncBridge`]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn fonts(&self) -> &Arc<FontRegistry> {
        &self.fonts
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, EditorStore>, EditorError> {
        self.store.read().map_err(|_| EditorError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, EditorStore>, EditorError> {
        self.store.write().map_err(|_| EditorError::Poisoned)
    }

    pub fn state(&self) -> Result<Arc<EditorState>, EditorError> {
        Ok(self.read()?.state())
    }

    pub fn dispatch(&self, action: Action) -> Result<(), EditorError> {
        self.write()?.dispatch(action)
    }

    pub fn dispatch_all(&self, actions: Vec<Action>) -> Result<(), EditorError> {
        self.write()?.dispatch_all(actions)
    }

    /// `false` when there was nothing to undo or the store is locked
    pub fn undo(&self) -> Result<bool, EditorError> {
        let mut store = self.write()?;
        if store.is_locked() || !store.history().can_undo() {
            return Ok(false);
        }
        store.dispatch(Action::Undo)?;
        Ok(true)
    }

    pub fn redo(&self) -> Result<bool, EditorError> {
        let mut store = self.write()?;
        if store.is_locked() || !store.history().can_redo() {
            return Ok(false);
        }
        store.dispatch(Action::Redo)?;
        Ok(true)
    }

    /// Start following a peer and jump to its camera if it is known
    pub fn follow<T: PresenceTransport>(
        &self,
        presence: &mut PresenceChannel<T>,
        cursor_id: &str,
    ) -> Result<(), EditorError> {
        match presence.follow(cursor_id) {
            Some(transform) => self.dispatch(Action::CameraTransform { transform }),
            None => Ok(()),
        }
    }

    /// Merge a peer's presence record. While that peer is followed, the
    /// local camera moves to its transform.
    pub fn receive_presence<T: PresenceTransport>(
        &self,
        presence: &mut PresenceChannel<T>,
        record: PresenceRecord,
    ) -> Result<bool, EditorError> {
        let accepted = presence.receive(record);
        if let Some(transform) = presence.take_follow_camera() {
            self.dispatch(Action::CameraTransform { transform })?;
        }
        Ok(accepted)
    }

    /// Resolve `request` against the font engine and apply the result to a
    /// text node. `Ok(None)` when no style matches; the node is left alone.
    pub async fn change_text_font_style(
        &self,
        node_id: &str,
        request: FontStyleRequest,
    ) -> Result<Option<FontStyleKey>, EditorError> {
        self.require_text(node_id)?;

        let Some(selected) = self.fonts.select_font_style(&request).await? else {
            debug!(
                "[Editor] no style of '{}' matches the request, '{}' unchanged",
                request.font_family, node_id
            );
            return Ok(None);
        };

        let font_variations = match &selected.instance {
            Some(instance) => instance.coordinates.clone(),
            None if selected.is_variable => request.font_variations.clone(),
            None => Default::default(),
        };
        let change = TextStyleChange {
            font_family: selected.key.font_family.clone(),
            font_weight: selected.key.font_weight,
            font_style_italic: selected.key.font_style_italic,
            font_postscript_name: Some(selected.key.font_postscript_name.clone()),
            font_instance_postscript_name: selected.key.font_instance_postscript_name.clone(),
            font_variations,
        };

        // the node may have gone while the family was loading
        self.require_text(node_id)?;
        self.dispatch(Action::change(node_id, NodeChange::FontStyle(change)))?;
        Ok(Some(selected.key))
    }

    fn require_text(&self, node_id: &str) -> Result<(), EditorError> {
        let state = self.state()?;
        let node = state
            .document
            .node(node_id)
            .ok_or_else(|| EditorError::NodeNotFound(node_id.to_string()))?;
        match node.kind {
            NodeKind::Text { .. } => Ok(()),
            _ => Err(EditorError::NotText(node_id.to_string())),
        }
    }

    pub async fn export_node_as(
        &self,
        node_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, EditorError> {
        let exporter = self
            .exporter
            .clone()
            .ok_or(EditorError::CapabilityUnavailable("export"))?;
        let state = self.state()?;
        if state.document.node(node_id).is_none() {
            return Err(EditorError::NodeNotFound(node_id.to_string()));
        }
        exporter.export(state, node_id, format).await
    }

    pub async fn to_vector_network(
        &self,
        node_id: &str,
    ) -> Result<Option<VectorNetwork>, EditorError> {
        let vector = self
            .vector
            .clone()
            .ok_or(EditorError::CapabilityUnavailable("vector"))?;
        let state = self.state()?;
        if state.document.node(node_id).is_none() {
            return Err(EditorError::NodeNotFound(node_id.to_string()));
        }
        vector.to_vector_network(state, node_id).await
    }

    pub fn snapshot(&self) -> Result<DocumentSnapshot, EditorError> {
        Ok(DocumentSnapshot::new(self.state()?.document.clone()))
    }

    /// Replace the open document. History is cleared and the camera kept.
    pub fn load_snapshot(
        &self,
        snapshot: DocumentSnapshot,
        document_key: Option<String>,
    ) -> Result<(), EditorError> {
        let state = EditorState::new(snapshot.document)?;
        self.write()?.reset(state, document_key, false)?;
        info!("[Editor] snapshot loaded");
        Ok(())
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("fonts", &self.fonts)
            .field("exporter", &self.exporter.is_some())
            .field("vector", &self.vector.is_some())
            .finish_non_exhaustive()
    }
}
