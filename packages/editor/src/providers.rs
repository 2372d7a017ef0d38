//! Host-supplied capabilities.
//!
//! Exporting and vector conversion depend on a rendering backend this crate
//! does not carry. Hosts plug one in through [`crate::Editor::with_exporter`]
//! and [`crate::Editor::with_vector_provider`].

use crate::context::{DocumentGeometry, GeometryQuery};
use crate::EditorError;
use async_trait::async_trait;
use canvas_schema::{EditorState, NodeKind, Vector2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Svg,
    Pdf,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(
        &self,
        state: Arc<EditorState>,
        node_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, EditorError>;
}

/// Segment between two vertices with tangents relative to each end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorSegment {
    pub a: usize,
    pub b: usize,
    pub ta: Vector2,
    pub tb: Vector2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorNetwork {
    pub vertices: Vec<Vector2>,
    pub segments: Vec<VectorSegment>,
}

#[async_trait]
pub trait VectorProvider: Send + Sync {
    /// `None` when the node has no vector representation
    async fn to_vector_network(
        &self,
        state: Arc<EditorState>,
        node_id: &str,
    ) -> Result<Option<VectorNetwork>, EditorError>;
}

/// Straight-edged outlines of box-shaped nodes, in absolute coordinates
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxOutlineProvider;

#[async_trait]
impl VectorProvider for BoxOutlineProvider {
    async fn to_vector_network(
        &self,
        state: Arc<EditorState>,
        node_id: &str,
    ) -> Result<Option<VectorNetwork>, EditorError> {
        let node = state
            .document
            .node(node_id)
            .ok_or_else(|| EditorError::NodeNotFound(node_id.to_string()))?;
        match node.kind {
            NodeKind::Rectangle { .. } | NodeKind::Container { .. } | NodeKind::Image { .. } => {}
            _ => return Ok(None),
        }
        let Some(rect) = DocumentGeometry.bounding_rect(&state, node_id) else {
            return Ok(None);
        };

        let vertices = vec![
            [rect.x, rect.y],
            [rect.right(), rect.y],
            [rect.right(), rect.bottom()],
            [rect.x, rect.bottom()],
        ];
        let segments = (0..vertices.len())
            .map(|a| VectorSegment {
                a,
                b: (a + 1) % vertices.len(),
                ta: [0.0, 0.0],
                tb: [0.0, 0.0],
            })
            .collect();
        Ok(Some(VectorNetwork { vertices, segments }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_schema::{Document, Node, ParentRef};

    #[tokio::test]
    async fn test_box_outline() {
        let mut doc = Document::with_scene("main", "Main");
        let scene = ParentRef::Scene("main".into());
        doc.attach(Node::rectangle("r").at(10.0, 20.0).sized(30.0, 40.0), &scene, None)
            .unwrap();
        doc.attach(Node::text("t", "hi"), &scene, None).unwrap();
        let state = Arc::new(EditorState::new(doc).unwrap());

        let network = BoxOutlineProvider
            .to_vector_network(state.clone(), "r")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(network.vertices[2], [40.0, 60.0]);
        assert_eq!(network.segments.len(), 4);
        assert_eq!(network.segments[3].b, 0);

        assert!(BoxOutlineProvider
            .to_vector_network(state.clone(), "t")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            BoxOutlineProvider.to_vector_network(state, "nope").await,
            Err(EditorError::NodeNotFound(_))
        ));
    }
}
