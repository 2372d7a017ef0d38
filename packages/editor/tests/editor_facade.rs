use async_trait::async_trait;
use canvas_editor::{
    BoxOutlineProvider, Editor, EditorConfig, EditorError, EditorStore, ExportFormat, Exporter,
    FocusSlice, GeometrySlice, ManualClock, PresenceChannel, PresenceProfile, PresenceRecord,
};
use canvas_fonts::{FaceSource, FontCatalog, FontError, FontFace, FontParser, FontRegistry, FontStyleRequest};
use canvas_schema::{
    Action, Document, DocumentSnapshot, EditorState, InsertKind, InsertNode, Node, NodeChange,
    NodeKind, ParentRef, Target, Transform,
};
use std::sync::{Arc, Mutex};

struct StaticInter;

#[async_trait]
impl FontParser for StaticInter {
    async fn parse_family(
        &self,
        _family: &str,
        faces: &[FaceSource],
    ) -> Result<Vec<FontFace>, FontError> {
        Ok(faces
            .iter()
            .map(|source| {
                let (ps, style, weight) = match source.face_id.as_str() {
                    "bold" => ("Inter-Bold", "Bold", 700),
                    _ => ("Inter-Regular", "Regular", 400),
                };
                FontFace {
                    face_id: source.face_id.clone(),
                    postscript_name: ps.into(),
                    style_name: style.into(),
                    weight,
                    italic: false,
                    axes: vec![],
                    instances: vec![],
                }
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingExporter {
    calls: Mutex<Vec<(String, ExportFormat)>>,
}

#[async_trait]
impl Exporter for RecordingExporter {
    async fn export(
        &self,
        _state: Arc<EditorState>,
        node_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, EditorError> {
        self.calls.lock().unwrap().push((node_id.to_string(), format));
        Ok(format.mime_type().as_bytes().to_vec())
    }
}

fn editor() -> Editor {
    let mut doc = Document::with_scene("main", "Main");
    let scene = ParentRef::Scene("main".into());
    doc.attach(Node::text("title", "Hello"), &scene, None).unwrap();
    doc.attach(Node::rectangle("box"), &scene, None).unwrap();
    let store = EditorStore::new(EditorState::new(doc).unwrap(), &EditorConfig::default());

    let mut catalog = FontCatalog::new();
    let source = |id: &str| FaceSource {
        face_id: id.into(),
        url: format!("https://fonts.example/{id}.ttf"),
        italic: None,
    };
    catalog.insert("Inter", vec![source("regular"), source("bold")]);
    let fonts = Arc::new(FontRegistry::new(catalog, Arc::new(StaticInter)));

    Editor::new(store, fonts)
}

fn title_style(editor: &Editor) -> canvas_schema::TextStyle {
    match &editor.state().unwrap().document.nodes["title"].kind {
        NodeKind::Text { style, .. } => style.clone(),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_change_text_font_style_applies_resolved_style() {
    let editor = editor();
    let key = editor
        .change_text_font_style("title", FontStyleRequest::family("Inter").weight(700).italic(false))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(key.font_style_name, "Bold");
    let style = title_style(&editor);
    assert_eq!(style.font_weight, 700);
    assert_eq!(style.font_postscript_name.as_deref(), Some("Inter-Bold"));

    assert!(editor.undo().unwrap());
    assert_eq!(title_style(&editor).font_weight, 400);
}

#[tokio::test]
async fn test_unknown_family_leaves_node_alone() {
    let editor = editor();
    let result = editor
        .change_text_font_style("title", FontStyleRequest::family("Comic Sans"))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(title_style(&editor).font_family, "Inter");
    assert!(!editor.undo().unwrap());
}

#[tokio::test]
async fn test_font_style_requires_text_node() {
    let editor = editor();
    assert!(matches!(
        editor
            .change_text_font_style("box", FontStyleRequest::family("Inter"))
            .await,
        Err(EditorError::NotText(_))
    ));
    assert!(matches!(
        editor
            .change_text_font_style("gone", FontStyleRequest::family("Inter"))
            .await,
        Err(EditorError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_capabilities_are_optional() {
    let editor = editor();
    assert!(matches!(
        editor.export_node_as("box", ExportFormat::Png).await,
        Err(EditorError::CapabilityUnavailable("export"))
    ));

    let exporter = Arc::new(RecordingExporter::default());
    let editor = editor
        .with_exporter(exporter.clone())
        .with_vector_provider(Arc::new(BoxOutlineProvider));

    let bytes = editor.export_node_as("box", ExportFormat::Svg).await.unwrap();
    assert_eq!(bytes, b"image/svg+xml".to_vec());
    assert!(matches!(
        editor.export_node_as("nope", ExportFormat::Png).await,
        Err(EditorError::NodeNotFound(_))
    ));
    assert_eq!(exporter.calls.lock().unwrap().len(), 1);

    let network = editor.to_vector_network("box").await.unwrap().unwrap();
    assert_eq!(network.vertices.len(), 4);
}

#[test]
fn test_snapshot_round_trip_resets_history() {
    let editor = editor();
    editor
        .dispatch(Action::change("box", NodeChange::Width(320.0)))
        .unwrap();
    let json = editor.snapshot().unwrap().to_json().unwrap();

    editor
        .dispatch(Action::change("box", NodeChange::Width(10.0)))
        .unwrap();
    editor
        .load_snapshot(DocumentSnapshot::from_json(&json).unwrap(), Some("restored".into()))
        .unwrap();

    let state = editor.state().unwrap();
    assert_eq!(state.document.nodes["box"].width, 320.0);
    assert_eq!(state.transaction_id, 0);
    assert!(!editor.undo().unwrap());
}

#[test]
fn test_insert_and_duplicate_on_document_with_generated_ids() {
    let mut doc = Document::with_scene("main", "Main");
    let scene = ParentRef::Scene("main".into());
    doc.attach(Node::rectangle("node-1"), &scene, None).unwrap();
    doc.attach(Node::rectangle("a"), &scene, None).unwrap();
    let store = EditorStore::new(EditorState::new(doc).unwrap(), &EditorConfig::default());
    let fonts = FontRegistry::new(FontCatalog::new(), Arc::new(StaticInter));
    let editor = Editor::new(store, Arc::new(fonts));

    editor
        .dispatch(Action::Insert(InsertNode::new(InsertKind::Rectangle)))
        .unwrap();
    editor
        .dispatch(Action::Duplicate {
            target: Target::nodes(["a"]),
        })
        .unwrap();

    let state = editor.state().unwrap();
    assert_eq!(state.document.nodes.len(), 4);
    assert_eq!(state.document.scenes["main"].children.len(), 4);
    assert_eq!(state.document.scenes["main"].children[..2], ["node-1", "a"]);
}

#[test]
fn test_followed_peer_moves_local_camera() {
    let editor = editor();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let mut presence = PresenceChannel::new(
        "me",
        PresenceProfile::default(),
        tx,
        &EditorConfig::default(),
        Arc::new(ManualClock::new(0)),
    );
    let peer = |t: i64, dx: f64| PresenceRecord {
        cursor_id: "peer".into(),
        t,
        profile: PresenceProfile::default(),
        focus: FocusSlice::default(),
        geo: GeometrySlice {
            transform: Transform::IDENTITY.translated(dx, 0.0),
            ..GeometrySlice::default()
        },
        cursor_chat: None,
    };

    assert!(editor.receive_presence(&mut presence, peer(1, 10.0)).unwrap());
    assert_eq!(editor.state().unwrap().transform, Transform::IDENTITY);

    editor.follow(&mut presence, "peer").unwrap();
    assert_eq!(editor.state().unwrap().transform, Transform::IDENTITY.translated(10.0, 0.0));

    editor.receive_presence(&mut presence, peer(2, 30.0)).unwrap();
    assert_eq!(editor.state().unwrap().transform, Transform::IDENTITY.translated(30.0, 0.0));

    presence.unfollow();
    editor.receive_presence(&mut presence, peer(3, 50.0)).unwrap();
    assert_eq!(editor.state().unwrap().transform, Transform::IDENTITY.translated(30.0, 0.0));
    assert!(!editor.undo().unwrap());
}
