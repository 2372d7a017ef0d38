//! # Font registry
//!
//! Knows which families exist ([`FontCatalog`]) and parses each family at
//! most once through an injected [`FontParser`]. Concurrent requests for the
//! same family share one parse.

use crate::family::{FontFace, FontFamily};
use crate::select::{select_font_style, FontStyleRequest, SelectedFontStyle};
use crate::FontError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Where to fetch one face of a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSource {
    pub face_id: String,
    pub url: String,
    /// Italic hint from the catalog, overrides what the parser infers
    #[serde(default)]
    pub italic: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FontCatalog {
    families: BTreeMap<String, Vec<FaceSource>>,
}

impl FontCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, family: impl Into<String>, faces: Vec<FaceSource>) {
        self.families.insert(family.into(), faces);
    }

    pub fn contains(&self, family: &str) -> bool {
        self.families.contains_key(family)
    }

    pub fn faces(&self, family: &str) -> Option<&[FaceSource]> {
        self.families.get(family).map(Vec::as_slice)
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }
}

/// Turns raw face sources into face descriptions (tables, axes, instances)
#[async_trait]
pub trait FontParser: Send + Sync {
    async fn parse_family(
        &self,
        family: &str,
        faces: &[FaceSource],
    ) -> Result<Vec<FontFace>, FontError>;
}

type FamilyCell = Arc<OnceCell<Arc<FontFamily>>>;

pub struct FontRegistry {
    catalog: RwLock<FontCatalog>,
    parser: Arc<dyn FontParser>,
    families: Mutex<HashMap<String, FamilyCell>>,
}

impl FontRegistry {
    pub fn new(catalog: FontCatalog, parser: Arc<dyn FontParser>) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            parser,
            families: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, family: &str) -> bool {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(family)
    }

    pub fn is_loaded(&self, family: &str) -> bool {
        self.families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(family)
            .is_some_and(|cell| cell.initialized())
    }

    /// Register an already parsed family
    pub fn insert_family(&self, family: FontFamily) {
        let name = family.family.clone();
        let sources = family
            .faces
            .iter()
            .map(|face| FaceSource {
                face_id: face.face_id.clone(),
                url: String::new(),
                italic: Some(face.italic),
            })
            .collect();
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), sources);
        let cell: FamilyCell = Arc::new(OnceCell::new_with(Some(Arc::new(family))));
        self.families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, cell);
    }

    /// Parsed family, loading it on first use. `None` for unknown families.
    pub async fn family(&self, family: &str) -> Result<Option<Arc<FontFamily>>, FontError> {
        let sources = {
            let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
            match catalog.faces(family) {
                Some(faces) => faces.to_vec(),
                None => return Ok(None),
            }
        };

        let cell = self
            .families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(family.to_string())
            .or_default()
            .clone();

        let parsed = cell
            .get_or_try_init(|| async {
                let mut faces = self.parser.parse_family(family, &sources).await?;
                for face in &mut faces {
                    let hint = sources
                        .iter()
                        .find(|s| s.face_id == face.face_id)
                        .and_then(|s| s.italic);
                    if let Some(italic) = hint {
                        face.italic = italic;
                    }
                }
                info!("[Fonts] parsed '{}' ({} faces)", family, faces.len());
                Ok::<_, FontError>(Arc::new(FontFamily::from_faces(family, faces)))
            })
            .await?;
        Ok(Some(Arc::clone(parsed)))
    }

    pub async fn select_font_style(
        &self,
        request: &FontStyleRequest,
    ) -> Result<Option<SelectedFontStyle>, FontError> {
        let Some(family) = self.family(&request.font_family).await? else {
            debug!("[Fonts] family '{}' not in registry", request.font_family);
            return Ok(None);
        };
        Ok(select_font_style(&family, request))
    }
}

impl std::fmt::Debug for FontRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRegistry")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingParser {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FontParser for CountingParser {
        async fn parse_family(
            &self,
            _family: &str,
            faces: &[FaceSource],
        ) -> Result<Vec<FontFace>, FontError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(faces
                .iter()
                .map(|source| FontFace {
                    face_id: source.face_id.clone(),
                    postscript_name: format!("Mono-{}", source.face_id),
                    style_name: source.face_id.clone(),
                    weight: 400,
                    italic: false,
                    axes: vec![],
                    instances: vec![],
                })
                .collect())
        }
    }

    fn registry() -> (Arc<FontRegistry>, Arc<CountingParser>) {
        let mut catalog = FontCatalog::new();
        catalog.insert(
            "Mono",
            vec![
                FaceSource {
                    face_id: "Regular".into(),
                    url: "mono-regular.ttf".into(),
                    italic: None,
                },
                FaceSource {
                    face_id: "Oblique".into(),
                    url: "mono-oblique.ttf".into(),
                    italic: Some(true),
                },
            ],
        );
        let parser = Arc::new(CountingParser {
            calls: AtomicUsize::new(0),
        });
        let registry = Arc::new(FontRegistry::new(catalog, parser.clone()));
        (registry, parser)
    }

    #[tokio::test]
    async fn test_unknown_family_is_none() {
        let (registry, parser) = registry();
        let hit = registry
            .select_font_style(&FontStyleRequest::family("Nope"))
            .await
            .unwrap();
        assert!(hit.is_none());
        assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_family_parsed_once_under_concurrency() {
        let (registry, parser) = registry();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.family("Mono").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }
        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded("Mono"));
    }

    #[tokio::test]
    async fn test_catalog_italic_hint_applies() {
        let (registry, _) = registry();
        let hit = registry
            .select_font_style(&FontStyleRequest::family("Mono").italic(true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.key.font_style_name, "Oblique");
        assert!(hit.key.font_style_italic);
    }
}
