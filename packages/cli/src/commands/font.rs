use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use canvas_fonts::{
    FaceSource, FontCatalog, FontError, FontFace, FontParser, FontRegistry, FontStyleRequest,
};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct FontArgs {
    /// JSON object mapping family names to their parsed faces
    #[arg(short, long)]
    pub registry: PathBuf,

    #[arg(short, long)]
    pub family: String,

    #[arg(long)]
    pub style_name: Option<String>,

    #[arg(short, long)]
    pub weight: Option<u16>,

    #[arg(short, long)]
    pub italic: Option<bool>,

    #[arg(long)]
    pub postscript_name: Option<String>,

    #[arg(long)]
    pub instance_postscript_name: Option<String>,

    /// Variation coordinate as TAG=VALUE, repeatable
    #[arg(long = "var", value_parser = parse_variation)]
    pub variations: Vec<(String, f32)>,
}

/// Serves faces from a registry file that was parsed ahead of time
struct PreParsed {
    families: BTreeMap<String, Vec<FontFace>>,
}

#[async_trait]
impl FontParser for PreParsed {
    async fn parse_family(
        &self,
        family: &str,
        _faces: &[FaceSource],
    ) -> Result<Vec<FontFace>, FontError> {
        self.families
            .get(family)
            .cloned()
            .ok_or_else(|| FontError::Parse {
                family: family.to_string(),
                reason: "not in registry file".into(),
            })
    }
}

#[derive(Debug, Serialize)]
struct Resolution {
    key: canvas_fonts::FontStyleKey,
    face_id: String,
    is_variable: bool,
    coordinates: BTreeMap<String, f32>,
}

pub(crate) fn parse_variation(raw: &str) -> Result<(String, f32), String> {
    let (tag, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=VALUE, got '{raw}'"))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("bad value for '{tag}': {e}"))?;
    Ok((tag.trim().to_string(), value))
}

pub(crate) fn registry_from(families: BTreeMap<String, Vec<FontFace>>) -> FontRegistry {
    let mut catalog = FontCatalog::new();
    for (family, faces) in &families {
        let sources = faces
            .iter()
            .map(|face| FaceSource {
                face_id: face.face_id.clone(),
                url: String::new(),
                italic: None,
            })
            .collect();
        catalog.insert(family.clone(), sources);
    }
    FontRegistry::new(catalog, Arc::new(PreParsed { families }))
}

impl FontArgs {
    fn request(&self) -> FontStyleRequest {
        let mut request = FontStyleRequest::family(&self.family);
        request.font_style_name = self.style_name.clone();
        request.font_weight = self.weight;
        request.font_style_italic = self.italic;
        request.font_postscript_name = self.postscript_name.clone();
        request.font_instance_postscript_name = self.instance_postscript_name.clone();
        request.font_variations = self.variations.iter().cloned().collect();
        request
    }
}

pub async fn font(args: FontArgs) -> Result<()> {
    let source = fs::read_to_string(&args.registry)
        .with_context(|| format!("reading {}", args.registry.display()))?;
    let families: BTreeMap<String, Vec<FontFace>> = serde_json::from_str(&source)
        .with_context(|| format!("parsing {}", args.registry.display()))?;
    if !families.contains_key(&args.family) {
        return Err(anyhow!("family '{}' is not in the registry", args.family));
    }

    let registry = registry_from(families);
    let Some(selected) = registry.select_font_style(&args.request()).await? else {
        println!("{}", "⚠️  No matching style".yellow());
        return Ok(());
    };

    let resolution = Resolution {
        coordinates: selected.coordinates(),
        face_id: selected.face.face_id.clone(),
        is_variable: selected.is_variable,
        key: selected.key,
    };
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}
