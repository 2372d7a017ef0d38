//! # Style selection
//!
//! Priority cascade, first hit wins:
//!
//! 1. exact style name
//! 2. weight / italic filter, only when exactly one style survives
//! 3. instance PostScript name
//! 4. variation coordinates (variable families): strict, then best partial
//! 5. face PostScript name (static families)
//! 6. first style of the family

use crate::family::{FaceInstance, FontFace, FontFamily, FontStyleInstance, FontStyleKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FontStyleRequest {
    pub font_family: String,
    #[serde(default)]
    pub font_style_name: Option<String>,
    #[serde(default)]
    pub font_weight: Option<u16>,
    #[serde(default)]
    pub font_style_italic: Option<bool>,
    #[serde(default)]
    pub font_postscript_name: Option<String>,
    #[serde(default)]
    pub font_instance_postscript_name: Option<String>,
    #[serde(default)]
    pub font_variations: BTreeMap<String, f32>,
}

impl FontStyleRequest {
    pub fn family(family: impl Into<String>) -> Self {
        Self {
            font_family: family.into(),
            ..Self::default()
        }
    }

    pub fn style_name(mut self, name: impl Into<String>) -> Self {
        self.font_style_name = Some(name.into());
        self
    }

    pub fn weight(mut self, weight: u16) -> Self {
        self.font_weight = Some(weight);
        self
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.font_style_italic = Some(italic);
        self
    }

    pub fn postscript_name(mut self, name: impl Into<String>) -> Self {
        self.font_postscript_name = Some(name.into());
        self
    }

    pub fn instance_postscript_name(mut self, name: impl Into<String>) -> Self {
        self.font_instance_postscript_name = Some(name.into());
        self
    }

    pub fn variation(mut self, tag: impl Into<String>, value: f32) -> Self {
        self.font_variations.insert(tag.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFontStyle {
    pub key: FontStyleKey,
    pub face: FontFace,
    pub instance: Option<FaceInstance>,
    pub is_variable: bool,
}

impl SelectedFontStyle {
    /// Variation coordinates to render with: the instance's, if any
    pub fn coordinates(&self) -> BTreeMap<String, f32> {
        self.instance
            .as_ref()
            .map(|i| i.coordinates.clone())
            .unwrap_or_default()
    }
}

const COORDINATE_TOLERANCE: f32 = 0.001;

pub fn select_font_style(
    family: &FontFamily,
    request: &FontStyleRequest,
) -> Option<SelectedFontStyle> {
    if let Some(name) = &request.font_style_name {
        let hit = family
            .styles
            .iter()
            .filter(|s| &s.font_style_name == name)
            .find_map(|s| resolve(family, s));
        if hit.is_some() {
            return hit;
        }
    }

    if request.font_weight.is_some() || request.font_style_italic.is_some() {
        let candidates: Vec<&FontStyleInstance> = family
            .styles
            .iter()
            .filter(|s| request.font_weight.map_or(true, |w| s.font_weight == w))
            .filter(|s| request.font_style_italic.map_or(true, |i| s.font_style_italic == i))
            .collect();
        match candidates.as_slice() {
            [only] => {
                if let Some(hit) = resolve(family, only) {
                    return Some(hit);
                }
            }
            [] => {}
            many => debug!(
                "[Fonts] {} styles of '{}' match weight {:?} italic {:?}, falling through",
                many.len(),
                family.family,
                request.font_weight,
                request.font_style_italic
            ),
        }
    }

    if let Some(instance_ps) = &request.font_instance_postscript_name {
        let hit = family
            .styles
            .iter()
            .filter(|s| s.font_instance_postscript_name.as_ref() == Some(instance_ps))
            .find_map(|s| resolve(family, s));
        if hit.is_some() {
            return hit;
        }
    }

    if family.is_variable() {
        if !request.font_variations.is_empty() {
            if let Some(hit) = match_variations(family, &request.font_variations) {
                return Some(hit);
            }
        }
    } else if let Some(ps) = &request.font_postscript_name {
        let hit = family
            .styles
            .iter()
            .filter(|s| &s.font_postscript_name == ps)
            .find_map(|s| resolve(family, s));
        if hit.is_some() {
            return hit;
        }
    }

    family.styles.iter().find_map(|s| resolve(family, s))
}

fn match_variations(
    family: &FontFamily,
    variations: &BTreeMap<String, f32>,
) -> Option<SelectedFontStyle> {
    let instances = || family.styles.iter().filter(|s| !s.coordinates.is_empty());

    let strict = instances()
        .filter(|s| {
            variations
                .iter()
                .all(|(tag, value)| coordinate_matches(s, tag, *value))
        })
        .find_map(|s| resolve(family, s));
    if strict.is_some() {
        return strict;
    }

    let mut best: Option<(f32, &FontStyleInstance)> = None;
    for style in instances() {
        let matched = variations
            .iter()
            .filter(|(tag, value)| coordinate_matches(style, tag, **value))
            .count();
        let score = matched as f32 / variations.len() as f32;
        if score > 0.0 && best.map_or(true, |(top, _)| score > top) {
            best = Some((score, style));
        }
    }
    best.and_then(|(_, style)| resolve(family, style))
}

fn coordinate_matches(style: &FontStyleInstance, tag: &str, value: f32) -> bool {
    style
        .coordinates
        .get(tag)
        .is_some_and(|v| (v - value).abs() <= COORDINATE_TOLERANCE)
}

fn resolve(family: &FontFamily, style: &FontStyleInstance) -> Option<SelectedFontStyle> {
    let face = family.face(&style.font_postscript_name)?;
    let instance = if face.is_variable() {
        face.instances
            .iter()
            .find(|i| {
                i.name == style.font_style_name
                    && i.postscript_name == style.font_instance_postscript_name
            })
            .cloned()
    } else {
        None
    };
    Some(SelectedFontStyle {
        key: style.key(),
        face: face.clone(),
        instance,
        is_variable: face.is_variable(),
    })
}
