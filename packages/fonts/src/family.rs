//! Parsed font family records and the flattened style list

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variation axis as declared by one face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAxis {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    pub min: f32,
    pub def: f32,
    pub max: f32,
}

/// Variation axis shared by every variable face of a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyAxis {
    pub tag: String,
    pub min: f32,
    pub def: f32,
    pub max: f32,
}

/// Named instance of a variable face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceInstance {
    pub name: String,
    #[serde(default)]
    pub postscript_name: Option<String>,
    #[serde(default)]
    pub coordinates: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontFace {
    pub face_id: String,
    pub postscript_name: String,
    /// Subfamily name, e.g. "Bold Italic"
    pub style_name: String,
    pub weight: u16,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub axes: Vec<FaceAxis>,
    #[serde(default)]
    pub instances: Vec<FaceInstance>,
}

impl FontFace {
    pub fn is_variable(&self) -> bool {
        !self.axes.is_empty()
    }

    pub fn axis(&self, tag: &str) -> Option<&FaceAxis> {
        self.axes.iter().find(|a| a.tag == tag)
    }
}

/// Identity of a selected style, stored on text nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontStyleKey {
    pub font_family: String,
    pub font_style_name: String,
    pub font_postscript_name: String,
    pub font_instance_postscript_name: Option<String>,
    pub font_style_italic: bool,
    pub font_weight: u16,
}

/// One entry of a family's style list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontStyleInstance {
    pub font_family: String,
    pub font_style_name: String,
    /// PostScript name of the face carrying this style
    pub font_postscript_name: String,
    /// Instance PostScript name for variable faces, the face's own for static faces
    pub font_instance_postscript_name: Option<String>,
    pub font_style_italic: bool,
    pub font_weight: u16,
    #[serde(default)]
    pub coordinates: BTreeMap<String, f32>,
}

impl FontStyleInstance {
    fn of_face(family: &str, face: &FontFace) -> Self {
        let weight = face
            .axis("wght")
            .map(|axis| axis.def.round() as u16)
            .unwrap_or(face.weight);
        Self {
            font_family: family.to_string(),
            font_style_name: face.style_name.clone(),
            font_postscript_name: face.postscript_name.clone(),
            font_instance_postscript_name: (!face.is_variable())
                .then(|| face.postscript_name.clone()),
            font_style_italic: face.italic,
            font_weight: weight,
            coordinates: BTreeMap::new(),
        }
    }

    fn of_instance(family: &str, face: &FontFace, instance: &FaceInstance) -> Self {
        let coords = &instance.coordinates;
        let italic = face.italic
            || coords.get("ital").is_some_and(|v| (*v - 1.0).abs() < f32::EPSILON)
            || coords.get("slnt").is_some_and(|v| *v != 0.0);
        Self {
            font_family: family.to_string(),
            font_style_name: instance.name.clone(),
            font_postscript_name: face.postscript_name.clone(),
            font_instance_postscript_name: instance.postscript_name.clone(),
            font_style_italic: italic,
            font_weight: coords
                .get("wght")
                .map(|w| w.round() as u16)
                .unwrap_or(face.weight),
            coordinates: coords.clone(),
        }
    }

    pub fn key(&self) -> FontStyleKey {
        FontStyleKey {
            font_family: self.font_family.clone(),
            font_style_name: self.font_style_name.clone(),
            font_postscript_name: self.font_postscript_name.clone(),
            font_instance_postscript_name: self.font_instance_postscript_name.clone(),
            font_style_italic: self.font_style_italic,
            font_weight: self.font_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontFamily {
    pub family: String,
    pub axes: Vec<FamilyAxis>,
    pub faces: Vec<FontFace>,
    pub styles: Vec<FontStyleInstance>,
}

impl FontFamily {
    /// Build the family record and its style list from parsed faces.
    ///
    /// Static faces contribute one style each. Variable faces contribute one
    /// style per named instance, or a single default style when they declare
    /// no instances.
    pub fn from_faces(family: impl Into<String>, faces: Vec<FontFace>) -> Self {
        let family = family.into();
        let mut styles = Vec::new();
        for face in &faces {
            if face.is_variable() && !face.instances.is_empty() {
                styles.extend(
                    face.instances
                        .iter()
                        .map(|instance| FontStyleInstance::of_instance(&family, face, instance)),
                );
            } else {
                styles.push(FontStyleInstance::of_face(&family, face));
            }
        }
        Self {
            axes: shared_axes(&faces),
            family,
            faces,
            styles,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.faces.iter().any(FontFace::is_variable)
    }

    pub fn face(&self, postscript_name: &str) -> Option<&FontFace> {
        self.faces.iter().find(|f| f.postscript_name == postscript_name)
    }
}

fn shared_axes(faces: &[FontFace]) -> Vec<FamilyAxis> {
    let mut variable = faces.iter().filter(|f| f.is_variable());
    let Some(first) = variable.next() else {
        return Vec::new();
    };
    let rest: Vec<&FontFace> = variable.collect();
    first
        .axes
        .iter()
        .filter_map(|axis| {
            let mut shared = FamilyAxis {
                tag: axis.tag.clone(),
                min: axis.min,
                def: axis.def,
                max: axis.max,
            };
            for face in &rest {
                let other = face.axis(&axis.tag)?;
                shared.min = shared.min.min(other.min);
                shared.max = shared.max.max(other.max);
            }
            Some(shared)
        })
        .collect()
}
