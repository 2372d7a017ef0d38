//! # Canvas Fonts
//!
//! Resolves a requested text style (family, style name, weight, italic,
//! PostScript names, variation axes) to one concrete face and, for
//! variable fonts, one named instance.
//!
//! ```rust,ignore
//! let registry = FontRegistry::new(catalog, Arc::new(parser));
//! let style = registry
//!     .select_font_style(&FontStyleRequest::family("Inter").weight(700))
//!     .await?;
//! ```

mod error;
pub mod family;
pub mod registry;
pub mod select;

pub use error::FontError;
pub use family::{
    FaceAxis, FaceInstance, FamilyAxis, FontFace, FontFamily, FontStyleInstance, FontStyleKey,
};
pub use registry::{FaceSource, FontCatalog, FontParser, FontRegistry};
pub use select::{select_font_style, FontStyleRequest, SelectedFontStyle};
