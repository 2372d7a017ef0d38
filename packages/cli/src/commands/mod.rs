pub mod font;
pub mod patches;
pub mod replay;

pub use font::{font, FontArgs};
pub use patches::{patches, PatchesArgs};
pub use replay::{replay, ReplayArgs};

use anyhow::{Context, Result};
use canvas_schema::DocumentSnapshot;
use std::fs;
use std::path::Path;

pub(crate) fn read_snapshot(path: &Path) -> Result<DocumentSnapshot> {
    let source =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    DocumentSnapshot::from_json(&source).with_context(|| format!("loading {}", path.display()))
}
