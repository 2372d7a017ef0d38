use super::read_snapshot;
use anyhow::Result;
use canvas_schema::patch::to_json_patches;
use canvas_schema::{diff, DocumentSnapshot, JsonPatch};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct PatchesArgs {
    /// Snapshot before the change
    pub before: PathBuf,

    /// Snapshot after the change
    pub after: PathBuf,

    /// Print the patches that undo the change instead
    #[arg(long)]
    pub inverse: bool,
}

pub fn snapshot_patches(
    before: &DocumentSnapshot,
    after: &DocumentSnapshot,
    inverse: bool,
) -> Result<Vec<JsonPatch>> {
    let (forward, backward) = diff(
        &serde_json::to_value(&before.document)?,
        &serde_json::to_value(&after.document)?,
    );
    Ok(to_json_patches(if inverse { &backward } else { &forward }))
}

pub fn patches(args: PatchesArgs) -> Result<()> {
    let before = read_snapshot(&args.before)?;
    let after = read_snapshot(&args.after)?;
    let patches = snapshot_patches(&before, &after, args.inverse)?;

    if patches.is_empty() {
        eprintln!("{}", "Snapshots are identical".green());
    }
    println!("{}", serde_json::to_string_pretty(&patches)?);
    Ok(())
}
