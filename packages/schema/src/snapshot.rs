//! Persisted document artifact

use crate::{Document, Result, SchemaError};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub version: u32,
    pub document: Document,
}

impl DocumentSnapshot {
    pub fn new(document: Document) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            document,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(source)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        snapshot.document.validate()?;
        Ok(snapshot)
    }
}
