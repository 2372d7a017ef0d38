use thiserror::Error;

/// Errors raised by the data model
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Patch failed at {path}: {reason}")]
    Patch { path: String, reason: String },

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn invariant(message: impl Into<String>) -> Self {
        SchemaError::Invariant(message.into())
    }

    pub(crate) fn patch(path: &[crate::PathSegment], reason: impl Into<String>) -> Self {
        SchemaError::Patch {
            path: crate::patch::to_pointer(path),
            reason: reason.into(),
        }
    }
}
