use thiserror::Error;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("Failed to parse family '{family}': {reason}")]
    Parse { family: String, reason: String },

    #[error("Face '{0}' not found")]
    FaceNotFound(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
