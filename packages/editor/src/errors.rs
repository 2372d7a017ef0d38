//! Error types for the editor

use canvas_fonts::FontError;
use canvas_schema::SchemaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Font error: {0}")]
    Font(#[from] FontError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Node '{0}' is not a text node")]
    NotText(String),

    #[error("No {0} provider configured")]
    CapabilityUnavailable(&'static str),

    #[error("Provider failed: {0}")]
    Provider(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[cfg(feature = "collaboration")]
    #[error("Replica error: {0}")]
    Replica(#[from] crate::sync::ReplicaError),
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to replay '{action}' entry: {source}")]
    Replay {
        action: String,
        #[source]
        source: SchemaError,
    },
}
