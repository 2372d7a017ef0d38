//! # Replica synchronization
//!
//! Mirrors `document.nodes` and `document.scenes` into a shared `yrs`
//! document and imports what other participants write there.
//!
//! Two layers keep the store and the replica from feeding each other:
//!
//! 1. **Origin tags**: every bridge writes with its own origin and ignores
//!    replica events carrying it (or carrying no origin at all)
//! 2. **Reentrancy mutex**: pushes and imports never nest within the same
//!    call chain; a contended import is logged and skipped

mod bridge;
mod replica;

pub use bridge::{BridgeOutcome, PushOutcome, ReplicaSyncBridge, UpstreamDriver};
pub use replica::{
    MapWrite, Record, RecordWrite, Replica, ReplicaEvent, ReplicaWrite, LIST_FIELDS, NODES_MAP,
    SCENES_MAP,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("Failed to decode replica payload: {0}")]
    Decode(String),

    #[error("Failed to apply replica update: {0}")]
    Apply(String),

    #[error("Failed to observe replica: {0}")]
    Observe(String),

    #[error("Failed to encode {kind} '{id}': {source}")]
    Encode {
        kind: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Upstream driver already taken")]
    DriverTaken,
}
