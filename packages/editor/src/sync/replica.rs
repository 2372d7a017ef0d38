//! The shared replica document.
//!
//! Two root maps, keyed by id. Each entry is a nested map holding one
//! [`canvas_schema::Node`] or [`canvas_schema::Scene`] field by field:
//! plain fields as their JSON encoding, id lists (`children`) as shared
//! arrays. Concurrent writes to different fields of one record both land,
//! and concurrent inserts into one children list interleave.

use super::ReplicaError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Array, ArrayPrelim, ArrayRef, Doc, Map, MapPrelim, MapRef, Out, ReadTxn, StateVector,
    Subscription, Transact, TransactionMut, Update,
};

pub const NODES_MAP: &str = "nodes";
pub const SCENES_MAP: &str = "scenes";

/// Fields stored as shared id arrays rather than JSON strings
pub const LIST_FIELDS: &[&str] = &["children"];

/// One node or scene as top-level field name to JSON value
pub type Record = serde_json::Map<String, Value>;

/// A record to bring the replica in line with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordWrite {
    pub record: Record,
    /// What the writer last exchanged for this record. Only fields that
    /// differ from it are written; `None` writes every field.
    pub base: Option<Record>,
}

/// Changes to one root map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapWrite {
    pub upserts: BTreeMap<String, RecordWrite>,
    pub removals: Vec<String>,
}

impl MapWrite {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }
}

/// One grouped write, committed as a single replica transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicaWrite {
    pub nodes: MapWrite,
    pub scenes: MapWrite,
}

impl ReplicaWrite {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.scenes.is_empty()
    }
}

/// A committed replica transaction as seen by observers.
///
/// `nodes`/`scenes` hold the full contents of each map after the commit.
#[derive(Debug, Clone)]
pub struct ReplicaEvent {
    pub origin: Option<Vec<u8>>,
    /// No origin: written directly against the replica on this peer
    pub local: bool,
    pub nodes: BTreeMap<String, Record>,
    pub scenes: BTreeMap<String, Record>,
}

impl ReplicaEvent {
    pub fn has_origin(&self, origin: &str) -> bool {
        self.origin.as_deref() == Some(origin.as_bytes())
    }
}

pub struct Replica {
    doc: Doc,
    nodes: MapRef,
    scenes: MapRef,
}

impl Replica {
    pub fn new() -> Self {
        Self::from_doc(Doc::new())
    }

    /// Fixed client id, for reproducible tests
    pub fn with_client_id(client_id: u64) -> Self {
        Self::from_doc(Doc::with_client_id(client_id))
    }

    fn from_doc(doc: Doc) -> Self {
        let nodes = doc.get_or_insert_map(NODES_MAP);
        let scenes = doc.get_or_insert_map(SCENES_MAP);
        Self { doc, nodes, scenes }
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Full state as a v1 update
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Everything a peer with `state_vector` is missing
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>, ReplicaError> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| ReplicaError::Decode(format!("state vector: {}", e)))?;
        let txn = self.doc.transact();
        Ok(txn.encode_diff_v1(&sv))
    }

    /// Apply an update received from `peer`, tagged with origin `remote:<peer>`
    pub fn apply_remote_update(&self, update: &[u8], peer: &str) -> Result<(), ReplicaError> {
        let update = Update::decode_v1(update)
            .map_err(|e| ReplicaError::Decode(format!("update from {}: {}", peer, e)))?;
        let origin = format!("remote:{peer}");
        let mut txn = self.doc.transact_mut_with(origin.as_str());
        txn.apply_update(update)
            .map_err(|e| ReplicaError::Apply(format!("update from {}: {}", peer, e)))
    }

    pub fn read_nodes(&self) -> BTreeMap<String, Record> {
        let txn = self.doc.transact();
        read_records(&self.nodes, &txn)
    }

    pub fn read_scenes(&self) -> BTreeMap<String, Record> {
        let txn = self.doc.transact();
        read_records(&self.scenes, &txn)
    }

    /// Commit `write` in one transaction tagged with `origin`
    pub fn write(&self, origin: &str, write: &ReplicaWrite) {
        if write.is_empty() {
            return;
        }
        let mut txn = self.doc.transact_mut_with(origin);
        self.write_in(&mut txn, write);
    }

    /// Write directly, without an origin. Observers see it as `local`.
    pub fn write_local(&self, write: &ReplicaWrite) {
        let mut txn = self.doc.transact_mut();
        self.write_in(&mut txn, write);
    }

    fn write_in(&self, txn: &mut TransactionMut, write: &ReplicaWrite) {
        for (map, changes) in [(&self.nodes, &write.nodes), (&self.scenes, &write.scenes)] {
            for (key, change) in &changes.upserts {
                write_record(txn, map, key, change);
            }
            for key in &changes.removals {
                map.remove(txn, key);
            }
        }
    }

    /// Call `f` after every committed transaction. The callback runs inside
    /// the commit and must not open another transaction on this replica.
    pub fn observe<F>(&self, f: F) -> Result<Subscription, ReplicaError>
    where
        F: Fn(ReplicaEvent) + Send + Sync + 'static,
    {
        let nodes = self.nodes.clone();
        let scenes = self.scenes.clone();
        self.doc
            .observe_update_v1(move |txn, _update| {
                let origin = txn.origin().map(|o| o.as_ref().to_vec());
                f(ReplicaEvent {
                    local: origin.is_none(),
                    origin,
                    nodes: read_records(&nodes, txn),
                    scenes: read_records(&scenes, txn),
                });
            })
            .map_err(|e| ReplicaError::Observe(format!("{:?}", e)))
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("client_id", &self.doc.client_id())
            .finish()
    }
}

fn id_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn write_record(txn: &mut TransactionMut, map: &MapRef, key: &str, change: &RecordWrite) {
    let existing = map.get(&*txn, key).and_then(|out| out.cast::<MapRef>().ok());
    let (entry, base) = match existing {
        Some(entry) => (entry, change.base.clone().unwrap_or_default()),
        None => (map.insert(txn, key, MapPrelim::default()), Record::new()),
    };

    for (field, value) in &change.record {
        let before = base.get(field);
        if before == Some(value) {
            continue;
        }
        let list = LIST_FIELDS
            .contains(&field.as_str())
            .then(|| id_list(value))
            .flatten();
        match list {
            Some(next) => {
                let base_list = before.and_then(id_list).unwrap_or_default();
                write_list(txn, &entry, field, &base_list, &next);
            }
            None => {
                entry.insert(txn, field.as_str(), value.to_string());
            }
        }
    }
    for field in base.keys() {
        if !change.record.contains_key(field) {
            entry.remove(txn, field);
        }
    }
}

/// Replays the edits that turn `base` into `next` onto the shared array, so
/// ids another peer inserted meanwhile keep their place.
fn write_list(
    txn: &mut TransactionMut,
    entry: &MapRef,
    field: &str,
    base: &[String],
    next: &[String],
) {
    let array = match entry.get(&*txn, field).and_then(|out| out.cast::<ArrayRef>().ok()) {
        Some(array) => array,
        None => {
            entry.insert(txn, field, ArrayPrelim::from(next.to_vec()));
            return;
        }
    };

    let stable = stable_items(base, next);
    let mut current: Vec<String> = array
        .iter(&*txn)
        .filter_map(|out| out.cast::<String>().ok())
        .collect();

    for id in base.iter().filter(|id| !stable.contains(id.as_str())) {
        if let Some(pos) = current.iter().position(|c| c == id) {
            array.remove(txn, pos as u32);
            current.remove(pos);
        }
    }

    for (i, id) in next.iter().enumerate() {
        if stable.contains(id.as_str()) {
            continue;
        }
        if let Some(pos) = current.iter().position(|c| c == id) {
            array.remove(txn, pos as u32);
            current.remove(pos);
        }
        let at = next[..i]
            .iter()
            .rev()
            .find_map(|prev| current.iter().position(|c| c == prev))
            .map_or(0, |pos| pos + 1);
        array.insert(txn, at as u32, id.clone());
        current.insert(at, id.clone());
    }
}

/// Items of `next` that keep their relative order from `base` (longest
/// common subsequence)
fn stable_items<'a>(base: &[String], next: &'a [String]) -> BTreeSet<&'a str> {
    let (n, m) = (base.len(), next.len());
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if base[i] == next[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut stable = BTreeSet::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if base[i] == next[j] {
            stable.insert(next[j].as_str());
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    stable
}

fn read_records<T: ReadTxn>(map: &MapRef, txn: &T) -> BTreeMap<String, Record> {
    map.iter(txn)
        .filter_map(|(key, value)| {
            let entry = value.cast::<MapRef>().ok()?;
            Some((key.to_string(), read_record(&entry, txn)))
        })
        .collect()
}

fn read_record<T: ReadTxn>(entry: &MapRef, txn: &T) -> Record {
    entry
        .iter(txn)
        .filter_map(|(field, value)| {
            let value = match value {
                Out::YArray(array) => Value::Array(
                    array
                        .iter(txn)
                        .filter_map(|out| out.cast::<String>().ok())
                        .map(Value::String)
                        .collect(),
                ),
                other => serde_json::from_str(&other.cast::<String>().ok()?).ok()?,
            };
            Some((field.to_string(), value))
        })
        .collect()
}
