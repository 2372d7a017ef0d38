//! Store ⇄ replica bridge.
//!
//! The bridge keeps a shadow of what it last exchanged with the replica,
//! record by record. Upstream writes only the fields whose local value
//! differs from the shadow and removes records the local document dropped.
//! Downstream takes only the fields the replica changed relative to the
//! shadow, so a local edit that is not pushed yet survives an import of
//! another field of the same record. A node removed by a remote peer stays
//! local (removals are not imported) and, as long as it is unchanged
//! locally, is not written back either.

use super::replica::{MapWrite, Record, RecordWrite, Replica, ReplicaEvent, ReplicaWrite};
use super::ReplicaError;
use crate::mutex::ReentrancyMutex;
use crate::store::{SharedStore, StoreEvent, SubscriptionId};
use canvas_schema::EditorState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;
use yrs::Subscription;

const NEVER_PUSHED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed { writes: usize },
    /// Transaction counter unchanged since the last push
    UpToDate,
    Locked,
    /// An import is running on this call chain; retried on the next tick
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Local or own-origin event
    Ignored,
    Unchanged,
    Applied { nodes: usize, scenes: usize },
    /// Mutex held; the next remote event resyncs
    Skipped,
    Failed,
}

#[derive(Debug, Default)]
struct Shadow {
    nodes: BTreeMap<String, Record>,
    scenes: BTreeMap<String, Record>,
}

struct BridgeInner {
    origin: String,
    replica: Arc<Replica>,
    store: SharedStore,
    mutex: ReentrancyMutex,
    shadow: Mutex<Shadow>,
    last_pushed: Arc<AtomicU64>,
    throttle: Duration,
}

impl BridgeInner {
    fn shadow(&self) -> MutexGuard<'_, Shadow> {
        self.shadow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sync_upstream(&self) -> Result<PushOutcome, ReplicaError> {
        let (state, locked) = {
            let store = self.store.read().map_err(|_| ReplicaError::Poisoned)?;
            (store.state(), store.is_locked())
        };
        if locked {
            debug!("[ReplicaSync] store locked, push skipped");
            return Ok(PushOutcome::Locked);
        }

        let transaction_id = state.transaction_id;
        if self.last_pushed.load(Ordering::Acquire) == transaction_id {
            return Ok(PushOutcome::UpToDate);
        }

        match self.mutex.try_run(|| self.push(&state)) {
            Some(Ok(writes)) => {
                self.last_pushed.store(transaction_id, Ordering::Release);
                if writes > 0 {
                    debug!(
                        "[ReplicaSync] pushed {} change(s) at transaction {}",
                        writes, transaction_id
                    );
                }
                Ok(PushOutcome::Pushed { writes })
            }
            Some(Err(err)) => Err(err),
            None => {
                debug!("[ReplicaSync] busy, push deferred");
                Ok(PushOutcome::Busy)
            }
        }
    }

    fn push(&self, state: &EditorState) -> Result<usize, ReplicaError> {
        let nodes = encode_all("node", &state.document.nodes)?;
        let scenes = encode_all("scene", &state.document.scenes)?;

        let write = {
            let shadow = self.shadow();
            ReplicaWrite {
                nodes: plan(&nodes, &shadow.nodes),
                scenes: plan(&scenes, &shadow.scenes),
            }
        };
        let writes = write.nodes.len() + write.scenes.len();

        self.replica.write(&self.origin, &write);
        *self.shadow() = Shadow { nodes, scenes };
        Ok(writes)
    }

    fn handle_event(&self, event: ReplicaEvent) -> BridgeOutcome {
        if event.local || event.has_origin(&self.origin) {
            return BridgeOutcome::Ignored;
        }
        self.mutex.run(
            || self.import(&event.nodes, &event.scenes),
            || {
                debug!("[ReplicaSync] busy, remote change skipped");
                BridgeOutcome::Skipped
            },
        )
    }

    fn import(
        &self,
        nodes: &BTreeMap<String, Record>,
        scenes: &BTreeMap<String, Record>,
    ) -> BridgeOutcome {
        let (changed_nodes, changed_scenes, node_bases, scene_bases) = {
            let shadow = self.shadow();
            let changed_nodes = changed(nodes, &shadow.nodes);
            let changed_scenes = changed(scenes, &shadow.scenes);
            let node_bases = bases(&changed_nodes, &shadow.nodes);
            let scene_bases = bases(&changed_scenes, &shadow.scenes);
            (changed_nodes, changed_scenes, node_bases, scene_bases)
        };
        if changed_nodes.is_empty() && changed_scenes.is_empty() {
            return BridgeOutcome::Unchanged;
        }

        let mut imported_nodes = Vec::new();
        let mut imported_scenes = Vec::new();
        let applied = match self.store.write() {
            Ok(mut store) => store.apply(|state| {
                imported_nodes =
                    merge_into("node", &mut state.document.nodes, &changed_nodes, &node_bases);
                imported_scenes = merge_into(
                    "scene",
                    &mut state.document.scenes,
                    &changed_scenes,
                    &scene_bases,
                );
                state.rebuild_context();
            }),
            Err(_) => {
                warn!("[ReplicaSync] store lock poisoned, remote change dropped");
                return BridgeOutcome::Failed;
            }
        };

        match applied {
            Ok(_) => {
                let outcome = BridgeOutcome::Applied {
                    nodes: imported_nodes.len(),
                    scenes: imported_scenes.len(),
                };
                let mut shadow = self.shadow();
                for id in imported_nodes {
                    if let Some(record) = changed_nodes.get(&id) {
                        shadow.nodes.insert(id, record.clone());
                    }
                }
                for id in imported_scenes {
                    if let Some(record) = changed_scenes.get(&id) {
                        shadow.scenes.insert(id, record.clone());
                    }
                }
                debug!("[ReplicaSync] imported remote change: {:?}", outcome);
                outcome
            }
            Err(err) => {
                warn!("[ReplicaSync] remote change rejected: {}", err);
                BridgeOutcome::Failed
            }
        }
    }

    /// Settled means nothing is left to retry. A locked store keeps the
    /// driver ticking so a change made under the lock goes out on unlock.
    fn push_settled(&self) -> bool {
        match self.sync_upstream() {
            Ok(PushOutcome::Busy) | Ok(PushOutcome::Locked) => false,
            Ok(_) => true,
            Err(err) => {
                warn!("[ReplicaSync] push failed, retrying next tick: {}", err);
                false
            }
        }
    }
}

/// Keeps one store mirrored into one replica.
///
/// Dropping the bridge detaches it from both. Neither a drop nor a remote
/// update may happen while the caller holds the store lock.
pub struct ReplicaSyncBridge {
    inner: Arc<BridgeInner>,
    store_subscription: SubscriptionId,
    signals: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    _replica_subscription: Subscription,
}

impl ReplicaSyncBridge {
    pub fn new(
        replica: Arc<Replica>,
        store: SharedStore,
        throttle: Duration,
    ) -> Result<Self, ReplicaError> {
        let origin = format!("bridge:{}", Uuid::new_v4());
        let last_pushed = Arc::new(AtomicU64::new(NEVER_PUSHED));
        let inner = Arc::new(BridgeInner {
            origin,
            replica: Arc::clone(&replica),
            store: Arc::clone(&store),
            mutex: ReentrancyMutex::new(),
            shadow: Mutex::new(Shadow::default()),
            last_pushed: Arc::clone(&last_pushed),
            throttle,
        });

        let observer = Arc::downgrade(&inner);
        let replica_subscription = replica.observe(move |event| {
            if let Some(inner) = observer.upgrade() {
                inner.handle_event(event);
            }
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let store_subscription = store
            .write()
            .map_err(|_| ReplicaError::Poisoned)?
            .subscribe(Box::new(move |event| {
                if let StoreEvent::Reset { .. } = event {
                    last_pushed.store(NEVER_PUSHED, Ordering::Release);
                }
                if matches!(event, StoreEvent::Applied { .. }) || !event.touches_document() {
                    return;
                }
                let _ = sender.send(());
            }));

        info!("[ReplicaSync] attached as {}", inner.origin);
        Ok(Self {
            inner,
            store_subscription,
            signals: Mutex::new(Some(receiver)),
            _replica_subscription: replica_subscription,
        })
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn replica(&self) -> &Arc<Replica> {
        &self.inner.replica
    }

    /// Push the local document if the store is unlocked and has advanced
    /// since the last successful push. A failed push leaves the marker
    /// alone so the next call retries.
    pub fn sync_upstream(&self) -> Result<PushOutcome, ReplicaError> {
        self.inner.sync_upstream()
    }

    /// Import a replica event. Called by the replica observer; exposed for
    /// transports that surface events themselves.
    pub fn handle_replica_event(&self, event: ReplicaEvent) -> BridgeOutcome {
        self.inner.handle_event(event)
    }

    /// Import whatever the replica already holds (joining a session)
    pub fn pull(&self) -> BridgeOutcome {
        let nodes = self.inner.replica.read_nodes();
        let scenes = self.inner.replica.read_scenes();
        self.inner.mutex.run(
            || self.inner.import(&nodes, &scenes),
            || BridgeOutcome::Skipped,
        )
    }

    /// The throttled upstream loop. Can be taken once.
    pub fn take_upstream_driver(&self) -> Result<UpstreamDriver, ReplicaError> {
        let signals = self
            .signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ReplicaError::DriverTaken)?;
        Ok(UpstreamDriver {
            inner: Arc::clone(&self.inner),
            signals,
        })
    }

    /// Tear down the session: stop observing the replica and the store
    pub fn detach(self) {
        info!("[ReplicaSync] detaching {}", self.inner.origin);
    }
}

impl Drop for ReplicaSyncBridge {
    fn drop(&mut self) {
        match self.inner.store.write() {
            Ok(mut store) => {
                store.unsubscribe(self.store_subscription);
            }
            Err(_) => warn!("[ReplicaSync] store lock poisoned, listener left attached"),
        }
    }
}

impl std::fmt::Debug for ReplicaSyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSyncBridge")
            .field("origin", &self.inner.origin)
            .field("last_pushed", &self.inner.last_pushed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Pushes on the leading edge of a burst of document changes, then once
/// more per throttle interval while changes keep arriving, so the last
/// state of a burst is always written.
pub struct UpstreamDriver {
    inner: Arc<BridgeInner>,
    signals: mpsc::UnboundedReceiver<()>,
}

impl UpstreamDriver {
    /// Runs until the bridge is detached
    pub async fn run_upstream(mut self) {
        let interval = self.inner.throttle;
        while self.signals.recv().await.is_some() {
            let mut dirty = !self.inner.push_settled();
            loop {
                tokio::time::sleep(interval).await;
                let mut signalled = false;
                loop {
                    match self.signals.try_recv() {
                        Ok(()) => signalled = true,
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            debug!("[ReplicaSync] store listener gone, upstream stopped");
                            return;
                        }
                    }
                }
                if !dirty && !signalled {
                    break;
                }
                dirty = !self.inner.push_settled();
            }
        }
        debug!("[ReplicaSync] upstream stopped");
    }
}

fn encode_all<T: Serialize>(
    kind: &'static str,
    items: &BTreeMap<String, T>,
) -> Result<BTreeMap<String, Record>, ReplicaError> {
    items
        .iter()
        .map(|(id, item)| {
            let record = match serde_json::to_value(item) {
                Ok(Value::Object(record)) => Ok(record),
                Ok(_) => Err(<serde_json::Error as serde::ser::Error>::custom(
                    "expected a JSON object",
                )),
                Err(err) => Err(err),
            };
            record
                .map(|record| (id.clone(), record))
                .map_err(|source| ReplicaError::Encode {
                    kind,
                    id: id.clone(),
                    source,
                })
        })
        .collect()
}

/// Overlay each changed replica record on the local item and decode it.
/// Returns the ids that were taken.
fn merge_into<T: Serialize + DeserializeOwned>(
    kind: &'static str,
    items: &mut BTreeMap<String, T>,
    changed: &BTreeMap<String, Record>,
    bases: &BTreeMap<String, Record>,
) -> Vec<String> {
    let mut imported = Vec::new();
    for (id, remote) in changed {
        let merged = match items.get(id).map(serde_json::to_value) {
            Some(Ok(Value::Object(mut local))) => {
                overlay(&mut local, remote, bases.get(id));
                local
            }
            _ => remote.clone(),
        };
        match serde_json::from_value::<T>(Value::Object(merged)) {
            Ok(item) => {
                items.insert(id.clone(), item);
                imported.push(id.clone());
            }
            Err(err) => warn!("[ReplicaSync] undecodable {} '{}' skipped: {}", kind, id, err),
        }
    }
    imported
}

/// Fields the replica changed relative to `base` replace the local ones.
/// Fields it left alone keep local edits that are not pushed yet.
fn overlay(local: &mut Record, remote: &Record, base: Option<&Record>) {
    let fields: BTreeSet<&String> = remote
        .keys()
        .chain(base.into_iter().flat_map(|base| base.keys()))
        .collect();
    for field in fields {
        let theirs = remote.get(field);
        if theirs == base.and_then(|base| base.get(field)) {
            continue;
        }
        match theirs {
            Some(value) => {
                local.insert(field.clone(), value.clone());
            }
            None => {
                local.remove(field);
            }
        }
    }
}

fn plan(local: &BTreeMap<String, Record>, shadow: &BTreeMap<String, Record>) -> MapWrite {
    MapWrite {
        upserts: changed(local, shadow)
            .into_iter()
            .map(|(id, record)| {
                let base = shadow.get(&id).cloned();
                (id, RecordWrite { record, base })
            })
            .collect(),
        removals: shadow
            .keys()
            .filter(|key| !local.contains_key(*key))
            .cloned()
            .collect(),
    }
}

fn changed(
    current: &BTreeMap<String, Record>,
    shadow: &BTreeMap<String, Record>,
) -> BTreeMap<String, Record> {
    current
        .iter()
        .filter(|(key, value)| shadow.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn bases(
    changed: &BTreeMap<String, Record>,
    shadow: &BTreeMap<String, Record>,
) -> BTreeMap<String, Record> {
    changed
        .keys()
        .filter_map(|id| shadow.get(id).map(|base| (id.clone(), base.clone())))
        .collect()
}
