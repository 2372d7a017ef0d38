//! # Presence
//!
//! Ephemeral per-participant state: where each cursor is, what it has
//! selected, and its latest chat bubble. Nothing here is persisted,
//! recorded in history or replicated through the document; a peer that
//! disconnects simply disappears.
//!
//! The local participant's state is kept as three slices that change at
//! different rates. Any slice update reassembles one [`PresenceRecord`] and
//! hands it to the transport:
//!
//! - `geo` (camera, pointer, marquee anchor) throttled on the fast interval
//! - `focus` (scene, selection) throttled on the medium interval
//! - `cursor_chat` sent as soon as it is edited
//!
//! Incoming records are merged last-writer-wins by `t`, keyed by cursor id.
//!
//! A participant may follow one peer. Every accepted record from that peer
//! leaves its camera transform for the host to apply to the local store.

use crate::clock::Clock;
use crate::config::EditorConfig;
use crate::throttle::Throttle;
use canvas_schema::{EditorState, NodeId, SceneId, Transform, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceProfile {
    /// Shade ("50" .. "950") to color
    pub palette: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusSlice {
    pub scene_id: Option<SceneId>,
    pub selection: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometrySlice {
    pub transform: Transform,
    pub position: Vector2,
    /// Marquee start; the rect spans to `position`
    pub marquee_a: Option<Vector2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorChat {
    pub txt: String,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub cursor_id: String,
    /// Milliseconds since the epoch when the record was assembled
    pub t: i64,
    pub profile: PresenceProfile,
    pub focus: FocusSlice,
    pub geo: GeometrySlice,
    pub cursor_chat: Option<CursorChat>,
}

pub trait PresenceTransport: Send + Sync {
    fn broadcast(&self, record: &PresenceRecord);
}

impl PresenceTransport for mpsc::UnboundedSender<PresenceRecord> {
    fn broadcast(&self, record: &PresenceRecord) {
        if self.send(record.clone()).is_err() {
            debug!("[Presence] transport closed, record for {} dropped", record.cursor_id);
        }
    }
}

pub struct PresenceChannel<T: PresenceTransport> {
    transport: T,
    cursor_id: String,
    profile: PresenceProfile,
    geo: GeometrySlice,
    focus: FocusSlice,
    chat: Option<CursorChat>,
    geo_throttle: Throttle,
    focus_throttle: Throttle,
    chat_lifetime_ms: i64,
    clock: Arc<dyn Clock>,
    peers: BTreeMap<String, PresenceRecord>,
    following: Option<String>,
    follow_camera: Option<Transform>,
}

impl<T: PresenceTransport> PresenceChannel<T> {
    pub fn new(
        cursor_id: impl Into<String>,
        profile: PresenceProfile,
        transport: T,
        config: &EditorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            cursor_id: cursor_id.into(),
            profile,
            geo: GeometrySlice::default(),
            focus: FocusSlice::default(),
            chat: None,
            geo_throttle: Throttle::new(config.presence_geometry_throttle()),
            focus_throttle: Throttle::new(config.presence_focus_throttle()),
            chat_lifetime_ms: config.chat_lifetime_ms,
            clock,
            peers: BTreeMap::new(),
            following: None,
            follow_camera: None,
        }
    }

    pub fn cursor_id(&self) -> &str {
        &self.cursor_id
    }

    /// The record this participant currently publishes
    pub fn local(&self) -> PresenceRecord {
        PresenceRecord {
            cursor_id: self.cursor_id.clone(),
            t: self.clock.now_ms(),
            profile: self.profile.clone(),
            focus: self.focus.clone(),
            geo: self.geo.clone(),
            cursor_chat: self.chat.clone(),
        }
    }

    fn broadcast(&self) {
        let record = self.local();
        trace!("[Presence] broadcast {} at {}", record.cursor_id, record.t);
        self.transport.broadcast(&record);
    }

    /// Returns `true` if a record went out right away
    pub fn update_geometry(&mut self, geo: GeometrySlice, now: Instant) -> bool {
        self.geo = geo;
        let fire = self.geo_throttle.hit(now);
        if fire {
            self.broadcast();
        }
        fire
    }

    pub fn update_focus(&mut self, focus: FocusSlice, now: Instant) -> bool {
        self.focus = focus;
        let fire = self.focus_throttle.hit(now);
        if fire {
            self.broadcast();
        }
        fire
    }

    /// Set or clear the chat bubble. Always sent immediately.
    pub fn update_chat(&mut self, message: Option<String>) {
        self.chat = message.map(|txt| CursorChat {
            txt,
            ts: self.clock.now_ms(),
        });
        self.broadcast();
    }

    /// Derive the geometry and focus slices from editor state, publishing
    /// whichever changed
    pub fn observe_state(&mut self, state: &EditorState, now: Instant) {
        let geo = GeometrySlice {
            transform: state.transform,
            position: state.pointer,
            marquee_a: state.marquee.map(|m| m.anchor),
        };
        if geo != self.geo {
            self.update_geometry(geo, now);
        }

        let focus = FocusSlice {
            scene_id: state.scene_id.clone(),
            selection: state.selection.clone(),
        };
        if focus != self.focus {
            self.update_focus(focus, now);
        }
    }

    /// Flush trailing slice updates whose interval has elapsed. One record
    /// covers both slices.
    pub fn tick(&mut self, now: Instant) -> bool {
        let geo = self.geo_throttle.take_trailing(now);
        let focus = self.focus_throttle.take_trailing(now);
        if geo || focus {
            self.broadcast();
        }
        geo || focus
    }

    /// Merge an incoming record. Returns `true` if it replaced the view of
    /// that peer. Records for the local cursor are dropped.
    pub fn receive(&mut self, record: PresenceRecord) -> bool {
        if record.cursor_id == self.cursor_id {
            return false;
        }
        if let Some(existing) = self.peers.get(&record.cursor_id) {
            if existing.t > record.t {
                trace!("[Presence] stale record for {} ignored", record.cursor_id);
                return false;
            }
        }
        if self.following.as_deref() == Some(record.cursor_id.as_str()) {
            self.follow_camera = Some(record.geo.transform);
        }
        self.peers.insert(record.cursor_id.clone(), record);
        true
    }

    /// Forget a peer that left. Following it stops.
    pub fn close(&mut self, cursor_id: &str) -> Option<PresenceRecord> {
        let removed = self.peers.remove(cursor_id);
        if removed.is_some() {
            debug!("[Presence] {} left", cursor_id);
        }
        if self.following.as_deref() == Some(cursor_id) {
            self.unfollow();
        }
        removed
    }

    /// Track `cursor_id`'s camera. Returns its last known transform, to be
    /// applied right away. The local cursor cannot be followed.
    pub fn follow(&mut self, cursor_id: &str) -> Option<Transform> {
        if cursor_id == self.cursor_id {
            return None;
        }
        debug!("[Presence] following {}", cursor_id);
        self.following = Some(cursor_id.to_string());
        self.follow_camera = None;
        self.peers.get(cursor_id).map(|peer| peer.geo.transform)
    }

    pub fn unfollow(&mut self) -> Option<String> {
        self.follow_camera = None;
        let previous = self.following.take();
        if let Some(id) = &previous {
            debug!("[Presence] stopped following {}", id);
        }
        previous
    }

    pub fn following(&self) -> Option<&str> {
        self.following.as_deref()
    }

    /// The followed peer's camera from the latest record accepted since the
    /// last call
    pub fn take_follow_camera(&mut self) -> Option<Transform> {
        self.follow_camera.take()
    }

    /// Peers sorted by cursor id
    pub fn peers(&self) -> impl Iterator<Item = &PresenceRecord> {
        self.peers.values()
    }

    pub fn peer(&self, cursor_id: &str) -> Option<&PresenceRecord> {
        self.peers.get(cursor_id)
    }

    /// Peers as they should be shown at `now_ms`: chat bubbles older than
    /// the configured lifetime are hidden
    pub fn peers_at(&self, now_ms: i64) -> Vec<PresenceRecord> {
        self.peers
            .values()
            .cloned()
            .map(|mut record| {
                if record
                    .cursor_chat
                    .as_ref()
                    .is_some_and(|chat| now_ms - chat.ts > self.chat_lifetime_ms)
                {
                    record.cursor_chat = None;
                }
                record
            })
            .collect()
    }
}

impl<T: PresenceTransport> std::fmt::Debug for PresenceChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceChannel")
            .field("cursor_id", &self.cursor_id)
            .field("peers", &self.peers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn channel(
        id: &str,
    ) -> (
        PresenceChannel<mpsc::UnboundedSender<PresenceRecord>>,
        mpsc::UnboundedReceiver<PresenceRecord>,
        Arc<ManualClock>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = Arc::new(ManualClock::new(1_000));
        let channel = PresenceChannel::new(
            id,
            PresenceProfile::default(),
            tx,
            &EditorConfig::default(),
            clock.clone(),
        );
        (channel, rx, clock)
    }

    fn record(id: &str, t: i64) -> PresenceRecord {
        PresenceRecord {
            cursor_id: id.into(),
            t,
            profile: PresenceProfile::default(),
            focus: FocusSlice::default(),
            geo: GeometrySlice::default(),
            cursor_chat: None,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PresenceRecord>) -> Vec<PresenceRecord> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(record);
        }
        out
    }

    #[test]
    fn test_later_record_wins() {
        let (mut channel, _rx, _) = channel("me");
        let mut newer = record("peer", 20);
        newer.focus.selection = vec!["a".into()];

        assert!(channel.receive(newer.clone()));
        assert!(!channel.receive(record("peer", 10)));
        assert_eq!(channel.peer("peer"), Some(&newer));
    }

    #[test]
    fn test_own_record_is_excluded() {
        let (mut channel, _rx, _) = channel("me");
        assert!(!channel.receive(record("me", 5)));
        assert_eq!(channel.peers().count(), 0);
    }

    #[test]
    fn test_close_forgets_peer() {
        let (mut channel, _rx, _) = channel("me");
        channel.receive(record("b", 1));
        channel.receive(record("a", 1));
        let ids: Vec<_> = channel.peers().map(|p| p.cursor_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(channel.close("a").is_some());
        assert!(channel.close("a").is_none());
        assert_eq!(channel.peers().count(), 1);
    }

    #[test]
    fn test_geometry_is_throttled_with_trailing_flush() {
        let (mut channel, mut rx, _) = channel("me");
        let start = Instant::now();
        let at = |x: f64| GeometrySlice {
            position: [x, 0.0],
            ..GeometrySlice::default()
        };

        assert!(channel.update_geometry(at(1.0), start));
        assert!(!channel.update_geometry(at(2.0), start + Duration::from_millis(10)));
        assert!(!channel.update_geometry(at(3.0), start + Duration::from_millis(20)));
        assert!(!channel.tick(start + Duration::from_millis(25)));
        assert!(channel.tick(start + Duration::from_millis(30)));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].geo.position, [3.0, 0.0]);
    }

    #[test]
    fn test_every_record_carries_all_slices() {
        let (mut channel, mut rx, _) = channel("me");
        let now = Instant::now();
        channel.update_focus(
            FocusSlice {
                scene_id: Some("main".into()),
                selection: vec!["a".into()],
            },
            now,
        );
        channel.update_chat(Some("hi".into()));

        let sent = drain(&mut rx);
        let last = sent.last().unwrap();
        assert_eq!(last.focus.selection, vec!["a".to_string()]);
        assert_eq!(last.cursor_chat.as_ref().map(|c| c.txt.as_str()), Some("hi"));
    }

    #[test]
    fn test_observe_state_publishes_changed_slices() {
        use canvas_schema::{Document, Node, ParentRef};

        let (mut channel, mut rx, _) = channel("me");
        let mut doc = Document::with_scene("main", "Main");
        doc.attach(Node::rectangle("a"), &ParentRef::Scene("main".into()), None)
            .unwrap();
        let mut state = EditorState::new(doc).unwrap();
        state.selection = vec!["a".into()];
        state.pointer = [4.0, 2.0];

        let now = Instant::now();
        channel.observe_state(&state, now);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].geo.position, [4.0, 2.0]);
        assert_eq!(sent[1].focus.scene_id.as_deref(), Some("main"));

        channel.observe_state(&state, now + Duration::from_secs(1));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_expired_chat_is_hidden() {
        let (mut channel, _rx, _) = channel("me");
        let mut peer = record("peer", 10);
        peer.cursor_chat = Some(CursorChat {
            txt: "hello".into(),
            ts: 10,
        });
        channel.receive(peer);

        assert!(channel.peers_at(1_000)[0].cursor_chat.is_some());
        assert!(channel.peers_at(10 + 5_001)[0].cursor_chat.is_none());
        assert!(channel.peer("peer").unwrap().cursor_chat.is_some());
    }

    fn record_at_camera(id: &str, t: i64, tx: f64) -> PresenceRecord {
        let mut record = record(id, t);
        record.geo.transform = Transform::IDENTITY.translated(tx, 0.0);
        record
    }

    #[test]
    fn test_follow_tracks_peer_camera() {
        let (mut channel, _rx, _) = channel("me");
        channel.receive(record_at_camera("peer", 1, 10.0));

        assert_eq!(channel.follow("peer"), Some(Transform::IDENTITY.translated(10.0, 0.0)));
        assert_eq!(channel.following(), Some("peer"));
        assert_eq!(channel.take_follow_camera(), None);

        channel.receive(record_at_camera("other", 2, 99.0));
        assert_eq!(channel.take_follow_camera(), None);

        channel.receive(record_at_camera("peer", 3, 20.0));
        channel.receive(record_at_camera("peer", 2, 15.0));
        assert_eq!(channel.take_follow_camera(), Some(Transform::IDENTITY.translated(20.0, 0.0)));
        assert_eq!(channel.take_follow_camera(), None);
    }

    #[test]
    fn test_unfollow_and_close_stop_tracking() {
        let (mut channel, _rx, _) = channel("me");
        assert_eq!(channel.follow("me"), None);
        assert_eq!(channel.following(), None);

        assert_eq!(channel.follow("peer"), None);
        channel.receive(record_at_camera("peer", 1, 5.0));
        assert_eq!(channel.unfollow().as_deref(), Some("peer"));
        assert_eq!(channel.take_follow_camera(), None);
        channel.receive(record_at_camera("peer", 2, 6.0));
        assert_eq!(channel.take_follow_camera(), None);

        channel.follow("peer");
        channel.close("peer");
        assert_eq!(channel.following(), None);
    }
}
