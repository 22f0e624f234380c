//! Connected participants and their display colors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identity of one connection. A reconnecting client gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Allocate a new random peer id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a participant while present.
///
/// A peer is `Connected` after the transport handshake and becomes `Active`
/// with its first drawing event. Leaving removes the entry entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    Connected,
    Active,
}

/// What other participants see about a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// CSS color used for the peer's cursor and name.
    pub color: String,
    #[serde(skip)]
    pub state: PeerState,
}

/// Stable, vivid display color for a peer.
pub fn presence_color(peer: PeerId) -> String {
    let hue = peer.as_uuid().as_u128() % 360;
    format!("hsl({hue}, 100%, 50%)")
}

/// The set of connected participants.
#[derive(Debug, Default)]
pub struct Presence {
    peers: BTreeMap<PeerId, PresenceEntry>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer, assigning its color.
    pub fn join(&mut self, peer: PeerId) -> &PresenceEntry {
        self.peers.entry(peer).or_insert_with(|| PresenceEntry {
            color: presence_color(peer),
            state: PeerState::Connected,
        })
    }

    /// Remove a peer. Returns its entry if it was present.
    pub fn leave(&mut self, peer: PeerId) -> Option<PresenceEntry> {
        self.peers.remove(&peer)
    }

    /// Mark a peer as drawing. Returns true on the `Connected → Active`
    /// transition.
    pub fn mark_active(&mut self, peer: PeerId) -> bool {
        match self.peers.get_mut(&peer) {
            Some(entry) if entry.state == PeerState::Connected => {
                entry.state = PeerState::Active;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, peer: PeerId) -> Option<&PresenceEntry> {
        self.peers.get(&peer)
    }

    pub fn color(&self, peer: PeerId) -> Option<&str> {
        self.peers.get(&peer).map(|entry| entry.color.as_str())
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    /// All peers, ordered by id.
    pub fn users(&self) -> &BTreeMap<PeerId, PresenceEntry> {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
