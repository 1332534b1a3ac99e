//! Peer registry and presence.
//!
//! The registry is the single writer of peer presence and media flags.
//! Notifications are applied in arrival order through `apply`. The exposed
//! list never contains the local participant, matched by session-assigned
//! id or by display name.

use common::protocol::{PeerDetails, ServerNotification};
use common::types::{MediaKind, PeerId};

/// A remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: PeerId,
    pub display_name: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl From<PeerDetails> for Peer {
    fn from(details: PeerDetails) -> Self {
        Self {
            id: details.id,
            display_name: details.display_name,
            audio_enabled: details.audio_enabled,
            video_enabled: details.video_enabled,
        }
    }
}

/// What a notification did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// Peers inserted or replaced; exposed list may differ.
    Membership,
    /// A peer's flags changed.
    MediaState { peer_id: PeerId },
    /// Nothing changed (unknown peer, duplicate state).
    None,
}

#[derive(Debug, Clone)]
pub struct PeerRegistry {
    local_display_name: String,
    local_peer_id: Option<PeerId>,
    peers: Vec<Peer>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new(local_display_name: impl Into<String>, local_peer_id: Option<PeerId>) -> Self {
        Self {
            local_display_name: local_display_name.into(),
            local_peer_id,
            peers: Vec::new(),
        }
    }

    #[must_use]
    pub fn local_peer_id(&self) -> Option<&PeerId> {
        self.local_peer_id.as_ref()
    }

    pub fn set_local_peer_id(&mut self, peer_id: PeerId) {
        self.local_peer_id = Some(peer_id);
    }

    /// Apply one inbound notification.
    pub fn apply(&mut self, notification: ServerNotification) -> RegistryChange {
        match notification {
            ServerNotification::PeerJoined(details) => {
                self.insert(Peer::from(details));
                RegistryChange::Membership
            }
            ServerNotification::PeerLeft(left) => {
                if self.remove(&left.id).is_some() {
                    RegistryChange::Membership
                } else {
                    RegistryChange::None
                }
            }
            ServerNotification::SetAvailablePeers(snapshot) => {
                self.replace_all(snapshot.other_peer_details);
                RegistryChange::Membership
            }
            ServerNotification::PeerMediaStateChanged(change) => {
                if self.set_media_state(&change.peer_id, change.kind, change.enabled) {
                    RegistryChange::MediaState {
                        peer_id: change.peer_id,
                    }
                } else {
                    RegistryChange::None
                }
            }
        }
    }

    /// Insert a joined peer with its announced flags. A known id is replaced in place.
    pub fn insert(&mut self, peer: Peer) {
        match self.peers.iter_mut().find(|p| p.id == peer.id) {
            Some(existing) => *existing = peer,
            None => self.peers.push(peer),
        }
    }

    pub fn remove(&mut self, peer_id: &PeerId) -> Option<Peer> {
        let index = self.peers.iter().position(|p| &p.id == peer_id)?;
        Some(self.peers.remove(index))
    }

    /// Clear and repopulate from a roster snapshot.
    pub fn replace_all(&mut self, roster: Vec<PeerDetails>) {
        self.peers.clear();
        for details in roster {
            self.insert(Peer::from(details));
        }
    }

    /// Update one flag. Returns whether the value changed.
    pub fn set_media_state(&mut self, peer_id: &PeerId, kind: MediaKind, enabled: bool) -> bool {
        let Some(peer) = self.peers.iter_mut().find(|p| &p.id == peer_id) else {
            return false;
        };
        let flag = match kind {
            MediaKind::Audio => &mut peer.audio_enabled,
            MediaKind::Video => &mut peer.video_enabled,
        };
        let changed = *flag != enabled;
        *flag = enabled;
        changed
    }

    /// Whether `peer` is the local participant.
    #[must_use]
    pub fn is_local(&self, peer: &Peer) -> bool {
        self.local_peer_id.as_ref() == Some(&peer.id) || peer.display_name == self.local_display_name
    }

    /// Peers in insertion order, local participant excluded.
    #[must_use]
    pub fn exposed(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .filter(|p| !self.is_local(p))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn exposed_ids(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|p| !self.is_local(p))
            .map(|p| p.id.clone())
            .collect()
    }

    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.id == peer_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
