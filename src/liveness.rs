use std::collections::{HashMap, HashSet};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::ids::{OwnerId, PeerId, TorrentId};

/// What happened to a watched identity. Consumed by the scheduler's
/// own event loop, the same way the teacher's `Download::work` drains
/// its `peers_handles` `JoinSet` inline in its `select!` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    OwnerDied(OwnerId, TorrentId),
    PeerDied(PeerId),
}

/// Watches the lifetime of torrent owners and peer workers (§4.3).
/// The two populations are tracked in separate maps — rather than one
/// map keyed by a common identity — so that which handler runs is
/// decided by which map a watch task was spawned from, never by
/// inspecting the identity at death time (§4.3: "tracked in separate
/// structures so the classification is deterministic").
///
/// Per §9's cycle-breaking note, the tracker never holds a peer's
/// private state, only its `CancellationToken`: a one-way subscription
/// to a "terminated" signal the peer session owns.
#[derive(Default)]
pub struct PeerLivenessTracker {
    owners: HashMap<OwnerId, TorrentId>,
    peers: HashSet<PeerId>,
    watchers: JoinSet<LivenessEvent>,
}

impl PeerLivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `owner` for `torrent`. Idempotent for the same
    /// owner (§4.2 `register_torrent`'s idempotence requirement): a
    /// second call with the same owner does not spawn a second watch.
    pub fn watch_owner(&mut self, owner: OwnerId, torrent: TorrentId, token: CancellationToken) {
        if self.owners.insert(owner, torrent).is_some() {
            return;
        }
        self.watchers.spawn(async move {
            token.cancelled().await;
            LivenessEvent::OwnerDied(owner, torrent)
        });
    }

    pub fn is_watching_owner(&self, owner: OwnerId) -> bool {
        self.owners.contains_key(&owner)
    }

    /// Start watching `peer`. A peer becomes monitored "on its first
    /// successful `pick_blocks`" (§3); calling this again for an
    /// already-watched peer is a no-op.
    pub fn watch_peer(&mut self, peer: PeerId, token: CancellationToken) {
        if !self.peers.insert(peer) {
            return;
        }
        self.watchers.spawn(async move {
            token.cancelled().await;
            LivenessEvent::PeerDied(peer)
        });
    }

    pub fn is_watching_peer(&self, peer: PeerId) -> bool {
        self.peers.contains(&peer)
    }

    /// Drop the bookkeeping for a dead owner. Call once the scheduler
    /// has finished purging `torrent`'s block entries.
    pub fn forget_owner(&mut self, owner: &OwnerId) {
        self.owners.remove(owner);
    }

    /// Drop the bookkeeping for a dead peer. Call once the scheduler
    /// has finished `putback`ing the peer's reservations.
    pub fn forget_peer(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    /// Whether any watch task is outstanding. Guards the `join_next`
    /// branch of the scheduler's `select!` — an empty `JoinSet`
    /// resolves `join_next` to `None` immediately rather than
    /// pending, so the branch must be disabled while empty or the
    /// event loop would spin.
    pub fn has_pending(&self) -> bool {
        !self.watchers.is_empty()
    }

    /// Await the next terminated identity. Only meaningful when
    /// `has_pending()` is true; see that method's doc.
    pub async fn join_next(&mut self) -> Option<Result<LivenessEvent, tokio::task::JoinError>> {
        self.watchers.join_next().await
    }
}
