use std::fmt::Display;

use uuid::Uuid;

/// Identifies a torrent registered with the scheduler.
///
/// Opaque on purpose: the scheduler never inspects a torrent's
/// metadata, only compares and hashes this token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TorrentId(Uuid);

impl TorrentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TorrentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TorrentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TorrentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Identity token of a peer session minted by the peer session
/// subsystem. Comparable, hashable, cheap to copy; carries no
/// reference back into the peer's own state (see `liveness`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PeerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Identity of whoever called `register_torrent`. Distinct type from
/// `PeerId` so the liveness tracker's two populations (§4.3) can never
/// be confused by the type system, even though both happen to be
/// backed by the same representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OwnerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}
