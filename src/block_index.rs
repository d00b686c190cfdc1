use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::ids::{PeerId, TorrentId};

/// A block locator within a piece: byte offset and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Locator {
    pub offset: u32,
    pub length: u32,
}

/// Aggregate block counts for a torrent, broken down by status. See
/// `BlockIndex::torrent_counts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TorrentBlockCounts {
    pub not_fetched: usize,
    pub assigned: usize,
    pub fetched: usize,
}

/// Split a piece of `piece_length` bytes into fixed-size blocks of
/// `block_length` bytes, with a final short block if the piece does
/// not divide evenly (§4.1).
pub fn chunk_piece(piece_length: u32, block_length: u32) -> Vec<Locator> {
    let mut blocks = Vec::with_capacity(piece_length.div_ceil(block_length) as usize);
    let mut offset = 0;
    while offset < piece_length {
        let length = std::cmp::min(block_length, piece_length - offset);
        blocks.push(Locator { offset, length });
        offset += length;
    }
    blocks
}

/// The blocks of a single `(torrent, piece)` in each of the three
/// statuses §3 defines. Kept as three maps rather than one map over a
/// tagged status so that the query shapes in §4.1 ((a) exact lookup of
/// `not_fetched`, (d) wildcard-by-peer over `assigned`) are each O(1)
/// to set up rather than requiring a full scan-and-filter.
#[derive(Debug, Default, Clone)]
struct PieceBlocks {
    not_fetched: BTreeMap<u32, u32>,
    assigned: BTreeMap<u32, (u32, PeerId)>,
    fetched: BTreeSet<u32>,
}

impl PieceBlocks {
    fn is_empty(&self) -> bool {
        self.not_fetched.is_empty() && self.assigned.is_empty() && self.fetched.is_empty()
    }
}

/// The sole authority on "who has what block reserved" (§4.1). Owned
/// exclusively by the scheduler actor; never shared across tasks.
#[derive(Debug, Default)]
pub struct BlockIndex {
    pieces: HashMap<(TorrentId, usize), PieceBlocks>,
    /// Secondary index supporting the per-peer wildcard query (d) in
    /// §4.1 (`putback`, `assigned_for_peer`) without scanning every
    /// piece in the index.
    by_peer: HashMap<PeerId, HashSet<(TorrentId, usize, u32)>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `blocks` as `not_fetched` entries for `(torrent, piece)`
    /// (§4.1 chunking policy). Idempotent in practice only if called
    /// once per piece — callers must not chunkify an already-chunked
    /// piece.
    pub fn chunkify(&mut self, torrent: TorrentId, piece: usize, blocks: &[Locator]) {
        let entry = self.pieces.entry((torrent, piece)).or_default();
        for block in blocks {
            entry.not_fetched.insert(block.offset, block.length);
        }
    }

    /// Query shape (b): does any `not_fetched` entry exist for this
    /// piece?
    pub fn has_not_fetched(&self, torrent: TorrentId, piece: usize) -> bool {
        self.pieces
            .get(&(torrent, piece))
            .is_some_and(|p| !p.not_fetched.is_empty())
    }

    /// Query shape (a): all `not_fetched` entries for this piece, in
    /// ascending offset order (the tie-break §4.2 names).
    pub fn not_fetched_entries(&self, torrent: TorrentId, piece: usize) -> Vec<Locator> {
        self.pieces
            .get(&(torrent, piece))
            .map(|p| {
                p.not_fetched
                    .iter()
                    .map(|(&offset, &length)| Locator { offset, length })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All entries (`not_fetched` or `assigned`, regardless of peer)
    /// for this piece — used by the endgame collection step (§4.2).
    pub fn outstanding_entries(&self, torrent: TorrentId, piece: usize) -> Vec<Locator> {
        let Some(p) = self.pieces.get(&(torrent, piece)) else {
            return Vec::new();
        };
        p.not_fetched
            .iter()
            .map(|(&offset, &length)| Locator { offset, length })
            .chain(
                p.assigned
                    .iter()
                    .map(|(&offset, &(length, _))| Locator { offset, length }),
            )
            .collect()
    }

    /// Piece indices that currently have any entry at all for this
    /// torrent (used to scope the endgame sweep to pieces the
    /// scheduler still knows about).
    pub fn pieces_in_progress(&self, torrent: TorrentId) -> Vec<usize> {
        let mut pieces: Vec<usize> = self
            .pieces
            .keys()
            .filter(|(t, _)| *t == torrent)
            .map(|(_, p)| *p)
            .collect();
        pieces.sort_unstable();
        pieces
    }

    /// §4.2 step 4 / the `select_by_piece` operation: atomically move
    /// up to `max` `not_fetched` entries of `piece` into
    /// `{assigned, peer}`. Returns the moved locators, ascending
    /// offset. Empty if the piece has no `not_fetched` entries (the
    /// caller treats this as `already_taken`).
    pub fn reserve(
        &mut self,
        torrent: TorrentId,
        piece: usize,
        peer: PeerId,
        max: usize,
    ) -> Vec<Locator> {
        let Some(entry) = self.pieces.get_mut(&(torrent, piece)) else {
            return Vec::new();
        };
        let offsets: Vec<u32> = entry.not_fetched.keys().take(max).copied().collect();
        let mut moved = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let length = entry.not_fetched.remove(&offset).expect("just queried");
            entry.assigned.insert(offset, (length, peer));
            self.by_peer
                .entry(peer)
                .or_default()
                .insert((torrent, piece, offset));
            moved.push(Locator { offset, length });
        }
        moved
    }

    /// §4.2, `mark_fetched`: if a `not_fetched` entry exists at this
    /// locator, delete it and return `true` ("found"). Otherwise
    /// return `false` ("assigned" — the block is reserved by someone).
    pub fn take_not_fetched(&mut self, torrent: TorrentId, piece: usize, offset: u32) -> bool {
        let Some(entry) = self.pieces.get_mut(&(torrent, piece)) else {
            return false;
        };
        let removed = entry.not_fetched.remove(&offset).is_some();
        if entry.is_empty() {
            self.pieces.remove(&(torrent, piece));
        }
        removed
    }

    /// §4.2, `endgame_release`: remove the single `{assigned, peer}`
    /// entry at this locator, if present.
    pub fn release_assignment(&mut self, torrent: TorrentId, piece: usize, offset: u32, peer: PeerId) {
        if let Some(entry) = self.pieces.get_mut(&(torrent, piece)) {
            if let Some((_, assigned_peer)) = entry.assigned.get(&offset) {
                if *assigned_peer == peer {
                    entry.assigned.remove(&offset);
                    if let Some(set) = self.by_peer.get_mut(&peer) {
                        set.remove(&(torrent, piece, offset));
                    }
                }
            }
            if entry.is_empty() {
                self.pieces.remove(&(torrent, piece));
            }
        }
    }

    /// §4.2 `store_block` step 3: delete *all* assignments of this
    /// block locator regardless of which peer held them (§9's
    /// resolved open question — endgame can legitimately have the
    /// block assigned to a peer other than the storer).
    pub fn clear_all_assignments(&mut self, torrent: TorrentId, piece: usize, offset: u32) {
        if let Some(entry) = self.pieces.get_mut(&(torrent, piece)) {
            if let Some((_, peer)) = entry.assigned.remove(&offset) {
                if let Some(set) = self.by_peer.get_mut(&peer) {
                    set.remove(&(torrent, piece, offset));
                }
            }
        }
    }

    /// §4.2 `store_block` step 2: has this offset already been
    /// recorded as `fetched`? If not, record it now. Returns `true` on
    /// first time, `false` on duplicate.
    pub fn mark_stored(&mut self, torrent: TorrentId, piece: usize, offset: u32) -> bool {
        let entry = self.pieces.entry((torrent, piece)).or_default();
        entry.fetched.insert(offset)
    }

    /// §4.4 finalization: remove every block entry under
    /// `(torrent, piece, *)`.
    pub fn remove_piece(&mut self, torrent: TorrentId, piece: usize) {
        if let Some(entry) = self.pieces.remove(&(torrent, piece)) {
            for (&offset, &(_, peer)) in entry.assigned.iter() {
                if let Some(set) = self.by_peer.get_mut(&peer) {
                    set.remove(&(torrent, piece, offset));
                }
            }
        }
    }

    /// Query shape (c): match-delete by `(torrent, '_', '_')`, used
    /// when a torrent's owning session disappears (§4.3).
    pub fn purge_torrent(&mut self, torrent: TorrentId) {
        let pieces: Vec<usize> = self.pieces_in_progress(torrent);
        for piece in pieces {
            self.remove_piece(torrent, piece);
        }
    }

    /// Query shape (d): match-iterate by `('_', '_', {assigned, peer})`
    /// — every block currently reserved by `peer`, across all
    /// torrents.
    pub fn assigned_to(&self, peer: PeerId) -> Vec<(TorrentId, usize, Locator)> {
        let Some(set) = self.by_peer.get(&peer) else {
            return Vec::new();
        };
        set.iter()
            .filter_map(|&(torrent, piece, offset)| {
                let entry = self.pieces.get(&(torrent, piece))?;
                let &(length, _) = entry.assigned.get(&offset)?;
                Some((torrent, piece, Locator { offset, length }))
            })
            .collect()
    }

    /// `putback(peer)`: convert every `{assigned, peer}` entry back to
    /// `not_fetched` at the same locator, across all torrents (§4.2,
    /// §8 property 2). Returns the locators that were converted.
    pub fn putback(&mut self, peer: PeerId) -> Vec<(TorrentId, usize, Locator)> {
        let Some(set) = self.by_peer.remove(&peer) else {
            return Vec::new();
        };
        let mut released = Vec::with_capacity(set.len());
        for (torrent, piece, offset) in set {
            if let Some(entry) = self.pieces.get_mut(&(torrent, piece)) {
                if let Some((length, assigned_peer)) = entry.assigned.remove(&offset) {
                    debug_assert_eq!(assigned_peer, peer);
                    entry.not_fetched.insert(offset, length);
                    released.push((torrent, piece, Locator { offset, length }));
                }
            }
        }
        released
    }

    /// Aggregate block counts across every piece currently tracked for
    /// `torrent`, broken down by status. A read-only introspection
    /// hook — useful for metrics as much as for tests — that does not
    /// appear verbatim in §4.1 but costs nothing to expose since the
    /// three counts are already sitting right there in each
    /// `PieceBlocks`.
    pub fn torrent_counts(&self, torrent: TorrentId) -> TorrentBlockCounts {
        let mut counts = TorrentBlockCounts::default();
        for ((t, _), blocks) in self.pieces.iter() {
            if *t != torrent {
                continue;
            }
            counts.not_fetched += blocks.not_fetched.len();
            counts.assigned += blocks.assigned.len();
            counts.fetched += blocks.fetched.len();
        }
        counts
    }

    /// Number of entries with status `{assigned, _}` for this exact
    /// locator — used by invariant checks in tests (§8 property 1).
    #[cfg(test)]
    pub fn assigned_count(&self, torrent: TorrentId, piece: usize, offset: u32) -> usize {
        self.pieces
            .get(&(torrent, piece))
            .and_then(|p| p.assigned.get(&offset))
            .map_or(0, |_| 1)
    }

    #[cfg(test)]
    pub fn not_fetched_count(&self, torrent: TorrentId) -> usize {
        self.pieces
            .iter()
            .filter(|((t, _), _)| *t == torrent)
            .map(|(_, p)| p.not_fetched.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (TorrentId, PeerId, PeerId) {
        (TorrentId::new(), PeerId::new(), PeerId::new())
    }

    #[test]
    fn chunk_piece_splits_with_short_tail() {
        let blocks = chunk_piece(32 * 1024 + 100, 16 * 1024);
        assert_eq!(
            blocks,
            vec![
                Locator { offset: 0, length: 16384 },
                Locator { offset: 16384, length: 16384 },
                Locator { offset: 32768, length: 100 },
            ]
        );
    }

    #[test]
    fn chunk_piece_exact_multiple_has_no_short_tail() {
        let blocks = chunk_piece(32 * 1024, 16 * 1024);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].length, 16384);
    }

    #[test]
    fn reserve_moves_not_fetched_to_assigned() {
        let (t, a, _b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(32 * 1024, 16 * 1024));
        assert!(idx.has_not_fetched(t, 0));
        let reserved = idx.reserve(t, 0, a, 10);
        assert_eq!(reserved.len(), 2);
        assert!(!idx.has_not_fetched(t, 0));
        assert_eq!(idx.assigned_to(a).len(), 2);
    }

    #[test]
    fn reserve_respects_max_and_is_idempotent_when_empty() {
        let (t, a, b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(48 * 1024, 16 * 1024));
        let first = idx.reserve(t, 0, a, 2);
        assert_eq!(first.len(), 2);
        let second = idx.reserve(t, 0, b, 5);
        assert_eq!(second.len(), 1);
        let third = idx.reserve(t, 0, b, 5);
        assert!(third.is_empty());
    }

    #[test]
    fn putback_restores_not_fetched_and_clears_peer() {
        let (t, a, _b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(32 * 1024, 16 * 1024));
        idx.reserve(t, 0, a, 10);
        assert!(idx.assigned_to(a).len() == 2);
        let released = idx.putback(a);
        assert_eq!(released.len(), 2);
        assert!(idx.assigned_to(a).is_empty());
        assert_eq!(idx.not_fetched_entries(t, 0).len(), 2);
    }

    #[test]
    fn take_not_fetched_semantics() {
        let (t, _a, _b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(32 * 1024, 16 * 1024));
        assert!(idx.take_not_fetched(t, 0, 16384));
        assert!(!idx.take_not_fetched(t, 0, 16384));
    }

    #[test]
    fn clear_all_assignments_ignores_peer_identity() {
        let (t, a, b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(16 * 1024, 16 * 1024));
        idx.reserve(t, 0, a, 1);
        // Simulate endgame: peer b's duplicate request also assigned, then
        // the block is stored by whoever wins the race; store_block must
        // clear both regardless of which peer field records.
        idx.reserve(t, 0, b, 1);
        idx.clear_all_assignments(t, 0, 0);
        assert!(idx.assigned_to(a).is_empty());
        assert!(idx.assigned_to(b).is_empty());
    }

    #[test]
    fn remove_piece_clears_peer_index() {
        let (t, a, _b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(16 * 1024, 16 * 1024));
        idx.reserve(t, 0, a, 1);
        idx.remove_piece(t, 0);
        assert!(idx.assigned_to(a).is_empty());
        assert!(idx.not_fetched_entries(t, 0).is_empty());
    }

    #[test]
    fn purge_torrent_removes_everything() {
        let (t, a, _b) = ids();
        let mut idx = BlockIndex::new();
        idx.chunkify(t, 0, &chunk_piece(16 * 1024, 16 * 1024));
        idx.chunkify(t, 1, &chunk_piece(16 * 1024, 16 * 1024));
        idx.reserve(t, 0, a, 1);
        idx.purge_torrent(t);
        assert!(idx.pieces_in_progress(t).is_empty());
        assert!(idx.assigned_to(a).is_empty());
    }
}
