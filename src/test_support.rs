//! In-memory fakes for the three external collaborators (§6). No
//! mocking crate anywhere in the retrieved corpus, so — in the
//! teacher's own style — these are hand-written structs behind the
//! real traits, good enough to drive the scheduler end to end in
//! tests and the `pick_blocks_demo` example.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::bitfield::HaveSet;
use crate::block_index::chunk_piece;
use crate::catalog::{Interest, MissingChunks, PieceCatalog, PieceDescriptor};
use crate::config::BLOCK_LENGTH;
use crate::disk::DiskSink;
use crate::error::SchedulerError;
use crate::ids::TorrentId;
use crate::verifier::Verifier;

struct TorrentState {
    piece_length: u32,
    total_length: u64,
    num_pieces: usize,
    chunked: HashSet<usize>,
    fetched: HashSet<usize>,
    missing: HashMap<usize, u32>,
    endgame: bool,
}

impl TorrentState {
    fn length_of(&self, piece: usize) -> u32 {
        if piece + 1 == self.num_pieces {
            let consumed = self.piece_length as u64 * (self.num_pieces - 1) as u64;
            (self.total_length - consumed) as u32
        } else {
            self.piece_length
        }
    }
}

/// A minimal in-memory `PieceCatalog`: uniform piece length with a
/// shortened final piece, no rarity policy (`check_interest` admits
/// every non-fetched piece the remote claims). Good enough to drive
/// the scheduler's contract without reimplementing metadata parsing
/// or rarity accounting, both explicitly out of scope (§1).
#[derive(Default)]
pub struct InMemoryCatalog {
    torrents: Mutex<HashMap<TorrentId, TorrentState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a torrent of `num_pieces` pieces, each `piece_length`
    /// bytes except a shortened final piece implied by `total_length`.
    pub fn register(&self, torrent: TorrentId, num_pieces: usize, piece_length: u32, total_length: u64) {
        self.torrents.lock().unwrap().insert(
            torrent,
            TorrentState {
                piece_length,
                total_length,
                num_pieces,
                chunked: HashSet::new(),
                fetched: HashSet::new(),
                missing: HashMap::new(),
                endgame: false,
            },
        );
    }

    pub fn set_endgame(&self, torrent: TorrentId, endgame: bool) {
        if let Some(state) = self.torrents.lock().unwrap().get_mut(&torrent) {
            state.endgame = endgame;
        }
    }

    /// Pre-seed a piece as already `fetched`, bypassing `store_block`
    /// — used to set up endgame scenarios (§8 scenario 5).
    pub fn mark_fetched_for_test(&self, torrent: TorrentId, piece: usize) {
        let mut torrents = self.torrents.lock().unwrap();
        if let Some(state) = torrents.get_mut(&torrent) {
            state.fetched.insert(piece);
            state.chunked.remove(&piece);
            state.missing.remove(&piece);
        }
    }
}

impl PieceCatalog for InMemoryCatalog {
    fn num_pieces(&self, torrent: TorrentId) -> anyhow::Result<usize> {
        let torrents = self.torrents.lock().unwrap();
        let state = torrents.get(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        Ok(state.num_pieces)
    }

    fn chunked_pieces(&self, torrent: TorrentId) -> anyhow::Result<HashSet<usize>> {
        let torrents = self.torrents.lock().unwrap();
        let state = torrents.get(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        Ok(state.chunked.clone())
    }

    fn find_new(&self, torrent: TorrentId, have: &HaveSet) -> anyhow::Result<Option<PieceDescriptor>> {
        let torrents = self.torrents.lock().unwrap();
        let state = torrents.get(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        let piece = have
            .pieces()
            .filter(|p| *p < state.num_pieces)
            .find(|p| !state.chunked.contains(p) && !state.fetched.contains(p));
        Ok(piece.map(|piece_index| PieceDescriptor {
            piece_index,
            length: state.length_of(piece_index),
        }))
    }

    fn is_fetched(&self, torrent: TorrentId, piece: usize) -> anyhow::Result<bool> {
        let torrents = self.torrents.lock().unwrap();
        let state = torrents.get(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        Ok(state.fetched.contains(&piece))
    }

    fn check_interest(&self, torrent: TorrentId, have: &HaveSet) -> anyhow::Result<Interest> {
        let torrents = self.torrents.lock().unwrap();
        let state = torrents.get(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        if have.pieces().any(|p| p >= state.num_pieces) {
            return Ok(Interest::InvalidPiece);
        }
        let pruned: HaveSet = have.pieces().filter(|p| !state.fetched.contains(p)).collect();
        if pruned.pieces().next().is_none() {
            Ok(Interest::NotInterested)
        } else {
            Ok(Interest::Interested { pruned_have: pruned })
        }
    }

    fn is_endgame(&self, torrent: TorrentId) -> anyhow::Result<bool> {
        let torrents = self.torrents.lock().unwrap();
        let state = torrents.get(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        Ok(state.endgame)
    }

    fn decrease_missing_chunks(&self, torrent: TorrentId, piece: usize) -> anyhow::Result<MissingChunks> {
        let mut torrents = self.torrents.lock().unwrap();
        let state = torrents.get_mut(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        let remaining = state
            .missing
            .get_mut(&piece)
            .ok_or_else(|| anyhow::anyhow!("piece {piece} was never chunked"))?;
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            state.missing.remove(&piece);
            state.chunked.remove(&piece);
            state.fetched.insert(piece);
            Ok(MissingChunks::Complete)
        } else {
            Ok(MissingChunks::Remaining(*remaining))
        }
    }

    fn chunkify_piece(&self, torrent: TorrentId, descriptor: &PieceDescriptor) -> anyhow::Result<Vec<crate::block_index::Locator>> {
        let mut torrents = self.torrents.lock().unwrap();
        let state = torrents.get_mut(&torrent).ok_or_else(|| anyhow::anyhow!("unknown torrent"))?;
        let blocks = chunk_piece(descriptor.length, BLOCK_LENGTH);
        state.chunked.insert(descriptor.piece_index);
        state.missing.insert(descriptor.piece_index, blocks.len() as u32);
        Ok(blocks)
    }
}

/// An in-memory `DiskSink` that records every write and can be made to
/// fail on demand, for exercising §7's `write_failed` path.
#[derive(Default)]
pub struct InMemoryDiskSink {
    writes: Mutex<Vec<(TorrentId, usize, u32, Bytes)>>,
    failing: AtomicBool,
}

impl InMemoryDiskSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(TorrentId, usize, u32, Bytes)> {
        self.writes.lock().unwrap().clone()
    }
}

impl DiskSink for InMemoryDiskSink {
    fn write_chunk(&self, torrent: TorrentId, piece: usize, offset: u32, data: Bytes) -> Result<(), SchedulerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::write_failed("simulated disk failure"));
        }
        self.writes.lock().unwrap().push((torrent, piece, offset, data));
        Ok(())
    }
}

/// A `Verifier` that just counts invocations per piece — enough to
/// assert §8 property 3 ("the verifier is invoked exactly once").
#[derive(Default)]
pub struct CountingVerifier {
    calls: Mutex<Vec<(TorrentId, usize)>>,
}

impl CountingVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self, torrent: TorrentId, piece: usize) -> usize {
        self.calls.lock().unwrap().iter().filter(|&&(t, p)| t == torrent && p == piece).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Verifier for CountingVerifier {
    fn check_piece(&self, torrent: TorrentId, piece: usize) {
        self.calls.lock().unwrap().push((torrent, piece));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TorrentId;

    #[test]
    fn catalog_chunks_and_completes_a_piece() {
        let catalog = InMemoryCatalog::new();
        let torrent = TorrentId::new();
        catalog.register(torrent, 1, 32 * 1024, 32 * 1024);
        let have: HaveSet = [0usize].into_iter().collect();
        let descriptor = catalog.find_new(torrent, &have).unwrap().unwrap();
        assert_eq!(descriptor.piece_index, 0);
        assert_eq!(descriptor.length, 32 * 1024);
        let blocks = catalog.chunkify_piece(torrent, &descriptor).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(matches!(catalog.decrease_missing_chunks(torrent, 0).unwrap(), MissingChunks::Remaining(1)));
        assert!(matches!(catalog.decrease_missing_chunks(torrent, 0).unwrap(), MissingChunks::Complete));
        assert!(catalog.is_fetched(torrent, 0).unwrap());
    }

    #[test]
    fn catalog_shortens_final_piece() {
        let catalog = InMemoryCatalog::new();
        let torrent = TorrentId::new();
        catalog.register(torrent, 2, 32 * 1024, 32 * 1024 + 100);
        let have: HaveSet = [0usize, 1].into_iter().collect();
        let first = catalog.find_new(torrent, &have).unwrap().unwrap();
        assert_eq!(first.length, 32 * 1024);
        catalog.chunkify_piece(torrent, &first).unwrap();
        let second = catalog.find_new(torrent, &have).unwrap().unwrap();
        assert_eq!(second.piece_index, 1);
        assert_eq!(second.length, 100);
    }

    #[test]
    fn disk_sink_can_be_made_to_fail() {
        let sink = InMemoryDiskSink::new();
        let torrent = TorrentId::new();
        assert!(sink.write_chunk(torrent, 0, 0, Bytes::from_static(b"abc")).is_ok());
        sink.set_failing(true);
        assert!(sink.write_chunk(torrent, 0, 16384, Bytes::from_static(b"def")).is_err());
        assert_eq!(sink.writes().len(), 1);
    }

    #[test]
    fn counting_verifier_tracks_per_piece_calls() {
        let verifier = CountingVerifier::new();
        let torrent = TorrentId::new();
        verifier.check_piece(torrent, 0);
        verifier.check_piece(torrent, 0);
        verifier.check_piece(torrent, 1);
        assert_eq!(verifier.call_count(torrent, 0), 2);
        assert_eq!(verifier.call_count(torrent, 1), 1);
        assert_eq!(verifier.total_calls(), 3);
    }
}
