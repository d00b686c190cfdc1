use std::collections::HashSet;

use crate::bitfield::HaveSet;
use crate::block_index::Locator;
use crate::ids::TorrentId;

/// What the catalog knows about a piece the scheduler has not yet
/// chunked (§3, "Piece descriptor (external)"). Opaque payload aside
/// from the two fields the scheduler itself needs: which piece, and
/// how long it is (to size the chunking in §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceDescriptor {
    pub piece_index: usize,
    pub length: u32,
}

/// Result of `check_interest` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// The remote has pieces we want; `pruned_have` is the subset of
    /// the remote's have-set the catalog considers worth pursuing
    /// (rarity / policy already applied upstream of the scheduler).
    Interested { pruned_have: HaveSet },
    NotInterested,
    /// The remote's bitfield is inconsistent with the known piece
    /// count (§7, `invalid_piece`).
    InvalidPiece,
}

/// Result of `decrease_missing_chunks` (§6, §4.2 `store_block` step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingChunks {
    /// The decrement brought the counter to zero: finalize the piece.
    Complete,
    /// Blocks are still outstanding; the piece is not yet done.
    Remaining(u32),
}

/// The Piece Catalog external collaborator (§2, §6). Not implemented
/// by this crate beyond the in-memory reference used by its own tests
/// (`test_support::InMemoryCatalog`) — in a full client this is backed
/// by torrent metadata plus on-disk piece state.
///
/// Shared read-mostly (§3, "Ownership"): the scheduler only ever
/// mutates it through `decrease_missing_chunks`, and that call must be
/// non-blocking in practice (§5, "Suspension points").
pub trait PieceCatalog: Send + Sync {
    fn num_pieces(&self, torrent: TorrentId) -> anyhow::Result<usize>;

    /// Piece indices that have already been chunked into the block
    /// index (§4.2 step 1's `C`).
    fn chunked_pieces(&self, torrent: TorrentId) -> anyhow::Result<HashSet<usize>>;

    /// A not-yet-chunked piece worth chunking from `have`, if any
    /// (§4.2 step 3).
    fn find_new(&self, torrent: TorrentId, have: &HaveSet) -> anyhow::Result<Option<PieceDescriptor>>;

    fn is_fetched(&self, torrent: TorrentId, piece: usize) -> anyhow::Result<bool>;

    fn check_interest(&self, torrent: TorrentId, have: &HaveSet) -> anyhow::Result<Interest>;

    fn is_endgame(&self, torrent: TorrentId) -> anyhow::Result<bool>;

    /// Atomically decrement `piece`'s outstanding-block counter
    /// (§4.2 `store_block` step 4). Must be non-blocking.
    fn decrease_missing_chunks(&self, torrent: TorrentId, piece: usize) -> anyhow::Result<MissingChunks>;

    /// Split `descriptor` into block locators (§4.1's chunking
    /// policy). The catalog owns this because it is the one that
    /// knows the piece's exact length.
    fn chunkify_piece(&self, torrent: TorrentId, descriptor: &PieceDescriptor) -> anyhow::Result<Vec<Locator>>;
}
