use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::bitfield::HaveSet;
use crate::block_index::TorrentBlockCounts;
use crate::catalog::PieceDescriptor;
use crate::error::SchedulerError;
use crate::ids::{OwnerId, PeerId, TorrentId};

use super::{Command, MarkFetchedOutcome, PickOutcome, SelectByPieceOutcome};

/// A cheap, cloneable handle to a running scheduler actor. Mirrors the
/// teacher's `DownloadHandle` / `StorageHandle`: one async method per
/// command, request-reply operations round-trip through a `oneshot`,
/// fire-and-forget operations use `try_send` so a slow or wedged
/// scheduler applies backpressure instead of blocking the caller
/// (§5's "bounded mailbox" backpressure note).
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    pub(super) fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    /// §4.2 `register_torrent`. `owner_token` is the caller's
    /// cancellation token; the scheduler watches it and purges the
    /// torrent's block entries when it fires.
    pub async fn register_torrent(
        &self,
        owner: OwnerId,
        torrent: TorrentId,
        owner_token: CancellationToken,
    ) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::RegisterTorrent { owner, torrent, owner_token, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("register_torrent: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("register_torrent: scheduler dropped the reply"))
    }

    /// §4.2 `pick_blocks`. `have = None` represents "remote have-set
    /// unknown," which short-circuits to `none_eligible` (§4.2).
    /// `peer_token` is only consulted if this call is the peer's first
    /// successful pick (§3): the scheduler starts watching it then.
    pub async fn pick_blocks(
        &self,
        torrent: TorrentId,
        peer: PeerId,
        peer_token: CancellationToken,
        have: Option<HaveSet>,
        budget: usize,
    ) -> Result<PickOutcome, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::PickBlocks { torrent, peer, peer_token, have, budget, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("pick_blocks: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("pick_blocks: scheduler dropped the reply"))?
            .map_err(SchedulerError::from)
    }

    /// §4.2 `store_block`, fire-and-forget. Backpressure is the
    /// bounded mailbox (§5): a full mailbox surfaces here rather than
    /// stalling the caller indefinitely.
    pub fn store_block(&self, torrent: TorrentId, piece: usize, offset: u32, data: Bytes) -> Result<(), SchedulerError> {
        self.commands
            .try_send(Command::StoreBlock { torrent, piece, offset, data })
            .map_err(|_| SchedulerError::actor_gone("store_block: scheduler mailbox full or closed"))
    }

    /// §4.2 `mark_fetched`.
    pub async fn mark_fetched(
        &self,
        torrent: TorrentId,
        piece: usize,
        offset: u32,
    ) -> Result<MarkFetchedOutcome, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::MarkFetched { torrent, piece, offset, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("mark_fetched: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("mark_fetched: scheduler dropped the reply"))
    }

    /// §4.2 `endgame_release`.
    pub async fn endgame_release(
        &self,
        peer: PeerId,
        torrent: TorrentId,
        piece: usize,
        offset: u32,
    ) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::EndgameRelease { peer, torrent, piece, offset, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("endgame_release: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("endgame_release: scheduler dropped the reply"))
    }

    /// §4.2 `putback`, fire-and-forget.
    pub fn putback(&self, peer: PeerId) -> Result<(), SchedulerError> {
        self.commands
            .try_send(Command::Putback { peer })
            .map_err(|_| SchedulerError::actor_gone("putback: scheduler mailbox full or closed"))
    }

    /// §4.2 `select_by_piece`. Takes a `peer_token` for the same
    /// reason `pick_blocks` does: a successful selection reserves
    /// blocks to `peer`, so the scheduler must start watching `peer`
    /// for termination or those blocks would never be put back.
    pub async fn select_by_piece(
        &self,
        torrent: TorrentId,
        piece: usize,
        peer: PeerId,
        peer_token: CancellationToken,
        max: usize,
    ) -> Result<SelectByPieceOutcome, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SelectByPiece { torrent, piece, peer, peer_token, max, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("select_by_piece: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("select_by_piece: scheduler dropped the reply"))
    }

    /// §4.2 `chunkify`. Takes a full `PieceDescriptor` rather than a
    /// bare piece index — see DESIGN.md for why.
    pub async fn chunkify(&self, torrent: TorrentId, descriptor: PieceDescriptor) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Chunkify { torrent, descriptor, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("chunkify: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("chunkify: scheduler dropped the reply"))?
            .map_err(SchedulerError::from)
    }

    /// Read-only introspection: per-status block counts for a
    /// torrent. Not part of §4.2's named contract, but a natural
    /// extension of the block index's own bookkeeping — handy for
    /// both tests and operational metrics.
    pub async fn torrent_counts(&self, torrent: TorrentId) -> Result<TorrentBlockCounts, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::TorrentCounts { torrent, reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::actor_gone("torrent_counts: scheduler mailbox closed"))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::actor_gone("torrent_counts: scheduler dropped the reply"))
    }

    /// Explicit-notify counterpart to letting `peer_token` fire on its
    /// own (§6: "sessions must either notify the liveness tracker
    /// explicitly or arrange for the tracker to observe termination").
    pub fn peer_lost(&self, peer: PeerId) -> Result<(), SchedulerError> {
        self.commands
            .try_send(Command::PeerLost { peer })
            .map_err(|_| SchedulerError::actor_gone("peer_lost: scheduler mailbox full or closed"))
    }

    /// Explicit-notify counterpart for torrent owners.
    pub fn torrent_owner_lost(&self, owner: OwnerId, torrent: TorrentId) -> Result<(), SchedulerError> {
        self.commands
            .try_send(Command::TorrentOwnerLost { owner, torrent })
            .map_err(|_| SchedulerError::actor_gone("torrent_owner_lost: scheduler mailbox full or closed"))
    }
}
