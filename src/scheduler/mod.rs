mod endgame;
mod handle;
mod pick;

pub use handle::SchedulerHandle;

use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::bitfield::HaveSet;
use crate::block_index::{BlockIndex, Locator, TorrentBlockCounts};
use crate::catalog::{MissingChunks, PieceCatalog, PieceDescriptor};
use crate::config::SchedulerConfig;
use crate::disk::DiskSink;
use crate::ids::{OwnerId, PeerId, TorrentId};
use crate::liveness::{LivenessEvent, PeerLivenessTracker};
use crate::verifier::Verifier;

/// Outcome of `pick_blocks` (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    NotInterested,
    NoneEligible,
    Normal(Vec<(usize, Vec<Locator>)>),
    Endgame(Vec<(usize, Vec<Locator>)>),
}

/// Outcome of `mark_fetched` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkFetchedOutcome {
    Found,
    Assigned,
}

/// Outcome of `select_by_piece` (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectByPieceOutcome {
    Selected {
        piece_index: usize,
        blocks: Vec<Locator>,
        count: usize,
    },
    AlreadyTaken,
}

pub(crate) enum Command {
    RegisterTorrent {
        owner: OwnerId,
        torrent: TorrentId,
        owner_token: CancellationToken,
        reply: oneshot::Sender<()>,
    },
    PickBlocks {
        torrent: TorrentId,
        peer: PeerId,
        peer_token: CancellationToken,
        have: Option<HaveSet>,
        budget: usize,
        reply: oneshot::Sender<anyhow::Result<PickOutcome>>,
    },
    StoreBlock {
        torrent: TorrentId,
        piece: usize,
        offset: u32,
        data: Bytes,
    },
    MarkFetched {
        torrent: TorrentId,
        piece: usize,
        offset: u32,
        reply: oneshot::Sender<MarkFetchedOutcome>,
    },
    EndgameRelease {
        peer: PeerId,
        torrent: TorrentId,
        piece: usize,
        offset: u32,
        reply: oneshot::Sender<()>,
    },
    Putback {
        peer: PeerId,
    },
    SelectByPiece {
        torrent: TorrentId,
        piece: usize,
        peer: PeerId,
        peer_token: CancellationToken,
        max: usize,
        reply: oneshot::Sender<SelectByPieceOutcome>,
    },
    Chunkify {
        torrent: TorrentId,
        descriptor: PieceDescriptor,
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
    TorrentCounts {
        torrent: TorrentId,
        reply: oneshot::Sender<TorrentBlockCounts>,
    },
    PeerLost {
        peer: PeerId,
    },
    TorrentOwnerLost {
        owner: OwnerId,
        torrent: TorrentId,
    },
}

/// The scheduler actor (§2, §5): single-writer owner of the block
/// index, reached only through `SchedulerHandle`. Grounded on the
/// teacher's `Download::work` — one `mpsc` command channel, one
/// `select!` loop, no lock anywhere near the state it owns.
pub struct Scheduler<C, V, D> {
    config: SchedulerConfig,
    catalog: Arc<C>,
    verifier: Arc<V>,
    disk: Arc<D>,
    block_index: BlockIndex,
    liveness: PeerLivenessTracker,
    rng: StdRng,
    commands: mpsc::Receiver<Command>,
}

impl<C, V, D> Scheduler<C, V, D>
where
    C: PieceCatalog + 'static,
    V: Verifier + 'static,
    D: DiskSink + 'static,
{
    /// Spawn the actor task and hand back a cloneable handle.
    /// Grounded on `TorrentStorage::spawn`.
    pub fn spawn(config: SchedulerConfig, catalog: Arc<C>, verifier: Arc<V>, disk: Arc<D>) -> SchedulerHandle {
        Self::spawn_with_rng(config, catalog, verifier, disk, StdRng::from_os_rng())
    }

    /// Same as `spawn`, but with an injectable RNG so endgame shuffles
    /// are reproducible in tests (§8 property tests over random
    /// sequences need a seeded source; the teacher's corpus has no
    /// equivalent because none of its algorithms are randomized).
    pub fn spawn_with_rng(
        config: SchedulerConfig,
        catalog: Arc<C>,
        verifier: Arc<V>,
        disk: Arc<D>,
        rng: StdRng,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let scheduler = Self {
            config,
            catalog,
            verifier,
            disk,
            block_index: BlockIndex::new(),
            liveness: PeerLivenessTracker::new(),
            rng,
            commands: rx,
        };
        tokio::spawn(scheduler.run());
        SchedulerHandle::new(tx)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!("scheduler mailbox closed, shutting down");
                            return;
                        }
                    }
                }
                Some(result) = self.liveness.join_next(), if self.liveness.has_pending() => {
                    match result {
                        Ok(event) => self.handle_liveness_event(event),
                        Err(err) => warn!(%err, "liveness watch task panicked"),
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RegisterTorrent { owner, torrent, owner_token, reply } => {
                self.liveness.watch_owner(owner, torrent, owner_token);
                let _ = reply.send(());
            }
            Command::PickBlocks { torrent, peer, peer_token, have, budget, reply } => {
                let outcome = self.pick_blocks(torrent, peer, peer_token, have, budget);
                let _ = reply.send(outcome);
            }
            Command::StoreBlock { torrent, piece, offset, data } => {
                if let Err(err) = self.store_block(torrent, piece, offset, data) {
                    warn!(%torrent, piece, offset, %err, "store_block failed");
                }
            }
            Command::MarkFetched { torrent, piece, offset, reply } => {
                let found = self.block_index.take_not_fetched(torrent, piece, offset);
                let outcome = if found {
                    MarkFetchedOutcome::Found
                } else {
                    MarkFetchedOutcome::Assigned
                };
                let _ = reply.send(outcome);
            }
            Command::EndgameRelease { peer, torrent, piece, offset, reply } => {
                self.block_index.release_assignment(torrent, piece, offset, peer);
                let _ = reply.send(());
            }
            Command::Putback { peer } => self.putback(peer),
            Command::SelectByPiece { torrent, piece, peer, peer_token, max, reply } => {
                let blocks = self.block_index.reserve(torrent, piece, peer, max);
                let outcome = if blocks.is_empty() {
                    SelectByPieceOutcome::AlreadyTaken
                } else {
                    // Mirrors `pick_blocks`: a caller only gets
                    // monitored once it actually holds a reservation,
                    // so invariant 3 never sees an unmonitored
                    // `{assigned, P}` entry.
                    self.liveness.watch_peer(peer, peer_token);
                    SelectByPieceOutcome::Selected {
                        piece_index: piece,
                        count: blocks.len(),
                        blocks,
                    }
                };
                let _ = reply.send(outcome);
            }
            Command::Chunkify { torrent, descriptor, reply } => {
                let result = self.chunkify(torrent, descriptor);
                let _ = reply.send(result);
            }
            Command::TorrentCounts { torrent, reply } => {
                let _ = reply.send(self.block_index.torrent_counts(torrent));
            }
            Command::PeerLost { peer } => {
                self.putback(peer);
                self.liveness.forget_peer(&peer);
            }
            Command::TorrentOwnerLost { owner, torrent } => {
                self.block_index.purge_torrent(torrent);
                self.liveness.forget_owner(&owner);
            }
        }
    }

    fn handle_liveness_event(&mut self, event: LivenessEvent) {
        match event {
            LivenessEvent::OwnerDied(owner, torrent) => {
                self.block_index.purge_torrent(torrent);
                self.liveness.forget_owner(&owner);
                debug!(%torrent, %owner, "torrent owner died, purged block index");
            }
            LivenessEvent::PeerDied(peer) => {
                self.putback(peer);
                self.liveness.forget_peer(&peer);
                debug!(%peer, "peer died, released reservations");
            }
        }
    }

    #[instrument(skip(self, have), fields(%torrent, %peer, budget))]
    fn pick_blocks(
        &mut self,
        torrent: TorrentId,
        peer: PeerId,
        peer_token: CancellationToken,
        have: Option<HaveSet>,
        budget: usize,
    ) -> anyhow::Result<PickOutcome> {
        let Some(have) = have else {
            return Ok(PickOutcome::NoneEligible);
        };

        let outcome = pick::pick_blocks(self.catalog.as_ref(), &mut self.block_index, torrent, peer, &have, budget)?;

        let outcome = match outcome {
            PickOutcome::NotInterested | PickOutcome::NoneEligible if self.catalog.is_endgame(torrent)? => {
                endgame::pick_endgame(&self.block_index, torrent, &have, budget, &mut self.rng)
            }
            other => other,
        };

        let delivered_blocks = matches!(&outcome, PickOutcome::Normal(v) | PickOutcome::Endgame(v) if !v.is_empty());
        if delivered_blocks {
            self.liveness.watch_peer(peer, peer_token);
        }
        Ok(outcome)
    }

    fn store_block(&mut self, torrent: TorrentId, piece: usize, offset: u32, data: Bytes) -> anyhow::Result<()> {
        self.disk.write_chunk(torrent, piece, offset, data)?;

        if self.catalog.is_fetched(torrent, piece)? {
            // Piece already finalized; per invariant 2 no block
            // entries remain, so there is nothing left to update.
            return Ok(());
        }

        let first_time = self.block_index.mark_stored(torrent, piece, offset);
        self.block_index.clear_all_assignments(torrent, piece, offset);

        if first_time {
            match self.catalog.decrease_missing_chunks(torrent, piece)? {
                MissingChunks::Complete => {
                    self.block_index.remove_piece(torrent, piece);
                    self.verifier.check_piece(torrent, piece);
                    debug!(%torrent, piece, "piece finalized");
                }
                MissingChunks::Remaining(remaining) => {
                    debug!(%torrent, piece, remaining, "block stored");
                }
            }
        }
        Ok(())
    }

    fn putback(&mut self, peer: PeerId) {
        let released = self.block_index.putback(peer);
        debug!(%peer, released = released.len(), "putback");
    }

    fn chunkify(&mut self, torrent: TorrentId, descriptor: PieceDescriptor) -> anyhow::Result<()> {
        let blocks = self.catalog.chunkify_piece(torrent, &descriptor)?;
        self.block_index.chunkify(torrent, descriptor.piece_index, &blocks);
        Ok(())
    }
}
