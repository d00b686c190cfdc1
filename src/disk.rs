use bytes::Bytes;

use crate::error::SchedulerError;
use crate::ids::TorrentId;

/// The disk sink external collaborator (§6, `write_chunk`): durable
/// write or recoverable failure, re-entrant and idempotent on
/// identical `(torrent, piece, offset, bytes)` — duplicate stores are
/// expected during endgame.
///
/// Grounded on the teacher's `StorageHandle`: per §5 the scheduler
/// must not be stalled by I/O inside a turn, so this call is expected
/// to be a cheap hand-off into the sink's own actor/queue (a bounded
/// `try_send`), not a synchronous write. An `Err` here is fatal for
/// the `store_block` turn (§7, `write_failed`) — the block stays
/// reserved so a later `putback` re-queues it.
pub trait DiskSink: Send + Sync {
    fn write_chunk(
        &self,
        torrent: TorrentId,
        piece: usize,
        offset: u32,
        data: Bytes,
    ) -> Result<(), SchedulerError>;
}
