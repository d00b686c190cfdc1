//! Chunk scheduling core for a BitTorrent client (§1, §2): decides
//! which block-level requests to issue next, tracks in-flight blocks
//! per peer, accepts completed blocks, detects piece completion, and
//! drives the endgame phase.
//!
//! Wire protocol parsing, disk I/O, torrent metadata, peer discovery
//! and rarity accounting are deliberately out of scope — they are
//! consulted through the [`catalog`], [`disk`], and [`verifier`]
//! traits rather than implemented here.
//!
//! The entry point is [`scheduler::Scheduler::spawn`], which returns a
//! [`scheduler::SchedulerHandle`] peer sessions clone and call into.

pub mod bitfield;
pub mod block_index;
pub mod catalog;
pub mod config;
pub mod disk;
pub mod error;
pub mod ids;
pub mod liveness;
pub mod scheduler;
pub mod verifier;

/// In-memory fakes for the catalog, disk sink, and verifier
/// collaborators. Always compiled (not `cfg(test)`-gated) so
/// integration tests under `tests/` and `demos/` can depend on the
/// crate normally and still reach them.
pub mod test_support;

pub use bitfield::HaveSet;
pub use block_index::{Locator, TorrentBlockCounts};
pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerErrorKind};
pub use ids::{OwnerId, PeerId, TorrentId};
pub use scheduler::{MarkFetchedOutcome, PickOutcome, Scheduler, SchedulerHandle, SelectByPieceOutcome};
