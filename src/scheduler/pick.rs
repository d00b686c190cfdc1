use crate::bitfield::HaveSet;
use crate::block_index::BlockIndex;
use crate::catalog::PieceCatalog;
use crate::ids::{PeerId, TorrentId};

use super::PickOutcome;

/// Candidate pieces within the chunked-and-wanted set `C` are walked
/// in ascending `piece_index` order — §4.2's tie-break rule, and the
/// only order `HaveSet` can express: it is a bitfield, so iterating it
/// is always ascending by construction. There is no "as the caller
/// gave it to us" order to preserve; a future rarity-aware catalog
/// would influence this by pruning `have` (via `check_interest`), not
/// by asking the scheduler to walk it differently.
fn order_candidates(mut candidates: Vec<usize>) -> Vec<usize> {
    candidates.sort_unstable();
    candidates
}

/// The normal-mode pick algorithm (§4.2). Runs entirely inside the
/// scheduler's own turn — no `.await` anywhere in this function — so
/// the "atomic reservation" step is atomic for free (§9).
pub(super) fn pick_blocks(
    catalog: &dyn PieceCatalog,
    block_index: &mut BlockIndex,
    torrent: TorrentId,
    peer: PeerId,
    have: &HaveSet,
    mut budget: usize,
) -> anyhow::Result<PickOutcome> {
    let mut accumulator: Vec<(usize, Vec<crate::block_index::Locator>)> = Vec::new();
    let mut found_chunked = false;
    let mut remaining_have = have.clone();

    while budget > 0 {
        let chunked = catalog.chunked_pieces(torrent)?;
        let candidates = order_candidates(chunked.into_iter().filter(|p| remaining_have.has(*p)).collect());

        let selected = candidates
            .iter()
            .copied()
            .find(|&p| block_index.has_not_fetched(torrent, p));

        if selected.is_none() && !candidates.is_empty() {
            found_chunked = true;
        }

        let piece = match selected {
            Some(p) => p,
            None => match catalog.find_new(torrent, &remaining_have)? {
                Some(descriptor) => {
                    let blocks = catalog.chunkify_piece(torrent, &descriptor)?;
                    block_index.chunkify(torrent, descriptor.piece_index, &blocks);
                    descriptor.piece_index
                }
                None => break,
            },
        };

        let reserved = block_index.reserve(torrent, piece, peer, budget);
        if reserved.is_empty() {
            // `already_taken` (§7): nothing left to reserve on this
            // piece after all. Drop it from consideration and keep
            // going without consuming budget.
            let _ = remaining_have.remove(piece);
            continue;
        }

        budget -= reserved.len();
        let _ = remaining_have.remove(piece);
        accumulator.push((piece, reserved));
    }

    if !accumulator.is_empty() {
        return Ok(PickOutcome::Normal(accumulator));
    }
    if found_chunked {
        Ok(PickOutcome::NoneEligible)
    } else {
        Ok(PickOutcome::NotInterested)
    }
}
