use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::bitfield::HaveSet;
use crate::block_index::{BlockIndex, Locator};
use crate::ids::TorrentId;

use super::PickOutcome;

/// The endgame pick algorithm (§4.2). Collects every outstanding
/// block (`not_fetched` or `{assigned, _}`, regardless of peer) whose
/// piece the remote claims, shuffles with a fair permutation, takes
/// the first `budget`, then groups by `piece_index` — explicitly, not
/// by merging adjacent same-piece entries, per §9's resolution of the
/// source's ambiguity ("spec demands explicit grouping by
/// `piece_index` regardless of order"). No reservation is recorded:
/// endgame deliberately allows duplicate outstanding requests.
pub(super) fn pick_endgame(
    block_index: &BlockIndex,
    torrent: TorrentId,
    have: &HaveSet,
    budget: usize,
    rng: &mut StdRng,
) -> PickOutcome {
    let mut candidates: Vec<(usize, Locator)> = Vec::new();
    for piece in block_index.pieces_in_progress(torrent) {
        if !have.has(piece) {
            continue;
        }
        for locator in block_index.outstanding_entries(torrent, piece) {
            candidates.push((piece, locator));
        }
    }

    candidates.shuffle(rng);
    candidates.truncate(budget);

    let mut grouped: HashMap<usize, Vec<Locator>> = HashMap::new();
    for (piece, locator) in candidates {
        grouped.entry(piece).or_default().push(locator);
    }
    let mut groups: Vec<(usize, Vec<Locator>)> = grouped.into_iter().collect();
    groups.shuffle(rng);

    PickOutcome::Endgame(groups)
}
