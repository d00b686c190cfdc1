use anyhow::Context;

/// The set of piece indices a remote peer claims to possess (§3,
/// "Bitfield / have-set"). Reused almost verbatim from the wire-level
/// bitfield representation: the scheduler only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaveSet(Vec<u8>);

impl HaveSet {
    pub fn new(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    pub fn empty(pieces_amount: usize) -> Self {
        Self(vec![0; std::cmp::max(pieces_amount.div_ceil(8), 1)])
    }

    pub fn has(&self, piece: usize) -> bool {
        let Some(block) = self.0.get(piece / 8) else {
            return false;
        };
        let position = (piece % 8) as u32;
        block & 1u8.rotate_right(position + 1) != 0
    }

    pub fn add(&mut self, piece: usize) -> anyhow::Result<()> {
        let Some(block) = self.0.get_mut(piece / 8) else {
            return Err(anyhow::anyhow!("piece {piece} does not exist"));
        };
        let position = (piece % 8) as u32;
        *block |= 1u8.rotate_right(position + 1);
        Ok(())
    }

    pub fn remove(&mut self, piece: usize) -> anyhow::Result<()> {
        let Some(block) = self.0.get_mut(piece / 8) else {
            return Err(anyhow::anyhow!("piece {piece} does not exist"));
        };
        let position = (piece % 8) as u32;
        *block &= !1u8.rotate_right(position + 1);
        Ok(())
    }

    /// Piece indices present in the set, ascending. This is the
    /// "ascending `piece_index`" tie-break order the pick algorithm
    /// relies on (§4.2).
    pub fn pieces(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, byte)| {
            (0..8).filter_map(move |position| {
                let piece_i = i * 8 + (position as usize);
                let mask = 1u8.rotate_right(position + 1);
                (byte & mask != 0).then_some(piece_i)
            })
        })
    }

    pub fn missing_pieces(&self, total_pieces: usize) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(move |(i, byte)| {
            (0..8).filter_map(move |position| {
                let piece_i = i * 8 + (position as usize);
                if piece_i >= total_pieces {
                    return None;
                }
                let mask = 1u8.rotate_right(position + 1);
                (byte & mask == 0).then_some(piece_i)
            })
        })
    }

    /// Make sure the bitfield is appropriate for a given piece count.
    /// Fails if there are any 1's after the end, or it is too small or
    /// too large to fit the given piece count.
    pub fn validate(&self, total_pieces: usize) -> anyhow::Result<()> {
        let bitfield_pieces = self.0.len() * 8;
        let leftover = bitfield_pieces
            .checked_sub(total_pieces)
            .context("have-set has less capacity than needed")?;
        if leftover >= 8 {
            anyhow::bail!("have-set is larger than needed")
        }
        for piece in (bitfield_pieces - leftover)..bitfield_pieces {
            anyhow::ensure!(!self.has(piece));
        }
        Ok(())
    }
}

impl From<Vec<u8>> for HaveSet {
    fn from(value: Vec<u8>) -> Self {
        HaveSet(value)
    }
}

impl FromIterator<usize> for HaveSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let pieces: Vec<usize> = iter.into_iter().collect();
        let max = pieces.iter().copied().max().map_or(0, |m| m + 1);
        let mut set = HaveSet::empty(max);
        for piece in pieces {
            set.add(piece).expect("capacity sized from max piece index");
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::HaveSet;

    #[test]
    fn has_add_remove_roundtrip() {
        let data = [0b01110101, 0b01110001];
        let mut bf = HaveSet::new(&data);
        assert!(!bf.has(0));
        assert!(bf.has(1));
        assert!(bf.has(2));
        bf.add(0).unwrap();
        assert!(bf.has(0));
        bf.remove(0).unwrap();
        assert!(!bf.has(0));
        assert!(bf.add(100).is_err());
    }

    #[test]
    fn pieces_iterates_ascending() {
        let data = [0b01110101, 0b01110001];
        let bf = HaveSet::new(&data);
        let pieces: Vec<usize> = bf.pieces().collect();
        assert_eq!(pieces, vec![1, 2, 3, 5, 7, 9, 10, 11, 15]);
    }

    #[test]
    fn from_iter_builds_matching_set() {
        let bf: HaveSet = [0usize, 3, 7].into_iter().collect();
        assert!(bf.has(0));
        assert!(bf.has(3));
        assert!(bf.has(7));
        assert!(!bf.has(1));
        assert!(!bf.has(5));
    }

    #[test]
    fn validate_rejects_mismatched_capacity() {
        let data = [0b01110101, 0b01110001, 0b00100000];
        let bf = HaveSet::new(&data);
        assert!(bf.validate(16).is_err());
        assert!(bf.validate(19).is_ok());
        assert!(bf.validate(24).is_ok());
        assert!(bf.validate(25).is_err());
    }
}
