//! Plain magic bitboards for rook and bishop sliding attacks.
//!
//! Lookup is `table[offset + ((occupied & mask) * magic) >> shift]`. The
//! per-square magic multipliers are found once at startup by a seeded
//! sparse-candidate search; the whole init is well under 100ms.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::LazyLock;

// ============================================================================
// LOOKUP
// ============================================================================

/// A single magic entry for one square.
pub struct MagicEntry {
    pub mask: u64,
    pub magic: u64,
    pub shift: u8,
    /// Offset into the shared attack table.
    pub offset: usize,
}

pub struct SliderTables {
    rook: [MagicEntry; 64],
    bishop: [MagicEntry; 64],
    /// Shared backing store for both piece types.
    table: Vec<u64>,
}

static TABLES: LazyLock<SliderTables> = LazyLock::new(SliderTables::build);

#[inline(always)]
fn magic_index(entry: &MagicEntry, occupied: u64) -> usize {
    let blockers = occupied & entry.mask;
    (blockers.wrapping_mul(entry.magic) >> entry.shift) as usize
}

#[inline(always)]
pub fn rook_attacks(sq: usize, occupied: u64) -> u64 {
    let t = &*TABLES;
    let entry = &t.rook[sq];
    t.table[entry.offset + magic_index(entry, occupied)]
}

#[inline(always)]
pub fn bishop_attacks(sq: usize, occupied: u64) -> u64 {
    let t = &*TABLES;
    let entry = &t.bishop[sq];
    t.table[entry.offset + magic_index(entry, occupied)]
}

#[inline(always)]
pub fn queen_attacks(sq: usize, occupied: u64) -> u64 {
    rook_attacks(sq, occupied) | bishop_attacks(sq, occupied)
}

/// Force table construction at startup instead of on the first lookup.
pub fn warmup_slider_tables() {
    let _ = TABLES.table.len();
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

const ROOK_DELTAS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const BISHOP_DELTAS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// Ray-walked attacks from `sq` stopping at (and including) blockers.
fn sliding_attacks(sq: usize, blockers: u64, deltas: &[(i32, i32)]) -> u64 {
    let rank = (sq / 8) as i32;
    let file = (sq % 8) as i32;
    let mut attacks = 0u64;
    for &(dr, df) in deltas {
        let mut r = rank + dr;
        let mut f = file + df;
        while (0..8).contains(&r) && (0..8).contains(&f) {
            let bit = 1u64 << (r * 8 + f);
            attacks |= bit;
            if blockers & bit != 0 {
                break;
            }
            r += dr;
            f += df;
        }
    }
    attacks
}

/// Relevant-occupancy mask: reachable squares excluding the edge along each
/// ray (an edge blocker never changes the attack set).
fn occupancy_mask(sq: usize, deltas: &[(i32, i32)]) -> u64 {
    let rank = (sq / 8) as i32;
    let file = (sq % 8) as i32;
    let mut mask = 0u64;
    for &(dr, df) in deltas {
        let mut r = rank + dr;
        let mut f = file + df;
        while (0..8).contains(&(r + dr)) && (0..8).contains(&(f + df)) {
            mask |= 1u64 << (r * 8 + f);
            r += dr;
            f += df;
        }
    }
    mask
}

/// Enumerate all subsets of `mask` with the Carry-Rippler trick.
fn enumerate_subsets(mask: u64) -> Vec<u64> {
    let mut subsets = Vec::with_capacity(1 << mask.count_ones());
    let mut subset = 0u64;
    loop {
        subsets.push(subset);
        subset = subset.wrapping_sub(mask) & mask;
        if subset == 0 {
            break;
        }
    }
    subsets
}

/// Sparse candidates (few set bits) are far more likely to hash without
/// collisions.
fn sparse_candidate(rng: &mut ChaCha8Rng) -> u64 {
    rng.gen::<u64>() & rng.gen::<u64>() & rng.gen::<u64>()
}

impl SliderTables {
    fn build() -> Self {
        let mut table = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0x0EA5_1DEA_5EED);
        let rook = build_piece(&mut table, &mut rng, &ROOK_DELTAS);
        let bishop = build_piece(&mut table, &mut rng, &BISHOP_DELTAS);
        SliderTables {
            rook,
            bishop,
            table,
        }
    }
}

fn build_piece(
    table: &mut Vec<u64>,
    rng: &mut ChaCha8Rng,
    deltas: &[(i32, i32)],
) -> [MagicEntry; 64] {
    std::array::from_fn(|sq| {
        let mask = occupancy_mask(sq, deltas);
        let bits = mask.count_ones() as u8;
        let shift = 64 - bits;
        let size = 1usize << bits;

        let subsets = enumerate_subsets(mask);
        let attacks: Vec<u64> = subsets
            .iter()
            .map(|&b| sliding_attacks(sq, b, deltas))
            .collect();

        // Trial candidates until every subset maps to a free slot or to the
        // same attack set (constructive collision).
        let magic = loop {
            let candidate = sparse_candidate(rng);
            if (candidate.wrapping_mul(mask) & 0xFF00_0000_0000_0000).count_ones() < 6 {
                continue;
            }

            let mut trial = vec![u64::MAX; size];
            let mut ok = true;
            for (i, &blockers) in subsets.iter().enumerate() {
                let idx = (blockers.wrapping_mul(candidate) >> shift) as usize;
                if trial[idx] == u64::MAX {
                    trial[idx] = attacks[i];
                } else if trial[idx] != attacks[i] {
                    ok = false;
                    break;
                }
            }
            if ok {
                break candidate;
            }
        };

        let offset = table.len();
        table.resize(offset + size, 0);
        for (i, &blockers) in subsets.iter().enumerate() {
            let idx = (blockers.wrapping_mul(magic) >> shift) as usize;
            table[offset + idx] = attacks[i];
        }

        MagicEntry {
            mask,
            magic,
            shift,
            offset,
        }
    })
}

#[cfg(test)]
mod test_magics {
    use super::*;

    #[test]
    fn test_rook_empty_board() {
        // Any square on an empty board reaches 14 squares.
        for sq in [0, 7, 28, 56, 63] {
            assert_eq!(rook_attacks(sq, 0).count_ones(), 14, "sq {sq}");
        }
    }

    #[test]
    fn test_bishop_empty_board() {
        assert_eq!(bishop_attacks(28, 0).count_ones(), 13); // e4
        assert_eq!(bishop_attacks(0, 0).count_ones(), 7); // a1
    }

    #[test]
    fn test_rook_blocked() {
        // Rook e4, blocker e6: can reach e5 and capture on e6, not beyond.
        let occ = 1u64 << 44;
        let attacks = rook_attacks(28, occ);
        assert!(attacks & (1 << 36) != 0); // e5
        assert!(attacks & (1 << 44) != 0); // e6
        assert!(attacks & (1 << 52) == 0); // e7
    }

    #[test]
    fn test_queen_is_union() {
        let occ = 0x00FF_0000_0012_3400u64;
        for sq in 0..64 {
            assert_eq!(
                queen_attacks(sq, occ),
                rook_attacks(sq, occ) | bishop_attacks(sq, occ)
            );
        }
    }

    #[test]
    fn test_lookup_matches_ray_walk() {
        // Exhaustive check over every relevant-occupancy subset for a few
        // squares; catches any collision the finder let through.
        for sq in [0, 27, 35, 63] {
            let mask = occupancy_mask(sq, &ROOK_DELTAS);
            for blockers in enumerate_subsets(mask) {
                assert_eq!(
                    rook_attacks(sq, blockers),
                    sliding_attacks(sq, blockers, &ROOK_DELTAS)
                );
            }
            let mask = occupancy_mask(sq, &BISHOP_DELTAS);
            for blockers in enumerate_subsets(mask) {
                assert_eq!(
                    bishop_attacks(sq, blockers),
                    sliding_attacks(sq, blockers, &BISHOP_DELTAS)
                );
            }
        }
    }
}
