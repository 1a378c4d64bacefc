//! Zobrist key material, fixed at compile time.
//!
//! Every feature key is the splitmix64 finalizer applied to its own slot
//! number in one flat stream, so the tables need no runtime init and the
//! whole set of 794 constants is pairwise distinct (checked below).

const STREAM_SEED: u64 = 0x004D_696E_6E6F_7721;

/// Splitmix64 output function over a counter (Steele/Lea/Flood's
/// SplittableRandom finalizer).
const fn key_at(slot: u64) -> u64 {
    let mut z = STREAM_SEED.wrapping_add(slot.wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

// Stream layout: 768 piece-square keys, then castling, en-passant, side.
const CASTLE_BASE: u64 = 768;
const EP_BASE: u64 = CASTLE_BASE + 16;
const SIDE_SLOT: u64 = EP_BASE + 9;

/// `PIECE_KEYS[color][piece][square]`
pub const PIECE_KEYS: [[[u64; 64]; 6]; 2] = {
    let mut keys = [[[0u64; 64]; 6]; 2];
    let mut color = 0;
    while color < 2 {
        let mut piece = 0;
        while piece < 6 {
            let mut sq = 0;
            while sq < 64 {
                keys[color][piece][sq] = key_at(((color * 6 + piece) * 64 + sq) as u64);
                sq += 1;
            }
            piece += 1;
        }
        color += 1;
    }
    keys
};

/// One key per castling-rights nibble.
pub const CASTLE_KEYS: [u64; 16] = {
    let mut keys = [0u64; 16];
    let mut i = 0;
    while i < 16 {
        keys[i] = key_at(CASTLE_BASE + i as u64);
        i += 1;
    }
    keys
};

/// Index 0 is "no en-passant file"; 1..=8 are files a..h.
pub const EP_KEYS: [u64; 9] = {
    let mut keys = [0u64; 9];
    let mut i = 0;
    while i < 9 {
        keys[i] = key_at(EP_BASE + i as u64);
        i += 1;
    }
    keys
};

pub const SIDE_KEY: u64 = key_at(SIDE_SLOT);

#[cfg(test)]
mod test_zobrist {
    use super::*;

    #[test]
    fn test_keys_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for color in &PIECE_KEYS {
            for piece in color {
                for &key in piece {
                    assert!(seen.insert(key));
                }
            }
        }
        for &key in CASTLE_KEYS.iter().chain(EP_KEYS.iter()) {
            assert!(seen.insert(key));
        }
        assert!(seen.insert(SIDE_KEY));
    }

    #[test]
    fn test_stream_layout_has_no_overlap() {
        // The named slots must tile the stream without reuse.
        assert_eq!(CASTLE_BASE, 2 * 6 * 64);
        assert_eq!(EP_BASE, CASTLE_BASE + 16);
        assert_eq!(SIDE_SLOT, EP_BASE + 9);
        assert_eq!(PIECE_KEYS[1][5][63], key_at(CASTLE_BASE - 1));
    }
}
