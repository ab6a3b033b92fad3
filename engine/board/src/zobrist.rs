//! Zobrist hashing keys.
//!
//! Keys are generated once from a fixed-seed ChaCha20 stream so hashes are
//! stable across runs and processes.

use once_cell::sync::Lazy;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::board::MAX_SQ;

/// Random keys for incremental position hashing.
pub struct ZobristKeys {
    /// Per-color, per-vertex stone keys.
    pub stones: [[u64; MAX_SQ]; 2],
    /// Side-to-move key, xored in when White is to move.
    pub to_move: u64,
    /// Keys for the consecutive-pass counter (clamped at 3).
    pub passes: [u64; 4],
}

pub static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(|| {
    let mut rng = ChaCha20Rng::seed_from_u64(0x5f3d_9ab1_c24e_7708);
    let mut stones = [[0u64; MAX_SQ]; 2];
    for color in &mut stones {
        for key in color.iter_mut() {
            *key = rng.next_u64();
        }
    }
    let to_move = rng.next_u64();
    let mut passes = [0u64; 4];
    for key in &mut passes {
        *key = rng.next_u64();
    }
    ZobristKeys {
        stones,
        to_move,
        passes,
    }
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct() {
        let keys = &*ZOBRIST;
        assert_ne!(keys.stones[0][100], keys.stones[1][100]);
        assert_ne!(keys.passes[0], keys.passes[1]);
        assert_ne!(keys.to_move, 0);
    }

    #[test]
    fn keys_are_deterministic() {
        // The table comes from a fixed seed, so regenerating the stream
        // reproduces the first key.
        let mut rng = ChaCha20Rng::seed_from_u64(0x5f3d_9ab1_c24e_7708);
        assert_eq!(ZOBRIST.stones[0][0], rng.next_u64());
    }
}
