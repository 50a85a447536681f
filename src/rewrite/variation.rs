// src/rewrite/variation.rs
//! Deterministic "randomness" keyed on the input text.
//!
//! Every choice the rewriter makes between equivalent options (substitution
//! alternatives, lead phrase, which pair to swap) comes from here, so the same
//! text always yields the same output, across calls and restarts.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct Variation {
    seed: [u8; 32],
    counter: u64,
}

impl Variation {
    pub fn from_text(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Self { seed, counter: 0 }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut h = Sha256::new();
        h.update(self.seed);
        h.update(self.counter.to_le_bytes());
        self.counter += 1;
        let out = h.finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&out[..8]);
        u64::from_le_bytes(buf)
    }

    /// Index in `0..n`; `0` when there is nothing to choose between.
    pub fn pick(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % n as u64) as usize
    }
}
