use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Characters used in session codes. Ambiguous glyphs (0/O, 1/I/L) are
/// excluded so codes survive being read aloud or retyped.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of a session code.
pub const CODE_LEN: usize = 5;

/// Generator for short shareable session codes.
#[derive(Debug)]
pub struct CodeGenerator {
    rng: ChaCha20Rng,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Seeded variant for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn next_code(&mut self) -> String {
        (0..CODE_LEN)
            .map(|_| {
                let idx = self.rng.random_range(0..CODE_ALPHABET.len());
                CODE_ALPHABET[idx] as char
            })
            .collect()
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
