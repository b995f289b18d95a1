//! Random identifier generation.
//!
//! Keys are drawn from a lowercase base32 alphabet so they survive being
//! typed into a URL or read out of an email in any case.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Source of random key material. Injected so tests can force collisions.
pub trait KeySource: Send + Sync {
    fn random_string(&self, len: usize) -> String;
}

/// Draw `len` characters from [`KEY_ALPHABET`].
pub fn random_string_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Backed by the thread-local OS-seeded generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngKeys;

impl KeySource for ThreadRngKeys {
    fn random_string(&self, len: usize) -> String {
        random_string_with(&mut rand::thread_rng(), len)
    }
}

/// Deterministic keys for reproducible runs.
pub struct SeededKeys {
    rng: Mutex<StdRng>,
}

impl SeededKeys {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl KeySource for SeededKeys {
    fn random_string(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        random_string_with(&mut *rng, len)
    }
}
