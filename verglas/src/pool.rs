//! Worker pool for CPU-bound per-peer work
//!
//! Rounds fan independent work (Paillier encryptions, proof generation and
//! verification) out over the peers and join the results before finalizing.
//! Results are always joined in input order, so protocol output never depends
//! on scheduling.

use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRngCore, SeedableRng};
use rayon::prelude::*;

/// Execution strategy for per-peer work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pool {
    /// Fan out over the process-wide rayon pool
    #[default]
    Rayon,
    /// Run everything on the caller's thread
    Sequential,
}

impl Pool {
    pub(crate) fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        match self {
            Pool::Rayon => items.into_par_iter().map(f).collect(),
            Pool::Sequential => items.into_iter().map(f).collect(),
        }
    }
}

/// Derives an owned RNG from the session RNG
///
/// Tasks running on the pool cannot share the session RNG, so each task gets
/// its own seeded fork, drawn before the fan-out.
pub(crate) fn fork_rng(rng: &mut dyn CryptoRngCore) -> ChaCha20Rng {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    ChaCha20Rng::from_seed(seed)
}
