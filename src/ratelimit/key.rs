//! Fixed-width lookup keys.

use ahash::RandomState;
use std::sync::OnceLock;

const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn hasher() -> &'static RandomState {
    static HASHER: OnceLock<RandomState> = OnceLock::new();
    HASHER.get_or_init(|| RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]))
}

/// A 64-bit digest of an arbitrary byte key, used as the table's lookup key.
///
/// The digest comes from a fast non-cryptographic hash with fixed seeds, so
/// the same bytes always produce the same key within a process.
///
/// # Collisions
///
/// Distinct inputs can map to the same `HashedKey`. When that happens the
/// two inputs share a single token bucket and are throttled together. This
/// is the accepted cost of a fixed-width key; for `n` live keys the chance of
/// any collision is roughly `n² / 2⁶⁵`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashedKey(u64);

impl HashedKey {
    /// Hash an arbitrary byte key.
    #[inline]
    pub fn of(key: impl AsRef<[u8]>) -> Self {
        Self(hasher().hash_one(key.as_ref()))
    }

    /// The raw 64-bit digest.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HashedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
