//! URI-to-key name generation

use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;

// Fixed seeds: generated names must be stable across processes, or every
// restart would orphan the whole disk cache.
const SEED: (u64, u64, u64, u64) = (
    0x7069_7861_6c6f_6164,
    0x6572_5f6e_616d_696e,
    0x675f_7365_6564_5f76,
    0x3100_0000_0000_0001,
);

/// Maps arbitrary identifiers (usually URIs) onto the disk cache's key
/// alphabet `[a-z0-9_-]{1,64}`.
///
/// Collisions are the generator's responsibility; the default implementation
/// hashes, which is collision-free enough for cache use.
pub trait FileNameGenerator: Send + Sync {
    /// Produce a valid cache key for the identifier
    fn generate(&self, uri: &str) -> String;
}

/// Default generator: a 64-bit hash of the URI rendered as lowercase hex
pub struct HashNameGenerator;

impl FileNameGenerator for HashNameGenerator {
    fn generate(&self, uri: &str) -> String {
        format!("{:016x}", stable_hash(uri))
    }
}

/// Process-stable 64-bit hash of a string
pub(crate) fn stable_hash(value: &str) -> u64 {
    let state = RandomState::with_seeds(SEED.0, SEED.1, SEED.2, SEED.3);
    let mut hasher = state.build_hasher();
    value.hash(&mut hasher);
    hasher.finish()
}
