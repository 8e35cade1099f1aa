//! Deterministic state fingerprints
//!
//! A fingerprint is a 64-bit hash of a state's canonical bytes. Unlike
//! `std::collections::hash_map::DefaultHasher`, which uses random keys, these
//! functions give the same output for the same input across runs and
//! platforms, so two replays of the same log can be compared cheaply.
//!
//! # Example
//!
//! ```
//! use talebound_hub::hash::{hash_bytes_with_seed, DEFAULT_SEED};
//!
//! let h1 = hash_bytes_with_seed(b"hello", DEFAULT_SEED);
//! let h2 = hash_bytes_with_seed(b"hello", DEFAULT_SEED);
//! assert_eq!(h1, h2);
//! ```

use crate::error::{Error, Result};
use talebound_core::State;

/// Seed used by [`fingerprint`]
pub const DEFAULT_SEED: u64 = 0x7a1e_b0a7_5eed_0001;

/// Mix a value into a seed
///
/// SplitMix64 finalizer over `seed ^ value` offset by `slot`, so that the
/// same value in different positions mixes differently.
pub fn mix(seed: u64, value: u64, slot: u64) -> u64 {
    let mut z = seed
        ^ value.wrapping_add(0x9e37_79b9_7f4a_7c15)
        ^ slot.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Hash a byte slice with a seed
///
/// FNV-1a with the seed as the initial state, remixed every eight bytes and
/// once more with the length at the end.
pub fn hash_bytes_with_seed(bytes: &[u8], seed: u64) -> u64 {
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut h = seed;
    for (i, &b) in bytes.iter().enumerate() {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
        if i % 8 == 7 {
            h = mix(seed, h, i as u64);
        }
    }
    mix(seed, h, bytes.len() as u64)
}

/// Canonical byte encoding of a state
pub fn state_bytes(state: &State) -> Result<Vec<u8>> {
    bincode::serialize(state).map_err(|e| Error::Encoding(e.to_string()))
}

/// Fingerprint of a state
///
/// Equal states always have equal fingerprints; every map inside `State`
/// keeps insertion order, so equal logs give equal bytes.
pub fn fingerprint(state: &State) -> Result<u64> {
    Ok(hash_bytes_with_seed(&state_bytes(state)?, DEFAULT_SEED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use talebound_core::{CharacterId, CharacterSnapshot, SessionId};

    #[test]
    fn test_hash_bytes_deterministic() {
        let h1 = hash_bytes_with_seed(b"hello", DEFAULT_SEED);
        let h2 = hash_bytes_with_seed(b"hello", DEFAULT_SEED);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_bytes_different_values() {
        let h1 = hash_bytes_with_seed(b"hello", DEFAULT_SEED);
        let h2 = hash_bytes_with_seed(b"world", DEFAULT_SEED);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hash_bytes_different_seeds() {
        let h1 = hash_bytes_with_seed(b"hello", 100);
        let h2 = hash_bytes_with_seed(b"hello", 200);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hash_bytes_empty() {
        assert_eq!(
            hash_bytes_with_seed(b"", DEFAULT_SEED),
            hash_bytes_with_seed(b"", DEFAULT_SEED)
        );
        assert_ne!(hash_bytes_with_seed(b"", DEFAULT_SEED), hash_bytes_with_seed(b"\0", DEFAULT_SEED));
    }

    #[test]
    fn test_fingerprint_tracks_state() {
        let mut a = State::new(SessionId::new("s"));
        a.characters.insert(
            CharacterId::new("kara"),
            CharacterSnapshot::new("kara", "Kara", 20),
        );
        let b = a.clone();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());

        let mut c = a.clone();
        if let Some(kara) = c.characters.get_mut(&CharacterId::new("kara")) {
            kara.hp.current = 19;
        }
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
    }
}
