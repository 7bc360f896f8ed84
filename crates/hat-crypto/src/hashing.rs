//! Canonical hashing.
//!
//! Structured values are encoded with `bincode` (fixed-width little-endian,
//! declaration-order fields) and hashed with SHA-256 behind a domain tag, so
//! a digest computed for one purpose can never be replayed for another.

use crate::error::{CryptoError, CryptoResult};
use hat_core::Hash256;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

pub const DOMAIN_RESPONSE: &[u8] = b"HAT/response/v1";
pub const DOMAIN_TASK: &[u8] = b"HAT/task/v1";
pub const DOMAIN_COMMITTEE: &[u8] = b"HAT/committee/v1";
pub const DOMAIN_SCORE: &[u8] = b"HAT/score/v1";
pub const DOMAIN_VOTE: &[u8] = b"HAT/reputation-vote/v1";
pub const DOMAIN_DISPUTE: &[u8] = b"HAT/dispute/v1";
pub const DOMAIN_REWARD: &[u8] = b"HAT/reward/v1";

pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(data).into())
}

pub fn keccak256(data: &[u8]) -> Hash256 {
    Hash256(Keccak256::digest(data).into())
}

/// SHA-256 over `domain || bincode(value)`.
pub fn canonical_digest<T: Serialize + ?Sized>(domain: &[u8], value: &T) -> CryptoResult<Hash256> {
    let encoded = bincode::serialize(value).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(&encoded);
    Ok(Hash256(hasher.finalize().into()))
}

/// First eight bytes of a digest as a big-endian integer.
pub fn hash_to_u64(hash: &Hash256) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash.0[..8]);
    u64::from_be_bytes(word)
}
