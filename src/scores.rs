//! HAT score book.
//!
//! Holds externally computed HAT scores. Each score is sealed by the
//! scoring component with a digest over its fields; tampered or expired
//! scores are never served.

use dashmap::DashMap;
use hat_core::{Address, BlockHeight, Hash256, HatScore};
use hat_crypto::hashing::{canonical_digest, DOMAIN_SCORE};
use hat_crypto::CryptoResult;
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("score {0} out of range")]
    OutOfRange(u8),

    #[error("score for {0} expires before it was computed")]
    BadExpiry(Address),

    #[error("integrity hash mismatch for {0}")]
    IntegrityMismatch(Address),

    #[error("score hashing failed: {0}")]
    Hashing(String),
}

pub fn score_integrity_hash(
    address: &Address,
    score: u8,
    computed_at_height: BlockHeight,
    expires_at_height: BlockHeight,
) -> CryptoResult<Hash256> {
    canonical_digest(DOMAIN_SCORE, &(address, score, computed_at_height, expires_at_height))
}

/// Builds a sealed score valid for `ttl_blocks` after `computed_at_height`.
pub fn seal_score(
    address: Address,
    score: u8,
    computed_at_height: BlockHeight,
    ttl_blocks: u64,
) -> CryptoResult<HatScore> {
    let expires_at_height = computed_at_height.saturating_add(ttl_blocks);
    Ok(HatScore {
        address,
        score,
        computed_at_height,
        expires_at_height,
        integrity_hash: score_integrity_hash(&address, score, computed_at_height, expires_at_height)?,
    })
}

#[derive(Default)]
pub struct HatScoreBook {
    scores: DashMap<Address, HatScore>,
}

impl HatScoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `score` unless a score computed later is already held.
    pub fn submit(&self, score: HatScore) -> Result<bool, ScoreError> {
        if score.score > 100 {
            return Err(ScoreError::OutOfRange(score.score));
        }
        if score.expires_at_height <= score.computed_at_height {
            return Err(ScoreError::BadExpiry(score.address));
        }
        let expected = score_integrity_hash(
            &score.address,
            score.score,
            score.computed_at_height,
            score.expires_at_height,
        )
        .map_err(|e| ScoreError::Hashing(e.to_string()))?;
        if expected != score.integrity_hash {
            warn!("Rejected HAT score for {}: integrity hash mismatch", score.address);
            return Err(ScoreError::IntegrityMismatch(score.address));
        }

        let mut entry = self.scores.entry(score.address).or_insert_with(|| score.clone());
        if entry.computed_at_height > score.computed_at_height {
            debug!("Ignoring older HAT score for {}", score.address);
            return Ok(false);
        }
        *entry = score;
        Ok(true)
    }

    /// Current score, or `None` when absent or expired at `current_height`.
    pub fn query(&self, address: &Address, current_height: BlockHeight) -> Option<HatScore> {
        self.scores
            .get(address)
            .filter(|s| s.is_valid_at(current_height))
            .map(|s| s.clone())
    }

    /// Drops every score expired at `current_height`.
    pub fn prune_expired(&self, current_height: BlockHeight) -> usize {
        let before = self.scores.len();
        self.scores.retain(|_, s| s.is_valid_at(current_height));
        before - self.scores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sealed_score_round_trip() {
        let book = HatScoreBook::new();
        let score = seal_score(Address([1; 20]), 73, 100, 50).unwrap();
        assert!(book.submit(score.clone()).unwrap());
        assert_eq!(book.query(&score.address, 149), Some(score.clone()));
        assert_eq!(book.query(&score.address, 150), None);
        assert_eq!(book.prune_expired(150), 1);
    }

    #[test]
    fn test_tampered_score_rejected() {
        let book = HatScoreBook::new();
        let mut score = seal_score(Address([1; 20]), 40, 100, 50).unwrap();
        score.score = 95;
        assert_eq!(book.submit(score), Err(ScoreError::IntegrityMismatch(Address([1; 20]))));
        assert_eq!(book.query(&Address([1; 20]), 100), None);
    }

    #[test]
    fn test_older_score_does_not_replace_newer() {
        let book = HatScoreBook::new();
        let newer = seal_score(Address([2; 20]), 60, 200, 100).unwrap();
        let older = seal_score(Address([2; 20]), 10, 150, 500).unwrap();
        assert!(book.submit(newer.clone()).unwrap());
        assert!(!book.submit(older).unwrap());
        assert_eq!(book.query(&newer.address, 210).map(|s| s.score), Some(60));
    }

    #[test]
    fn test_invalid_scores_rejected() {
        let book = HatScoreBook::new();
        let score = seal_score(Address([3; 20]), 101, 10, 10).unwrap();
        assert_eq!(book.submit(score), Err(ScoreError::OutOfRange(101)));
        let score = seal_score(Address([3; 20]), 50, 10, 0).unwrap();
        assert_eq!(book.submit(score), Err(ScoreError::BadExpiry(Address([3; 20]))));
    }
}
