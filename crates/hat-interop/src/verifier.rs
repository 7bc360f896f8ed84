// CROSS-CHAIN TRUST VERIFIER
// Verifies claims from registered chains and aggregates the survivors.
//
// SAFETY INVARIANTS:
// 1. Verification fails closed: unknown chain, missing signer or unknown scheme means false
// 2. Only verified claims enter the cache
// 3. Signatures cover every claim field; any post-signing change invalidates them
// 4. A reorg evicts every cached claim whose proof root it invalidated

use crate::claim::{claim_digest, CrossChainTrustClaim, ProofScheme, TrustProof};
use dashmap::DashMap;
use hat_core::{Address, CrossChainConfig, Hash256};
use hat_crypto::{recover_signer, reputation_leaf, verify_digest, MerkleProof};
use log::{debug, info, warn};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InteropError {
    #[error("chain {0} is not registered")]
    UnknownChain(u32),

    #[error("claim from chain {chain} for {target} failed verification")]
    Rejected { chain: u32, target: Address },

    #[error("claim from chain {chain} source {source_address} is older than the cached one")]
    Superseded { chain: u32, source_address: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerZeroKeys {
    pub oracle: Address,
    pub relayer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonKeys {
    pub members: Vec<Address>,
    /// Distinct member signatures required
    pub threshold: usize,
}

/// A chain we accept trust claims from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    pub chain_id: u32,
    pub name: String,
    /// Aggregation weight in (0, 1]
    pub weight: f64,
    pub layer_zero: Option<LayerZeroKeys>,
    pub chainlink: Option<DonKeys>,
}

impl ChainConfig {
    pub fn new(chain_id: u32, name: &str, weight: f64) -> Self {
        ChainConfig {
            chain_id,
            name: name.to_string(),
            weight,
            layer_zero: None,
            chainlink: None,
        }
    }

    pub fn with_layer_zero(mut self, oracle: Address, relayer: Address) -> Self {
        self.layer_zero = Some(LayerZeroKeys { oracle, relayer });
        self
    }

    pub fn with_chainlink(mut self, members: Vec<Address>, threshold: usize) -> Self {
        self.chainlink = Some(DonKeys { members, threshold });
        self
    }
}

/// Verified score held for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTrustScore {
    pub chain_id: u32,
    pub source_address: Address,
    pub trust_score: u8,
    pub timestamp: u64,
    pub proof_root: Hash256,
}

pub struct CrossChainVerifier {
    chains: DashMap<u32, ChainConfig>,
    scores: DashMap<Address, Vec<ChainTrustScore>>,
    config: CrossChainConfig,
}

impl CrossChainVerifier {
    pub fn new(config: CrossChainConfig) -> Self {
        CrossChainVerifier {
            chains: DashMap::new(),
            scores: DashMap::new(),
            config,
        }
    }

    pub fn register_chain(&self, chain: ChainConfig) {
        info!("Registered chain {} ({}) with weight {:.2}", chain.chain_id, chain.name, chain.weight);
        self.chains.insert(chain.chain_id, chain);
    }

    pub fn chain(&self, chain_id: u32) -> Option<ChainConfig> {
        self.chains.get(&chain_id).map(|c| c.clone())
    }

    fn within_age(&self, timestamp: u64, now: u64) -> bool {
        if timestamp > now.saturating_add(self.config.max_future_skew_secs) {
            return false;
        }
        now.saturating_sub(timestamp) <= self.config.max_claim_age_secs
    }

    /// Checks every signer `proof` requires against the chain's registered
    /// keys, plus claim freshness and range.
    pub fn verify_claim(&self, claim: &CrossChainTrustClaim, proof: &TrustProof, now: u64) -> bool {
        let chain = match self.chains.get(&claim.source_chain) {
            Some(chain) => chain.clone(),
            None => {
                warn!("Claim from unregistered chain {}", claim.source_chain);
                return false;
            }
        };
        if claim.trust_score > 100 {
            warn!("Claim for {} has out-of-range score {}", claim.target_address, claim.trust_score);
            return false;
        }
        if !self.within_age(claim.timestamp, now) {
            warn!(
                "Claim for {} from chain {} is stale or future-dated (ts {}, now {})",
                claim.target_address, claim.source_chain, claim.timestamp, now
            );
            return false;
        }

        let scheme = proof.scheme();
        let digest = match claim_digest(claim, scheme) {
            Ok(d) => d,
            Err(e) => {
                warn!("Claim digest failed: {}", e);
                return false;
            }
        };

        let ok = match (proof, scheme) {
            (
                TrustProof::LayerZero {
                    oracle_signature,
                    relayer_signature,
                },
                ProofScheme::LayerZero,
            ) => match &chain.layer_zero {
                Some(keys) => {
                    verify_digest(&digest, oracle_signature, &keys.oracle)
                        && verify_digest(&digest, relayer_signature, &keys.relayer)
                }
                None => false,
            },
            (TrustProof::ChainlinkDon { signatures }, ProofScheme::ChainlinkDon) => match &chain.chainlink {
                Some(don) if don.threshold > 0 => {
                    let signers: HashSet<Address> = signatures
                        .iter()
                        .filter_map(|sig| recover_signer(&digest, sig))
                        .filter(|signer| don.members.contains(signer))
                        .collect();
                    signers.len() >= don.threshold
                }
                _ => false,
            },
            _ => false,
        };

        if !ok {
            warn!(
                "{:?} proof for {} from chain {} failed verification",
                scheme, claim.target_address, claim.source_chain
            );
        }
        ok
    }

    /// Like `verify_claim` for a proof still in wire form.
    pub fn verify_encoded_claim(&self, claim: &CrossChainTrustClaim, proof: &[u8], now: u64) -> bool {
        match TrustProof::from_bytes(proof) {
            Some(proof) => self.verify_claim(claim, &proof, now),
            None => {
                warn!("Unrecognized proof scheme for claim on {}", claim.target_address);
                false
            }
        }
    }

    /// True when `proof` shows the claimed score is a leaf of `claim.proof_root`.
    pub fn verify_inclusion(&self, claim: &CrossChainTrustClaim, proof: &MerkleProof) -> bool {
        let leaf = reputation_leaf(&claim.source_address, i64::from(claim.trust_score), claim.timestamp);
        leaf == proof.leaf && proof.verify(&claim.proof_root)
    }

    /// Verifies and caches a claim. A newer claim from the same chain and
    /// source address replaces the older one; an older one is refused.
    pub fn submit_claim(
        &self,
        claim: &CrossChainTrustClaim,
        proof: &TrustProof,
        now: u64,
    ) -> Result<(), InteropError> {
        if !self.chains.contains_key(&claim.source_chain) {
            return Err(InteropError::UnknownChain(claim.source_chain));
        }
        if !self.verify_claim(claim, proof, now) {
            return Err(InteropError::Rejected {
                chain: claim.source_chain,
                target: claim.target_address,
            });
        }

        let mut entry = self.scores.entry(claim.target_address).or_default();
        let newer_cached = entry.iter().any(|s| {
            s.chain_id == claim.source_chain
                && s.source_address == claim.source_address
                && s.timestamp > claim.timestamp
        });
        if newer_cached {
            warn!(
                "Ignoring replayed chain {} claim from {} for {} (timestamp {})",
                claim.source_chain, claim.source_address, claim.target_address, claim.timestamp
            );
            return Err(InteropError::Superseded {
                chain: claim.source_chain,
                source_address: claim.source_address,
            });
        }
        entry.retain(|s| {
            !(s.chain_id == claim.source_chain
                && s.source_address == claim.source_address
                && s.timestamp <= claim.timestamp)
        });
        entry.push(ChainTrustScore {
            chain_id: claim.source_chain,
            source_address: claim.source_address,
            trust_score: claim.trust_score,
            timestamp: claim.timestamp,
            proof_root: claim.proof_root,
        });
        debug!("Cached chain {} score {} for {}", claim.source_chain, claim.trust_score, claim.target_address);
        Ok(())
    }

    pub fn scores_for(&self, address: &Address) -> Vec<ChainTrustScore> {
        self.scores.get(address).map(|s| s.clone()).unwrap_or_default()
    }

    /// Chain-weighted, age-decayed mean of cached scores. `None` when no
    /// fresh score remains.
    pub fn aggregated_trust(&self, address: &Address, now: u64) -> Option<u8> {
        let scores = self.scores_for(address);
        let mut weighted = 0.0;
        let mut total = 0.0;
        for score in &scores {
            if !self.within_age(score.timestamp, now) {
                continue;
            }
            let chain_weight = match self.chains.get(&score.chain_id) {
                Some(chain) => chain.weight,
                None => continue,
            };
            let age_hours = now.saturating_sub(score.timestamp) as f64 / 3600.0;
            let decay = (1.0 - age_hours / self.config.decay_horizon_hours).max(self.config.min_decay_factor);
            let weight = chain_weight * decay;
            weighted += f64::from(score.trust_score) * weight;
            total += weight;
        }
        if total <= 0.0 {
            return None;
        }
        Some((weighted / total).round().clamp(0.0, 100.0) as u8)
    }

    /// Drops cached claims from `chain_id` anchored to an invalidated root.
    pub fn handle_reorg(&self, chain_id: u32, invalidated_roots: &[Hash256]) -> usize {
        let mut removed = 0;
        for mut entry in self.scores.iter_mut() {
            let before = entry.len();
            entry.retain(|s| !(s.chain_id == chain_id && invalidated_roots.contains(&s.proof_root)));
            removed += before - entry.len();
        }
        self.scores.retain(|_, v| !v.is_empty());
        info!(
            "Reorg on chain {}: {} roots invalidated, {} cached claims evicted",
            chain_id,
            invalidated_roots.len(),
            removed
        );
        removed
    }
}
