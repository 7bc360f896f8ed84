//! Cross-chain trust claims and the proof schemes that attest to them.
//!
//! Each scheme signs the claim's canonical digest under its own domain tag,
//! so a signature produced for one scheme never verifies under another.

use hat_core::{Address, Hash256};
use hat_crypto::hashing::canonical_digest;
use hat_crypto::{sign_digest, CryptoResult, SecretKey};
use serde::{Deserialize, Serialize};

pub const DOMAIN_LAYER_ZERO: &[u8] = b"HAT/xchain/layerzero/v1";
pub const DOMAIN_CHAINLINK_DON: &[u8] = b"HAT/xchain/chainlink-don/v1";

/// Trust score asserted by another chain for one of our addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainTrustClaim {
    pub source_chain: u32,
    /// Address on the source chain the score was computed for
    pub source_address: Address,
    /// Local address the score applies to
    pub target_address: Address,
    /// 0-100
    pub trust_score: u8,
    /// Unix seconds on the source chain
    pub timestamp: u64,
    /// Root of the source chain's reputation tree containing this score
    pub proof_root: Hash256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofScheme {
    LayerZero,
    ChainlinkDon,
}

impl ProofScheme {
    pub fn domain(&self) -> &'static [u8] {
        match self {
            ProofScheme::LayerZero => DOMAIN_LAYER_ZERO,
            ProofScheme::ChainlinkDon => DOMAIN_CHAINLINK_DON,
        }
    }
}

/// Signer material for one proof scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustProof {
    /// Oracle and relayer must both sign
    LayerZero {
        oracle_signature: Vec<u8>,
        relayer_signature: Vec<u8>,
    },
    /// Threshold of DON members must sign
    ChainlinkDon { signatures: Vec<Vec<u8>> },
}

impl TrustProof {
    pub fn scheme(&self) -> ProofScheme {
        match self {
            TrustProof::LayerZero { .. } => ProofScheme::LayerZero,
            TrustProof::ChainlinkDon { .. } => ProofScheme::ChainlinkDon,
        }
    }

    /// Decodes a wire proof; unknown scheme tags yield `None`.
    pub fn from_bytes(raw: &[u8]) -> Option<TrustProof> {
        bincode::deserialize(raw).ok()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }
}

pub fn claim_digest(claim: &CrossChainTrustClaim, scheme: ProofScheme) -> CryptoResult<Hash256> {
    canonical_digest(scheme.domain(), claim)
}

/// Signature by `signer` over `claim` for `scheme`.
pub fn sign_claim(
    claim: &CrossChainTrustClaim,
    scheme: ProofScheme,
    signer: &SecretKey,
) -> CryptoResult<Vec<u8>> {
    Ok(sign_digest(&claim_digest(claim, scheme)?, signer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> CrossChainTrustClaim {
        CrossChainTrustClaim {
            source_chain: 1,
            source_address: Address([1; 20]),
            target_address: Address([2; 20]),
            trust_score: 70,
            timestamp: 1_700_000_000,
            proof_root: Hash256([3; 32]),
        }
    }

    #[test]
    fn test_digest_is_scheme_separated() {
        let c = claim();
        assert_ne!(
            claim_digest(&c, ProofScheme::LayerZero).unwrap(),
            claim_digest(&c, ProofScheme::ChainlinkDon).unwrap()
        );
    }

    #[test]
    fn test_digest_covers_every_field() {
        let base = claim_digest(&claim(), ProofScheme::LayerZero).unwrap();
        let mut c = claim();
        c.trust_score = 71;
        assert_ne!(claim_digest(&c, ProofScheme::LayerZero).unwrap(), base);
        let mut c = claim();
        c.timestamp += 1;
        assert_ne!(claim_digest(&c, ProofScheme::LayerZero).unwrap(), base);
        let mut c = claim();
        c.proof_root = Hash256([4; 32]);
        assert_ne!(claim_digest(&c, ProofScheme::LayerZero).unwrap(), base);
    }

    #[test]
    fn test_proof_wire_form() {
        let proof = TrustProof::ChainlinkDon { signatures: vec![vec![1, 2, 3]] };
        assert_eq!(TrustProof::from_bytes(&proof.to_bytes()), Some(proof));
        // Variant index 7 does not exist.
        assert_eq!(TrustProof::from_bytes(&[7, 0, 0, 0]), None);
    }
}
