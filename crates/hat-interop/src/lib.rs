// HAT INTEROP
// Cross-chain trust claims: signature schemes, inclusion proofs and
// weighted aggregation.
pub mod claim;
pub mod verifier;

pub use claim::{claim_digest, sign_claim, CrossChainTrustClaim, ProofScheme, TrustProof};
pub use verifier::{
    ChainConfig, ChainTrustScore, CrossChainVerifier, DonKeys, InteropError, LayerZeroKeys,
};
