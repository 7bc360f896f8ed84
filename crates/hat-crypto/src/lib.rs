// HAT CRYPTO
// Attestation signatures, canonical hashing and Merkle proofs.
pub mod error;
pub mod hashing;
pub mod attestation;
pub mod merkle;
pub mod custody;

pub use error::{CryptoError, CryptoResult};

pub use hashing::{canonical_digest, hash_to_u64, keccak256, sha256};

pub use attestation::{
    address_of, derive_address, public_key_of, recover_signer, response_digest,
    secret_key_from_bytes, sign_digest, sign_response, sign_response_with, verify_digest,
    verify_response, SIGNATURE_LEN,
};

pub use merkle::{reputation_leaf, verify_merkle_proof, MerkleProof, MerkleTree};

pub use custody::LocalKeyCustody;

// Re-exported so callers can hold key types without a direct dependency.
pub use secp256k1::{PublicKey, SecretKey};
