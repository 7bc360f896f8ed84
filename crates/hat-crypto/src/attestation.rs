// VALIDATOR RESPONSE ATTESTATION
// Recoverable secp256k1 signatures over canonical response digests.
//
// SAFETY INVARIANTS:
// 1. The signed digest covers every response field except the signature
// 2. A response is authentic iff the recovered key derives the claimed address
// 3. Verification is pure and never errors; any malformation yields false
// 4. Address derivation is identical for compressed and uncompressed key encodings

use crate::error::{CryptoError, CryptoResult};
use crate::hashing::{canonical_digest, keccak256, DOMAIN_RESPONSE};
use hat_core::{Address, Hash256, KeyCustody, KeyRef, ValidationResponse};
use log::debug;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// Compact signature plus one recovery byte.
pub const SIGNATURE_LEN: usize = 65;

/// Digest a validator signs for `response`.
pub fn response_digest(response: &ValidationResponse) -> CryptoResult<Hash256> {
    canonical_digest(
        DOMAIN_RESPONSE,
        &(
            &response.task_hash,
            &response.validator,
            &response.verdict,
            response.responded_at_ms,
        ),
    )
}

/// Last 20 bytes of Keccak-256 over the 64-byte uncompressed key body.
pub fn address_of(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.0[12..]);
    Address(out)
}

/// Derives the address for a serialized (33- or 65-byte) public key.
pub fn derive_address(public_key: &[u8]) -> CryptoResult<Address> {
    let key = PublicKey::from_slice(public_key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    Ok(address_of(&key))
}

pub fn secret_key_from_bytes(secret: &[u8]) -> CryptoResult<SecretKey> {
    SecretKey::from_slice(secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

pub fn public_key_of(secret: &SecretKey) -> PublicKey {
    PublicKey::from_secret_key(&Secp256k1::signing_only(), secret)
}

/// Signs a digest, producing a 65-byte recoverable signature.
pub fn sign_digest(digest: &Hash256, secret: &SecretKey) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(digest.0);
    let signature = secp.sign_ecdsa_recoverable(&message, secret);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&compact);
    out.push(recovery_id.to_i32() as u8);
    out
}

/// Recovers the signer's address, or `None` for any malformed input.
pub fn recover_signer(digest: &Hash256, signature: &[u8]) -> Option<Address> {
    if signature.len() != SIGNATURE_LEN {
        return None;
    }
    let recovery_id = RecoveryId::from_i32(signature[64] as i32).ok()?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id).ok()?;
    let message = Message::from_digest(digest.0);
    let key = Secp256k1::verification_only()
        .recover_ecdsa(&message, &recoverable)
        .ok()?;
    Some(address_of(&key))
}

pub fn verify_digest(digest: &Hash256, signature: &[u8], expected: &Address) -> bool {
    recover_signer(digest, signature).map_or(false, |signer| signer == *expected)
}

/// Signs `response` in place with a raw 32-byte secret key.
pub fn sign_response(response: &mut ValidationResponse, secret_key: &[u8]) -> CryptoResult<()> {
    let secret = secret_key_from_bytes(secret_key)?;
    let digest = response_digest(response)?;
    response.signature = sign_digest(&digest, &secret);
    Ok(())
}

/// Signs `response` through a custody service.
pub fn sign_response_with(
    response: &mut ValidationResponse,
    custody: &dyn KeyCustody,
    key: &KeyRef,
) -> CryptoResult<()> {
    let digest = response_digest(response)?;
    let signature = custody.sign(&digest, key)?;
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "custody returned {} bytes",
            signature.len()
        )));
    }
    response.signature = signature;
    Ok(())
}

/// True iff the signature recovers to the key behind `response.validator`.
pub fn verify_response(response: &ValidationResponse) -> bool {
    let digest = match response_digest(response) {
        Ok(d) => d,
        Err(e) => {
            debug!("Response digest failed: {}", e);
            return false;
        }
    };
    verify_digest(&digest, &response.signature, &response.validator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hat_core::Verdict;
    use proptest::prelude::*;

    fn key(n: u8) -> [u8; 32] {
        let mut k = [0u8; 32];
        k[31] = n.max(1);
        k[0] = n;
        k
    }

    fn signed_response(secret: &[u8; 32], trust: u8, at: u64) -> ValidationResponse {
        let sk = secret_key_from_bytes(secret).unwrap();
        let validator = address_of(&public_key_of(&sk));
        let verdict = Verdict { is_valid: true, trust_score: trust, confidence: 90 };
        let mut response = ValidationResponse::new(Hash256([3u8; 32]), validator, verdict, at);
        sign_response(&mut response, secret).unwrap();
        response
    }

    #[test]
    fn test_standard_address_derivation() {
        // Private key 1 maps to a well-known ledger address.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let sk = secret_key_from_bytes(&secret).unwrap();
        let pk = public_key_of(&sk);
        let expected = Address::from_hex("7e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap();
        assert_eq!(address_of(&pk), expected);
        assert_eq!(derive_address(&pk.serialize()).unwrap(), expected);
        assert_eq!(derive_address(&pk.serialize_uncompressed()).unwrap(), expected);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let mut response = signed_response(&key(1), 50, 1);
        assert!(matches!(sign_response(&mut response, &[0u8; 32]), Err(CryptoError::InvalidKey(_))));
        assert!(matches!(sign_response(&mut response, &[1u8; 7]), Err(CryptoError::InvalidKey(_))));
        assert!(derive_address(&[4u8; 12]).is_err());
    }

    #[test]
    fn test_truncated_signature_fails() {
        let mut response = signed_response(&key(2), 70, 5);
        response.signature.truncate(64);
        assert!(!verify_response(&response));
        response.signature.clear();
        assert!(!verify_response(&response));
    }

    #[test]
    fn test_field_tampering_fails() {
        let response = signed_response(&key(3), 70, 5);
        let mut tampered = response.clone();
        tampered.verdict.trust_score = 71;
        assert!(!verify_response(&tampered));
        let mut tampered = response.clone();
        tampered.responded_at_ms += 1;
        assert!(!verify_response(&tampered));
        let mut tampered = response;
        tampered.verdict.is_valid = false;
        assert!(!verify_response(&tampered));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sign_then_verify(seed in 1u8..=255, trust in 0u8..=100, at in any::<u64>()) {
            let response = signed_response(&key(seed), trust, at);
            prop_assert!(verify_response(&response));
        }

        #[test]
        fn prop_flipped_signature_byte_fails(seed in 1u8..=255, idx in 0usize..SIGNATURE_LEN, mask in 1u8..=255) {
            let mut response = signed_response(&key(seed), 40, 9);
            response.signature[idx] ^= mask;
            prop_assert!(!verify_response(&response));
        }

        #[test]
        fn prop_flipped_address_byte_fails(seed in 1u8..=255, idx in 0usize..20, mask in 1u8..=255) {
            let mut response = signed_response(&key(seed), 40, 9);
            response.validator.0[idx] ^= mask;
            prop_assert!(!verify_response(&response));
        }

        #[test]
        fn prop_derivation_is_deterministic(seed in 1u8..=255) {
            let sk = secret_key_from_bytes(&key(seed)).unwrap();
            let pk = public_key_of(&sk);
            prop_assert_eq!(address_of(&pk), address_of(&pk));
            prop_assert_eq!(derive_address(&pk.serialize()).unwrap(), address_of(&pk));
        }
    }
}
