//! Process-local key custody backed by in-memory secp256k1 keys.

use crate::attestation::{address_of, public_key_of, secret_key_from_bytes, sign_digest};
use crate::error::CryptoResult;
use hat_core::{Address, CustodyError, Hash256, KeyCustody, KeyRef};
use parking_lot::RwLock;
use secp256k1::SecretKey;
use std::collections::HashMap;

#[derive(Default)]
pub struct LocalKeyCustody {
    keys: RwLock<HashMap<KeyRef, SecretKey>>,
}

impl LocalKeyCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports a raw 32-byte secret and returns the address it controls.
    pub fn import(&self, key: KeyRef, secret: &[u8]) -> CryptoResult<Address> {
        let secret = secret_key_from_bytes(secret)?;
        let address = address_of(&public_key_of(&secret));
        self.keys.write().insert(key, secret);
        Ok(address)
    }

    pub fn address_of(&self, key: &KeyRef) -> Option<Address> {
        self.keys.read().get(key).map(|sk| address_of(&public_key_of(sk)))
    }
}

impl KeyCustody for LocalKeyCustody {
    fn sign(&self, digest: &Hash256, key: &KeyRef) -> Result<Vec<u8>, CustodyError> {
        let keys = self.keys.read();
        let secret = keys.get(key).ok_or_else(|| CustodyError::UnknownKey(key.clone()))?;
        Ok(sign_digest(digest, secret))
    }

    fn public_key_of(&self, key: &KeyRef) -> Result<Vec<u8>, CustodyError> {
        let keys = self.keys.read();
        let secret = keys.get(key).ok_or_else(|| CustodyError::UnknownKey(key.clone()))?;
        Ok(public_key_of(secret).serialize().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{derive_address, sign_response_with, verify_response};
    use hat_core::{ValidationResponse, Verdict};

    #[test]
    fn test_custody_signed_response_verifies() {
        let custody = LocalKeyCustody::new();
        let key = KeyRef("validator".into());
        let address = custody.import(key.clone(), &[7u8; 32]).unwrap();

        let public = custody.public_key_of(&key).unwrap();
        assert_eq!(derive_address(&public).unwrap(), address);

        let verdict = Verdict { is_valid: false, trust_score: 12, confidence: 60 };
        let mut response = ValidationResponse::new(Hash256([1u8; 32]), address, verdict, 77);
        sign_response_with(&mut response, &custody, &key).unwrap();
        assert!(verify_response(&response));
    }

    #[test]
    fn test_unknown_key() {
        let custody = LocalKeyCustody::new();
        let missing = KeyRef("missing".into());
        assert!(matches!(custody.sign(&Hash256::ZERO, &missing), Err(CustodyError::UnknownKey(_))));
        assert!(custody.address_of(&missing).is_none());
    }
}
