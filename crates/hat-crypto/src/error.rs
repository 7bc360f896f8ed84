use thiserror::Error;

/// Errors from key handling and encoding. Verification never produces one;
/// it returns `false`.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("merkle tree has no leaves")]
    EmptyTree,

    #[error("leaf index {index} out of bounds for {leaves} leaves")]
    LeafOutOfBounds { index: usize, leaves: usize },

    #[error("custody failure: {0}")]
    Custody(#[from] hat_core::CustodyError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
