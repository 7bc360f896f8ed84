// HOST COLLABORATORS
// Interfaces the HAT core consumes from the node it runs inside.
// Every component receives these explicitly; nothing reaches for a
// process-wide chain, wallet or network handle.

use crate::types::{Address, Amount, BlockHeight, BondRef, Hash256};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==================== LEDGER QUERY ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

/// Unspent output controlled by a queried address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub creation_height: BlockHeight,
    /// Address that funded the transaction creating this output
    pub funding_source: Address,
}

/// Transaction touching a queried address, from the address index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_hash: Hash256,
    pub height: BlockHeight,
    /// Other addresses involved in the transaction
    pub counterparties: Vec<Address>,
}

/// Transaction as seen in a raw block, used by the fallback scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTx {
    pub tx_hash: Hash256,
    /// Every address appearing in inputs or outputs
    pub participants: Vec<Address>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("address index unavailable")]
    IndexUnavailable,

    #[error("block {0} not available")]
    BlockUnavailable(BlockHeight),

    #[error("ledger query failed: {0}")]
    Query(String),
}

/// Read access to the host chain.
pub trait LedgerQuery: Send + Sync {
    fn current_height(&self) -> BlockHeight;

    /// False while the host is still catching up with the network.
    fn is_synced(&self) -> bool {
        true
    }

    fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, LedgerError>;

    /// Address-indexed history. Returns `IndexUnavailable` when the host
    /// runs without an address index.
    fn tx_history_for<'a>(
        &'a self,
        address: &Address,
    ) -> Result<Box<dyn Iterator<Item = TxRecord> + 'a>, LedgerError>;

    fn block_transactions(&self, height: BlockHeight) -> Result<Vec<BlockTx>, LedgerError>;
}

// ==================== PEER MESSAGING ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    TaskAnnouncement,
    ResponseSubmission,
    DisputeNotification,
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("peer {0} unreachable")]
    Unreachable(Address),

    #[error("send failed: {0}")]
    Send(String),
}

/// Opaque byte delivery to peers identified by validator address.
pub trait PeerMessaging: Send + Sync {
    fn send_to(&self, peer: &Address, kind: MessageType, payload: &[u8]) -> Result<(), MessagingError>;

    /// Best-effort fan-out. A failed peer never stops delivery to the rest;
    /// failures are returned for the caller to log.
    fn broadcast(
        &self,
        peers: &[Address],
        kind: MessageType,
        payload: &[u8],
    ) -> Vec<(Address, MessagingError)> {
        let mut failures = Vec::new();
        for peer in peers {
            if let Err(e) = self.send_to(peer, kind, payload) {
                warn!("Delivery of {:?} to {} failed: {}", kind, peer, e);
                failures.push((*peer, e));
            }
        }
        failures
    }
}

// ==================== KEY CUSTODY ====================

/// Opaque handle naming a key held by the custody service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRef(pub String);

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("unknown key {0:?}")]
    UnknownKey(KeyRef),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Signing service used only by the local validator's answer path.
pub trait KeyCustody: Send + Sync {
    /// Signs a 32-byte digest, returning a 65-byte recoverable signature.
    fn sign(&self, digest: &Hash256, key: &KeyRef) -> Result<Vec<u8>, CustodyError>;

    /// Serialized public key for `key`.
    fn public_key_of(&self, key: &KeyRef) -> Result<Vec<u8>, CustodyError>;
}

// ==================== ECONOMIC LEDGER ====================

/// One slice of a payout drawn from locked bonds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutFragment {
    /// Deterministic identifier; the ledger applies each id at most once
    pub id: Hash256,
    /// `None` burns the amount
    pub recipient: Option<Address>,
    pub amount: Amount,
}

#[derive(Debug, Error)]
pub enum EconomicError {
    #[error("insufficient funds for {owner}: need {needed}, have {available}")]
    InsufficientFunds {
        owner: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("unknown bond {0:?}")]
    UnknownBond(BondRef),

    #[error("payout of {requested} exceeds bonded {available}")]
    PayoutExceedsBond { requested: Amount, available: Amount },

    #[error("economic ledger failure: {0}")]
    Ledger(String),
}

/// Bond custody and payout.
pub trait EconomicLedger: Send + Sync {
    fn lock(&self, owner: &Address, amount: Amount) -> Result<BondRef, EconomicError>;

    /// Pays `fragments` out of `bonds`. Fragments whose id was already paid
    /// are skipped, which makes retries safe.
    fn payout(&self, bonds: &[BondRef], fragments: &[PayoutFragment]) -> Result<(), EconomicError>;
}
