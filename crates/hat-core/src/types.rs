// HAT CORE DATA MODEL
// Shared records passed between eligibility, attestation, dispute and
// cross-chain components.
//
// SAFETY INVARIANTS:
// 1. `ValidatorEligibilityRecord::is_eligible` is true iff all three requirement flags are true
// 2. Responses are never mutated after signing; re-signing requires a new response
// 3. HAT scores are valid only while `current_height < expires_at_height`
// 4. Field order of every serialized record is part of the signing contract

use serde::{Deserialize, Serialize};
use std::fmt;

/// Base-unit amount (1 coin = `COIN` units).
pub type Amount = u64;

/// Block height on the host ledger.
pub type BlockHeight = u64;

/// Base units per coin.
pub const COIN: Amount = 100_000_000;

/// Vote values are bounded to [-100, 100].
pub const MIN_VOTE_VALUE: i16 = -100;
pub const MAX_VOTE_VALUE: i16 = 100;

/// 20-byte account address (last 20 bytes of Keccak-256 over the public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Some(Address(out))
    }

    /// Parses a hex string with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(raw).ok().and_then(|b| Self::from_slice(&b))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

/// 32-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Some(Hash256(out))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(raw).ok().and_then(|b| Self::from_slice(&b))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(&self.0[..8]))
    }
}

// ==================== ELIGIBILITY ====================

/// Confidence tag attached to ledger-derived data.
///
/// Variants are ordered from most to least trustworthy, so `max` of two
/// tags yields the weaker one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum DataQuality {
    /// Fresh data from a synced ledger with an address index.
    #[default]
    Complete,
    /// Address index missing; data rebuilt from a full block scan.
    IndexFallback,
    /// Ledger not fully synced.
    Stale,
    /// Scan hit its time budget; counts are lower bounds.
    Partial,
}

impl DataQuality {
    pub fn is_low_confidence(&self) -> bool {
        matches!(self, DataQuality::Stale | DataQuality::Partial)
    }

    pub fn weaker(self, other: DataQuality) -> DataQuality {
        self.max(other)
    }
}

/// Eligibility snapshot for one candidate validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEligibilityRecord {
    /// Candidate address
    pub address: Address,

    /// Total stake controlled by the address
    pub staked_amount: Amount,

    /// Age in blocks of the oldest stake-backing output
    pub stake_age_blocks: u64,

    /// Blocks elapsed since the address first appeared on-chain
    pub blocks_since_first_seen: u64,

    /// Number of transactions involving the address
    pub transaction_count: u64,

    /// Distinct counterparties seen in those transactions
    pub unique_interactions: u64,

    /// Distinct funding sources backing the stake
    pub funding_sources: u32,

    /// Height at which this record was computed
    pub last_update_height: BlockHeight,

    /// Unix time (seconds) at which this record was computed
    pub last_update_time: u64,

    pub meets_stake_requirement: bool,
    pub meets_history_requirement: bool,
    pub meets_interaction_requirement: bool,

    /// Derived: all three requirement flags hold
    pub is_eligible: bool,

    /// Confidence of the ledger data the flags were computed from
    pub data_quality: DataQuality,
}

impl ValidatorEligibilityRecord {
    pub fn new(address: Address) -> Self {
        ValidatorEligibilityRecord {
            address,
            staked_amount: 0,
            stake_age_blocks: 0,
            blocks_since_first_seen: 0,
            transaction_count: 0,
            unique_interactions: 0,
            funding_sources: 0,
            last_update_height: 0,
            last_update_time: 0,
            meets_stake_requirement: false,
            meets_history_requirement: false,
            meets_interaction_requirement: false,
            is_eligible: false,
            data_quality: DataQuality::Complete,
        }
    }

    /// Recomputes `is_eligible` from the requirement flags.
    pub fn refresh_eligibility(&mut self) {
        self.is_eligible = self.meets_stake_requirement
            && self.meets_history_requirement
            && self.meets_interaction_requirement;
    }

    pub fn is_consistent(&self) -> bool {
        self.is_eligible
            == (self.meets_stake_requirement
                && self.meets_history_requirement
                && self.meets_interaction_requirement)
    }

    /// Eligible and backed by data we can act on.
    pub fn is_selectable(&self) -> bool {
        self.is_eligible && !self.data_quality.is_low_confidence()
    }
}

// ==================== ATTESTATION ====================

/// Lifecycle of an attestation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Broadcast,
    Collecting,
    Aggregated,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Aggregated | TaskState::TimedOut)
    }
}

/// Unit of reputation-verification work handed to a committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationTask {
    /// Deterministic task identifier
    pub task_hash: Hash256,

    /// Address whose reputation is being attested
    pub subject: Address,

    /// Ledger height the committee was selected for
    pub target_height: BlockHeight,

    /// Selected committee, in rank order
    pub committee: Vec<Address>,

    /// Node that announced the task and collects responses
    pub coordinator: Address,

    /// Creation time (unix millis)
    pub created_at_ms: u64,

    /// Responses after this instant are not collected (unix millis)
    pub deadline_ms: u64,
}

impl ValidationTask {
    pub fn is_member(&self, validator: &Address) -> bool {
        self.committee.contains(validator)
    }
}

/// A validator's assessment of a task's subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the reputation claim holds
    pub is_valid: bool,

    /// Trust score computed by the validator (0-100)
    pub trust_score: u8,

    /// Self-reported confidence (0-100)
    pub confidence: u8,
}

/// Signed answer from one committee member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub task_hash: Hash256,
    pub validator: Address,
    pub verdict: Verdict,
    /// Unix millis at which the validator produced the response
    pub responded_at_ms: u64,
    /// 65-byte recoverable signature over every other field
    pub signature: Vec<u8>,
}

impl ValidationResponse {
    pub fn new(task_hash: Hash256, validator: Address, verdict: Verdict, responded_at_ms: u64) -> Self {
        ValidationResponse {
            task_hash,
            validator,
            verdict,
            responded_at_ms,
            signature: Vec::new(),
        }
    }
}

/// Instant a response was accepted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationTimestamp {
    pub task_hash: Hash256,
    pub validator: Address,
    pub timestamp_ms: u64,
}

// ==================== SCORES & VOTES ====================

/// Externally computed HAT trust score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatScore {
    pub address: Address,
    /// Final trust score (0-100)
    pub score: u8,
    pub computed_at_height: BlockHeight,
    pub expires_at_height: BlockHeight,
    /// Digest over the fields above, produced by the scoring component
    pub integrity_hash: Hash256,
}

impl HatScore {
    pub fn is_valid_at(&self, current_height: BlockHeight) -> bool {
        current_height < self.expires_at_height
    }
}

/// Custody handle for a locked bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BondRef(pub Hash256);

/// Bonded reputation assertion by one address about another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationVote {
    pub voter: Address,
    pub target: Address,
    /// Vote value in [-100, 100]
    pub value: i16,
    pub height: BlockHeight,
    /// Unix seconds
    pub timestamp: u64,
    pub bond: Amount,
    /// Custody lock holding `bond`
    pub bond_ref: BondRef,
}

impl ReputationVote {
    pub fn value_in_range(&self) -> bool {
        (MIN_VOTE_VALUE..=MAX_VOTE_VALUE).contains(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_flag_follows_requirements() {
        let mut record = ValidatorEligibilityRecord::new(Address([1u8; 20]));
        record.meets_stake_requirement = true;
        record.meets_history_requirement = true;
        record.refresh_eligibility();
        assert!(!record.is_eligible);
        assert!(record.is_consistent());

        record.meets_interaction_requirement = true;
        record.refresh_eligibility();
        assert!(record.is_eligible);
        assert!(record.is_selectable());

        record.data_quality = DataQuality::Partial;
        assert!(!record.is_selectable());
    }

    #[test]
    fn test_data_quality_weaker() {
        assert_eq!(DataQuality::Complete.weaker(DataQuality::Stale), DataQuality::Stale);
        assert_eq!(DataQuality::Partial.weaker(DataQuality::IndexFallback), DataQuality::Partial);
        assert!(!DataQuality::IndexFallback.is_low_confidence());
    }

    #[test]
    fn test_address_hex_round_trip() {
        let addr = Address([0xab; 20]);
        assert_eq!(Address::from_hex(&addr.to_string()), Some(addr));
        assert_eq!(Address::from_hex(&addr.to_hex()), Some(addr));
        assert_eq!(Address::from_hex("0x1234"), None);
    }

    #[test]
    fn test_hat_score_expiry_is_exclusive() {
        let score = HatScore {
            address: Address::default(),
            score: 80,
            computed_at_height: 10,
            expires_at_height: 20,
            integrity_hash: Hash256::ZERO,
        };
        assert!(score.is_valid_at(19));
        assert!(!score.is_valid_at(20));
    }

    #[test]
    fn test_fixed_width_encoding() {
        // Addresses and hashes encode as raw bytes with no length prefix.
        let encoded = bincode::serialize(&(Address([7u8; 20]), Hash256([9u8; 32]))).unwrap();
        assert_eq!(encoded.len(), 52);
    }
}
