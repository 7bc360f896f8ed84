// DAO DISPUTE RECORD
// One state machine for direct and commit-reveal disputes.
//
// SAFETY INVARIANTS:
// 1. `rewards_distributed` implies `resolved`
// 2. `resolved` is set only after the voting window closes (deadline or early quorum)
// 3. Tallies change only through accepted votes, applied in acceptance order
// 4. Once resolved, only the one-time `rewards_distributed` transition remains

use hat_core::{
    Address, Amount, BlockHeight, BondRef, DisputeNotice, Hash256, ReputationVote,
    ValidationResponse,
};
use hat_crypto::hashing::{canonical_digest, sha256, DOMAIN_DISPUTE, DOMAIN_VOTE};
use hat_crypto::CryptoResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingMode {
    Direct,
    CommitReveal,
}

/// Derived lifecycle position of a dispute at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeState {
    /// Direct-mode voting open
    Created,
    CommitPhase,
    RevealPhase,
    /// Voting window over; awaiting resolution
    Closed,
    Resolved,
    RewardsDistributed,
}

impl DisputeState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DisputeState::Created | DisputeState::CommitPhase | DisputeState::RevealPhase
        )
    }
}

/// A counted DAO vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeVote {
    pub voter: Address,
    pub support_slash: bool,
    pub stake: Amount,
    pub height: BlockHeight,
}

/// Hidden vote awaiting reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCommitment {
    pub voter: Address,
    pub digest: Hash256,
    pub stake: Amount,
    pub height: BlockHeight,
    pub revealed: bool,
    /// Set at resolution for commitments that were never revealed
    pub forfeited: bool,
}

/// Vote submission, one variant per voting step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ballot {
    Direct { support_slash: bool, stake: Amount },
    Commit { digest: Hash256, stake: Amount },
    Reveal { support_slash: bool, nonce: [u8; 32] },
}

impl Ballot {
    /// Commit ballot hiding `support_slash` behind `nonce`.
    pub fn commit(support_slash: bool, nonce: &[u8; 32], stake: Amount) -> Ballot {
        Ballot::Commit {
            digest: commitment_digest(support_slash, nonce),
            stake,
        }
    }
}

/// `SHA-256(vote_byte || nonce)` with vote byte 0x01 for slash, 0x00 for keep.
pub fn commitment_digest(support_slash: bool, nonce: &[u8; 32]) -> Hash256 {
    let mut buf = [0u8; 33];
    buf[0] = u8::from(support_slash);
    buf[1..].copy_from_slice(nonce);
    sha256(&buf)
}

pub fn reputation_vote_hash(vote: &ReputationVote) -> CryptoResult<Hash256> {
    canonical_digest(DOMAIN_VOTE, vote)
}

pub fn dispute_id(
    target_vote_hash: &Hash256,
    challenger: &Address,
    created_height: BlockHeight,
) -> CryptoResult<Hash256> {
    canonical_digest(DOMAIN_DISPUTE, &(target_vote_hash, challenger, created_height))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoDispute {
    pub dispute_id: Hash256,
    pub challenger: Address,

    /// The bonded vote under challenge
    pub target_vote: ReputationVote,
    pub target_vote_hash: Hash256,

    pub challenge_bond: Amount,
    pub challenge_bond_ref: BondRef,

    /// Signed attestations supporting the challenge
    pub evidence: Vec<ValidationResponse>,

    pub created_height: BlockHeight,
    /// Unix seconds
    pub created_time: u64,

    pub mode: VotingMode,
    /// Unset in direct mode
    pub commit_phase_start: Option<BlockHeight>,
    pub reveal_phase_start: Option<BlockHeight>,
    /// First height at which no vote is accepted
    pub voting_deadline: BlockHeight,

    /// Stake-weighted tallies
    pub slash_votes: Amount,
    pub keep_votes: Amount,

    /// Counted votes in acceptance order
    pub votes: Vec<DisputeVote>,
    pub commitments: Vec<VoteCommitment>,

    pub resolved: bool,
    pub slash_decision: bool,
    pub rewards_distributed: bool,
    pub resolved_height: Option<BlockHeight>,
}

impl DaoDispute {
    pub fn has_voted(&self, voter: &Address) -> bool {
        self.votes.iter().any(|v| v.voter == *voter)
    }

    pub fn commitment_of(&self, voter: &Address) -> Option<&VoteCommitment> {
        self.commitments.iter().find(|c| c.voter == *voter)
    }

    pub fn total_voted_stake(&self) -> Amount {
        self.slash_votes.saturating_add(self.keep_votes)
    }

    /// Direct-mode disputes close early once `early_quorum` stake has voted.
    pub fn quorum_reached(&self, early_quorum: Option<Amount>) -> bool {
        self.mode == VotingMode::Direct
            && early_quorum.map_or(false, |q| q > 0 && self.total_voted_stake() >= q)
    }

    pub fn state_at(&self, height: BlockHeight, early_quorum: Option<Amount>) -> DisputeState {
        if self.rewards_distributed {
            return DisputeState::RewardsDistributed;
        }
        if self.resolved {
            return DisputeState::Resolved;
        }
        if height >= self.voting_deadline || self.quorum_reached(early_quorum) {
            return DisputeState::Closed;
        }
        match (self.mode, self.reveal_phase_start) {
            (VotingMode::CommitReveal, Some(reveal)) if height >= reveal => DisputeState::RevealPhase,
            (VotingMode::CommitReveal, _) => DisputeState::CommitPhase,
            (VotingMode::Direct, _) => DisputeState::Created,
        }
    }

    /// Bonds a payout for this dispute may draw from.
    pub fn payout_bonds(&self) -> Vec<BondRef> {
        if self.resolved && self.slash_decision {
            vec![self.challenge_bond_ref, self.target_vote.bond_ref]
        } else {
            vec![self.challenge_bond_ref]
        }
    }

    pub fn notice(&self) -> DisputeNotice {
        DisputeNotice {
            dispute_id: self.dispute_id,
            target_vote_hash: self.target_vote_hash,
            challenger: self.challenger,
            challenge_bond: self.challenge_bond,
            voting_deadline: self.voting_deadline,
        }
    }
}
