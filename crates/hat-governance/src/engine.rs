// DISPUTE RESOLUTION ENGINE
// Opens, tallies, resolves and pays out DAO disputes against bonded
// reputation votes. The key-value store is the single source of truth;
// every operation re-reads the record it mutates.
//
// SAFETY INVARIANTS:
// 1. Mutations of one dispute are serialized on that dispute's lock; disputes never contend
// 2. Resolution happens at most once; a resolved dispute is never re-decided
// 3. Distribution records, reward records and the distributed flag land in one atomic batch
// 4. Every payout fragment carries a deterministic id, so a retried resolve or claim never pays twice
// 5. Bond locking and payouts happen outside any dispute or reward lock
// 6. A challenge that loses the race to persist releases its bond

use crate::dispute::{
    commitment_digest, dispute_id, reputation_vote_hash, Ballot, DaoDispute, DisputeState,
    DisputeVote, VoteCommitment, VotingMode,
};
use crate::rewards::{
    bond_release_fragment, burn_fragment, compute_distribution, pending_rewards, policy_for,
    PendingReward, RewardDistribution, VoterRewardPolicy,
};
use hat_core::{
    Address, Amount, BlockHeight, BondRef, DisputeConfig, EconomicError, EconomicLedger, Hash256,
    PayoutFragment, ReputationVote, RewardConfig, TieBreak, ValidationResponse,
};
use hat_crypto::{verify_response, CryptoError};
use hat_state::{with_retry, BatchOp, KeyLocks, KvStore, StoreError};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

pub const DISPUTE_PREFIX: &[u8] = b"dispute_";
pub const VOTE_DISPUTES_PREFIX: &[u8] = b"vote_disputes_";
pub const DISTRIBUTION_PREFIX: &[u8] = b"distribution_";
pub const REWARD_PREFIX: &[u8] = b"reward_";
pub const RECIPIENT_PREFIX: &[u8] = b"rewards_recipient_";

#[derive(Debug, Error)]
pub enum DisputeError {
    #[error("challenge bond {provided} below minimum {required}")]
    InsufficientBond { provided: Amount, required: Amount },

    #[error("target vote is malformed: {0}")]
    InvalidVote(String),

    #[error("voter cannot challenge their own vote")]
    SelfChallenge,

    #[error("evidence response from {0} failed signature verification")]
    InvalidEvidence(Address),

    #[error("dispute {0} already exists")]
    DuplicateDispute(Hash256),

    #[error("dispute {0} not found")]
    NotFound(Hash256),

    #[error("voting on dispute {0} is closed")]
    VotingClosed(Hash256),

    #[error("dispute {0} is still accepting votes")]
    VotingActive(Hash256),

    #[error("{ballot} ballot not accepted during {state:?}")]
    WrongPhase { ballot: &'static str, state: DisputeState },

    #[error("{0} already voted")]
    DuplicateVote(Address),

    #[error("{0} is a party to the dispute")]
    PartyCannotVote(Address),

    #[error("vote stake must be positive")]
    ZeroStake,

    #[error("reveal from {0} has no prior commitment")]
    NoCommitment(Address),

    #[error("reveal from {0} does not match its commitment")]
    CommitmentMismatch(Address),

    #[error("dispute {0} already resolved")]
    AlreadyResolved(Hash256),

    #[error("distribution for dispute {0} does not conserve the bond pool")]
    Unbalanced(Hash256),

    #[error("reward {0} not found")]
    RewardNotFound(Hash256),

    #[error("reward {reward} is not payable to {claimant}")]
    NotRecipient { reward: Hash256, claimant: Address },

    #[error("reward {0} already claimed")]
    AlreadyClaimed(Hash256),

    #[error("economic ledger: {0}")]
    Economic(#[from] EconomicError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("encoding failure: {0}")]
    Encoding(String),

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

impl DisputeError {
    /// Logic errors that point at a caller or state-machine bug rather than
    /// ordinary bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            DisputeError::AlreadyResolved(_)
                | DisputeError::CommitmentMismatch(_)
                | DisputeError::NoCommitment(_)
                | DisputeError::AlreadyClaimed(_)
                | DisputeError::Unbalanced(_)
        )
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, DisputeError::Storage(_) | DisputeError::Encoding(_))
    }
}

pub type DisputeResult<T> = Result<T, DisputeError>;

/// Result of an accepted ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteReceipt {
    Counted { slash_votes: Amount, keep_votes: Amount },
    Committed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisputeStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub distributed: usize,
}

fn hex_key(prefix: &[u8], parts: &[&str]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(b'_');
        }
        key.extend_from_slice(part.as_bytes());
    }
    key
}

pub fn dispute_key(id: &Hash256) -> Vec<u8> {
    hex_key(DISPUTE_PREFIX, &[&id.to_hex()])
}

fn vote_index_key(vote_hash: &Hash256, id: &Hash256) -> Vec<u8> {
    hex_key(VOTE_DISPUTES_PREFIX, &[&vote_hash.to_hex(), &id.to_hex()])
}

fn distribution_key(id: &Hash256) -> Vec<u8> {
    hex_key(DISTRIBUTION_PREFIX, &[&id.to_hex()])
}

fn reward_key(id: &Hash256) -> Vec<u8> {
    hex_key(REWARD_PREFIX, &[&id.to_hex()])
}

fn recipient_key(recipient: &Address, reward: &Hash256) -> Vec<u8> {
    hex_key(RECIPIENT_PREFIX, &[&recipient.to_hex(), &reward.to_hex()])
}

fn encode<T: Serialize>(value: &T) -> DisputeResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DisputeError::Encoding(e.to_string()))
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> DisputeResult<T> {
    bincode::deserialize(raw).map_err(|e| DisputeError::Encoding(e.to_string()))
}

pub struct DisputeEngine {
    store: Arc<dyn KvStore>,
    economics: Arc<dyn EconomicLedger>,
    config: DisputeConfig,
    rewards: RewardConfig,
    policy: Box<dyn VoterRewardPolicy>,
    locks: KeyLocks,
}

impl DisputeEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        economics: Arc<dyn EconomicLedger>,
        config: DisputeConfig,
        rewards: RewardConfig,
    ) -> Self {
        let policy = policy_for(rewards.voter_split);
        DisputeEngine {
            store,
            economics,
            config,
            rewards,
            policy,
            locks: KeyLocks::new(),
        }
    }

    /// Replaces the voter reward policy selected by configuration.
    pub fn with_policy(mut self, policy: Box<dyn VoterRewardPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &DisputeConfig {
        &self.config
    }

    fn reject(&self, err: DisputeError) -> DisputeError {
        if err.is_invariant_violation() {
            error!("Dispute invariant violation: {}", err);
        } else if err.is_storage() {
            error!("Dispute storage failure: {}", err);
        } else {
            warn!("Dispute operation rejected: {}", err);
        }
        err
    }

    fn load_dispute(&self, id: &Hash256) -> DisputeResult<DaoDispute> {
        match self.store.get(&dispute_key(id))? {
            Some(raw) => decode(&raw),
            None => Err(DisputeError::NotFound(*id)),
        }
    }

    fn save_dispute(&self, dispute: &DaoDispute) -> DisputeResult<()> {
        let raw = encode(dispute)?;
        let key = dispute_key(&dispute.dispute_id);
        with_retry("dispute write", || self.store.put(&key, &raw))?;
        Ok(())
    }

    // ==================== OPEN ====================

    /// Challenges `target` with a bond locked from `challenger`. Evidence
    /// responses must carry valid attestation signatures.
    pub fn open_dispute(
        &self,
        target: &ReputationVote,
        challenger: Address,
        bond: Amount,
        evidence: Vec<ValidationResponse>,
        height: BlockHeight,
        now: u64,
    ) -> DisputeResult<DaoDispute> {
        self.open_inner(target, challenger, bond, evidence, height, now)
            .map_err(|e| self.reject(e))
    }

    fn open_inner(
        &self,
        target: &ReputationVote,
        challenger: Address,
        bond: Amount,
        evidence: Vec<ValidationResponse>,
        height: BlockHeight,
        now: u64,
    ) -> DisputeResult<DaoDispute> {
        if bond < self.config.min_challenge_bond {
            return Err(DisputeError::InsufficientBond {
                provided: bond,
                required: self.config.min_challenge_bond,
            });
        }
        if !target.value_in_range() {
            return Err(DisputeError::InvalidVote(format!("value {} out of range", target.value)));
        }
        if challenger == target.voter {
            return Err(DisputeError::SelfChallenge);
        }
        if let Some(bad) = evidence.iter().find(|r| !verify_response(r)) {
            return Err(DisputeError::InvalidEvidence(bad.validator));
        }

        let vote_hash = reputation_vote_hash(target)?;
        let id = dispute_id(&vote_hash, &challenger, height)?;
        let key = dispute_key(&id);
        if self.store.get(&key)?.is_some() {
            return Err(DisputeError::DuplicateDispute(id));
        }

        let bond_ref = self.economics.lock(&challenger, bond)?;

        let (mode, commit_start, reveal_start, deadline) = if self.config.commit_reveal {
            let reveal = height.saturating_add(self.config.commit_phase_blocks);
            (
                VotingMode::CommitReveal,
                Some(height),
                Some(reveal),
                reveal.saturating_add(self.config.reveal_phase_blocks),
            )
        } else {
            (
                VotingMode::Direct,
                None,
                None,
                height.saturating_add(self.config.voting_period_blocks),
            )
        };

        let dispute = DaoDispute {
            dispute_id: id,
            challenger,
            target_vote: target.clone(),
            target_vote_hash: vote_hash,
            challenge_bond: bond,
            challenge_bond_ref: bond_ref,
            evidence,
            created_height: height,
            created_time: now,
            mode,
            commit_phase_start: commit_start,
            reveal_phase_start: reveal_start,
            voting_deadline: deadline,
            slash_votes: 0,
            keep_votes: 0,
            votes: Vec::new(),
            commitments: Vec::new(),
            resolved: false,
            slash_decision: false,
            rewards_distributed: false,
            resolved_height: None,
        };

        let persisted = self.locks.with_lock(&key, || -> DisputeResult<bool> {
            if self.store.get(&key)?.is_some() {
                return Ok(false);
            }
            let ops = vec![
                BatchOp::Put(key.clone(), encode(&dispute)?),
                BatchOp::Put(vote_index_key(&vote_hash, &id), Vec::new()),
            ];
            with_retry("dispute open", || self.store.write_batch(ops.clone()))?;
            Ok(true)
        });
        match persisted {
            Ok(true) => {}
            Ok(false) => {
                self.release_bond(&challenger, bond_ref, bond);
                return Err(DisputeError::DuplicateDispute(id));
            }
            Err(e) => {
                error!("Dispute {} not persisted: {}", id, e);
                self.release_bond(&challenger, bond_ref, bond);
                return Err(e);
            }
        }

        info!(
            "Dispute {} opened by {} against vote {} (bond {}, {:?}, deadline {})",
            id, challenger, vote_hash, bond, mode, deadline
        );
        Ok(dispute)
    }

    /// Returns a challenge bond whose dispute was never persisted.
    fn release_bond(&self, owner: &Address, bond_ref: BondRef, amount: Amount) {
        let released = bond_release_fragment(&bond_ref, owner, amount)
            .map_err(DisputeError::from)
            .and_then(|fragment| {
                self.economics
                    .payout(&[bond_ref], &[fragment])
                    .map_err(DisputeError::from)
            });
        match released {
            Ok(()) => info!("Challenge bond {:?} of {} released", bond_ref, owner),
            Err(e) => error!("Challenge bond {:?} of {} left locked: {}", bond_ref, owner, e),
        }
    }

    // ==================== VOTE ====================

    pub fn cast_vote(
        &self,
        id: &Hash256,
        voter: Address,
        ballot: Ballot,
        height: BlockHeight,
    ) -> DisputeResult<VoteReceipt> {
        self.locks
            .with_lock(&dispute_key(id), || self.cast_inner(id, voter, ballot, height))
            .map_err(|e| self.reject(e))
    }

    fn cast_inner(
        &self,
        id: &Hash256,
        voter: Address,
        ballot: Ballot,
        height: BlockHeight,
    ) -> DisputeResult<VoteReceipt> {
        let mut dispute = self.load_dispute(id)?;
        if voter == dispute.challenger || voter == dispute.target_vote.voter {
            return Err(DisputeError::PartyCannotVote(voter));
        }

        let state = dispute.state_at(height, self.config.early_quorum_stake);
        if !state.is_active() {
            return Err(DisputeError::VotingClosed(*id));
        }

        let receipt = match (ballot, state) {
            (Ballot::Direct { support_slash, stake }, DisputeState::Created) => {
                if stake == 0 {
                    return Err(DisputeError::ZeroStake);
                }
                if dispute.has_voted(&voter) {
                    return Err(DisputeError::DuplicateVote(voter));
                }
                count_vote(&mut dispute, voter, support_slash, stake, height)
            }
            (Ballot::Commit { digest, stake }, DisputeState::CommitPhase) => {
                if stake == 0 {
                    return Err(DisputeError::ZeroStake);
                }
                if dispute.commitment_of(&voter).is_some() {
                    return Err(DisputeError::DuplicateVote(voter));
                }
                dispute.commitments.push(VoteCommitment {
                    voter,
                    digest,
                    stake,
                    height,
                    revealed: false,
                    forfeited: false,
                });
                VoteReceipt::Committed
            }
            (Ballot::Reveal { support_slash, nonce }, DisputeState::RevealPhase) => {
                let commitment = dispute
                    .commitments
                    .iter_mut()
                    .find(|c| c.voter == voter)
                    .ok_or(DisputeError::NoCommitment(voter))?;
                if commitment.revealed {
                    return Err(DisputeError::DuplicateVote(voter));
                }
                if commitment_digest(support_slash, &nonce) != commitment.digest {
                    return Err(DisputeError::CommitmentMismatch(voter));
                }
                commitment.revealed = true;
                let stake = commitment.stake;
                count_vote(&mut dispute, voter, support_slash, stake, height)
            }
            (ballot, state) => {
                let kind = match ballot {
                    Ballot::Direct { .. } => "direct",
                    Ballot::Commit { .. } => "commit",
                    Ballot::Reveal { .. } => "reveal",
                };
                return Err(DisputeError::WrongPhase { ballot: kind, state });
            }
        };

        self.save_dispute(&dispute)?;
        debug!("Dispute {} ballot from {} accepted: {:?}", id, voter, receipt);
        Ok(receipt)
    }

    // ==================== RESOLVE ====================

    /// Decides the dispute and distributes its bond pool. A retry after a
    /// partial failure finishes the distribution; a call after completion
    /// is rejected without touching state.
    pub fn resolve(&self, id: &Hash256, height: BlockHeight, now: u64) -> DisputeResult<RewardDistribution> {
        self.resolve_inner(id, height, now).map_err(|e| self.reject(e))
    }

    fn resolve_inner(&self, id: &Hash256, height: BlockHeight, now: u64) -> DisputeResult<RewardDistribution> {
        let key = dispute_key(id);
        let (dispute, distribution) = self.locks.with_lock(&key, || self.decide_and_split(id, height, now))?;

        if let Some(burn) = burn_fragment(&distribution)? {
            self.economics.payout(&dispute.payout_bonds(), &[burn])?;
        }

        self.locks.with_lock(&key, || self.publish_rewards(id, &distribution))?;

        info!(
            "Dispute {} distributed: pool {}, bond return {}, bounty {}, voters {} ({}), burned {}",
            id,
            distribution.total_bond_pool,
            distribution.challenger_bond_return,
            distribution.challenger_bounty,
            distribution.total_dao_voter_rewards,
            self.policy.name(),
            distribution.burned_amount
        );
        Ok(distribution)
    }

    fn decide_and_split(
        &self,
        id: &Hash256,
        height: BlockHeight,
        now: u64,
    ) -> DisputeResult<(DaoDispute, RewardDistribution)> {
        let mut dispute = self.load_dispute(id)?;
        if dispute.rewards_distributed {
            return Err(DisputeError::AlreadyResolved(*id));
        }

        if !dispute.resolved {
            if dispute.state_at(height, self.config.early_quorum_stake).is_active() {
                return Err(DisputeError::VotingActive(*id));
            }
            let forfeited = forfeit_unrevealed(&mut dispute);
            if forfeited > 0 {
                info!("Dispute {}: {} unrevealed commitments forfeited", id, forfeited);
            }
            dispute.slash_decision = decide(&dispute, &self.config);
            dispute.resolved = true;
            dispute.resolved_height = Some(height);
            self.save_dispute(&dispute)?;
            info!(
                "Dispute {} resolved at height {}: {} (slash {} / keep {}, {} votes)",
                id,
                height,
                if dispute.slash_decision { "slash" } else { "keep" },
                dispute.slash_votes,
                dispute.keep_votes,
                dispute.votes.len()
            );
        } else {
            warn!("Dispute {} resolved earlier without distribution; completing", id);
        }

        let distribution = compute_distribution(&dispute, &self.rewards, self.policy.as_ref(), now);
        if !distribution.is_conserved() {
            return Err(DisputeError::Unbalanced(*id));
        }
        Ok((dispute, distribution))
    }

    /// Writes the distribution, its reward records and the distributed flag.
    /// A concurrent resolve that published first wins.
    fn publish_rewards(&self, id: &Hash256, distribution: &RewardDistribution) -> DisputeResult<()> {
        let mut dispute = self.load_dispute(id)?;
        if dispute.rewards_distributed {
            return Err(DisputeError::AlreadyResolved(*id));
        }
        let rewards = pending_rewards(distribution)?;
        dispute.rewards_distributed = true;

        let mut ops = vec![
            BatchOp::Put(distribution_key(id), encode(distribution)?),
            BatchOp::Put(dispute_key(id), encode(&dispute)?),
        ];
        for reward in &rewards {
            ops.push(BatchOp::Put(reward_key(&reward.reward_id), encode(reward)?));
            ops.push(BatchOp::Put(recipient_key(&reward.recipient, &reward.reward_id), Vec::new()));
        }
        with_retry("reward distribution", || self.store.write_batch(ops.clone()))?;
        Ok(())
    }

    // ==================== CLAIM ====================

    /// Pays a pending reward to its recipient.
    pub fn claim_reward(&self, reward_id: &Hash256, claimant: Address, now: u64) -> DisputeResult<PendingReward> {
        self.claim_inner(reward_id, claimant, now).map_err(|e| self.reject(e))
    }

    fn claim_inner(&self, reward_id: &Hash256, claimant: Address, now: u64) -> DisputeResult<PendingReward> {
        let key = reward_key(reward_id);
        let reward = self.locks.with_lock(&key, || self.claimable(reward_id, claimant))?;

        let dispute = self.load_dispute(&reward.dispute_id)?;
        let fragment = PayoutFragment {
            id: reward.reward_id,
            recipient: Some(reward.recipient),
            amount: reward.amount,
        };
        self.economics.payout(&dispute.payout_bonds(), &[fragment])?;

        let reward = self.locks.with_lock(&key, || -> DisputeResult<PendingReward> {
            let mut reward = self.claimable(reward_id, claimant)?;
            reward.claimed = true;
            reward.claimed_time = Some(now);
            let raw = encode(&reward)?;
            with_retry("reward claim", || self.store.put(&key, &raw))?;
            Ok(reward)
        })?;

        info!(
            "Reward {} ({:?}, {}) claimed by {}",
            reward_id, reward.reward_type, reward.amount, claimant
        );
        Ok(reward)
    }

    /// The unclaimed reward `reward_id`, provided `claimant` is its recipient.
    fn claimable(&self, reward_id: &Hash256, claimant: Address) -> DisputeResult<PendingReward> {
        let reward: PendingReward = match self.store.get(&reward_key(reward_id))? {
            Some(raw) => decode(&raw)?,
            None => return Err(DisputeError::RewardNotFound(*reward_id)),
        };
        if reward.recipient != claimant {
            return Err(DisputeError::NotRecipient {
                reward: *reward_id,
                claimant,
            });
        }
        if reward.claimed {
            return Err(DisputeError::AlreadyClaimed(*reward_id));
        }
        Ok(reward)
    }

    /// Lock-table entries currently held or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    // ==================== QUERIES ====================

    pub fn dispute(&self, id: &Hash256) -> Option<DaoDispute> {
        match self.load_dispute(id) {
            Ok(d) => Some(d),
            Err(DisputeError::NotFound(_)) => None,
            Err(e) => {
                warn!("Dispute {} unreadable: {}", id, e);
                None
            }
        }
    }

    pub fn dispute_state(&self, id: &Hash256, height: BlockHeight) -> Option<DisputeState> {
        self.dispute(id)
            .map(|d| d.state_at(height, self.config.early_quorum_stake))
    }

    /// Dispute ids opened against the vote with hash `vote_hash`.
    pub fn disputes_for_vote(&self, vote_hash: &Hash256) -> Vec<Hash256> {
        let mut prefix = VOTE_DISPUTES_PREFIX.to_vec();
        prefix.extend_from_slice(vote_hash.to_hex().as_bytes());
        prefix.push(b'_');
        self.scan_suffix_ids(&prefix)
    }

    fn stored_distribution(&self, id: &Hash256) -> DisputeResult<Option<RewardDistribution>> {
        match self.store.get(&distribution_key(id))? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn reward_distribution(&self, id: &Hash256) -> Option<RewardDistribution> {
        self.stored_distribution(id).unwrap_or_else(|e| {
            warn!("Distribution for {} unreadable: {}", id, e);
            None
        })
    }

    fn scan_suffix_ids(&self, prefix: &[u8]) -> Vec<Hash256> {
        self.store
            .prefix_scan(prefix)
            .filter_map(|item| match item {
                Ok((key, _)) => {
                    let suffix = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                    Hash256::from_hex(&suffix)
                }
                Err(e) => {
                    warn!("Index scan error: {}", e);
                    None
                }
            })
            .collect()
    }

    fn rewards_of(&self, recipient: &Address) -> Vec<PendingReward> {
        let mut prefix = RECIPIENT_PREFIX.to_vec();
        prefix.extend_from_slice(recipient.to_hex().as_bytes());
        prefix.push(b'_');
        self.scan_suffix_ids(&prefix)
            .into_iter()
            .filter_map(|rid| match self.store.get(&reward_key(&rid)) {
                Ok(Some(raw)) => decode::<PendingReward>(&raw).ok(),
                Ok(None) => None,
                Err(e) => {
                    warn!("Reward {} unreadable: {}", rid, e);
                    None
                }
            })
            .collect()
    }

    pub fn pending_rewards(&self, recipient: &Address) -> Vec<PendingReward> {
        self.rewards_of(recipient).into_iter().filter(|r| !r.claimed).collect()
    }

    pub fn claimed_rewards(&self, recipient: &Address) -> Vec<PendingReward> {
        self.rewards_of(recipient).into_iter().filter(|r| r.claimed).collect()
    }

    pub fn stats(&self, height: BlockHeight) -> DisputeStats {
        let mut stats = DisputeStats::default();
        for item in self.store.prefix_scan(DISPUTE_PREFIX) {
            let dispute: DaoDispute = match item.map_err(DisputeError::from).and_then(|(_, raw)| decode(&raw)) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping unreadable dispute: {}", e);
                    continue;
                }
            };
            stats.total += 1;
            if dispute.rewards_distributed {
                stats.distributed += 1;
            }
            if dispute.resolved {
                stats.resolved += 1;
            } else if dispute.state_at(height, self.config.early_quorum_stake).is_active() {
                stats.active += 1;
            }
        }
        stats
    }
}

fn count_vote(
    dispute: &mut DaoDispute,
    voter: Address,
    support_slash: bool,
    stake: Amount,
    height: BlockHeight,
) -> VoteReceipt {
    if support_slash {
        dispute.slash_votes = dispute.slash_votes.saturating_add(stake);
    } else {
        dispute.keep_votes = dispute.keep_votes.saturating_add(stake);
    }
    dispute.votes.push(DisputeVote {
        voter,
        support_slash,
        stake,
        height,
    });
    VoteReceipt::Counted {
        slash_votes: dispute.slash_votes,
        keep_votes: dispute.keep_votes,
    }
}

fn forfeit_unrevealed(dispute: &mut DaoDispute) -> usize {
    let mut forfeited = 0;
    for c in dispute.commitments.iter_mut().filter(|c| !c.revealed && !c.forfeited) {
        c.forfeited = true;
        forfeited += 1;
    }
    forfeited
}

/// Slash needs enough participation and a stake majority; exact ties follow
/// the configured tie break.
pub fn decide(dispute: &DaoDispute, config: &DisputeConfig) -> bool {
    if dispute.votes.len() < config.min_dao_votes {
        return false;
    }
    match dispute.slash_votes.cmp(&dispute.keep_votes) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => config.tie_break == TieBreak::FavorSlash,
    }
}
