// DISPUTE REWARD DISTRIBUTION
// Splits the bond pool of a resolved dispute.
//
// SAFETY INVARIANTS:
// 1. bond return + bounty + voter rewards + burn == total bond pool, exactly
// 2. A forfeited challenge compensates the accused voter out of the voter reward share
// 3. Integer arithmetic only; rounding remainders are burned
// 4. Only the winning side of the vote is rewarded
// 5. Reward ids are deterministic, so a retried payout is recognised by the ledger

use crate::dispute::DaoDispute;
use hat_core::{
    Address, Amount, BondRef, FailedChallengePolicy, Hash256, PayoutFragment, RewardConfig,
    VoterRewardSplit,
};
use hat_crypto::hashing::{canonical_digest, DOMAIN_REWARD};
use hat_crypto::CryptoResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewardType {
    ChallengerBondReturn,
    ChallengerBounty,
    DaoVoterReward,
    WronglyAccusedCompensation,
}

/// Claimable reward produced by a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReward {
    pub reward_id: Hash256,
    pub dispute_id: Hash256,
    pub recipient: Address,
    pub amount: Amount,
    pub reward_type: RewardType,
    pub created_time: u64,
    pub claimed: bool,
    pub claimed_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDistribution {
    pub dispute_id: Hash256,
    pub slash_decision: bool,
    pub total_bond_pool: Amount,

    pub challenger: Address,
    pub challenger_bond_return: Amount,
    pub challenger_bounty: Amount,

    pub total_dao_voter_rewards: Amount,
    pub voter_rewards: BTreeMap<Address, Amount>,

    /// Challenged voter; compensated through `voter_rewards` when a
    /// forfeited challenge fails
    pub wrongly_accused: Address,

    pub burned_amount: Amount,
    pub distribution_time: u64,
}

impl RewardDistribution {
    pub fn total_paid(&self) -> u128 {
        self.challenger_bond_return as u128
            + self.challenger_bounty as u128
            + self.total_dao_voter_rewards as u128
            + self.burned_amount as u128
    }

    pub fn is_conserved(&self) -> bool {
        self.total_paid() == self.total_bond_pool as u128
            && self.voter_rewards.values().map(|a| *a as u128).sum::<u128>()
                == self.total_dao_voter_rewards as u128
    }
}

/// Apportions the voter pool among winning voters.
pub trait VoterRewardPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Shares must not sum above `pool`; the caller burns any remainder.
    fn split(&self, pool: Amount, winners: &[(Address, Amount)]) -> BTreeMap<Address, Amount>;
}

/// Pro rata by voting stake, floor division.
pub struct StakeWeighted;

impl VoterRewardPolicy for StakeWeighted {
    fn name(&self) -> &'static str {
        "stake_weighted"
    }

    fn split(&self, pool: Amount, winners: &[(Address, Amount)]) -> BTreeMap<Address, Amount> {
        let total: u128 = winners.iter().map(|(_, s)| *s as u128).sum();
        let mut shares = BTreeMap::new();
        if total == 0 {
            return shares;
        }
        for (voter, stake) in winners {
            let share = (pool as u128 * *stake as u128 / total) as Amount;
            *shares.entry(*voter).or_insert(0) += share;
        }
        shares
    }
}

/// Same share for every winner regardless of stake.
pub struct EqualSplit;

impl VoterRewardPolicy for EqualSplit {
    fn name(&self) -> &'static str {
        "equal"
    }

    fn split(&self, pool: Amount, winners: &[(Address, Amount)]) -> BTreeMap<Address, Amount> {
        let mut shares = BTreeMap::new();
        if winners.is_empty() {
            return shares;
        }
        let each = pool / winners.len() as Amount;
        for (voter, _) in winners {
            *shares.entry(*voter).or_insert(0) += each;
        }
        shares
    }
}

pub fn policy_for(split: VoterRewardSplit) -> Box<dyn VoterRewardPolicy> {
    match split {
        VoterRewardSplit::StakeWeighted => Box::new(StakeWeighted),
        VoterRewardSplit::Equal => Box::new(EqualSplit),
    }
}

fn pct(amount: Amount, percent: u8) -> Amount {
    (amount as u128 * percent as u128 / 100) as Amount
}

/// Computes the distribution for a resolved dispute.
pub fn compute_distribution(
    dispute: &DaoDispute,
    config: &RewardConfig,
    policy: &dyn VoterRewardPolicy,
    now: u64,
) -> RewardDistribution {
    let mut dist = RewardDistribution {
        dispute_id: dispute.dispute_id,
        slash_decision: dispute.slash_decision,
        total_bond_pool: 0,
        challenger: dispute.challenger,
        challenger_bond_return: 0,
        challenger_bounty: 0,
        total_dao_voter_rewards: 0,
        voter_rewards: BTreeMap::new(),
        wrongly_accused: dispute.target_vote.voter,
        burned_amount: 0,
        distribution_time: now,
    };

    if dispute.slash_decision {
        let slashed = dispute.target_vote.bond;
        dist.total_bond_pool = dispute.challenge_bond.saturating_add(slashed);
        dist.challenger_bond_return = dispute.challenge_bond;

        let mut bounty = pct(slashed, config.challenger_bounty_pct);
        let mut voter_pool = pct(slashed, config.dao_voter_pct);
        let mut burned = slashed - bounty - voter_pool;

        let winners: Vec<(Address, Amount)> = dispute
            .votes
            .iter()
            .filter(|v| v.support_slash)
            .map(|v| (v.voter, v.stake))
            .collect();

        if winners.is_empty() {
            bounty += voter_pool;
            voter_pool = 0;
        }

        let shares = policy.split(voter_pool, &winners);
        let paid: Amount = shares.values().sum();
        let paid = paid.min(voter_pool);
        burned += voter_pool - paid;

        dist.challenger_bounty = bounty;
        dist.total_dao_voter_rewards = paid;
        dist.voter_rewards = shares.into_iter().filter(|(_, a)| *a > 0).collect();
        dist.burned_amount = burned;
    } else {
        dist.total_bond_pool = dispute.challenge_bond;
        match config.failed_challenge {
            FailedChallengePolicy::Refund => {
                dist.challenger_bond_return = dispute.challenge_bond;
            }
            FailedChallengePolicy::Forfeit => {
                let compensation = pct(dispute.challenge_bond, config.wrongly_accused_pct);
                if compensation > 0 {
                    dist.voter_rewards.insert(dist.wrongly_accused, compensation);
                }
                dist.total_dao_voter_rewards = compensation;
                dist.burned_amount = dispute.challenge_bond - compensation;
            }
        }
    }
    dist
}

pub fn reward_id(dispute_id: &Hash256, recipient: &Address, reward_type: RewardType) -> CryptoResult<Hash256> {
    canonical_digest(DOMAIN_REWARD, &(dispute_id, recipient, reward_type))
}

pub fn burn_fragment_id(dispute_id: &Hash256) -> CryptoResult<Hash256> {
    canonical_digest(DOMAIN_REWARD, &(dispute_id, "burn"))
}

/// Claimable records for every non-zero, non-burn share.
pub fn pending_rewards(dist: &RewardDistribution) -> CryptoResult<Vec<PendingReward>> {
    let mut shares: Vec<(Address, Amount, RewardType)> = vec![
        (dist.challenger, dist.challenger_bond_return, RewardType::ChallengerBondReturn),
        (dist.challenger, dist.challenger_bounty, RewardType::ChallengerBounty),
    ];
    shares.extend(dist.voter_rewards.iter().map(|(voter, amount)| {
        let reward_type = if !dist.slash_decision && *voter == dist.wrongly_accused {
            RewardType::WronglyAccusedCompensation
        } else {
            RewardType::DaoVoterReward
        };
        (*voter, *amount, reward_type)
    }));

    shares
        .into_iter()
        .filter(|(_, amount, _)| *amount > 0)
        .map(|(recipient, amount, reward_type)| {
            Ok(PendingReward {
                reward_id: reward_id(&dist.dispute_id, &recipient, reward_type)?,
                dispute_id: dist.dispute_id,
                recipient,
                amount,
                reward_type,
                created_time: dist.distribution_time,
                claimed: false,
                claimed_time: None,
            })
        })
        .collect()
}

/// Full refund of a challenge bond whose dispute was never persisted.
pub fn bond_release_fragment(bond: &BondRef, owner: &Address, amount: Amount) -> CryptoResult<PayoutFragment> {
    Ok(PayoutFragment {
        id: canonical_digest(DOMAIN_REWARD, &(bond, "release"))?,
        recipient: Some(*owner),
        amount,
    })
}

pub fn burn_fragment(dist: &RewardDistribution) -> CryptoResult<Option<PayoutFragment>> {
    if dist.burned_amount == 0 {
        return Ok(None);
    }
    Ok(Some(PayoutFragment {
        id: burn_fragment_id(&dist.dispute_id)?,
        recipient: None,
        amount: dist.burned_amount,
    }))
}
