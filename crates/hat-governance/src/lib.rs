// HAT GOVERNANCE
// DAO disputes against bonded reputation votes, commit-reveal voting and
// bond-pool reward distribution.
pub mod dispute;
pub mod rewards;
pub mod engine;

pub use dispute::{
    commitment_digest, dispute_id, reputation_vote_hash, Ballot, DaoDispute, DisputeState,
    DisputeVote, VoteCommitment, VotingMode,
};

pub use rewards::{
    bond_release_fragment, compute_distribution, policy_for, EqualSplit, PendingReward,
    RewardDistribution, RewardType, StakeWeighted, VoterRewardPolicy,
};

pub use engine::{
    decide, DisputeEngine, DisputeError, DisputeResult, DisputeStats, VoteReceipt,
};
