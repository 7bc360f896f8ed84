// HAT CONFIGURATION
// Per-subsystem policy knobs with defaults taken from the deployed network.
// Every field is optional in YAML; omitted fields keep their default.

use crate::types::{Amount, COIN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HatConfig {
    pub eligibility: EligibilityConfig,
    pub attestation: AttestationConfig,
    pub sybil: SybilConfig,
    pub dispute: DisputeConfig,
    pub rewards: RewardConfig,
    pub cross_chain: CrossChainConfig,
}

impl HatConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: HatConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.attestation;
        if a.committee_size == 0 {
            return Err(ConfigError::Invalid("committee_size must be positive".into()));
        }
        if !(a.quorum_fraction > 0.0 && a.quorum_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "quorum_fraction {} outside (0, 1]",
                a.quorum_fraction
            )));
        }
        if !(a.consensus_threshold > 0.0 && a.consensus_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "consensus_threshold {} outside (0, 1]",
                a.consensus_threshold
            )));
        }
        if self.sybil.window_size == 0 || self.sybil.coordination_window_ms == 0 {
            return Err(ConfigError::Invalid("sybil windows must be positive".into()));
        }
        if self.sybil.min_coordinated_validators < 2 {
            return Err(ConfigError::Invalid(
                "min_coordinated_validators must be at least 2".into(),
            ));
        }
        let r = &self.rewards;
        let shares = [
            ("challenger_bounty_pct", r.challenger_bounty_pct),
            ("dao_voter_pct", r.dao_voter_pct),
            ("slash_burn_pct", r.slash_burn_pct),
            ("wrongly_accused_pct", r.wrongly_accused_pct),
            ("failed_challenge_burn_pct", r.failed_challenge_burn_pct),
        ];
        if let Some((name, pct)) = shares.iter().find(|(_, pct)| *pct > 100) {
            return Err(ConfigError::Invalid(format!("{} is {}, above 100", name, pct)));
        }
        let slash_split =
            u16::from(r.challenger_bounty_pct) + u16::from(r.dao_voter_pct) + u16::from(r.slash_burn_pct);
        if slash_split != 100 {
            return Err(ConfigError::Invalid(format!(
                "slash split sums to {}, expected 100",
                slash_split
            )));
        }
        let failed_split = u16::from(r.wrongly_accused_pct) + u16::from(r.failed_challenge_burn_pct);
        if failed_split != 100 {
            return Err(ConfigError::Invalid(format!(
                "failed-challenge split sums to {}, expected 100",
                failed_split
            )));
        }
        let d = &self.dispute;
        if d.commit_reveal && (d.commit_phase_blocks == 0 || d.reveal_phase_blocks == 0) {
            return Err(ConfigError::Invalid("commit/reveal phases must be positive".into()));
        }
        if !d.commit_reveal && d.voting_period_blocks == 0 {
            return Err(ConfigError::Invalid("voting_period_blocks must be positive".into()));
        }
        Ok(())
    }
}

// ==================== ELIGIBILITY ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub min_stake: Amount,
    /// Blocks the oldest stake output must have aged
    pub min_stake_age: u64,
    /// Blocks since the address first appeared
    pub min_history_blocks: u64,
    pub min_transactions: u64,
    pub min_unique_interactions: u64,
    /// Distinct funding sources backing the stake
    pub min_funding_sources: u32,
    /// Wall-clock budget for the fallback block scan
    pub history_scan_budget_ms: u64,
    /// Blocks between validator pool re-scans
    pub pool_refresh_interval: u64,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        EligibilityConfig {
            min_stake: 10 * COIN,
            min_stake_age: 40_320,
            min_history_blocks: 40_320,
            min_transactions: 100,
            min_unique_interactions: 20,
            min_funding_sources: 3,
            history_scan_budget_ms: 2_000,
            pool_refresh_interval: 100,
        }
    }
}

// ==================== ATTESTATION ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    pub committee_size: usize,
    /// Fraction of the committee that must respond before aggregation
    pub quorum_fraction: f64,
    /// Agreement ratio at which no DAO review is needed
    pub consensus_threshold: f64,
    pub response_timeout_ms: u64,
    /// Allow a validator to replace its earlier response
    pub allow_response_updates: bool,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        AttestationConfig {
            committee_size: 10,
            quorum_fraction: 0.67,
            consensus_threshold: 0.70,
            response_timeout_ms: 30_000,
            allow_response_updates: false,
        }
    }
}

// ==================== SYBIL / ECLIPSE ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SybilConfig {
    /// Timestamps retained per validator
    pub window_size: usize,
    pub min_coordinated_validators: usize,
    pub coordination_window_ms: u64,
    /// Largest share of committee stake one validator may hold
    pub max_stake_concentration: f64,
}

impl Default for SybilConfig {
    fn default() -> Self {
        SybilConfig {
            window_size: 100,
            min_coordinated_validators: 5,
            coordination_window_ms: 1_000,
            max_stake_concentration: 0.20,
        }
    }
}

// ==================== DISPUTES ====================

/// Outcome when stake-weighted slash and keep totals are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    FavorKeep,
    FavorSlash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    pub min_challenge_bond: Amount,
    /// Base bond for any reputation vote
    pub min_vote_bond: Amount,
    /// Additional bond per point of |vote value|
    pub bond_per_vote_point: Amount,
    /// Direct-mode voting window
    pub voting_period_blocks: u64,
    pub commit_reveal: bool,
    pub commit_phase_blocks: u64,
    pub reveal_phase_blocks: u64,
    /// Votes required before a slash can win
    pub min_dao_votes: usize,
    /// Direct mode closes early once this much stake has voted
    pub early_quorum_stake: Option<Amount>,
    pub tie_break: TieBreak,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        DisputeConfig {
            min_challenge_bond: COIN,
            min_vote_bond: COIN,
            bond_per_vote_point: COIN / 100,
            voting_period_blocks: 1_440,
            commit_reveal: false,
            commit_phase_blocks: 720,
            reveal_phase_blocks: 720,
            min_dao_votes: 5,
            early_quorum_stake: None,
            tie_break: TieBreak::FavorKeep,
        }
    }
}

impl DisputeConfig {
    /// Bond a reputation vote of `value` must carry.
    pub fn required_vote_bond(&self, value: i16) -> Amount {
        self.min_vote_bond
            .saturating_add(self.bond_per_vote_point.saturating_mul(value.unsigned_abs() as u64))
    }
}

// ==================== REWARDS ====================

/// What happens to the challenger's bond when keep wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedChallengePolicy {
    /// Bond returned in full
    #[default]
    Refund,
    /// Bond split between the wrongly accused voter and the burn sink
    Forfeit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterRewardSplit {
    #[default]
    StakeWeighted,
    Equal,
}

/// Percentages are whole numbers; each split must total 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub challenger_bounty_pct: u8,
    pub dao_voter_pct: u8,
    pub slash_burn_pct: u8,
    pub wrongly_accused_pct: u8,
    pub failed_challenge_burn_pct: u8,
    pub failed_challenge: FailedChallengePolicy,
    pub voter_split: VoterRewardSplit,
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            challenger_bounty_pct: 50,
            dao_voter_pct: 30,
            slash_burn_pct: 20,
            wrongly_accused_pct: 70,
            failed_challenge_burn_pct: 30,
            failed_challenge: FailedChallengePolicy::Refund,
            voter_split: VoterRewardSplit::StakeWeighted,
        }
    }
}

// ==================== CROSS-CHAIN ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossChainConfig {
    /// Claims older than this are rejected (seconds)
    pub max_claim_age_secs: u64,
    /// Tolerated clock skew for claims dated in the future (seconds)
    pub max_future_skew_secs: u64,
    /// Weight decays as `1 - age_hours / decay_horizon_hours`, floored at `min_decay_factor`
    pub decay_horizon_hours: f64,
    /// Floor of the age decay factor
    pub min_decay_factor: f64,
}

impl Default for CrossChainConfig {
    fn default() -> Self {
        CrossChainConfig {
            max_claim_age_secs: 86_400,
            max_future_skew_secs: 300,
            decay_horizon_hours: 48.0,
            min_decay_factor: 0.5,
        }
    }
}
