// HAT NODE
// Wires the attestation, dispute and cross-chain components to the host's
// collaborators and exposes the surface block validation and dashboards use.
//
// SAFETY INVARIANTS:
// 1. Every component reads through the same store; nothing caches dispute state
// 2. Query methods never mutate state
// 3. Peer payloads are decoded once and dispatched by message type
// 4. The local validator answers only tasks whose committee includes it

use crate::scores::{HatScoreBook, ScoreError};
use hat_consensus::{
    AggregationOutcome, AttestationCoordinator, BroadcastReport, CollectOutcome,
    CoordinatorError, EligibilityError, EligibilityVerifier, SybilDetector, ValidatorPool,
};
use hat_core::{
    Address, Amount, BlockHeight, ConfigError, DisputeNotice, EconomicLedger, Hash256, HatConfig,
    HatScore, KeyCustody, KeyRef, LedgerQuery, MessageType, MessagingError, PeerMessage,
    PeerMessaging, ReputationVote, ValidationResponse, ValidationTask, ValidatorEligibilityRecord,
    Verdict,
};
use hat_crypto::{sign_response_with, CryptoError};
use hat_governance::{
    Ballot, DaoDispute, DisputeEngine, DisputeError, DisputeState, DisputeStats, PendingReward,
    RewardDistribution, VoteReceipt,
};
use hat_interop::{CrossChainTrustClaim, CrossChainVerifier, InteropError, TrustProof};
use hat_state::{KvStore, ValidatorRegistry};
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("eligibility: {0}")]
    Eligibility(#[from] EligibilityError),

    #[error("attestation: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("dispute: {0}")]
    Dispute(#[from] DisputeError),

    #[error("cross-chain: {0}")]
    Interop(#[from] InteropError),

    #[error("hat score: {0}")]
    Score(#[from] ScoreError),

    #[error("signing: {0}")]
    Crypto(#[from] CryptoError),

    #[error("peer messaging: {0}")]
    Messaging(#[from] MessagingError),

    #[error("peer payload: {0}")]
    Codec(String),
}

pub type NodeResult<T> = Result<T, NodeError>;

/// Host services the node depends on.
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerQuery>,
    pub messenger: Arc<dyn PeerMessaging>,
    pub custody: Arc<dyn KeyCustody>,
    pub store: Arc<dyn KvStore>,
    pub economics: Arc<dyn EconomicLedger>,
}

/// What an inbound peer message turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The local validator sits on this task's committee and should answer
    AssignedTask(ValidationTask),
    /// Announcement for a committee we are not on
    IgnoredTask(Hash256),
    Response(CollectOutcome),
    Dispute(DisputeNotice),
}

pub struct HatNode {
    config: HatConfig,
    local: Address,
    signing_key: KeyRef,
    messenger: Arc<dyn PeerMessaging>,
    custody: Arc<dyn KeyCustody>,
    registry: Arc<ValidatorRegistry>,
    eligibility: EligibilityVerifier,
    pool: Arc<ValidatorPool>,
    coordinator: AttestationCoordinator,
    disputes: DisputeEngine,
    cross_chain: CrossChainVerifier,
    scores: HatScoreBook,
}

impl HatNode {
    pub fn new(
        config: HatConfig,
        local: Address,
        signing_key: KeyRef,
        collaborators: Collaborators,
    ) -> NodeResult<Self> {
        config.validate()?;

        let registry = Arc::new(ValidatorRegistry::new(collaborators.store.clone()));
        let eligibility = EligibilityVerifier::new(
            collaborators.ledger.clone(),
            registry.clone(),
            config.eligibility.clone(),
        );
        let pool = Arc::new(ValidatorPool::new());
        let coordinator = AttestationCoordinator::new(
            local,
            pool.clone(),
            collaborators.messenger.clone(),
            Arc::new(SybilDetector::new(config.sybil.clone())),
            config.attestation.clone(),
        );
        let disputes = DisputeEngine::new(
            collaborators.store.clone(),
            collaborators.economics.clone(),
            config.dispute.clone(),
            config.rewards.clone(),
        );
        let cross_chain = CrossChainVerifier::new(config.cross_chain.clone());

        info!("HAT node {} initialised", local);
        Ok(HatNode {
            config,
            local,
            signing_key,
            messenger: collaborators.messenger,
            custody: collaborators.custody,
            registry,
            eligibility,
            pool,
            coordinator,
            disputes,
            cross_chain,
            scores: HatScoreBook::new(),
        })
    }

    pub fn config(&self) -> &HatConfig {
        &self.config
    }

    pub fn local_address(&self) -> Address {
        self.local
    }

    pub fn coordinator(&self) -> &AttestationCoordinator {
        &self.coordinator
    }

    pub fn disputes(&self) -> &DisputeEngine {
        &self.disputes
    }

    pub fn cross_chain(&self) -> &CrossChainVerifier {
        &self.cross_chain
    }

    pub fn pool(&self) -> &Arc<ValidatorPool> {
        &self.pool
    }

    // ==================== VALIDATORS ====================

    /// Recomputes eligibility for `address` and updates pool membership.
    pub fn refresh_validator(&self, address: &Address) -> NodeResult<ValidatorEligibilityRecord> {
        let record = self.eligibility.refresh(address)?;
        if record.is_selectable() {
            self.pool.upsert(record.address, record.staked_amount);
        } else {
            self.pool.remove(&record.address);
        }
        Ok(record)
    }

    pub fn validator_eligibility(&self, address: &Address) -> NodeResult<ValidatorEligibilityRecord> {
        Ok(self.eligibility.eligibility(address)?)
    }

    /// Rebuilds the pool from the registry when the refresh interval has passed.
    pub fn rebuild_pool_if_due(&self, height: BlockHeight) -> Option<usize> {
        if self.pool.needs_refresh(height, self.config.eligibility.pool_refresh_interval) {
            Some(self.pool.rebuild(&self.registry, height))
        } else {
            None
        }
    }

    // ==================== HAT SCORES ====================

    pub fn submit_hat_score(&self, score: HatScore) -> NodeResult<bool> {
        Ok(self.scores.submit(score)?)
    }

    pub fn hat_score(&self, address: &Address, current_height: BlockHeight) -> Option<HatScore> {
        self.scores.query(address, current_height)
    }

    // ==================== ATTESTATION ====================

    /// Creates the task for `subject` and announces it to its committee.
    pub fn request_attestation(
        &self,
        subject: Address,
        target_height: BlockHeight,
        now_ms: u64,
    ) -> NodeResult<(ValidationTask, BroadcastReport)> {
        let task = self.coordinator.create_task(subject, target_height, now_ms)?;
        let report = self.coordinator.broadcast(&task.task_hash)?;
        Ok((task, report))
    }

    pub fn aggregate(&self, task_hash: &Hash256, now_ms: u64) -> NodeResult<AggregationOutcome> {
        Ok(self.coordinator.aggregate(task_hash, now_ms)?)
    }

    /// Signs the local validator's verdict and sends it to the task's coordinator.
    pub fn answer_task(&self, task: &ValidationTask, verdict: Verdict, now_ms: u64) -> NodeResult<ValidationResponse> {
        let mut response = ValidationResponse::new(task.task_hash, self.local, verdict, now_ms);
        sign_response_with(&mut response, self.custody.as_ref(), &self.signing_key)?;

        let payload = bincode::serialize(&PeerMessage::ResponseSubmission(response.clone()))
            .map_err(|e| NodeError::Codec(e.to_string()))?;
        self.messenger
            .send_to(&task.coordinator, MessageType::ResponseSubmission, &payload)
            .map_err(|e| {
                warn!("Response for task {} not delivered: {}", task.task_hash, e);
                NodeError::from(e)
            })?;
        debug!("Answered task {} (valid: {})", task.task_hash, verdict.is_valid);
        Ok(response)
    }

    /// The announced committee is only a claim; the local node answers when
    /// its own derivation for the task's subject and height selects it too.
    fn selected_for(&self, task: &ValidationTask) -> bool {
        if !task.is_member(&self.local) {
            return false;
        }
        match self.coordinator.committee_for(&task.subject, task.target_height) {
            Ok(committee) if committee.contains(&self.local) => true,
            Ok(_) => {
                warn!(
                    "Task {} lists {} but the local committee for height {} does not",
                    task.task_hash, self.local, task.target_height
                );
                false
            }
            Err(e) => {
                warn!("Cannot derive committee for task {}: {}", task.task_hash, e);
                false
            }
        }
    }

    /// Decodes and dispatches one peer payload.
    pub fn handle_peer_message(&self, from: &Address, payload: &[u8], now_ms: u64) -> NodeResult<Inbound> {
        let message: PeerMessage = bincode::deserialize(payload).map_err(|e| {
            warn!("Undecodable payload from {}: {}", from, e);
            NodeError::Codec(e.to_string())
        })?;
        debug!("{:?} from {}", message.message_type(), from);

        Ok(match message {
            PeerMessage::TaskAnnouncement(task) => {
                if self.selected_for(&task) {
                    Inbound::AssignedTask(task)
                } else {
                    Inbound::IgnoredTask(task.task_hash)
                }
            }
            PeerMessage::ResponseSubmission(response) => {
                Inbound::Response(self.coordinator.collect(response, now_ms))
            }
            PeerMessage::DisputeNotification(notice) => {
                info!(
                    "Dispute {} announced by {} (deadline {})",
                    notice.dispute_id, notice.challenger, notice.voting_deadline
                );
                Inbound::Dispute(notice)
            }
        })
    }

    // ==================== DISPUTES ====================

    /// Opens a dispute and notifies the validator pool. Notification is
    /// best effort; the dispute stands regardless.
    pub fn submit_dispute(
        &self,
        target: &ReputationVote,
        challenger: Address,
        bond: Amount,
        evidence: Vec<ValidationResponse>,
        height: BlockHeight,
        now: u64,
    ) -> NodeResult<DaoDispute> {
        let dispute = self
            .disputes
            .open_dispute(target, challenger, bond, evidence, height, now)?;

        match bincode::serialize(&PeerMessage::DisputeNotification(dispute.notice())) {
            Ok(payload) => {
                let peers: Vec<Address> = self
                    .pool
                    .snapshot()
                    .into_iter()
                    .map(|(a, _)| a)
                    .filter(|a| *a != self.local)
                    .collect();
                let failed = self
                    .messenger
                    .broadcast(&peers, MessageType::DisputeNotification, &payload);
                if !failed.is_empty() {
                    warn!(
                        "Dispute {} notice missed {}/{} peers",
                        dispute.dispute_id,
                        failed.len(),
                        peers.len()
                    );
                }
            }
            Err(e) => warn!("Dispute notice encoding failed: {}", e),
        }
        Ok(dispute)
    }

    pub fn cast_vote(&self, dispute_id: &Hash256, voter: Address, ballot: Ballot, height: BlockHeight) -> NodeResult<VoteReceipt> {
        Ok(self.disputes.cast_vote(dispute_id, voter, ballot, height)?)
    }

    pub fn resolve_dispute(&self, dispute_id: &Hash256, height: BlockHeight, now: u64) -> NodeResult<RewardDistribution> {
        Ok(self.disputes.resolve(dispute_id, height, now)?)
    }

    pub fn claim_reward(&self, reward_id: &Hash256, claimant: Address, now: u64) -> NodeResult<PendingReward> {
        Ok(self.disputes.claim_reward(reward_id, claimant, now)?)
    }

    pub fn dispute(&self, dispute_id: &Hash256) -> Option<DaoDispute> {
        self.disputes.dispute(dispute_id)
    }

    pub fn dispute_status(&self, dispute_id: &Hash256, height: BlockHeight) -> Option<DisputeState> {
        self.disputes.dispute_state(dispute_id, height)
    }

    pub fn dispute_stats(&self, height: BlockHeight) -> DisputeStats {
        self.disputes.stats(height)
    }

    pub fn pending_rewards(&self, address: &Address) -> Vec<PendingReward> {
        self.disputes.pending_rewards(address)
    }

    pub fn claimed_rewards(&self, address: &Address) -> Vec<PendingReward> {
        self.disputes.claimed_rewards(address)
    }

    // ==================== CROSS-CHAIN ====================

    pub fn verify_cross_chain_claim(&self, claim: &CrossChainTrustClaim, proof: &TrustProof, now: u64) -> bool {
        self.cross_chain.verify_claim(claim, proof, now)
    }

    pub fn submit_cross_chain_claim(&self, claim: &CrossChainTrustClaim, proof: &TrustProof, now: u64) -> NodeResult<()> {
        Ok(self.cross_chain.submit_claim(claim, proof, now)?)
    }

    pub fn cross_chain_trust(&self, address: &Address, now: u64) -> Option<u8> {
        self.cross_chain.aggregated_trust(address, now)
    }
}
