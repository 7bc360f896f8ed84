// ATTESTATION COORDINATOR
// Committee selection, task broadcast, response collection and aggregation.
//
// SAFETY INVARIANTS:
// 1. Only authentic responses from committee members count toward quorum
// 2. At most one accepted response per (task, validator)
// 3. Quorum is a fraction of the committee, never a fixed count
// 4. A task that misses quorum by its deadline ends TimedOut, never with a forced result
// 5. Signature checks and peer sends run outside the task's lock

use crate::committee::{committee_seed, select_committee, ValidatorPool};
use crate::detector::SybilDetector;
use dashmap::DashMap;
use hat_core::{
    Address, Amount, AttestationConfig, BlockHeight, Hash256, MessageType, PeerMessage, PeerMessaging,
    TaskState, ValidationResponse, ValidationTask,
};
use hat_crypto::hashing::{canonical_digest, DOMAIN_TASK};
use hat_crypto::{verify_response, CryptoError};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("validator pool is empty")]
    EmptyPool,

    #[error("unknown task {0}")]
    UnknownTask(Hash256),

    #[error("task encoding failed: {0}")]
    Encoding(String),

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Why a response did not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownTask,
    TaskClosed,
    PastDeadline,
    NotInCommittee,
    InvalidSignature,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    Accepted { responses: usize },
    Replaced { responses: usize },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    pub task_hash: Hash256,
    pub subject: Address,
    pub responses: usize,
    pub valid_votes: usize,
    pub invalid_votes: usize,
    /// Strict majority of valid verdicts; ties resolve to invalid
    pub is_valid: bool,
    /// Confidence-weighted mean of reported trust scores (0-100)
    pub trust_score: u8,
    /// Majority share of responses
    pub agreement: f64,
    pub consensus_reached: bool,
    pub requires_dao_review: bool,
    /// Advisory timing flag from the Sybil detector
    pub coordinated_timing: bool,
    /// Advisory: one committee member holds too much of the committee stake
    pub stake_concentrated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    Pending { responses: usize, quorum: usize },
    Aggregated(AggregatedResult),
    Inconclusive { responses: usize, quorum: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<Address>,
}

struct TaskEntry {
    task: ValidationTask,
    state: TaskState,
    responses: Vec<ValidationResponse>,
    result: Option<AggregatedResult>,
    notify: Arc<Notify>,
}

pub struct AttestationCoordinator {
    local: Address,
    pool: Arc<ValidatorPool>,
    messenger: Arc<dyn PeerMessaging>,
    detector: Arc<SybilDetector>,
    config: AttestationConfig,
    tasks: DashMap<Hash256, TaskEntry>,
}

impl AttestationCoordinator {
    pub fn new(
        local: Address,
        pool: Arc<ValidatorPool>,
        messenger: Arc<dyn PeerMessaging>,
        detector: Arc<SybilDetector>,
        config: AttestationConfig,
    ) -> Self {
        AttestationCoordinator {
            local,
            pool,
            messenger,
            detector,
            config,
            tasks: DashMap::new(),
        }
    }

    pub fn detector(&self) -> &Arc<SybilDetector> {
        &self.detector
    }

    /// Responses required for a committee of `members`.
    pub fn quorum_size(&self, members: usize) -> usize {
        if members == 0 {
            return 1;
        }
        let raw = (self.config.quorum_fraction * members as f64 - 1e-9).ceil();
        (raw.max(1.0) as usize).min(members)
    }

    /// Committee every node derives for `(subject, target_height)` from the
    /// current pool.
    pub fn committee_for(&self, subject: &Address, target_height: BlockHeight) -> CoordinatorResult<Vec<Address>> {
        let snapshot = self.pool.snapshot();
        if snapshot.is_empty() {
            return Err(CoordinatorError::EmptyPool);
        }
        let seed = committee_seed(target_height, subject)?;
        Ok(select_committee(&snapshot, &seed, self.config.committee_size))
    }

    pub fn create_task(
        &self,
        subject: Address,
        target_height: BlockHeight,
        now_ms: u64,
    ) -> CoordinatorResult<ValidationTask> {
        let committee = self.committee_for(&subject, target_height)?;
        let task_hash = canonical_digest(DOMAIN_TASK, &(&subject, target_height, &committee))?;

        let entry = self.tasks.entry(task_hash).or_insert_with(|| {
            info!(
                "Task {} created for {} at height {} with {} validators",
                task_hash,
                subject,
                target_height,
                committee.len()
            );
            TaskEntry {
                task: ValidationTask {
                    task_hash,
                    subject,
                    target_height,
                    committee: committee.clone(),
                    coordinator: self.local,
                    created_at_ms: now_ms,
                    deadline_ms: now_ms.saturating_add(self.config.response_timeout_ms),
                },
                state: TaskState::Created,
                responses: Vec::new(),
                result: None,
                notify: Arc::new(Notify::new()),
            }
        });
        Ok(entry.task.clone())
    }

    /// Announces the task to its committee. Unreachable peers are skipped.
    pub fn broadcast(&self, task_hash: &Hash256) -> CoordinatorResult<BroadcastReport> {
        let task = self.task(task_hash).ok_or(CoordinatorError::UnknownTask(*task_hash))?;
        let payload = bincode::serialize(&PeerMessage::TaskAnnouncement(task.clone()))
            .map_err(|e| CoordinatorError::Encoding(e.to_string()))?;

        let failures = self
            .messenger
            .broadcast(&task.committee, MessageType::TaskAnnouncement, &payload);
        let failed: Vec<Address> = failures.into_iter().map(|(a, _)| a).collect();
        let report = BroadcastReport {
            delivered: task.committee.len() - failed.len(),
            failed,
        };

        if let Some(mut entry) = self.tasks.get_mut(task_hash) {
            if entry.state == TaskState::Created {
                entry.state = TaskState::Broadcast;
            }
        }
        if !report.failed.is_empty() {
            warn!(
                "Task {} reached {}/{} validators",
                task_hash,
                report.delivered,
                task.committee.len()
            );
        }
        Ok(report)
    }

    fn reject(&self, response: &ValidationResponse, reason: RejectReason) -> CollectOutcome {
        warn!(
            "Rejected response from {} for task {}: {:?}",
            response.validator, response.task_hash, reason
        );
        CollectOutcome::Rejected(reason)
    }

    pub fn collect(&self, response: ValidationResponse, now_ms: u64) -> CollectOutcome {
        let (member, deadline, closed) = match self.tasks.get(&response.task_hash) {
            Some(entry) => (
                entry.task.is_member(&response.validator),
                entry.task.deadline_ms,
                entry.state.is_terminal(),
            ),
            None => return self.reject(&response, RejectReason::UnknownTask),
        };
        if closed {
            return self.reject(&response, RejectReason::TaskClosed);
        }
        if now_ms > deadline {
            return self.reject(&response, RejectReason::PastDeadline);
        }
        if !member {
            return self.reject(&response, RejectReason::NotInCommittee);
        }
        if !verify_response(&response) {
            return self.reject(&response, RejectReason::InvalidSignature);
        }

        let task_hash = response.task_hash;
        let validator = response.validator;
        let outcome = {
            let mut entry = match self.tasks.get_mut(&task_hash) {
                Some(entry) => entry,
                None => return self.reject(&response, RejectReason::UnknownTask),
            };
            if entry.state.is_terminal() {
                drop(entry);
                return self.reject(&response, RejectReason::TaskClosed);
            }
            let existing = entry.responses.iter().position(|r| r.validator == validator);
            let outcome = match existing {
                Some(_) if !self.config.allow_response_updates => {
                    drop(entry);
                    return self.reject(&response, RejectReason::Duplicate);
                }
                Some(idx) => {
                    entry.responses[idx] = response;
                    CollectOutcome::Replaced { responses: entry.responses.len() }
                }
                None => {
                    entry.responses.push(response);
                    CollectOutcome::Accepted { responses: entry.responses.len() }
                }
            };
            entry.state = TaskState::Collecting;
            entry.notify.notify_waiters();
            outcome
        };

        self.detector.record(validator, task_hash, now_ms);
        debug!("Accepted response from {} for task {}", validator, task_hash);
        outcome
    }

    fn summarize(&self, task: &ValidationTask, responses: &[ValidationResponse]) -> AggregatedResult {
        let total = responses.len();
        let valid_votes = responses.iter().filter(|r| r.verdict.is_valid).count();
        let invalid_votes = total - valid_votes;
        let majority = valid_votes.max(invalid_votes);
        let agreement = if total == 0 { 0.0 } else { majority as f64 / total as f64 };

        let weight: u64 = responses.iter().map(|r| r.verdict.confidence as u64).sum();
        let trust_score = if weight > 0 {
            let weighted: u64 = responses
                .iter()
                .map(|r| r.verdict.trust_score as u64 * r.verdict.confidence as u64)
                .sum();
            (weighted / weight).min(100) as u8
        } else if total > 0 {
            let sum: u64 = responses.iter().map(|r| r.verdict.trust_score as u64).sum();
            (sum / total as u64).min(100) as u8
        } else {
            0
        };

        let consensus_reached = agreement >= self.config.consensus_threshold;
        let stakes: Vec<(Address, Amount)> = task
            .committee
            .iter()
            .map(|member| (*member, self.pool.stake_of(member).unwrap_or(0)))
            .collect();
        AggregatedResult {
            task_hash: task.task_hash,
            subject: task.subject,
            responses: total,
            valid_votes,
            invalid_votes,
            is_valid: valid_votes > invalid_votes,
            trust_score,
            agreement,
            consensus_reached,
            requires_dao_review: !consensus_reached,
            coordinated_timing: self.detector.detect_coordinated(&task.task_hash),
            stake_concentrated: self.detector.stake_concentration_exceeded(&stakes),
        }
    }

    pub fn aggregate(&self, task_hash: &Hash256, now_ms: u64) -> CoordinatorResult<AggregationOutcome> {
        let mut entry = self
            .tasks
            .get_mut(task_hash)
            .ok_or(CoordinatorError::UnknownTask(*task_hash))?;
        let quorum = self.quorum_size(entry.task.committee.len());
        let responses = entry.responses.len();

        match entry.state {
            TaskState::Aggregated => {
                if let Some(result) = entry.result.clone() {
                    return Ok(AggregationOutcome::Aggregated(result));
                }
            }
            TaskState::TimedOut => return Ok(AggregationOutcome::Inconclusive { responses, quorum }),
            _ => {}
        }

        if responses >= quorum {
            let result = self.summarize(&entry.task, &entry.responses);
            if result.requires_dao_review {
                warn!(
                    "Task {} aggregated without consensus (agreement {:.2}); flagged for DAO review",
                    task_hash, result.agreement
                );
            } else {
                info!(
                    "Task {} aggregated: valid={} trust={} ({} responses)",
                    task_hash, result.is_valid, result.trust_score, responses
                );
            }
            entry.state = TaskState::Aggregated;
            entry.result = Some(result.clone());
            entry.notify.notify_waiters();
            return Ok(AggregationOutcome::Aggregated(result));
        }

        if now_ms >= entry.task.deadline_ms {
            warn!(
                "Task {} timed out with {}/{} responses; inconclusive",
                task_hash, responses, quorum
            );
            entry.state = TaskState::TimedOut;
            entry.notify.notify_waiters();
            return Ok(AggregationOutcome::Inconclusive { responses, quorum });
        }

        Ok(AggregationOutcome::Pending { responses, quorum })
    }

    fn quorum_status(&self, task_hash: &Hash256) -> CoordinatorResult<(bool, bool, Arc<Notify>)> {
        let entry = self
            .tasks
            .get(task_hash)
            .ok_or(CoordinatorError::UnknownTask(*task_hash))?;
        let reached = entry.responses.len() >= self.quorum_size(entry.task.committee.len());
        Ok((reached, entry.state == TaskState::TimedOut, entry.notify.clone()))
    }

    /// Waits until quorum is reached or `timeout` elapses. Returns whether
    /// quorum was reached.
    pub async fn wait_for_quorum(&self, task_hash: &Hash256, timeout: Duration) -> CoordinatorResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (reached, timed_out, notify) = self.quorum_status(task_hash)?;
            if reached {
                return Ok(true);
            }
            if timed_out {
                return Ok(false);
            }

            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // A response may have landed between the check and `enable`.
            let (reached, timed_out, _) = self.quorum_status(task_hash)?;
            if reached || timed_out {
                return Ok(reached);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(false);
            }
        }
    }

    pub fn task(&self, task_hash: &Hash256) -> Option<ValidationTask> {
        self.tasks.get(task_hash).map(|e| e.task.clone())
    }

    pub fn task_state(&self, task_hash: &Hash256) -> Option<TaskState> {
        self.tasks.get(task_hash).map(|e| e.state)
    }

    pub fn response_count(&self, task_hash: &Hash256) -> usize {
        self.tasks.get(task_hash).map_or(0, |e| e.responses.len())
    }

    pub fn was_selected(&self, task_hash: &Hash256, validator: &Address) -> bool {
        self.tasks.get(task_hash).map_or(false, |e| e.task.is_member(validator))
    }

    /// Drops aggregated and timed-out tasks. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, e| !e.state.is_terminal());
        before - self.tasks.len()
    }
}
