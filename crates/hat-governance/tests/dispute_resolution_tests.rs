use hat_core::testing::{addr, MemoryEconomicLedger};
use hat_core::{
    Address, Amount, DisputeConfig, EconomicLedger, FailedChallengePolicy, ReputationVote,
    RewardConfig, TieBreak, ValidationResponse, Verdict, COIN,
};
use hat_crypto::{address_of, public_key_of, secret_key_from_bytes, sign_response};
use hat_governance::{
    reputation_vote_hash, Ballot, DisputeEngine, DisputeError, DisputeState, RewardType,
    VoteReceipt, VotingMode,
};
use hat_state::MemoryStore;
use std::sync::{Arc, Barrier};
use std::thread;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Harness {
    engine: DisputeEngine,
    ledger: Arc<MemoryEconomicLedger>,
}

fn harness(config: DisputeConfig) -> Harness {
    harness_with(config, RewardConfig::default())
}

fn harness_with(config: DisputeConfig, rewards: RewardConfig) -> Harness {
    init_logger();
    let ledger = Arc::new(MemoryEconomicLedger::new());
    let engine = DisputeEngine::new(Arc::new(MemoryStore::new()), ledger.clone(), config, rewards);
    Harness { engine, ledger }
}

fn small_bonds() -> DisputeConfig {
    DisputeConfig {
        min_challenge_bond: 10,
        ..Default::default()
    }
}

const VOTER: u8 = 1;
const CHALLENGER: u8 = 2;

fn bonded_vote(ledger: &MemoryEconomicLedger, value: i16, bond: Amount) -> ReputationVote {
    ledger.fund(addr(VOTER), bond);
    let bond_ref = ledger.lock(&addr(VOTER), bond).unwrap();
    ReputationVote {
        voter: addr(VOTER),
        target: addr(3),
        value,
        height: 50,
        timestamp: 1_700_000_000,
        bond,
        bond_ref,
    }
}

fn direct(support_slash: bool, stake: Amount) -> Ballot {
    Ballot::Direct { support_slash, stake }
}

#[test]
fn test_keep_majority_returns_bond_without_voter_rewards() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, -40, 500);
    h.ledger.fund(addr(CHALLENGER), 10);

    let dispute = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap();
    assert_eq!(dispute.mode, VotingMode::Direct);
    assert_eq!(dispute.voting_deadline, 100 + 1_440);
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 0);

    let id = dispute.dispute_id;
    for n in 10..13 {
        h.engine.cast_vote(&id, addr(n), direct(false, 5), 200).unwrap();
    }
    for n in 13..15 {
        h.engine.cast_vote(&id, addr(n), direct(true, 5), 200).unwrap();
    }

    let stored = h.engine.dispute(&id).unwrap();
    assert_eq!((stored.slash_votes, stored.keep_votes), (10, 15));

    assert!(matches!(
        h.engine.resolve(&id, 300, 0),
        Err(DisputeError::VotingActive(_))
    ));

    let dist = h.engine.resolve(&id, 1_540, 42).unwrap();
    assert!(!dist.slash_decision);
    assert_eq!(dist.total_bond_pool, 10);
    assert_eq!(dist.challenger_bond_return, 10);
    assert_eq!(dist.total_dao_voter_rewards, 0);
    assert!(dist.voter_rewards.is_empty());
    assert_eq!(dist.burned_amount, 0);

    for n in 10..15 {
        assert!(h.engine.pending_rewards(&addr(n)).is_empty());
    }
    let pending = h.engine.pending_rewards(&addr(CHALLENGER));
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reward_type, RewardType::ChallengerBondReturn);
    assert_eq!(pending[0].amount, 10);

    let claimed = h.engine.claim_reward(&pending[0].reward_id, addr(CHALLENGER), 50).unwrap();
    assert!(claimed.claimed);
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 10);
    assert!(h.engine.pending_rewards(&addr(CHALLENGER)).is_empty());
    assert_eq!(h.engine.claimed_rewards(&addr(CHALLENGER)).len(), 1);

    // The challenged vote's bond is untouched by a failed challenge.
    assert_eq!(h.ledger.bonded(&vote.bond_ref), Some(500));
}

#[test]
fn test_slash_pays_bounty_voters_and_burn() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, -60, 1_000);
    h.ledger.fund(addr(CHALLENGER), 100);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 100, vec![], 100, 0).unwrap().dispute_id;

    let stakes = [10, 10, 10, 10, 20];
    for (i, stake) in stakes.iter().enumerate() {
        h.engine.cast_vote(&id, addr(20 + i as u8), direct(true, *stake), 150).unwrap();
    }
    h.engine.cast_vote(&id, addr(30), direct(false, 40), 150).unwrap();

    let dist = h.engine.resolve(&id, 2_000, 0).unwrap();
    assert!(dist.slash_decision);
    assert_eq!(dist.total_bond_pool, 1_100);
    assert_eq!(dist.challenger_bond_return, 100);
    assert_eq!(dist.challenger_bounty, 500);
    assert_eq!(dist.total_dao_voter_rewards, 300);
    assert_eq!(dist.burned_amount, 200);
    assert_eq!(h.ledger.burned(), 200);
    assert!(dist.voter_rewards.get(&addr(30)).is_none());

    for (i, stake) in stakes.iter().enumerate() {
        let voter = addr(20 + i as u8);
        let pending = h.engine.pending_rewards(&voter);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, 300 * stake / 60);
        h.engine.claim_reward(&pending[0].reward_id, voter, 1).unwrap();
        assert_eq!(h.ledger.balance_of(&voter), 300 * stake / 60);
    }
    for reward in h.engine.pending_rewards(&addr(CHALLENGER)) {
        h.engine.claim_reward(&reward.reward_id, addr(CHALLENGER), 1).unwrap();
    }
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 600);

    // Every unit of both bonds is accounted for.
    assert_eq!(h.ledger.bonded(&vote.bond_ref), Some(0));
    let dispute = h.engine.dispute(&id).unwrap();
    assert_eq!(h.ledger.bonded(&dispute.challenge_bond_ref), Some(0));
}

#[test]
fn test_second_resolve_is_rejected_and_changes_nothing() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, 90, 1_000);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;
    for n in 20..25 {
        h.engine.cast_vote(&id, addr(n), direct(true, 7), 120).unwrap();
    }

    let first = h.engine.resolve(&id, 1_540, 5).unwrap();
    let burned = h.ledger.burned();

    let err = h.engine.resolve(&id, 1_600, 9).unwrap_err();
    assert!(matches!(err, DisputeError::AlreadyResolved(_)));
    assert!(err.is_invariant_violation());
    assert_eq!(h.engine.reward_distribution(&id), Some(first));
    assert_eq!(h.ledger.burned(), burned);
    assert_eq!(
        h.engine.dispute_state(&id, 1_600),
        Some(DisputeState::RewardsDistributed)
    );
}

#[test]
fn test_resolve_retry_after_payout_failure_pays_once() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, -80, 1_000);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;
    for n in 20..25 {
        h.engine.cast_vote(&id, addr(n), direct(true, 3), 120).unwrap();
    }

    h.ledger.fail_next_payouts(1);
    assert!(matches!(
        h.engine.resolve(&id, 1_540, 0),
        Err(DisputeError::Economic(_))
    ));
    assert_eq!(h.engine.dispute_state(&id, 1_540), Some(DisputeState::Resolved));
    assert!(h.engine.reward_distribution(&id).is_none());
    assert!(h.engine.pending_rewards(&addr(CHALLENGER)).is_empty());

    let stats = h.engine.stats(1_540);
    assert_eq!((stats.total, stats.resolved, stats.distributed), (1, 1, 0));

    let dist = h.engine.resolve(&id, 1_541, 0).unwrap();
    assert!(dist.slash_decision);
    assert_eq!(h.ledger.burned(), dist.burned_amount);
    assert_eq!(h.engine.stats(1_541).distributed, 1);
}

#[test]
fn test_vote_rejections() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, 10, 100);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;

    h.engine.cast_vote(&id, addr(20), direct(true, 5), 101).unwrap();
    assert!(matches!(
        h.engine.cast_vote(&id, addr(20), direct(false, 5), 102),
        Err(DisputeError::DuplicateVote(_))
    ));
    assert!(matches!(
        h.engine.cast_vote(&id, addr(CHALLENGER), direct(true, 5), 102),
        Err(DisputeError::PartyCannotVote(_))
    ));
    assert!(matches!(
        h.engine.cast_vote(&id, addr(VOTER), direct(false, 5), 102),
        Err(DisputeError::PartyCannotVote(_))
    ));
    assert!(matches!(
        h.engine.cast_vote(&id, addr(21), direct(true, 0), 102),
        Err(DisputeError::ZeroStake)
    ));
    assert!(matches!(
        h.engine.cast_vote(&id, addr(21), direct(true, 5), 1_540),
        Err(DisputeError::VotingClosed(_))
    ));

    let stored = h.engine.dispute(&id).unwrap();
    assert_eq!((stored.slash_votes, stored.keep_votes, stored.votes.len()), (5, 0, 1));
}

#[test]
fn test_open_dispute_rejections() {
    let h = harness(DisputeConfig::default());
    let vote = bonded_vote(&h.ledger, 10, 100);
    h.ledger.fund(addr(CHALLENGER), 5 * COIN);

    assert!(matches!(
        h.engine.open_dispute(&vote, addr(CHALLENGER), COIN - 1, vec![], 100, 0),
        Err(DisputeError::InsufficientBond { .. })
    ));
    assert!(matches!(
        h.engine.open_dispute(&vote, addr(VOTER), COIN, vec![], 100, 0),
        Err(DisputeError::SelfChallenge)
    ));
    let mut wild = vote.clone();
    wild.value = 101;
    assert!(matches!(
        h.engine.open_dispute(&wild, addr(CHALLENGER), COIN, vec![], 100, 0),
        Err(DisputeError::InvalidVote(_))
    ));

    h.engine.open_dispute(&vote, addr(CHALLENGER), COIN, vec![], 100, 0).unwrap();
    assert!(matches!(
        h.engine.open_dispute(&vote, addr(CHALLENGER), COIN, vec![], 100, 0),
        Err(DisputeError::DuplicateDispute(_))
    ));
    // Only the accepted dispute locked a bond.
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 4 * COIN);

    let poor = addr(77);
    assert!(matches!(
        h.engine.open_dispute(&vote, poor, COIN, vec![], 100, 0),
        Err(DisputeError::Economic(_))
    ));
}

#[test]
fn test_evidence_signatures_are_checked() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, -30, 100);
    h.ledger.fund(addr(CHALLENGER), 20);

    let secret = [9u8; 32];
    let validator = address_of(&public_key_of(&secret_key_from_bytes(&secret).unwrap()));
    let verdict = Verdict { is_valid: false, trust_score: 12, confidence: 90 };
    let mut response = ValidationResponse::new(hat_core::Hash256([4; 32]), validator, verdict, 1_000);
    sign_response(&mut response, &secret).unwrap();

    let mut forged = response.clone();
    forged.verdict.trust_score = 95;
    assert!(matches!(
        h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![response.clone(), forged], 100, 0),
        Err(DisputeError::InvalidEvidence(v)) if v == validator
    ));
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 20);

    let dispute = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![response], 100, 0).unwrap();
    assert_eq!(dispute.evidence.len(), 1);
    assert_eq!(
        h.engine.disputes_for_vote(&reputation_vote_hash(&vote).unwrap()),
        vec![dispute.dispute_id]
    );
}

#[test]
fn test_commit_reveal_flow() {
    let config = DisputeConfig {
        min_challenge_bond: 10,
        commit_reveal: true,
        commit_phase_blocks: 10,
        reveal_phase_blocks: 10,
        min_dao_votes: 1,
        ..Default::default()
    };
    let h = harness(config);
    let vote = bonded_vote(&h.ledger, -50, 1_000);
    h.ledger.fund(addr(CHALLENGER), 10);
    let dispute = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap();
    let id = dispute.dispute_id;
    assert_eq!(dispute.mode, VotingMode::CommitReveal);
    assert_eq!(dispute.reveal_phase_start, Some(110));
    assert_eq!(dispute.voting_deadline, 120);

    let nonces = [[1u8; 32], [2u8; 32], [3u8; 32]];
    for (i, nonce) in nonces.iter().enumerate() {
        let receipt = h.engine.cast_vote(&id, addr(20 + i as u8), Ballot::commit(true, nonce, 10), 105).unwrap();
        assert_eq!(receipt, VoteReceipt::Committed);
    }
    let stored = h.engine.dispute(&id).unwrap();
    assert_eq!((stored.slash_votes, stored.keep_votes), (0, 0));

    assert!(matches!(
        h.engine.cast_vote(&id, addr(30), direct(true, 10), 105),
        Err(DisputeError::WrongPhase { .. })
    ));
    assert!(matches!(
        h.engine.cast_vote(&id, addr(20), Ballot::Reveal { support_slash: true, nonce: nonces[0] }, 105),
        Err(DisputeError::WrongPhase { .. })
    ));

    let counted = h.engine
        .cast_vote(&id, addr(20), Ballot::Reveal { support_slash: true, nonce: nonces[0] }, 112)
        .unwrap();
    assert_eq!(counted, VoteReceipt::Counted { slash_votes: 10, keep_votes: 0 });

    // Flipping the revealed vote breaks the commitment.
    let mismatch = h.engine
        .cast_vote(&id, addr(21), Ballot::Reveal { support_slash: false, nonce: nonces[1] }, 113)
        .unwrap_err();
    assert!(matches!(mismatch, DisputeError::CommitmentMismatch(_)));
    assert!(mismatch.is_invariant_violation());

    assert!(matches!(
        h.engine.cast_vote(&id, addr(40), Ballot::Reveal { support_slash: true, nonce: [0; 32] }, 113),
        Err(DisputeError::NoCommitment(_))
    ));
    assert!(matches!(
        h.engine.cast_vote(&id, addr(22), Ballot::commit(true, &nonces[2], 10), 113),
        Err(DisputeError::WrongPhase { .. })
    ));

    let dist = h.engine.resolve(&id, 120, 0).unwrap();
    assert!(dist.slash_decision);
    assert_eq!(dist.voter_rewards.len(), 1);

    let resolved = h.engine.dispute(&id).unwrap();
    assert_eq!(resolved.votes.len(), 1);
    let forfeited: Vec<Address> = resolved
        .commitments
        .iter()
        .filter(|c| c.forfeited)
        .map(|c| c.voter)
        .collect();
    assert_eq!(forfeited, vec![addr(21), addr(22)]);
}

fn tied_outcome(tie_break: TieBreak) -> bool {
    let h = harness(DisputeConfig {
        min_challenge_bond: 10,
        min_dao_votes: 2,
        tie_break,
        ..Default::default()
    });
    let vote = bonded_vote(&h.ledger, 25, 100);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;
    h.engine.cast_vote(&id, addr(20), direct(true, 8), 101).unwrap();
    h.engine.cast_vote(&id, addr(21), direct(false, 8), 102).unwrap();
    h.engine.resolve(&id, 1_540, 0).unwrap().slash_decision
}

#[test]
fn test_tie_break_policy() {
    assert!(!tied_outcome(TieBreak::FavorKeep));
    assert!(tied_outcome(TieBreak::FavorSlash));
}

#[test]
fn test_slash_needs_minimum_participation() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, 25, 100);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;
    for n in 20..24 {
        h.engine.cast_vote(&id, addr(n), direct(true, 50), 101).unwrap();
    }
    assert!(!h.engine.resolve(&id, 1_540, 0).unwrap().slash_decision);
}

#[test]
fn test_early_quorum_closes_direct_voting() {
    let h = harness(DisputeConfig {
        min_challenge_bond: 10,
        early_quorum_stake: Some(20),
        ..Default::default()
    });
    let vote = bonded_vote(&h.ledger, 25, 100);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;

    h.engine.cast_vote(&id, addr(20), direct(false, 10), 101).unwrap();
    assert_eq!(h.engine.dispute_state(&id, 101), Some(DisputeState::Created));
    h.engine.cast_vote(&id, addr(21), direct(false, 10), 101).unwrap();
    assert_eq!(h.engine.dispute_state(&id, 101), Some(DisputeState::Closed));

    assert!(matches!(
        h.engine.cast_vote(&id, addr(22), direct(true, 10), 102),
        Err(DisputeError::VotingClosed(_))
    ));
    assert_eq!(h.engine.stats(102).active, 0);
    assert!(h.engine.resolve(&id, 102, 0).is_ok());
}

#[test]
fn test_claims_are_checked() {
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, 25, 100);
    h.ledger.fund(addr(CHALLENGER), 10);
    let id = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap().dispute_id;
    h.engine.resolve(&id, 1_540, 0).unwrap();

    let reward = h.engine.pending_rewards(&addr(CHALLENGER)).remove(0);
    assert!(matches!(
        h.engine.claim_reward(&reward.reward_id, addr(99), 1),
        Err(DisputeError::NotRecipient { .. })
    ));
    h.engine.claim_reward(&reward.reward_id, addr(CHALLENGER), 1).unwrap();
    let again = h.engine.claim_reward(&reward.reward_id, addr(CHALLENGER), 2).unwrap_err();
    assert!(matches!(again, DisputeError::AlreadyClaimed(_)));
    assert!(again.is_invariant_violation());
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 10);
    assert!(matches!(
        h.engine.claim_reward(&hat_core::Hash256([0xee; 32]), addr(CHALLENGER), 1),
        Err(DisputeError::RewardNotFound(_))
    ));
}

#[test]
fn test_forfeited_challenge_compensates_accused_voter() {
    let rewards = RewardConfig { failed_challenge: FailedChallengePolicy::Forfeit, ..Default::default() };
    let h = harness_with(small_bonds(), rewards);
    let vote = bonded_vote(&h.ledger, -40, 500);
    h.ledger.fund(addr(CHALLENGER), 10);
    let dispute = h.engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0).unwrap();
    let id = dispute.dispute_id;

    for n in 10..13 {
        h.engine.cast_vote(&id, addr(n), direct(false, 5), 200).unwrap();
    }
    for n in 13..15 {
        h.engine.cast_vote(&id, addr(n), direct(true, 5), 200).unwrap();
    }

    let dist = h.engine.resolve(&id, dispute.voting_deadline, 42).unwrap();
    assert!(!dist.slash_decision);
    assert_eq!(dist.total_bond_pool, 10);
    assert_eq!(dist.challenger_bond_return, 0);
    assert_eq!(dist.total_dao_voter_rewards, 7);
    assert_eq!(dist.voter_rewards.get(&addr(VOTER)), Some(&7));
    assert_eq!(dist.burned_amount, 3);
    assert_eq!(
        dist.challenger_bond_return + dist.challenger_bounty + dist.total_dao_voter_rewards + dist.burned_amount,
        dist.total_bond_pool
    );
    assert_eq!(h.ledger.burned(), 3);

    assert!(h.engine.pending_rewards(&addr(CHALLENGER)).is_empty());
    let pending = h.engine.pending_rewards(&addr(VOTER));
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reward_type, RewardType::WronglyAccusedCompensation);
    assert_eq!(pending[0].amount, 7);

    h.engine.claim_reward(&pending[0].reward_id, addr(VOTER), 50).unwrap();
    assert_eq!(h.ledger.balance_of(&addr(VOTER)), 7);
    assert_eq!(h.ledger.bonded(&dispute.challenge_bond_ref), Some(0));
    assert_eq!(h.ledger.bonded(&vote.bond_ref), Some(500));
    assert_eq!(h.engine.active_locks(), 0);
}

#[test]
fn test_concurrent_opens_lock_a_single_bond() {
    const RACERS: usize = 6;
    let h = harness(small_bonds());
    let vote = bonded_vote(&h.ledger, -40, 500);
    h.ledger.fund(addr(CHALLENGER), 10 * RACERS as Amount);
    let engine = Arc::new(h.engine);
    let barrier = Arc::new(Barrier::new(RACERS));

    let racers: Vec<_> = (0..RACERS)
        .map(|_| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let vote = vote.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.open_dispute(&vote, addr(CHALLENGER), 10, vec![], 100, 0)
            })
        })
        .collect();
    let outcomes: Vec<_> = racers.into_iter().map(|r| r.join().unwrap()).collect();

    let opened: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(opened.len(), 1);
    assert!(outcomes
        .iter()
        .filter(|o| o.is_err())
        .all(|o| matches!(o, Err(DisputeError::DuplicateDispute(_)))));

    let stored = engine.dispute(&opened[0].dispute_id).unwrap();
    assert_eq!(h.ledger.bonded(&stored.challenge_bond_ref), Some(10));
    assert_eq!(h.ledger.balance_of(&addr(CHALLENGER)), 10 * (RACERS as Amount - 1));
    assert_eq!(engine.active_locks(), 0);
}
