//! End-to-end protocol scenarios.
//!
//! Each scenario drives a `VotingClient` against an in-process ledger on a
//! manual clock.

use proptest::prelude::*;
use sealed_ballot::{
    make_commit, ExecutionOutcome, GovernanceConfig, Ledger, LedgerClient, LedgerError,
    LedgerParams, LocalId, ManualClock, MirrorStore, Phase, ProposalDraft, ProposalId,
    QuorumRule, Salt, SaltSource, SharedLedger, Vote, VoterId, VotingClient,
};
use std::sync::Arc;

const DAY: u64 = 86_400;
const START: u64 = 1_700_000_000;

struct FixedSalt(Salt);

impl SaltSource for FixedSalt {
    fn generate_salt(&self) -> Salt {
        self.0
    }
}

struct World {
    clock: ManualClock,
    ledger: SharedLedger,
    client: VotingClient,
}

fn world(salts: Box<dyn SaltSource>) -> World {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
    let clock = ManualClock::new(START);
    let config = GovernanceConfig {
        eligible_voters: 3,
        quorum_percent: 50,
        ..GovernanceConfig::default()
    };
    let ledger = SharedLedger::new(Ledger::new(config.ledger_params(), Arc::new(clock.clone())));
    let client = VotingClient::new(
        Arc::new(ledger.clone()),
        Arc::new(clock.clone()),
        salts,
        &config,
    );
    World {
        clock,
        ledger,
        client,
    }
}

fn voter(n: u64) -> VoterId {
    VoterId::parse(&format!("0x{:040x}", n)).unwrap()
}

fn draft(commit: u64, reveal: u64) -> ProposalDraft {
    ProposalDraft {
        title: "Treasury grant".into(),
        description: "Fund the documentation sprint".into(),
        amount_requested: 12_000,
        commit_duration_secs: commit,
        reveal_duration_secs: reveal,
    }
}

fn salt_aa() -> Salt {
    Salt::from_bytes([0xAA; 32])
}

fn open_proposal(w: &mut World) -> ProposalId {
    w.client
        .submit_proposal(&voter(100), LocalId::new("grant-1"), &draft(DAY, DAY))
        .unwrap()
}

#[test]
fn scenario_a_second_commit_is_rejected() {
    let mut w = world(Box::new(FixedSalt(salt_aa())));
    let id = open_proposal(&mut w);
    let commit = w.client.commit(id, &voter(1), Vote::Yes).unwrap();
    assert_eq!(commit, make_commit(Vote::Yes, &salt_aa()));

    let err = w.client.commit(id, &voter(1), Vote::Yes).unwrap_err();
    assert!(matches!(
        err.as_ledger(),
        Some(LedgerError::AlreadyVoted { .. })
    ));
    assert_eq!(w.client.results(id).unwrap().total_committed, 1);
}

#[test]
fn scenario_b_reveal_after_commit_window() {
    let mut w = world(Box::new(FixedSalt(salt_aa())));
    let id = open_proposal(&mut w);
    w.client.commit(id, &voter(1), Vote::Yes).unwrap();
    w.clock.advance(DAY);
    assert_eq!(w.client.phase(id).unwrap(), Phase::Reveal);

    w.ledger
        .reveal_vote(&voter(1), id, Vote::Yes, salt_aa())
        .unwrap();
    let results = w.client.results(id).unwrap();
    assert_eq!((results.yes, results.no, results.total_revealed), (1, 0, 1));
}

#[test]
fn scenario_c_wrong_salt_leaves_state_untouched() {
    let mut w = world(Box::new(FixedSalt(salt_aa())));
    let id = open_proposal(&mut w);
    w.client.commit(id, &voter(1), Vote::Yes).unwrap();
    w.clock.advance(DAY);

    let wrong = Salt::from_bytes([0xAB; 32]);
    let err = w
        .ledger
        .reveal_vote(&voter(1), id, Vote::Yes, wrong)
        .unwrap_err();
    assert!(matches!(
        err.as_ledger(),
        Some(LedgerError::InvalidReveal { .. })
    ));
    let status = w.ledger.get_user_vote_status(id, &voter(1)).unwrap();
    assert!(status.has_committed);
    assert!(!status.has_revealed);
    assert_eq!(w.client.results(id).unwrap().total_revealed, 0);
}

#[test]
fn scenario_d_three_voters_execute_with_majority() {
    let mut w = world(Box::new(sealed_ballot::OsSaltSource));
    let id = open_proposal(&mut w);
    for (n, vote) in [(1, Vote::Yes), (2, Vote::Yes), (3, Vote::No)] {
        w.client.commit(id, &voter(n), vote).unwrap();
    }
    w.clock.advance(DAY);
    for n in 1..=3 {
        w.client.reveal(id, &voter(n)).unwrap();
    }
    assert!(matches!(
        w.client.execute(id).unwrap_err().as_ledger(),
        Some(LedgerError::WrongPhase {
            actual: Phase::Reveal,
            ..
        })
    ));
    w.clock.advance(DAY);

    let outcome = w.client.execute(id).unwrap();
    assert_eq!(outcome, ExecutionOutcome::Executed { yes: 2, no: 1 });
    assert!(w.ledger.get_proposal(id).unwrap().executed);
    assert!(matches!(
        w.client.execute(id).unwrap_err().as_ledger(),
        Some(LedgerError::AlreadyExecuted { .. })
    ));

    let mut rebuilt = MirrorStore::new();
    rebuilt.rebuild(&w.ledger).unwrap();
    assert_eq!(
        rebuilt.proposal(id).unwrap(),
        w.client.mirror().proposal(id).unwrap()
    );
}

#[test]
fn scenario_e_short_commit_window_is_rejected() {
    let mut w = world(Box::new(sealed_ballot::OsSaltSource));
    let err = w
        .client
        .submit_proposal(&voter(100), LocalId::new("short"), &draft(3_600, DAY))
        .unwrap_err();
    assert!(matches!(
        err.as_ledger(),
        Some(LedgerError::InvalidDuration {
            requested: 3_600,
            ..
        })
    ));
    assert_eq!(w.ledger.proposal_count().unwrap(), 0);
    assert!(w.client.registry().is_empty());
}

#[test]
fn unrevealed_ballots_do_not_count_toward_quorum() {
    let clock = ManualClock::new(START);
    let params = LedgerParams {
        quorum: QuorumRule {
            eligible_voters: 4,
            quorum_percent: 50,
        },
        ..LedgerParams::default()
    };
    let ledger = SharedLedger::new(Ledger::new(params, Arc::new(clock.clone())));
    let id = ledger.create_proposal(&voter(100), &draft(DAY, DAY)).unwrap();
    for n in 1..=4 {
        let salt = Salt::from_u128(u128::from(n));
        ledger
            .commit_vote(&voter(n), id, make_commit(Vote::Yes, &salt))
            .unwrap();
    }
    clock.advance(DAY);
    ledger
        .reveal_vote(&voter(1), id, Vote::Yes, Salt::from_u128(1))
        .unwrap();
    clock.advance(DAY);
    let results = ledger.get_voting_results(id).unwrap();
    assert_eq!((results.total_committed, results.total_revealed), (4, 1));
    assert!(!results.has_quorum);
    let err = ledger.execute_proposal(id).unwrap_err();
    assert!(err.as_ledger().unwrap().is_protocol_outcome());
}

proptest! {
    #[test]
    fn at_most_one_vote_per_voter(attempts in proptest::collection::vec((1u64..4, any::<bool>(), any::<[u8; 32]>()), 1..24)) {
        let clock = ManualClock::new(START);
        let ledger = SharedLedger::new(Ledger::new(LedgerParams::default(), Arc::new(clock)));
        let id = ledger.create_proposal(&voter(100), &draft(DAY, DAY)).unwrap();
        let mut seen = std::collections::HashSet::new();
        for (n, vote, salt) in attempts {
            let commit = make_commit(Vote::from_bool(vote), &Salt::from_bytes(salt));
            let outcome = ledger.commit_vote(&voter(n), id, commit);
            if seen.insert(n) {
                prop_assert!(outcome.is_ok());
            } else {
                let rejected = matches!(
                    outcome.unwrap_err().as_ledger(),
                    Some(LedgerError::AlreadyVoted { .. })
                );
                prop_assert!(rejected);
            }
        }
        prop_assert_eq!(ledger.voters(id).unwrap().len(), seen.len());
    }

    #[test]
    fn reveal_requires_a_matching_commit(
        committed in any::<bool>(),
        vote in any::<bool>(),
        salt in any::<[u8; 32]>(),
        reveal_vote in any::<bool>(),
        reveal_salt in any::<[u8; 32]>(),
    ) {
        let clock = ManualClock::new(START);
        let ledger = SharedLedger::new(Ledger::new(LedgerParams::default(), Arc::new(clock.clone())));
        let id = ledger.create_proposal(&voter(100), &draft(DAY, DAY)).unwrap();
        let commit = make_commit(Vote::from_bool(vote), &Salt::from_bytes(salt));
        if committed {
            ledger.commit_vote(&voter(1), id, commit).unwrap();
        }
        clock.advance(DAY);
        let outcome = ledger.reveal_vote(
            &voter(1),
            id,
            Vote::from_bool(reveal_vote),
            Salt::from_bytes(reveal_salt),
        );
        let matches_commit = committed && vote == reveal_vote && salt == reveal_salt;
        prop_assert_eq!(outcome.is_ok(), matches_commit);
        let status = ledger.get_user_vote_status(id, &voter(1)).unwrap();
        prop_assert_eq!(status.has_revealed, matches_commit);
    }
}
