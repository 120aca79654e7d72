#![warn(missing_docs)]

//! # sealed_ballot
//!
//! **sealed_ballot** is the core of a commit-reveal voting system for a DAO
//! treasury.  Members first submit a binding but hidden commitment to a
//! yes/no vote, later open it, and only opened ballots are counted.  An
//! authoritative ledger decides every outcome; an off-ledger mirror serves
//! fast reads and is reconciled against the ledger on a fixed interval.
//!
//! ## Features
//!
//! * **Commitments**: [`make_commit`] hashes `(vote, salt)` with Keccak-256
//!   in the `abi.encodePacked(bool, uint256)` layout, and [`verify_commit`]
//!   checks an opening in constant time.
//! * **Phase clock**: [`phase_at`] maps a sampled time onto
//!   `commit → reveal → completed`; the [`Clock`] trait lets tests and
//!   simulations drive time with a [`ManualClock`].
//! * **Authoritative ledger**: [`Ledger`] validates every mutation against
//!   the phase clock, keeps one record per `(proposal, voter)`, counts only
//!   revealed ballots and appends accepted mutations to an event log.
//! * **Tally and quorum**: [`tally`] recounts from records; [`QuorumRule`]
//!   applies integer-percent participation; majority is strictly `yes > no`.
//! * **Mirror and reconciliation**: [`MirrorStore`] projects ledger events,
//!   overwrites divergent rows on [`MirrorStore::reconcile`] and can be
//!   rebuilt from the ledger alone.  [`ProposalRegistry`] maps local draft
//!   ids to ledger ids exactly once.
//! * **Client flow**: [`VotingClient`] anchors drafts, seals ballots with
//!   fresh salts, reveals from its [`SaltVault`] and recovers from lost
//!   responses by reading ledger state before retrying.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use sealed_ballot::{
//!     make_commit, Ledger, LedgerParams, ManualClock, ProposalDraft, Salt, Vote, VoterId,
//! };
//!
//! let clock = ManualClock::new(1_700_000_000);
//! let mut ledger = Ledger::new(LedgerParams::default(), Arc::new(clock.clone()));
//! let alice = VoterId::parse("0x00000000000000000000000000000000000000a1").unwrap();
//!
//! let id = ledger
//!     .create_proposal(
//!         &alice,
//!         &ProposalDraft {
//!             title: "Fund the audit".into(),
//!             description: "External review of the treasury module".into(),
//!             amount_requested: 25_000,
//!             commit_duration_secs: 86_400,
//!             reveal_duration_secs: 86_400,
//!         },
//!     )
//!     .unwrap();
//!
//! let salt = Salt::from_bytes([0xAA; 32]);
//! ledger.commit_vote(&alice, id, make_commit(Vote::Yes, &salt)).unwrap();
//! clock.advance(86_400);
//! ledger.reveal_vote(&alice, id, Vote::Yes, salt).unwrap();
//!
//! let results = ledger.get_voting_results(id).unwrap();
//! assert_eq!((results.yes, results.no, results.total_revealed), (1, 0, 1));
//! ```
//!
//! The library never installs a `tracing` subscriber; binaries choose their
//! own.

pub mod client;
pub mod commitment;
pub mod config;
pub mod error;
mod io;
pub mod ledger;
pub mod mirror;
pub mod phase;
pub mod registry;
pub mod scheduler;
pub mod tally;
pub mod voter;
pub mod voting;

pub use client::{LedgerClient, SharedLedger};
pub use commitment::{
    make_commit, verify_commit, CodecError, CommitHash, OsSaltSource, Salt, SaltSource,
    SeededSaltSource, Vote, DIGEST_LEN,
};
pub use config::{ConfigError, GovernanceConfig};
pub use error::{Action, ClientError, LedgerError, Recovery};
pub use io::PersistError;
pub use ledger::{
    Decision, EventKind, ExecutionOutcome, Ledger, LedgerEvent, LedgerParams, Proposal,
    ProposalDraft, ProposalId, ProposalView, VoteRecord, VoteStatus, MIN_PHASE_DURATION_SECS,
};
pub use mirror::{MirrorError, MirrorProposal, MirrorStore, MirrorVote, ReconcileReport};
pub use phase::{phase_at, Clock, ManualClock, Phase, SystemClock};
pub use registry::{LocalId, ProposalMapping, ProposalRegistry, RegistryError};
#[cfg(feature = "runtime")]
pub use scheduler::{spawn_poller, PollerHandle};
pub use scheduler::{ReconcileScheduler, TickReport, DEFAULT_POLL_INTERVAL_SECS};
pub use tally::{has_majority, tally, QuorumRule, TallyState, VotingResults};
pub use voter::VoterId;
pub use voting::{SaltVault, SealedBallot, VotingClient, VotingError};
