//! Rejection taxonomy for ledger operations and ledger clients.
//!
//! Every rejection names the proposal and the precondition that failed, and
//! [`LedgerError::recovery`] tells the caller whether to wait, resync,
//! resubmit corrected input, or give up on the action.

use crate::ledger::ProposalId;
use crate::{Phase, VoterId};
use std::fmt;
use thiserror::Error;

/// The voting action a rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `commit_vote`.
    Commit,
    /// `reveal_vote`.
    Reveal,
    /// `execute_proposal`.
    Execute,
}

impl Action {
    /// Phase in which the action is legal.
    pub fn legal_phase(self) -> Phase {
        match self {
            Action::Commit => Phase::Commit,
            Action::Reveal => Phase::Reveal,
            Action::Execute => Phase::Completed,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Commit => "commit",
            Action::Reveal => "reveal",
            Action::Execute => "execute",
        })
    }
}

/// What a client should do after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The action becomes legal later; wait for the phase to change.
    Wait,
    /// Local state is stale; reconcile before deciding anything.
    Resync,
    /// Fix the input and submit again.
    Resubmit,
    /// Outcome unknown; reconcile, then retry only if the call did not land.
    RetryAfterReconcile,
    /// The action is permanently invalid.
    Permanent,
}

/// Rejections produced by the authoritative ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No proposal exists under this id.
    #[error("proposal {proposal} not found on the ledger")]
    ProposalNotFound {
        /// Requested proposal id.
        proposal: ProposalId,
    },
    /// A commit or reveal window is shorter than the minimum.
    #[error("{window} window of {requested}s is below the {minimum}s minimum")]
    InvalidDuration {
        /// Which window was too short (`"commit"` or `"reveal"`).
        window: &'static str,
        /// Requested duration in seconds.
        requested: u64,
        /// Minimum duration in seconds.
        minimum: u64,
    },
    /// A window would end past the largest representable timestamp.
    #[error("{window} window of {requested}s ends past the clock's range")]
    WindowOverflow {
        /// Which window overflowed (`"commit"` or `"reveal"`).
        window: &'static str,
        /// Requested duration in seconds.
        requested: u64,
    },
    /// The action is not legal in the proposal's current phase.
    #[error("proposal {proposal}: {action} requires the {} phase, proposal is in {actual}", .action.legal_phase())]
    WrongPhase {
        /// Proposal id.
        proposal: ProposalId,
        /// Attempted action.
        action: Action,
        /// Phase observed by the ledger.
        actual: Phase,
    },
    /// The voter already committed on this proposal.
    #[error("proposal {proposal}: voter {voter} has already committed")]
    AlreadyVoted {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
    /// The voter already revealed on this proposal.
    #[error("proposal {proposal}: voter {voter} has already revealed")]
    AlreadyRevealed {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
    /// The proposal's decision was already recorded.
    #[error("proposal {proposal} has already been decided")]
    AlreadyExecuted {
        /// Proposal id.
        proposal: ProposalId,
    },
    /// A reveal arrived without a prior commit.
    #[error("proposal {proposal}: voter {voter} must commit before revealing")]
    NoCommitFound {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
    /// The opening does not hash to the stored commitment.
    #[error("proposal {proposal}: reveal from {voter} does not match the stored commitment")]
    InvalidReveal {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
    /// Too few ballots were revealed for the result to be actionable.
    #[error(
        "proposal {proposal}: quorum not met ({revealed} of {eligible} eligible revealed, {quorum_percent}% required)"
    )]
    QuorumNotMet {
        /// Proposal id.
        proposal: ProposalId,
        /// Ballots revealed.
        revealed: u64,
        /// Eligible voters.
        eligible: u64,
        /// Required participation in percent.
        quorum_percent: u8,
    },
}

impl LedgerError {
    /// Proposal the rejection refers to, when there is one.
    pub fn proposal(&self) -> Option<ProposalId> {
        match self {
            LedgerError::InvalidDuration { .. } | LedgerError::WindowOverflow { .. } => None,
            LedgerError::ProposalNotFound { proposal }
            | LedgerError::WrongPhase { proposal, .. }
            | LedgerError::AlreadyVoted { proposal, .. }
            | LedgerError::AlreadyRevealed { proposal, .. }
            | LedgerError::AlreadyExecuted { proposal }
            | LedgerError::NoCommitFound { proposal, .. }
            | LedgerError::InvalidReveal { proposal, .. }
            | LedgerError::QuorumNotMet { proposal, .. } => Some(*proposal),
        }
    }

    /// Classifies the rejection for the caller.
    pub fn recovery(&self) -> Recovery {
        match self {
            LedgerError::ProposalNotFound { .. } => Recovery::Resync,
            LedgerError::InvalidDuration { .. } | LedgerError::WindowOverflow { .. } => {
                Recovery::Resubmit
            }
            LedgerError::WrongPhase { action, actual, .. } => {
                if *actual < action.legal_phase() {
                    Recovery::Wait
                } else {
                    Recovery::Permanent
                }
            }
            LedgerError::AlreadyVoted { .. }
            | LedgerError::AlreadyRevealed { .. }
            | LedgerError::AlreadyExecuted { .. } => Recovery::Resync,
            LedgerError::NoCommitFound { .. }
            | LedgerError::InvalidReveal { .. }
            | LedgerError::QuorumNotMet { .. } => Recovery::Permanent,
        }
    }

    /// True for rejections that are legitimate protocol outcomes rather than faults.
    pub fn is_protocol_outcome(&self) -> bool {
        matches!(self, LedgerError::QuorumNotMet { .. })
    }
}

/// Errors surfaced by a ledger client adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The ledger processed the call and rejected it.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The ledger could not be reached; the call may or may not have landed.
    #[error("ledger transport failure: {0}")]
    Transport(String),
    /// The call timed out; the call may or may not have landed.
    #[error("ledger call timed out")]
    Timeout,
}

impl ClientError {
    /// True when the outcome of a mutating call cannot be known without a read.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout)
    }

    /// Classifies the failure for the caller.
    pub fn recovery(&self) -> Recovery {
        match self {
            ClientError::Ledger(err) => err.recovery(),
            ClientError::Transport(_) | ClientError::Timeout => Recovery::RetryAfterReconcile,
        }
    }

    /// Returns the ledger rejection, if this was one.
    pub fn as_ledger(&self) -> Option<&LedgerError> {
        match self {
            ClientError::Ledger(err) => Some(err),
            _ => None,
        }
    }
}
