//! Tally and quorum engine.
//!
//! Only revealed ballots move the yes/no counts.  A committed ballot that is
//! never opened still shows up in `total_committed`, but it counts toward
//! neither side of the decision and not toward quorum.
//!
//! ```
//! use sealed_ballot::{QuorumRule, TallyState, VotingResults};
//!
//! let tally = TallyState { yes: 2, no: 1, total_committed: 4, total_revealed: 3 };
//! let rule = QuorumRule { eligible_voters: 5, quorum_percent: 50 };
//! let results = VotingResults::evaluate(&tally, &rule);
//! assert!(results.has_quorum);
//! assert!(results.has_majority);
//! ```

use crate::ledger::VoteRecord;
use crate::Vote;
use serde::{Deserialize, Serialize};

/// Derived per-proposal counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyState {
    /// Revealed yes ballots.
    pub yes: u64,
    /// Revealed no ballots.
    pub no: u64,
    /// Ballots committed, revealed or not.
    pub total_committed: u64,
    /// Ballots revealed.
    pub total_revealed: u64,
}

/// Recounts a proposal from its vote records.
pub fn tally<'a, I>(records: I) -> TallyState
where
    I: IntoIterator<Item = &'a VoteRecord>,
{
    let mut state = TallyState::default();
    for record in records {
        if record.has_committed {
            state.total_committed += 1;
        }
        if !record.has_revealed {
            continue;
        }
        match record.vote {
            Some(Vote::Yes) => state.yes += 1,
            Some(Vote::No) => state.no += 1,
            None => continue,
        }
        state.total_revealed += 1;
    }
    state
}

/// DAO participation requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumRule {
    /// Number of members entitled to vote.
    pub eligible_voters: u64,
    /// Minimum share of eligible voters that must reveal, in percent.
    pub quorum_percent: u8,
}

impl Default for QuorumRule {
    fn default() -> Self {
        Self {
            eligible_voters: 10,
            quorum_percent: 20,
        }
    }
}

impl QuorumRule {
    /// Returns true when `revealed / eligible_voters >= quorum_percent / 100`.
    ///
    /// A zero threshold is always met; otherwise an empty electorate never is.
    pub fn is_met(&self, revealed: u64) -> bool {
        if self.quorum_percent == 0 {
            return true;
        }
        if self.eligible_voters == 0 {
            return false;
        }
        u128::from(revealed) * 100
            >= u128::from(self.quorum_percent) * u128::from(self.eligible_voters)
    }
}

/// Strict majority of revealed ballots; ties fail.
pub fn has_majority(yes: u64, no: u64) -> bool {
    yes > no
}

/// Read model returned by `get_voting_results`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingResults {
    /// Ballots committed.
    pub total_committed: u64,
    /// Ballots revealed.
    pub total_revealed: u64,
    /// Revealed yes ballots.
    pub yes: u64,
    /// Revealed no ballots.
    pub no: u64,
    /// Whether revealed participation meets the quorum rule.
    pub has_quorum: bool,
    /// Whether yes strictly outnumbers no.
    pub has_majority: bool,
}

impl VotingResults {
    /// Evaluates quorum and majority over a tally.
    pub fn evaluate(tally: &TallyState, rule: &QuorumRule) -> Self {
        Self {
            total_committed: tally.total_committed,
            total_revealed: tally.total_revealed,
            yes: tally.yes,
            no: tally.no,
            has_quorum: rule.is_met(tally.total_revealed),
            has_majority: has_majority(tally.yes, tally.no),
        }
    }
}
