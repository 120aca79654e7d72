//! Authoritative commit-reveal ledger.
//!
//! The ledger is the only component whose state decides outcomes.  Every
//! mutating call is validated against the phase clock and either applies in
//! full or leaves the state untouched.  Accepted mutations are final and are
//! appended to an ordered event log.
//!
//! ## Storage layout
//!
//! * Proposals live in a dense arena; proposal `n` sits at index `n - 1`.
//! * Vote records live in a second arena.  A single map from
//!   `(proposal, voter)` to record index enforces one record per pair: a
//!   commit is accepted iff that map insert succeeds.
//! * Running yes/no counters are advanced only inside
//!   [`Ledger::reveal_vote`] and can be cross-checked at any time with
//!   [`Ledger::recount`].

use crate::commitment::{verify_commit, CommitHash, Salt, Vote};
use crate::error::{Action, LedgerError};
use crate::io::{read_json, write_json_atomic, PersistError};
use crate::phase::{phase_at, Clock, Phase};
use crate::tally::{tally, QuorumRule, TallyState, VotingResults};
use crate::voter::VoterId;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum length of the commit and reveal windows: 24 hours.
pub const MIN_PHASE_DURATION_SECS: u64 = 86_400;

/// Sequential ledger-issued proposal identifier, starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tunable ledger rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerParams {
    /// Minimum commit window in seconds.
    pub min_commit_duration_secs: u64,
    /// Minimum reveal window in seconds.
    pub min_reveal_duration_secs: u64,
    /// Participation rule applied to results and execution.
    pub quorum: QuorumRule,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            min_commit_duration_secs: MIN_PHASE_DURATION_SECS,
            min_reveal_duration_secs: MIN_PHASE_DURATION_SECS,
            quorum: QuorumRule::default(),
        }
    }
}

/// Parameters supplied when anchoring a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Treasury amount requested, in base units.
    pub amount_requested: u128,
    /// Length of the commit window in seconds.
    pub commit_duration_secs: u64,
    /// Length of the reveal window in seconds.
    pub reveal_duration_secs: u64,
}

/// Recorded decision of a completed proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Quorum and majority held; the proposal was executed.
    Executed,
    /// Quorum held but majority failed.
    Rejected,
}

/// Stored proposal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Ledger id.
    pub id: ProposalId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Creator of the proposal.
    pub proposer: VoterId,
    /// Treasury amount requested.
    pub amount_requested: u128,
    /// Start of the commit window.
    pub commit_start: u64,
    /// End of the commit window (exclusive).
    pub commit_end: u64,
    /// Start of the reveal window; equal to `commit_end`.
    pub reveal_start: u64,
    /// End of the reveal window (exclusive).
    pub reveal_end: u64,
    /// Decision, once `execute_proposal` recorded one.
    pub decision: Option<Decision>,
    /// Running tally, advanced only by accepted reveals.
    pub tally: TallyState,
}

impl Proposal {
    /// Phase at time `now`.
    pub fn phase_at(&self, now: u64) -> Phase {
        phase_at(now, self.commit_end, self.reveal_end)
    }

    /// Whether the proposal has been executed.
    pub fn executed(&self) -> bool {
        self.decision == Some(Decision::Executed)
    }
}

/// One ballot: unique per `(proposal, voter)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Proposal voted on.
    pub proposal: ProposalId,
    /// Voter address.
    pub voter: VoterId,
    /// Commitment submitted in the commit phase; never changes.
    pub commit_hash: CommitHash,
    /// Always true for a stored record.
    pub has_committed: bool,
    /// Set once by an accepted reveal.
    pub has_revealed: bool,
    /// Opened vote, after reveal.
    pub vote: Option<Vote>,
    /// Opened salt, after reveal.
    pub salt: Option<Salt>,
    /// Time of the commit.
    pub committed_at: u64,
    /// Time of the reveal.
    pub revealed_at: Option<u64>,
}

/// Read model returned by `get_proposal`.
///
/// Unknown ids yield a default view with `exists == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalView {
    /// Requested id.
    pub id: ProposalId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Creator, when the proposal exists.
    pub proposer: Option<VoterId>,
    /// Treasury amount requested.
    pub amount_requested: u128,
    /// Start of the commit window.
    pub commit_start: u64,
    /// End of the commit window.
    pub commit_end: u64,
    /// Start of the reveal window.
    pub reveal_start: u64,
    /// End of the reveal window.
    pub reveal_end: u64,
    /// Whether the proposal has been executed.
    pub executed: bool,
    /// Recorded decision, if any.
    pub decision: Option<Decision>,
    /// Whether the ledger holds this proposal.
    pub exists: bool,
}

impl ProposalView {
    fn missing(id: ProposalId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

impl From<&Proposal> for ProposalView {
    fn from(p: &Proposal) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            description: p.description.clone(),
            proposer: Some(p.proposer.clone()),
            amount_requested: p.amount_requested,
            commit_start: p.commit_start,
            commit_end: p.commit_end,
            reveal_start: p.reveal_start,
            reveal_end: p.reveal_end,
            executed: p.executed(),
            decision: p.decision,
            exists: true,
        }
    }
}

/// Read model returned by `get_user_vote_status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    /// Whether a commitment is recorded.
    pub has_committed: bool,
    /// Whether the commitment was opened.
    pub has_revealed: bool,
    /// Opened vote.
    pub vote: Option<Vote>,
    /// Stored commitment.
    pub commit_hash: Option<CommitHash>,
    /// Opened salt.
    pub salt: Option<Salt>,
}

impl From<&VoteRecord> for VoteStatus {
    fn from(record: &VoteRecord) -> Self {
        Self {
            has_committed: record.has_committed,
            has_revealed: record.has_revealed,
            vote: record.vote,
            commit_hash: Some(record.commit_hash),
            salt: record.salt,
        }
    }
}

/// Result of a successful `execute_proposal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// Quorum and majority held.
    Executed {
        /// Revealed yes ballots.
        yes: u64,
        /// Revealed no ballots.
        no: u64,
    },
    /// Quorum held, majority failed; the rejection is recorded.
    Rejected {
        /// Revealed yes ballots.
        yes: u64,
        /// Revealed no ballots.
        no: u64,
    },
}

/// Payload of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A proposal was anchored.
    ProposalCreated {
        /// New id.
        proposal: ProposalId,
        /// Creator.
        proposer: VoterId,
        /// Title.
        title: String,
        /// End of the commit window.
        commit_end: u64,
        /// End of the reveal window.
        reveal_end: u64,
    },
    /// A commitment was recorded.
    VoteCommitted {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
        /// Stored commitment.
        commit_hash: CommitHash,
    },
    /// A commitment was opened and counted.
    VoteRevealed {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
        /// Opened vote.
        vote: Vote,
    },
    /// The proposal passed and was executed.
    ProposalExecuted {
        /// Proposal id.
        proposal: ProposalId,
        /// Final yes count.
        yes: u64,
        /// Final no count.
        no: u64,
    },
    /// The proposal reached quorum but failed majority.
    ProposalRejected {
        /// Proposal id.
        proposal: ProposalId,
        /// Final yes count.
        yes: u64,
        /// Final no count.
        no: u64,
    },
}

impl EventKind {
    /// Proposal the event belongs to.
    pub fn proposal(&self) -> ProposalId {
        match self {
            EventKind::ProposalCreated { proposal, .. }
            | EventKind::VoteCommitted { proposal, .. }
            | EventKind::VoteRevealed { proposal, .. }
            | EventKind::ProposalExecuted { proposal, .. }
            | EventKind::ProposalRejected { proposal, .. } => *proposal,
        }
    }
}

/// An accepted ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Position in the log, starting at 1.
    pub seq: u64,
    /// Ledger time of the mutation.
    pub at: u64,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    proposals: Vec<Proposal>,
    records: Vec<VoteRecord>,
    events: Vec<LedgerEvent>,
}

/// The authoritative commit-reveal ledger.
pub struct Ledger {
    params: LedgerParams,
    clock: Arc<dyn Clock>,
    proposals: Vec<Proposal>,
    records: Vec<VoteRecord>,
    by_voter: HashMap<(ProposalId, VoterId), usize>,
    by_proposal: HashMap<ProposalId, Vec<usize>>,
    events: Vec<LedgerEvent>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("params", &self.params)
            .field("proposals", &self.proposals.len())
            .field("records", &self.records.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new(params: LedgerParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            params,
            clock,
            proposals: Vec::new(),
            records: Vec::new(),
            by_voter: HashMap::new(),
            by_proposal: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Active rules.
    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    fn proposal(&self, id: ProposalId) -> Result<&Proposal, LedgerError> {
        let idx = id
            .0
            .checked_sub(1)
            .ok_or(LedgerError::ProposalNotFound { proposal: id })?;
        usize::try_from(idx)
            .ok()
            .and_then(|idx| self.proposals.get(idx))
            .ok_or(LedgerError::ProposalNotFound { proposal: id })
    }

    fn proposal_index(&self, id: ProposalId) -> Result<usize, LedgerError> {
        self.proposal(id)?;
        Ok((id.0 - 1) as usize)
    }

    fn require_phase(&self, id: ProposalId, action: Action) -> Result<usize, LedgerError> {
        let idx = self.proposal_index(id)?;
        let actual = self.proposals[idx].phase_at(self.clock.now());
        if actual != action.legal_phase() {
            debug!(proposal = %id, %action, %actual, "rejected: wrong phase");
            return Err(LedgerError::WrongPhase {
                proposal: id,
                action,
                actual,
            });
        }
        Ok(idx)
    }

    fn emit(&mut self, kind: EventKind) {
        let event = LedgerEvent {
            seq: self.events.len() as u64 + 1,
            at: self.clock.now(),
            kind,
        };
        self.events.push(event);
    }

    /// Anchors a new proposal in the commit phase and returns its id.
    ///
    /// Both windows are checked before anything is written.
    pub fn create_proposal(
        &mut self,
        proposer: &VoterId,
        draft: &ProposalDraft,
    ) -> Result<ProposalId, LedgerError> {
        if draft.commit_duration_secs < self.params.min_commit_duration_secs {
            return Err(LedgerError::InvalidDuration {
                window: "commit",
                requested: draft.commit_duration_secs,
                minimum: self.params.min_commit_duration_secs,
            });
        }
        if draft.reveal_duration_secs < self.params.min_reveal_duration_secs {
            return Err(LedgerError::InvalidDuration {
                window: "reveal",
                requested: draft.reveal_duration_secs,
                minimum: self.params.min_reveal_duration_secs,
            });
        }
        let now = self.clock.now();
        let commit_end = now
            .checked_add(draft.commit_duration_secs)
            .ok_or(LedgerError::WindowOverflow {
                window: "commit",
                requested: draft.commit_duration_secs,
            })?;
        let reveal_end = commit_end
            .checked_add(draft.reveal_duration_secs)
            .ok_or(LedgerError::WindowOverflow {
                window: "reveal",
                requested: draft.reveal_duration_secs,
            })?;
        let id = ProposalId(self.proposals.len() as u64 + 1);
        self.proposals.push(Proposal {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            proposer: proposer.clone(),
            amount_requested: draft.amount_requested,
            commit_start: now,
            commit_end,
            reveal_start: commit_end,
            reveal_end,
            decision: None,
            tally: TallyState::default(),
        });
        self.emit(EventKind::ProposalCreated {
            proposal: id,
            proposer: proposer.clone(),
            title: draft.title.clone(),
            commit_end,
            reveal_end,
        });
        info!(proposal = %id, %proposer, commit_end, reveal_end, "proposal created");
        Ok(id)
    }

    /// Records `voter`'s commitment on `proposal`.
    pub fn commit_vote(
        &mut self,
        voter: &VoterId,
        proposal: ProposalId,
        commit_hash: CommitHash,
    ) -> Result<(), LedgerError> {
        let idx = self.require_phase(proposal, Action::Commit)?;
        let now = self.clock.now();
        let record_idx = self.records.len();
        match self.by_voter.entry((proposal, voter.clone())) {
            Entry::Occupied(_) => {
                debug!(%proposal, %voter, "rejected: already committed");
                return Err(LedgerError::AlreadyVoted {
                    proposal,
                    voter: voter.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(record_idx);
            }
        }
        self.records.push(VoteRecord {
            proposal,
            voter: voter.clone(),
            commit_hash,
            has_committed: true,
            has_revealed: false,
            vote: None,
            salt: None,
            committed_at: now,
            revealed_at: None,
        });
        self.by_proposal.entry(proposal).or_default().push(record_idx);
        self.proposals[idx].tally.total_committed += 1;
        self.emit(EventKind::VoteCommitted {
            proposal,
            voter: voter.clone(),
            commit_hash,
        });
        debug!(%proposal, %voter, commit = %commit_hash, "vote committed");
        Ok(())
    }

    /// Opens `voter`'s commitment and counts the vote.
    ///
    /// A mismatching opening is rejected with the record left untouched.
    pub fn reveal_vote(
        &mut self,
        voter: &VoterId,
        proposal: ProposalId,
        vote: Vote,
        salt: Salt,
    ) -> Result<(), LedgerError> {
        let idx = self.require_phase(proposal, Action::Reveal)?;
        let record_idx = *self
            .by_voter
            .get(&(proposal, voter.clone()))
            .ok_or_else(|| LedgerError::NoCommitFound {
                proposal,
                voter: voter.clone(),
            })?;
        let now = self.clock.now();
        let record = &mut self.records[record_idx];
        if record.has_revealed {
            return Err(LedgerError::AlreadyRevealed {
                proposal,
                voter: voter.clone(),
            });
        }
        if !verify_commit(vote, &salt, &record.commit_hash) {
            debug!(%proposal, %voter, "rejected: opening does not match commitment");
            return Err(LedgerError::InvalidReveal {
                proposal,
                voter: voter.clone(),
            });
        }
        record.has_revealed = true;
        record.vote = Some(vote);
        record.salt = Some(salt);
        record.revealed_at = Some(now);

        let tally = &mut self.proposals[idx].tally;
        match vote {
            Vote::Yes => tally.yes += 1,
            Vote::No => tally.no += 1,
        }
        tally.total_revealed += 1;
        self.emit(EventKind::VoteRevealed {
            proposal,
            voter: voter.clone(),
            vote,
        });
        debug!(%proposal, %voter, %vote, "vote revealed");
        Ok(())
    }

    /// Current counts with quorum and majority evaluated.
    pub fn get_voting_results(&self, proposal: ProposalId) -> Result<VotingResults, LedgerError> {
        let p = self.proposal(proposal)?;
        Ok(VotingResults::evaluate(&p.tally, &self.params.quorum))
    }

    /// Records the decision of a completed proposal.
    ///
    /// Missing quorum is reported as [`LedgerError::QuorumNotMet`] and records
    /// nothing.  A failed majority records a rejection.  Either recorded
    /// decision is terminal: later calls fail with `AlreadyExecuted`.
    pub fn execute_proposal(
        &mut self,
        proposal: ProposalId,
    ) -> Result<ExecutionOutcome, LedgerError> {
        let idx = self.require_phase(proposal, Action::Execute)?;
        if self.proposals[idx].decision.is_some() {
            return Err(LedgerError::AlreadyExecuted { proposal });
        }
        let results = VotingResults::evaluate(&self.proposals[idx].tally, &self.params.quorum);
        if !results.has_quorum {
            info!(%proposal, revealed = results.total_revealed, "quorum not met");
            return Err(LedgerError::QuorumNotMet {
                proposal,
                revealed: results.total_revealed,
                eligible: self.params.quorum.eligible_voters,
                quorum_percent: self.params.quorum.quorum_percent,
            });
        }
        let (yes, no) = (results.yes, results.no);
        let outcome = if results.has_majority {
            self.proposals[idx].decision = Some(Decision::Executed);
            self.emit(EventKind::ProposalExecuted { proposal, yes, no });
            ExecutionOutcome::Executed { yes, no }
        } else {
            self.proposals[idx].decision = Some(Decision::Rejected);
            self.emit(EventKind::ProposalRejected { proposal, yes, no });
            ExecutionOutcome::Rejected { yes, no }
        };
        info!(%proposal, yes, no, ?outcome, "proposal decided");
        Ok(outcome)
    }

    /// Proposal metadata; unknown ids report `exists == false`.
    pub fn get_proposal(&self, proposal: ProposalId) -> ProposalView {
        self.proposal(proposal)
            .map(ProposalView::from)
            .unwrap_or_else(|_| ProposalView::missing(proposal))
    }

    /// Ballot status of `voter`; voters without a record get the default status.
    pub fn get_user_vote_status(
        &self,
        proposal: ProposalId,
        voter: &VoterId,
    ) -> Result<VoteStatus, LedgerError> {
        self.proposal(proposal)?;
        Ok(self
            .by_voter
            .get(&(proposal, voter.clone()))
            .map(|&idx| VoteStatus::from(&self.records[idx]))
            .unwrap_or_default())
    }

    /// Phase of `proposal` at the current time.
    pub fn get_proposal_phase(&self, proposal: ProposalId) -> Result<Phase, LedgerError> {
        Ok(self.proposal(proposal)?.phase_at(self.clock.now()))
    }

    /// Number of anchored proposals; ids run from 1 to this value.
    pub fn proposal_count(&self) -> u64 {
        self.proposals.len() as u64
    }

    /// Voters holding a record on `proposal`, in commit order.
    pub fn voters(&self, proposal: ProposalId) -> Result<Vec<VoterId>, LedgerError> {
        self.proposal(proposal)?;
        Ok(self
            .by_proposal
            .get(&proposal)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| self.records[idx].voter.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Vote records of `proposal`, in commit order.
    pub fn records(&self, proposal: ProposalId) -> impl Iterator<Item = &VoteRecord> + '_ {
        self.by_proposal
            .get(&proposal)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.records[idx])
    }

    /// Recomputes the tally of `proposal` from its records.
    pub fn recount(&self, proposal: ProposalId) -> Result<TallyState, LedgerError> {
        self.proposal(proposal)?;
        Ok(tally(self.records(proposal)))
    }

    /// Events with `seq > cursor`.
    pub fn events_since(&self, cursor: u64) -> &[LedgerEvent] {
        let start = usize::try_from(cursor)
            .unwrap_or(usize::MAX)
            .min(self.events.len());
        &self.events[start..]
    }

    /// Persists the full ledger state as JSON.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            proposals: &'a [Proposal],
            records: &'a [VoteRecord],
            events: &'a [LedgerEvent],
        }
        write_json_atomic(
            path,
            &Borrowed {
                proposals: &self.proposals,
                records: &self.records,
                events: &self.events,
            },
        )
    }

    /// Restores a ledger saved with [`Ledger::save`]; a missing file yields an empty ledger.
    ///
    /// The snapshot is rejected unless ids are dense, every proposal has
    /// `commit_start <= commit_end == reveal_start < reveal_end`, every
    /// record is unique per `(proposal, voter)`, every reveal opens its
    /// commitment, the stored counters equal a fresh recount, and events are
    /// numbered `1..=n` and refer to known proposals.
    pub fn load(
        path: &Path,
        params: LedgerParams,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PersistError> {
        let snapshot: LedgerSnapshot = read_json(path)?.unwrap_or_default();
        let mut ledger = Self::new(params, clock);
        for (idx, proposal) in snapshot.proposals.iter().enumerate() {
            if proposal.id.0 != idx as u64 + 1 {
                return Err(PersistError::Corrupt(format!(
                    "proposal at position {idx} has id {}",
                    proposal.id
                )));
            }
            if proposal.commit_start > proposal.commit_end
                || proposal.commit_end != proposal.reveal_start
                || proposal.reveal_start >= proposal.reveal_end
            {
                return Err(PersistError::Corrupt(format!(
                    "proposal {} has malformed windows",
                    proposal.id
                )));
            }
        }
        ledger.proposals = snapshot.proposals;
        for (idx, record) in snapshot.records.iter().enumerate() {
            ledger
                .proposal(record.proposal)
                .map_err(|err| PersistError::Corrupt(err.to_string()))?;
            if ledger
                .by_voter
                .insert((record.proposal, record.voter.clone()), idx)
                .is_some()
            {
                return Err(PersistError::Corrupt(format!(
                    "duplicate record for voter {} on proposal {}",
                    record.voter, record.proposal
                )));
            }
            let opened = match (record.has_revealed, record.vote, record.salt) {
                (false, None, None) => true,
                (true, Some(vote), Some(salt)) => verify_commit(vote, &salt, &record.commit_hash),
                _ => false,
            };
            if !record.has_committed || !opened {
                return Err(PersistError::Corrupt(format!(
                    "inconsistent record for voter {} on proposal {}",
                    record.voter, record.proposal
                )));
            }
            ledger
                .by_proposal
                .entry(record.proposal)
                .or_default()
                .push(idx);
        }
        ledger.records = snapshot.records;
        for proposal in &ledger.proposals {
            let recount = tally(ledger.records(proposal.id));
            if recount != proposal.tally {
                return Err(PersistError::Corrupt(format!(
                    "proposal {} counters diverge from its records",
                    proposal.id
                )));
            }
        }
        for (idx, event) in snapshot.events.iter().enumerate() {
            if event.seq != idx as u64 + 1 {
                return Err(PersistError::Corrupt(format!(
                    "event at position {idx} has seq {}",
                    event.seq
                )));
            }
            ledger
                .proposal(event.kind.proposal())
                .map_err(|err| PersistError::Corrupt(err.to_string()))?;
        }
        ledger.events = snapshot.events;
        Ok(ledger)
    }
}
