//! Off-ledger mirror of proposal and ballot state.
//!
//! The mirror serves fast reads and may lag the ledger.  It never stores
//! deltas: every write sets booleans and enums, so applying the same update
//! twice is harmless, and counts are copied from the ledger rather than
//! accumulated.  Anything the mirror holds can be rederived with
//! [`MirrorStore::rebuild`].

use crate::client::LedgerClient;
use crate::commitment::{CommitHash, Salt, Vote};
use crate::error::ClientError;
use crate::io::{read_json, write_json_atomic, PersistError};
use crate::ledger::{Decision, EventKind, LedgerEvent, ProposalId, VoteStatus};
use crate::phase::Phase;
use crate::tally::VotingResults;
use crate::voter::VoterId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by mirror persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// Reading or writing the store failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The stored file holds two rows for one ballot.
    #[error("duplicate mirror row for voter {voter} on proposal {proposal}")]
    DuplicateRow {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
}

/// Mirrored ballot row, unique on `(proposal_id, voter)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorVote {
    /// Proposal id.
    pub proposal_id: ProposalId,
    /// Lowercase voter address.
    pub voter: VoterId,
    /// Stored commitment, when known.
    pub commit_hash: Option<CommitHash>,
    /// Whether a commitment is recorded.
    pub has_committed: bool,
    /// Opened vote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<Vote>,
    /// Opened salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Salt>,
    /// Whether the commitment was opened.
    pub is_revealed: bool,
}

impl MirrorVote {
    fn empty(proposal_id: ProposalId, voter: VoterId) -> Self {
        Self {
            proposal_id,
            voter,
            commit_hash: None,
            has_committed: false,
            vote: None,
            salt: None,
            is_revealed: false,
        }
    }

    fn from_status(proposal_id: ProposalId, voter: VoterId, status: &VoteStatus) -> Self {
        Self {
            proposal_id,
            voter,
            commit_hash: status.commit_hash,
            has_committed: status.has_committed,
            vote: status.vote,
            salt: status.salt,
            is_revealed: status.has_revealed,
        }
    }
}

/// Mirrored proposal row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorProposal {
    /// Ledger id.
    pub proposal_id: ProposalId,
    /// Title.
    pub title: String,
    /// Creator.
    pub proposer: Option<VoterId>,
    /// End of the commit window.
    pub commit_end: u64,
    /// End of the reveal window.
    pub reveal_end: u64,
    /// Phase observed at the last sync.
    pub phase: Phase,
    /// Recorded decision.
    pub decision: Option<Decision>,
    /// Counts observed at the last reconcile.
    pub results: VotingResults,
}

/// Summary of one [`MirrorStore::reconcile`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Whether the ledger knows the proposal.
    pub exists: bool,
    /// Phase reported by the ledger.
    pub phase: Option<Phase>,
    /// Rows inserted or overwritten.
    pub updated: usize,
    /// Rows dropped because the ledger does not know them.
    pub removed: usize,
}

impl ReconcileReport {
    /// True once the proposal is completed or gone, so polling can stop.
    pub fn is_settled(&self) -> bool {
        !self.exists || self.phase == Some(Phase::Completed)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MirrorSnapshot {
    cursor: u64,
    proposals: Vec<MirrorProposal>,
    votes: Vec<MirrorVote>,
}

/// The mirror store.
#[derive(Debug, Clone, Default)]
pub struct MirrorStore {
    proposals: BTreeMap<ProposalId, MirrorProposal>,
    votes: BTreeMap<(ProposalId, VoterId), MirrorVote>,
    cursor: u64,
}

impl MirrorStore {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last applied ledger event.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Mirrored proposal row.
    pub fn proposal(&self, id: ProposalId) -> Option<&MirrorProposal> {
        self.proposals.get(&id)
    }

    /// All mirrored proposal rows in id order.
    pub fn proposals(&self) -> impl Iterator<Item = &MirrorProposal> {
        self.proposals.values()
    }

    /// Mirrored ballot row.
    pub fn vote(&self, id: ProposalId, voter: &VoterId) -> Option<&MirrorVote> {
        self.votes.get(&(id, voter.clone()))
    }

    /// Mirrored ballot rows of one proposal, ordered by voter.
    pub fn votes_for(&self, id: ProposalId) -> impl Iterator<Item = &MirrorVote> {
        self.votes
            .iter()
            .filter(move |((proposal, _), _)| *proposal == id)
            .map(|(_, row)| row)
    }

    /// Sets the ballot flags of one voter.  Returns true if the row changed.
    pub fn upsert_vote_status(
        &mut self,
        id: ProposalId,
        voter: &VoterId,
        has_committed: bool,
        has_revealed: bool,
        vote: Option<Vote>,
    ) -> bool {
        let row = self
            .votes
            .entry((id, voter.clone()))
            .or_insert_with(|| MirrorVote::empty(id, voter.clone()));
        let before = row.clone();
        row.has_committed = has_committed;
        row.is_revealed = has_revealed;
        row.vote = vote;
        *row != before
    }

    /// Projects one ledger event.  Counts are left for [`Self::reconcile`].
    pub fn apply_event(&mut self, event: &LedgerEvent) {
        match &event.kind {
            EventKind::ProposalCreated {
                proposal,
                proposer,
                title,
                commit_end,
                reveal_end,
            } => {
                self.proposals
                    .entry(*proposal)
                    .or_insert_with(|| MirrorProposal {
                        proposal_id: *proposal,
                        title: title.clone(),
                        proposer: Some(proposer.clone()),
                        commit_end: *commit_end,
                        reveal_end: *reveal_end,
                        phase: Phase::Commit,
                        decision: None,
                        results: VotingResults::default(),
                    });
            }
            EventKind::VoteCommitted {
                proposal,
                voter,
                commit_hash,
            } => {
                let row = self
                    .votes
                    .entry((*proposal, voter.clone()))
                    .or_insert_with(|| MirrorVote::empty(*proposal, voter.clone()));
                row.has_committed = true;
                row.commit_hash = Some(*commit_hash);
            }
            EventKind::VoteRevealed {
                proposal,
                voter,
                vote,
            } => {
                let row = self
                    .votes
                    .entry((*proposal, voter.clone()))
                    .or_insert_with(|| MirrorVote::empty(*proposal, voter.clone()));
                row.has_committed = true;
                row.is_revealed = true;
                row.vote = Some(*vote);
            }
            EventKind::ProposalExecuted { proposal, .. } => {
                self.mark_decided(*proposal, Decision::Executed);
            }
            EventKind::ProposalRejected { proposal, .. } => {
                self.mark_decided(*proposal, Decision::Rejected);
            }
        }
        self.cursor = self.cursor.max(event.seq);
    }

    fn mark_decided(&mut self, id: ProposalId, decision: Decision) {
        if let Some(row) = self.proposals.get_mut(&id) {
            row.decision = Some(decision);
            row.phase = Phase::Completed;
        }
    }

    /// Applies every ledger event past the cursor and returns how many were applied.
    pub fn catch_up(&mut self, ledger: &dyn LedgerClient) -> Result<usize, ClientError> {
        let events = ledger.events_since(self.cursor)?;
        for event in &events {
            self.apply_event(event);
        }
        if !events.is_empty() {
            debug!(applied = events.len(), cursor = self.cursor, "mirror caught up");
        }
        Ok(events.len())
    }

    /// Overwrites the mirror's view of `id` with ledger truth.
    ///
    /// Rows the ledger does not know are dropped.  On error the mirror is
    /// left unchanged.
    pub fn reconcile(
        &mut self,
        id: ProposalId,
        ledger: &dyn LedgerClient,
    ) -> Result<ReconcileReport, ClientError> {
        let view = ledger.get_proposal(id)?;
        if !view.exists {
            let mut report = ReconcileReport::default();
            report.removed += usize::from(self.proposals.remove(&id).is_some());
            let before = self.votes.len();
            self.votes.retain(|(proposal, _), _| *proposal != id);
            report.removed += before - self.votes.len();
            if report.removed > 0 {
                info!(proposal = %id, removed = report.removed, "dropped rows unknown to the ledger");
            }
            return Ok(report);
        }

        let phase = ledger.get_proposal_phase(id)?;
        let results = ledger.get_voting_results(id)?;
        let voters = ledger.voters(id)?;
        let mut fresh = Vec::with_capacity(voters.len());
        for voter in voters {
            let status = ledger.get_user_vote_status(id, &voter)?;
            fresh.push(MirrorVote::from_status(id, voter, &status));
        }

        let mut report = ReconcileReport {
            exists: true,
            phase: Some(phase),
            ..ReconcileReport::default()
        };
        let row = MirrorProposal {
            proposal_id: id,
            title: view.title,
            proposer: view.proposer,
            commit_end: view.commit_end,
            reveal_end: view.reveal_end,
            phase,
            decision: view.decision,
            results,
        };
        if self.proposals.get(&id) != Some(&row) {
            self.proposals.insert(id, row);
            report.updated += 1;
        }

        let known: BTreeSet<VoterId> = fresh.iter().map(|row| row.voter.clone()).collect();
        let before = self.votes.len();
        self.votes
            .retain(|(proposal, voter), _| *proposal != id || known.contains(voter));
        report.removed += before - self.votes.len();
        for row in fresh {
            let key = (id, row.voter.clone());
            if self.votes.get(&key) != Some(&row) {
                self.votes.insert(key, row);
                report.updated += 1;
            }
        }

        if report.updated > 0 || report.removed > 0 {
            debug!(
                proposal = %id,
                %phase,
                updated = report.updated,
                removed = report.removed,
                "mirror reconciled"
            );
        }
        Ok(report)
    }

    /// Reconciles every proposal the ledger holds and drops the rest.
    ///
    /// Returns the number of proposals reconciled.
    pub fn rebuild(&mut self, ledger: &dyn LedgerClient) -> Result<u64, ClientError> {
        let count = ledger.proposal_count()?;
        for raw in 1..=count {
            self.reconcile(ProposalId(raw), ledger)?;
        }
        let stale = ProposalId(count);
        self.proposals.retain(|id, _| *id <= stale);
        self.votes.retain(|(id, _), _| *id <= stale);
        info!(proposals = count, "mirror rebuilt from ledger");
        Ok(count)
    }

    /// Persists the mirror as JSON.
    pub fn save(&self, path: &Path) -> Result<(), MirrorError> {
        let snapshot = MirrorSnapshot {
            cursor: self.cursor,
            proposals: self.proposals.values().cloned().collect(),
            votes: self.votes.values().cloned().collect(),
        };
        Ok(write_json_atomic(path, &snapshot)?)
    }

    /// Loads a mirror saved with [`Self::save`]; a missing file yields an empty mirror.
    pub fn load(path: &Path) -> Result<Self, MirrorError> {
        let snapshot: MirrorSnapshot = read_json(path)?.unwrap_or_default();
        let mut store = Self {
            cursor: snapshot.cursor,
            ..Self::default()
        };
        for row in snapshot.proposals {
            store.proposals.insert(row.proposal_id, row);
        }
        for row in snapshot.votes {
            let key = (row.proposal_id, row.voter.clone());
            if store.votes.contains_key(&key) {
                return Err(MirrorError::DuplicateRow {
                    proposal: row.proposal_id,
                    voter: row.voter,
                });
            }
            store.votes.insert(key, row);
        }
        Ok(store)
    }
}
