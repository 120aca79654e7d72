//! Voter-facing commit-reveal flow.
//!
//! [`VotingClient`] ties the pieces together for one operator: it anchors
//! locally drafted proposals, seals ballots with fresh salts, keeps the
//! openings in a [`SaltVault`] until the reveal window, and keeps the mirror
//! reconciled after each write.
//!
//! Every mutating call goes to the ledger first.  When the ledger cannot be
//! reached, or a call times out, the outcome is unknown: the client reads
//! ledger state to learn whether the call landed and only retries when it
//! did not.

use crate::client::LedgerClient;
use crate::commitment::{make_commit, CommitHash, Salt, SaltSource, Vote};
use crate::config::GovernanceConfig;
use crate::error::{Action, ClientError, LedgerError};
use crate::io::{read_json, write_json_atomic, PersistError};
use crate::ledger::{Decision, ExecutionOutcome, ProposalDraft, ProposalId};
use crate::mirror::{MirrorStore, ReconcileReport};
use crate::phase::{Clock, Phase};
use crate::registry::{LocalId, ProposalRegistry, RegistryError};
use crate::scheduler::{ReconcileScheduler, TickReport};
use crate::tally::VotingResults;
use crate::voter::VoterId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by [`VotingClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VotingError {
    /// The ledger rejected the action.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The ledger stayed unreachable and the outcome is still unknown.
    #[error("ledger unavailable after {attempts} attempt(s): {last}")]
    Unavailable {
        /// Attempts made.
        attempts: u32,
        /// Last transport failure.
        last: ClientError,
    },
    /// Anchoring bookkeeping failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A different commitment for this voter is already on the ledger.
    #[error("proposal {proposal}: ledger holds a different commitment for {voter}")]
    ConflictingCommit {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
    /// No sealed ballot is stored for this voter.
    #[error("proposal {proposal}: no stored salt for {voter}")]
    NoStoredSalt {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
    /// The stored opening does not match the commitment on the ledger.
    #[error("proposal {proposal}: stored salt for {voter} does not open the ledger commitment")]
    SaltMismatch {
        /// Proposal id.
        proposal: ProposalId,
        /// Voter address.
        voter: VoterId,
    },
}

impl VotingError {
    /// The ledger rejection, if this is one.
    pub fn as_ledger(&self) -> Option<&LedgerError> {
        match self {
            VotingError::Ledger(err) => Some(err),
            _ => None,
        }
    }
}

/// A sealed ballot and its opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedBallot {
    /// Proposal id.
    pub proposal_id: ProposalId,
    /// Voter address.
    pub voter: VoterId,
    /// Hidden vote.
    pub vote: Vote,
    /// Salt mixed into the commitment.
    pub salt: Salt,
    /// The commitment sent to the ledger.
    pub commit_hash: CommitHash,
}

/// Openings of committed ballots, one per `(proposal, voter)`.
///
/// A ballot is staged as pending before its commitment is sent and promoted
/// once the ledger is known to hold that commitment.  Pending openings are
/// dropped only after a ledger read shows a different commitment or none.
///
/// A salt is reused only when the same vote is sealed again; sealing a
/// different vote always draws a fresh salt, so one salt never opens two
/// different votes.
#[derive(Debug, Clone, Default)]
pub struct SaltVault {
    ballots: BTreeMap<(ProposalId, VoterId), SealedBallot>,
    pending: BTreeMap<(ProposalId, VoterId), Vec<SealedBallot>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultRow {
    #[serde(flatten)]
    ballot: SealedBallot,
    #[serde(default)]
    pending: bool,
}

impl SaltVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    fn openings(
        &self,
        proposal: ProposalId,
        voter: &VoterId,
    ) -> impl Iterator<Item = &SealedBallot> + '_ {
        let key = (proposal, voter.clone());
        self.ballots
            .get(&key)
            .into_iter()
            .chain(self.pending.get(&key).into_iter().flatten())
    }

    /// Prepares a ballot without storing it.
    pub fn seal(
        &self,
        proposal: ProposalId,
        voter: &VoterId,
        vote: Vote,
        salts: &dyn SaltSource,
    ) -> SealedBallot {
        let salt = self
            .openings(proposal, voter)
            .find(|existing| existing.vote == vote)
            .map(|existing| existing.salt)
            .unwrap_or_else(|| salts.generate_salt());
        SealedBallot {
            proposal_id: proposal,
            voter: voter.clone(),
            vote,
            salt,
            commit_hash: make_commit(vote, &salt),
        }
    }

    /// Keeps `ballot` as pending until the ledger confirms or refutes it.
    ///
    /// Returns false when the same commitment is already held.
    pub fn stage(&mut self, ballot: SealedBallot) -> bool {
        if self
            .openings(ballot.proposal_id, &ballot.voter)
            .any(|held| held.commit_hash == ballot.commit_hash)
        {
            return false;
        }
        self.pending
            .entry((ballot.proposal_id, ballot.voter.clone()))
            .or_default()
            .push(ballot);
        true
    }

    /// Drops the pending opening of `commit`.
    pub fn discard(&mut self, proposal: ProposalId, voter: &VoterId, commit: &CommitHash) {
        let key = (proposal, voter.clone());
        if let Some(rows) = self.pending.get_mut(&key) {
            rows.retain(|row| &row.commit_hash != commit);
            if rows.is_empty() {
                self.pending.remove(&key);
            }
        }
    }

    /// Stores a ballot the ledger accepted, clearing any pending openings.
    pub fn store(&mut self, ballot: SealedBallot) {
        let key = (ballot.proposal_id, ballot.voter.clone());
        self.pending.remove(&key);
        self.ballots.insert(key, ballot);
    }

    /// Settles the openings of `voter` against the commitment the ledger holds.
    ///
    /// The opening of `on_ledger` is kept as confirmed and returned; every
    /// other pending opening is dropped.
    pub fn settle(
        &mut self,
        proposal: ProposalId,
        voter: &VoterId,
        on_ledger: Option<CommitHash>,
    ) -> Option<SealedBallot> {
        let key = (proposal, voter.clone());
        let pending = self.pending.remove(&key).unwrap_or_default();
        let on_ledger = on_ledger?;
        if let Some(confirmed) = self.ballots.get(&key) {
            if confirmed.commit_hash == on_ledger {
                return Some(confirmed.clone());
            }
        }
        let landed = pending
            .into_iter()
            .find(|row| row.commit_hash == on_ledger)?;
        self.ballots.insert(key, landed.clone());
        Some(landed)
    }

    /// Confirmed ballot of `voter`.
    pub fn get(&self, proposal: ProposalId, voter: &VoterId) -> Option<&SealedBallot> {
        self.ballots.get(&(proposal, voter.clone()))
    }

    /// Openings of `voter` whose commitment is not yet known to be on the ledger.
    pub fn pending(&self, proposal: ProposalId, voter: &VoterId) -> &[SealedBallot] {
        self.pending
            .get(&(proposal, voter.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when any opening, confirmed or pending, is held for `voter`.
    pub fn holds(&self, proposal: ProposalId, voter: &VoterId) -> bool {
        self.openings(proposal, voter).next().is_some()
    }

    /// Number of held openings, confirmed and pending.
    pub fn len(&self) -> usize {
        self.ballots.len() + self.pending.values().map(Vec::len).sum::<usize>()
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty() && self.pending.is_empty()
    }

    /// Persists the vault as JSON.  The file holds secrets until the reveal.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let confirmed = self.ballots.values().map(|ballot| (ballot, false));
        let pending = self.pending.values().flatten().map(|ballot| (ballot, true));
        let rows: Vec<VaultRow> = confirmed
            .chain(pending)
            .map(|(ballot, pending)| VaultRow {
                ballot: ballot.clone(),
                pending,
            })
            .collect();
        write_json_atomic(path, &rows)
    }

    /// Loads a vault saved with [`Self::save`]; a missing file yields an empty vault.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let rows: Vec<VaultRow> = read_json(path)?.unwrap_or_default();
        let mut vault = Self::new();
        for VaultRow { ballot, pending } in rows {
            if make_commit(ballot.vote, &ballot.salt) != ballot.commit_hash {
                return Err(PersistError::Corrupt(format!(
                    "sealed ballot of {} on proposal {} does not open its commitment",
                    ballot.voter, ballot.proposal_id
                )));
            }
            let key = (ballot.proposal_id, ballot.voter.clone());
            if pending {
                vault.pending.entry(key).or_default().push(ballot);
            } else if vault.ballots.insert(key, ballot).is_some() {
                return Err(PersistError::Corrupt(
                    "two confirmed ballots for one voter".into(),
                ));
            }
        }
        Ok(vault)
    }
}

/// Client-side driver of the commit-reveal protocol.
pub struct VotingClient {
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    salts: Box<dyn SaltSource>,
    mirror: MirrorStore,
    registry: ProposalRegistry,
    vault: SaltVault,
    scheduler: ReconcileScheduler,
    max_attempts: u32,
}

impl VotingClient {
    /// Creates a client with empty local stores.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        salts: Box<dyn SaltSource>,
        config: &GovernanceConfig,
    ) -> Self {
        Self {
            ledger,
            clock,
            salts,
            mirror: MirrorStore::new(),
            registry: ProposalRegistry::new(),
            vault: SaltVault::new(),
            scheduler: ReconcileScheduler::new(config.poll_interval_secs),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Replaces the local stores, e.g. with snapshots loaded at startup.
    pub fn with_stores(
        mut self,
        mirror: MirrorStore,
        registry: ProposalRegistry,
        vault: SaltVault,
    ) -> Self {
        let now = self.clock.now();
        for id in registry.ledger_ids() {
            self.scheduler.track(id, now);
        }
        self.mirror = mirror;
        self.registry = registry;
        self.vault = vault;
        self
    }

    /// Mirror store.
    pub fn mirror(&self) -> &MirrorStore {
        &self.mirror
    }

    /// Proposal registry.
    pub fn registry(&self) -> &ProposalRegistry {
        &self.registry
    }

    /// Salt vault.
    pub fn vault(&self) -> &SaltVault {
        &self.vault
    }

    /// Reconciliation timetable.
    pub fn scheduler(&self) -> &ReconcileScheduler {
        &self.scheduler
    }

    fn read<T>(
        &self,
        op: impl Fn(&dyn LedgerClient) -> Result<T, ClientError>,
    ) -> Result<T, VotingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(self.ledger.as_ref()) {
                Ok(value) => return Ok(value),
                Err(ClientError::Ledger(err)) => return Err(err.into()),
                Err(err) if attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "ledger read failed; retrying");
                }
                Err(last) => {
                    return Err(VotingError::Unavailable {
                        attempts: attempt,
                        last,
                    })
                }
            }
        }
    }

    /// Runs a mutating call with retry-after-reconcile.
    ///
    /// `landed` inspects ledger state after an unknown outcome and returns
    /// the call's result if it took effect.
    fn mutate<T>(
        &self,
        action: &'static str,
        call: impl Fn(&dyn LedgerClient) -> Result<T, ClientError>,
        landed: impl Fn(&Self) -> Result<Option<T>, VotingError>,
    ) -> Result<T, VotingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match call(self.ledger.as_ref()) {
                Ok(value) => return Ok(value),
                Err(ClientError::Ledger(err)) => return Err(err.into()),
                Err(err) => err,
            };
            warn!(action, attempt, error = %err, "outcome unknown; reconciling");
            if let Some(value) = landed(self)? {
                info!(action, attempt, "call had landed before the failure");
                return Ok(value);
            }
            if attempt >= self.max_attempts {
                return Err(VotingError::Unavailable {
                    attempts: attempt,
                    last: err,
                });
            }
        }
    }

    fn require_phase(&self, proposal: ProposalId, action: Action) -> Result<(), VotingError> {
        let actual = self.read(|l| l.get_proposal_phase(proposal))?;
        if actual != action.legal_phase() {
            return Err(LedgerError::WrongPhase {
                proposal,
                action,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Reconciles the mirror for `proposal`, logging failures.
    pub fn refresh(&mut self, proposal: ProposalId) -> Option<ReconcileReport> {
        match self.mirror.reconcile(proposal, self.ledger.as_ref()) {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(%proposal, error = %err, "mirror refresh failed; poller will retry");
                None
            }
        }
    }

    /// Anchors the locally drafted proposal `local`, or returns its existing anchor.
    pub fn submit_proposal(
        &mut self,
        proposer: &VoterId,
        local: LocalId,
        draft: &ProposalDraft,
    ) -> Result<ProposalId, VotingError> {
        if let Some(id) = self.registry.resolve_local(&local) {
            debug!(%local, proposal = %id, "proposal already anchored");
            return Ok(id);
        }
        let before = self.read(|l| l.proposal_count())?;
        let id = self.mutate(
            "create_proposal",
            |l| l.create_proposal(proposer, draft),
            |client| client.find_created(before, proposer, draft),
        )?;
        let now = self.clock.now();
        self.registry
            .anchor(local, id, draft.title.clone(), now)?;
        self.scheduler.track(id, now);
        self.refresh(id);
        Ok(id)
    }

    fn find_created(
        &self,
        before: u64,
        proposer: &VoterId,
        draft: &ProposalDraft,
    ) -> Result<Option<ProposalId>, VotingError> {
        let after = self.read(|l| l.proposal_count())?;
        for raw in (before + 1)..=after {
            let id = ProposalId(raw);
            if self.registry.resolve_ledger(id).is_some() {
                continue;
            }
            let view = self.read(|l| l.get_proposal(id))?;
            if view.proposer.as_ref() == Some(proposer)
                && view.title == draft.title
                && view.description == draft.description
                && view.amount_requested == draft.amount_requested
            {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Resolves openings left pending by an earlier unknown outcome.
    fn settle_pending(
        &mut self,
        proposal: ProposalId,
        voter: &VoterId,
    ) -> Result<Option<SealedBallot>, VotingError> {
        if self.vault.pending(proposal, voter).is_empty() {
            return Ok(None);
        }
        let status = self.read(|l| l.get_user_vote_status(proposal, voter))?;
        Ok(self.vault.settle(proposal, voter, status.commit_hash))
    }

    /// Seals `vote` and commits it for `voter`.  Returns the commitment.
    ///
    /// The opening is held as pending while the outcome is unknown, so a
    /// commitment that landed can still be revealed.
    pub fn commit(
        &mut self,
        proposal: ProposalId,
        voter: &VoterId,
        vote: Vote,
    ) -> Result<CommitHash, VotingError> {
        self.require_phase(proposal, Action::Commit)?;
        if let Some(landed) = self.settle_pending(proposal, voter)? {
            if landed.vote == vote {
                info!(%proposal, %voter, commit = %landed.commit_hash, "earlier commit had landed");
                self.scheduler.track(proposal, self.clock.now());
                self.refresh(proposal);
                return Ok(landed.commit_hash);
            }
        }
        let ballot = self
            .vault
            .seal(proposal, voter, vote, self.salts.as_ref());
        let commit = ballot.commit_hash;
        let staged = self.vault.stage(ballot.clone());
        let outcome = self.mutate(
            "commit_vote",
            |l| l.commit_vote(voter, proposal, commit),
            |client| {
                let status = client.read(|l| l.get_user_vote_status(proposal, voter))?;
                match status.commit_hash {
                    Some(found) if found == commit => Ok(Some(())),
                    Some(_) => Err(VotingError::ConflictingCommit {
                        proposal,
                        voter: voter.clone(),
                    }),
                    None => Ok(None),
                }
            },
        );
        if let Err(err) = outcome {
            if matches!(err, VotingError::Unavailable { .. }) {
                warn!(%proposal, %voter, %commit, "commit outcome unknown; opening kept as pending");
            } else if staged {
                self.vault.discard(proposal, voter, &commit);
            }
            return Err(err);
        }
        self.vault.store(ballot);
        info!(%proposal, %voter, %commit, "ballot committed");
        self.scheduler.track(proposal, self.clock.now());
        self.refresh(proposal);
        Ok(commit)
    }

    /// Opens `voter`'s stored ballot.  Returns the revealed vote.
    ///
    /// The opening used is the one whose commitment the ledger holds.
    pub fn reveal(&mut self, proposal: ProposalId, voter: &VoterId) -> Result<Vote, VotingError> {
        if !self.vault.holds(proposal, voter) {
            return Err(VotingError::NoStoredSalt {
                proposal,
                voter: voter.clone(),
            });
        }
        self.require_phase(proposal, Action::Reveal)?;
        let status = self.read(|l| l.get_user_vote_status(proposal, voter))?;
        if !status.has_committed {
            return Err(LedgerError::NoCommitFound {
                proposal,
                voter: voter.clone(),
            }
            .into());
        }
        if status.has_revealed {
            return Err(LedgerError::AlreadyRevealed {
                proposal,
                voter: voter.clone(),
            }
            .into());
        }
        let ballot = self
            .vault
            .settle(proposal, voter, status.commit_hash)
            .ok_or_else(|| VotingError::SaltMismatch {
                proposal,
                voter: voter.clone(),
            })?;
        self.mutate(
            "reveal_vote",
            |l| l.reveal_vote(voter, proposal, ballot.vote, ballot.salt),
            |client| {
                let status = client.read(|l| l.get_user_vote_status(proposal, voter))?;
                Ok(status.has_revealed.then_some(()))
            },
        )?;
        info!(%proposal, %voter, "ballot revealed");
        self.refresh(proposal);
        Ok(ballot.vote)
    }

    /// Records the decision of a completed proposal.
    pub fn execute(&mut self, proposal: ProposalId) -> Result<ExecutionOutcome, VotingError> {
        self.require_phase(proposal, Action::Execute)?;
        let outcome = self.mutate(
            "execute_proposal",
            |l| l.execute_proposal(proposal),
            |client| {
                let view = client.read(|l| l.get_proposal(proposal))?;
                let Some(decision) = view.decision else {
                    return Ok(None);
                };
                let results = client.read(|l| l.get_voting_results(proposal))?;
                let (yes, no) = (results.yes, results.no);
                Ok(Some(match decision {
                    Decision::Executed => ExecutionOutcome::Executed { yes, no },
                    Decision::Rejected => ExecutionOutcome::Rejected { yes, no },
                }))
            },
        )?;
        info!(%proposal, ?outcome, "proposal decided");
        self.refresh(proposal);
        Ok(outcome)
    }

    /// Current results straight from the ledger.
    pub fn results(&self, proposal: ProposalId) -> Result<VotingResults, VotingError> {
        self.read(|l| l.get_voting_results(proposal))
    }

    /// Current phase straight from the ledger.
    pub fn phase(&self, proposal: ProposalId) -> Result<Phase, VotingError> {
        self.read(|l| l.get_proposal_phase(proposal))
    }

    /// Applies new ledger events, then reconciles every proposal that is due.
    pub fn poll(&mut self) -> TickReport {
        if let Err(err) = self.mirror.catch_up(self.ledger.as_ref()) {
            warn!(error = %err, "event catch-up failed");
        }
        let now = self.clock.now();
        self.scheduler
            .tick(now, &mut self.mirror, self.ledger.as_ref())
    }
}
