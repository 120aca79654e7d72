//! Ledger client abstraction.
//!
//! Everything outside the ledger reaches it through [`LedgerClient`], so a
//! local in-process ledger and a remote adapter are interchangeable.  Every
//! call can fail with a transport error in addition to a ledger rejection.

use crate::commitment::{CommitHash, Salt, Vote};
use crate::error::ClientError;
use crate::ledger::{
    ExecutionOutcome, Ledger, LedgerEvent, ProposalDraft, ProposalId, ProposalView, VoteStatus,
};
use crate::phase::Phase;
use crate::tally::VotingResults;
use crate::voter::VoterId;
use std::sync::{Arc, Mutex, MutexGuard};

/// Operations exposed by the authoritative ledger.
pub trait LedgerClient: Send + Sync {
    /// Anchors a proposal.
    fn create_proposal(
        &self,
        proposer: &VoterId,
        draft: &ProposalDraft,
    ) -> Result<ProposalId, ClientError>;
    /// Records a commitment.
    fn commit_vote(
        &self,
        voter: &VoterId,
        proposal: ProposalId,
        commit_hash: CommitHash,
    ) -> Result<(), ClientError>;
    /// Opens a commitment.
    fn reveal_vote(
        &self,
        voter: &VoterId,
        proposal: ProposalId,
        vote: Vote,
        salt: Salt,
    ) -> Result<(), ClientError>;
    /// Records the decision of a completed proposal.
    fn execute_proposal(&self, proposal: ProposalId) -> Result<ExecutionOutcome, ClientError>;
    /// Proposal metadata.
    fn get_proposal(&self, proposal: ProposalId) -> Result<ProposalView, ClientError>;
    /// Counts with quorum and majority.
    fn get_voting_results(&self, proposal: ProposalId) -> Result<VotingResults, ClientError>;
    /// Ballot status of one voter.
    fn get_user_vote_status(
        &self,
        proposal: ProposalId,
        voter: &VoterId,
    ) -> Result<VoteStatus, ClientError>;
    /// Current phase.
    fn get_proposal_phase(&self, proposal: ProposalId) -> Result<Phase, ClientError>;
    /// Number of anchored proposals.
    fn proposal_count(&self) -> Result<u64, ClientError>;
    /// Voters holding a record on the proposal.
    fn voters(&self, proposal: ProposalId) -> Result<Vec<VoterId>, ClientError>;
    /// Events with `seq > cursor`.
    fn events_since(&self, cursor: u64) -> Result<Vec<LedgerEvent>, ClientError>;
}

/// In-process ledger shared behind a mutex.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    /// Wraps `ledger`.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Locks the ledger for direct access.
    pub fn lock(&self) -> Result<MutexGuard<'_, Ledger>, ClientError> {
        self.inner
            .lock()
            .map_err(|_| ClientError::Transport("ledger lock poisoned".into()))
    }
}

impl LedgerClient for SharedLedger {
    fn create_proposal(
        &self,
        proposer: &VoterId,
        draft: &ProposalDraft,
    ) -> Result<ProposalId, ClientError> {
        Ok(self.lock()?.create_proposal(proposer, draft)?)
    }

    fn commit_vote(
        &self,
        voter: &VoterId,
        proposal: ProposalId,
        commit_hash: CommitHash,
    ) -> Result<(), ClientError> {
        Ok(self.lock()?.commit_vote(voter, proposal, commit_hash)?)
    }

    fn reveal_vote(
        &self,
        voter: &VoterId,
        proposal: ProposalId,
        vote: Vote,
        salt: Salt,
    ) -> Result<(), ClientError> {
        Ok(self.lock()?.reveal_vote(voter, proposal, vote, salt)?)
    }

    fn execute_proposal(&self, proposal: ProposalId) -> Result<ExecutionOutcome, ClientError> {
        Ok(self.lock()?.execute_proposal(proposal)?)
    }

    fn get_proposal(&self, proposal: ProposalId) -> Result<ProposalView, ClientError> {
        Ok(self.lock()?.get_proposal(proposal))
    }

    fn get_voting_results(&self, proposal: ProposalId) -> Result<VotingResults, ClientError> {
        Ok(self.lock()?.get_voting_results(proposal)?)
    }

    fn get_user_vote_status(
        &self,
        proposal: ProposalId,
        voter: &VoterId,
    ) -> Result<VoteStatus, ClientError> {
        Ok(self.lock()?.get_user_vote_status(proposal, voter)?)
    }

    fn get_proposal_phase(&self, proposal: ProposalId) -> Result<Phase, ClientError> {
        Ok(self.lock()?.get_proposal_phase(proposal)?)
    }

    fn proposal_count(&self) -> Result<u64, ClientError> {
        Ok(self.lock()?.proposal_count())
    }

    fn voters(&self, proposal: ProposalId) -> Result<Vec<VoterId>, ClientError> {
        Ok(self.lock()?.voters(proposal)?)
    }

    fn events_since(&self, cursor: u64) -> Result<Vec<LedgerEvent>, ClientError> {
        Ok(self.lock()?.events_since(cursor).to_vec())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fault-injecting client for exercising unknown-outcome recovery.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// How the next mutating call misbehaves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Fault {
        /// The call never reaches the ledger.
        LoseRequest,
        /// The call lands but the caller sees a timeout.
        LoseResponse,
    }

    pub(crate) struct FaultyLedger {
        pub(crate) inner: SharedLedger,
        faults: Mutex<VecDeque<Fault>>,
        offline: AtomicBool,
        stalled_status_reads: AtomicU32,
    }

    impl FaultyLedger {
        pub(crate) fn new(inner: SharedLedger) -> Self {
            Self {
                inner,
                faults: Mutex::new(VecDeque::new()),
                offline: AtomicBool::new(false),
                stalled_status_reads: AtomicU32::new(0),
            }
        }

        pub(crate) fn push(&self, fault: Fault) {
            self.faults.lock().unwrap().push_back(fault);
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// The next `count` vote-status reads time out.
        pub(crate) fn stall_status_reads(&self, count: u32) {
            self.stalled_status_reads.store(count, Ordering::SeqCst);
        }

        fn online(&self) -> Result<(), ClientError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("connection refused".into()));
            }
            Ok(())
        }

        fn read<T>(
            &self,
            call: impl FnOnce(&SharedLedger) -> Result<T, ClientError>,
        ) -> Result<T, ClientError> {
            self.online()?;
            call(&self.inner)
        }

        fn write<T>(
            &self,
            call: impl FnOnce(&SharedLedger) -> Result<T, ClientError>,
        ) -> Result<T, ClientError> {
            self.online()?;
            let fault = self.faults.lock().unwrap().pop_front();
            match fault {
                Some(Fault::LoseRequest) => Err(ClientError::Timeout),
                Some(Fault::LoseResponse) => {
                    let _ = call(&self.inner);
                    Err(ClientError::Timeout)
                }
                None => call(&self.inner),
            }
        }
    }

    impl LedgerClient for FaultyLedger {
        fn create_proposal(
            &self,
            proposer: &VoterId,
            draft: &ProposalDraft,
        ) -> Result<ProposalId, ClientError> {
            self.write(|l| l.create_proposal(proposer, draft))
        }

        fn commit_vote(
            &self,
            voter: &VoterId,
            proposal: ProposalId,
            commit_hash: CommitHash,
        ) -> Result<(), ClientError> {
            self.write(|l| l.commit_vote(voter, proposal, commit_hash))
        }

        fn reveal_vote(
            &self,
            voter: &VoterId,
            proposal: ProposalId,
            vote: Vote,
            salt: Salt,
        ) -> Result<(), ClientError> {
            self.write(|l| l.reveal_vote(voter, proposal, vote, salt))
        }

        fn execute_proposal(&self, proposal: ProposalId) -> Result<ExecutionOutcome, ClientError> {
            self.write(|l| l.execute_proposal(proposal))
        }

        fn get_proposal(&self, proposal: ProposalId) -> Result<ProposalView, ClientError> {
            self.read(|l| l.get_proposal(proposal))
        }

        fn get_voting_results(&self, proposal: ProposalId) -> Result<VotingResults, ClientError> {
            self.read(|l| l.get_voting_results(proposal))
        }

        fn get_user_vote_status(
            &self,
            proposal: ProposalId,
            voter: &VoterId,
        ) -> Result<VoteStatus, ClientError> {
            let stalled = self
                .stalled_status_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if stalled.is_ok() {
                return Err(ClientError::Timeout);
            }
            self.read(|l| l.get_user_vote_status(proposal, voter))
        }

        fn get_proposal_phase(&self, proposal: ProposalId) -> Result<Phase, ClientError> {
            self.read(|l| l.get_proposal_phase(proposal))
        }

        fn proposal_count(&self) -> Result<u64, ClientError> {
            self.read(|l| l.proposal_count())
        }

        fn voters(&self, proposal: ProposalId) -> Result<Vec<VoterId>, ClientError> {
            self.read(|l| l.voters(proposal))
        }

        fn events_since(&self, cursor: u64) -> Result<Vec<LedgerEvent>, ClientError> {
            self.read(|l| l.events_since(cursor))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::make_commit;
    use crate::error::LedgerError;
    use crate::ledger::LedgerParams;
    use crate::phase::ManualClock;

    #[test]
    fn shared_ledger_forwards_rejections() {
        let clock = ManualClock::new(10);
        let client = SharedLedger::new(Ledger::new(LedgerParams::default(), Arc::new(clock)));
        let voter = VoterId::parse("0x1111111111111111111111111111111111111111").unwrap();
        let id = client
            .create_proposal(
                &voter,
                &ProposalDraft {
                    title: "t".into(),
                    description: "d".into(),
                    amount_requested: 1,
                    commit_duration_secs: 86_400,
                    reveal_duration_secs: 86_400,
                },
            )
            .unwrap();
        let commit = make_commit(Vote::Yes, &Salt::from_u128(3));
        client.commit_vote(&voter, id, commit).unwrap();
        let err = client.commit_vote(&voter, id, commit).unwrap_err();
        assert!(matches!(
            err.as_ledger(),
            Some(LedgerError::AlreadyVoted { .. })
        ));
        assert_eq!(client.proposal_count().unwrap(), 1);
        assert_eq!(client.events_since(0).unwrap().len(), 2);
        assert!(!client.get_proposal(ProposalId(2)).unwrap().exists);
    }
}
