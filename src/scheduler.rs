//! Periodic mirror reconciliation.
//!
//! [`ReconcileScheduler`] keeps a next-due time per tracked proposal and is
//! advanced explicitly with [`ReconcileScheduler::tick`], so tests can step it
//! with a manual clock.  In production [`spawn_poller`] drives the same tick
//! from a tokio interval.

use crate::client::LedgerClient;
use crate::ledger::ProposalId;
use crate::mirror::MirrorStore;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default reconciliation period in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Proposals reconciled and still tracked.
    pub reconciled: Vec<ProposalId>,
    /// Proposals reconciled for the last time and no longer tracked.
    pub settled: Vec<ProposalId>,
    /// Proposals whose reconcile failed; they stay due.
    pub failed: Vec<(ProposalId, String)>,
}

impl TickReport {
    /// True when the tick touched nothing.
    pub fn is_idle(&self) -> bool {
        self.reconciled.is_empty() && self.settled.is_empty() && self.failed.is_empty()
    }
}

/// Per-proposal reconciliation timetable.
#[derive(Debug, Clone)]
pub struct ReconcileScheduler {
    interval_secs: u64,
    due: BTreeMap<ProposalId, u64>,
}

impl Default for ReconcileScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL_SECS)
    }
}

impl ReconcileScheduler {
    /// Creates a scheduler reconciling every `interval_secs` (at least one second).
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs: interval_secs.max(1),
            due: BTreeMap::new(),
        }
    }

    /// Poll period in seconds.
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Starts tracking `id`, due immediately at `now`.  Re-tracking keeps the earlier due time.
    pub fn track(&mut self, id: ProposalId, now: u64) {
        let due = self.due.entry(id).or_insert(now);
        *due = (*due).min(now);
    }

    /// Stops tracking `id`.  Returns whether it was tracked.
    pub fn cancel(&mut self, id: ProposalId) -> bool {
        self.due.remove(&id).is_some()
    }

    /// Whether `id` is tracked.
    pub fn is_tracked(&self, id: ProposalId) -> bool {
        self.due.contains_key(&id)
    }

    /// Tracked proposals.
    pub fn tracked(&self) -> impl Iterator<Item = ProposalId> + '_ {
        self.due.keys().copied()
    }

    /// Earliest due time across tracked proposals.
    pub fn next_due(&self) -> Option<u64> {
        self.due.values().copied().min()
    }

    /// Reconciles every proposal due at `now`.
    ///
    /// Completed or unknown proposals stop being tracked after a successful
    /// reconcile.  Failures leave the proposal due for the next interval.
    pub fn tick(
        &mut self,
        now: u64,
        mirror: &mut MirrorStore,
        ledger: &dyn LedgerClient,
    ) -> TickReport {
        let ready: Vec<ProposalId> = self
            .due
            .iter()
            .filter(|(_, due)| **due <= now)
            .map(|(id, _)| *id)
            .collect();
        let next = now.saturating_add(self.interval_secs);
        let mut report = TickReport::default();
        for id in ready {
            match mirror.reconcile(id, ledger) {
                Ok(outcome) if outcome.is_settled() => {
                    self.due.remove(&id);
                    debug!(proposal = %id, "reconciliation settled");
                    report.settled.push(id);
                }
                Ok(_) => {
                    self.due.insert(id, next);
                    report.reconciled.push(id);
                }
                Err(err) => {
                    warn!(proposal = %id, error = %err, "reconciliation failed; retrying next interval");
                    self.due.insert(id, next);
                    report.failed.push((id, err.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(feature = "runtime")]
pub use runtime::{spawn_poller, PollerHandle};

#[cfg(feature = "runtime")]
mod runtime {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::MissedTickBehavior;
    use tracing::debug;

    /// Handle to a running poll task.  Dropping it aborts the task.
    pub struct PollerHandle {
        stop: Option<oneshot::Sender<()>>,
        task: Option<JoinHandle<()>>,
        ticks: Arc<AtomicU64>,
    }

    impl PollerHandle {
        /// Number of ticks run so far.
        pub fn ticks(&self) -> u64 {
            self.ticks.load(Ordering::SeqCst)
        }

        /// Stops the task after its current tick and waits for it to exit.
        pub async fn shutdown(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            if let Some(task) = self.task.take() {
                let _ = task.await;
            }
        }
    }

    impl Drop for PollerHandle {
        fn drop(&mut self) {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }

    /// Runs `on_tick` every `period` on the current tokio runtime.
    ///
    /// The first tick fires immediately.
    pub fn spawn_poller<F>(period: Duration, mut on_tick: F) -> PollerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        on_tick();
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            debug!(?period, "poller stopped");
        });
        debug!(?period, "poller started");
        PollerHandle {
            stop: Some(stop_tx),
            task: Some(task),
            ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FaultyLedger;
    use crate::client::SharedLedger;
    use crate::commitment::{make_commit, Salt, Vote};
    use crate::ledger::{Ledger, LedgerParams, ProposalDraft};
    use crate::phase::{Clock, ManualClock, Phase};
    use crate::voter::VoterId;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const DAY: u64 = 86_400;

    fn voter(n: u64) -> VoterId {
        VoterId::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn fixture() -> (SharedLedger, ManualClock, ProposalId) {
        let clock = ManualClock::new(0);
        let ledger = SharedLedger::new(Ledger::new(
            LedgerParams::default(),
            Arc::new(clock.clone()),
        ));
        let id = ledger
            .create_proposal(
                &voter(1),
                &ProposalDraft {
                    title: "Upgrade".into(),
                    description: "Upgrade the treasury module".into(),
                    amount_requested: 0,
                    commit_duration_secs: DAY,
                    reveal_duration_secs: DAY,
                },
            )
            .unwrap();
        (ledger, clock, id)
    }

    #[test]
    fn tick_reconciles_due_proposals_until_completed() {
        let (ledger, clock, id) = fixture();
        let mut mirror = MirrorStore::new();
        let mut scheduler = ReconcileScheduler::new(30);
        scheduler.track(id, clock.now());

        let report = scheduler.tick(clock.now(), &mut mirror, &ledger);
        assert_eq!(report.reconciled, vec![id]);
        assert_eq!(scheduler.next_due(), Some(30));
        assert!(scheduler.tick(clock.now() + 10, &mut mirror, &ledger).is_idle());

        ledger
            .commit_vote(&voter(2), id, make_commit(Vote::Yes, &Salt::from_u128(2)))
            .unwrap();
        scheduler.tick(clock.advance(30), &mut mirror, &ledger);
        assert_eq!(mirror.proposal(id).unwrap().results.total_committed, 1);

        let now = clock.advance(2 * DAY);
        let report = scheduler.tick(now, &mut mirror, &ledger);
        assert_eq!(report.settled, vec![id]);
        assert!(!scheduler.is_tracked(id));
        assert_eq!(mirror.proposal(id).unwrap().phase, Phase::Completed);
    }

    #[test]
    fn cancel_stops_tracking() {
        let mut scheduler = ReconcileScheduler::default();
        assert_eq!(scheduler.interval_secs(), DEFAULT_POLL_INTERVAL_SECS);
        scheduler.track(ProposalId(1), 100);
        scheduler.track(ProposalId(1), 50);
        assert_eq!(scheduler.next_due(), Some(50));
        assert!(scheduler.cancel(ProposalId(1)));
        assert!(!scheduler.cancel(ProposalId(1)));
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn failures_stay_due() {
        let (ledger, clock, id) = fixture();
        let flaky = FaultyLedger::new(ledger);
        flaky.set_offline(true);
        let mut mirror = MirrorStore::new();
        let mut scheduler = ReconcileScheduler::new(30);
        scheduler.track(id, 0);
        let report = scheduler.tick(clock.now(), &mut mirror, &flaky);
        assert_eq!(report.failed.len(), 1);
        assert!(scheduler.is_tracked(id));
        assert!(mirror.proposal(id).is_none());

        flaky.set_offline(false);
        let report = scheduler.tick(clock.advance(30), &mut mirror, &flaky);
        assert_eq!(report.reconciled, vec![id]);
        assert!(mirror.proposal(id).is_some());
    }

    #[cfg(feature = "runtime")]
    #[tokio::test(start_paused = true)]
    async fn poller_ticks_on_interval_and_stops_on_shutdown() {
        use std::sync::atomic::AtomicUsize;
        use std::time::Duration;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handle = spawn_poller(Duration::from_secs(30), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(handle.ticks(), 4);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[cfg(feature = "runtime")]
    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_aborts_the_poller() {
        use std::sync::atomic::AtomicUsize;
        use std::time::Duration;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handle = spawn_poller(Duration::from_secs(30), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
