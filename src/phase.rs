//! Phase clock for the commit → reveal → completed lifecycle.
//!
//! Phases are never stored.  They are recomputed from the sampled time and
//! the proposal-local boundaries on every query, so a proposal can only move
//! forward as the clock advances.

use crate::commitment::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Voting phase of a proposal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Commitments are accepted.
    Commit,
    /// Openings are accepted.
    Reveal,
    /// Voting is closed; only tally reads and execution remain.
    Completed,
}

impl Phase {
    /// Returns the wire literal (`"commit"`, `"reveal"`, `"completed"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Commit => "commit",
            Phase::Reveal => "reveal",
            Phase::Completed => "completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "commit" => Ok(Phase::Commit),
            "reveal" => Ok(Phase::Reveal),
            "completed" => Ok(Phase::Completed),
            other => Err(CodecError::InvalidPhase(other.to_string())),
        }
    }
}

/// Maps a sampled time onto the phase implied by the two boundaries.
///
/// ```
/// use sealed_ballot::{phase_at, Phase};
///
/// assert_eq!(phase_at(99, 100, 200), Phase::Commit);
/// assert_eq!(phase_at(100, 100, 200), Phase::Reveal);
/// assert_eq!(phase_at(200, 100, 200), Phase::Completed);
/// ```
pub fn phase_at(now: u64, commit_end: u64, reveal_end: u64) -> Phase {
    if now < commit_end {
        Phase::Commit
    } else if now < reveal_end {
        Phase::Reveal
    } else {
        Phase::Completed
    }
}

/// Time source sampled by every phase-sensitive operation, in UNIX seconds.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually advanced clock; clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Starts the clock at `start`.
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Moves the clock forward by `secs` and returns the new time.
    pub fn advance(&self, secs: u64) -> u64 {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }

    /// Jumps to `at`.  Moving backwards is ignored.
    pub fn set(&self, at: u64) {
        self.now.fetch_max(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literals_round_trip() {
        for phase in [Phase::Commit, Phase::Reveal, Phase::Completed] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("voting".parse::<Phase>().is_err());
    }

    #[test]
    fn manual_clock_is_shared_and_monotonic() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        assert_eq!(clock.advance(86_400), 87_400);
        assert_eq!(other.now(), 87_400);
        other.set(5);
        assert_eq!(clock.now(), 87_400);
    }

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }

    proptest! {
        #[test]
        fn phases_never_move_backwards(
            commit_len in 1u64..1_000_000,
            reveal_len in 1u64..1_000_000,
            mut samples in proptest::collection::vec(0u64..4_000_000, 1..64),
        ) {
            let commit_end = commit_len;
            let reveal_end = commit_end + reveal_len;
            samples.sort_unstable();
            let phases: Vec<Phase> = samples
                .iter()
                .map(|&now| phase_at(now, commit_end, reveal_end))
                .collect();
            prop_assert!(phases.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}
