//! Governance configuration.
//!
//! Values come from defaults, then an optional JSON file, then `SB_*`
//! environment variables, and are validated last.

use crate::io::{read_json, PersistError};
use crate::ledger::{LedgerParams, MIN_PHASE_DURATION_SECS};
use crate::scheduler::DEFAULT_POLL_INTERVAL_SECS;
use crate::tally::QuorumRule;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The config file could not be read or parsed.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// An environment override did not parse.
    #[error("{key}={value:?} is not a valid value")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// `quorum_percent` exceeds 100.
    #[error("quorum_percent {0} exceeds 100")]
    QuorumOutOfRange(u8),
    /// `poll_interval_secs` is zero.
    #[error("poll_interval_secs must be non-zero")]
    ZeroPollInterval,
    /// `max_attempts` is zero.
    #[error("max_attempts must be non-zero")]
    ZeroAttempts,
}

/// Settings shared by the ledger, the voting client and the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Minimum commit window in seconds.
    pub min_commit_duration_secs: u64,
    /// Minimum reveal window in seconds.
    pub min_reveal_duration_secs: u64,
    /// Members entitled to vote.
    pub eligible_voters: u64,
    /// Required revealed participation, in percent.
    pub quorum_percent: u8,
    /// Mirror reconciliation period.
    pub poll_interval_secs: u64,
    /// Attempts per ledger call, reads and writes alike, before the client
    /// reports the ledger unavailable.
    #[serde(alias = "max_commit_attempts")]
    pub max_attempts: u32,
    /// Directory for ledger, mirror and registry snapshots.
    pub state_dir: Option<PathBuf>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        let quorum = QuorumRule::default();
        Self {
            min_commit_duration_secs: MIN_PHASE_DURATION_SECS,
            min_reveal_duration_secs: MIN_PHASE_DURATION_SECS,
            eligible_voters: quorum.eligible_voters,
            quorum_percent: quorum.quorum_percent,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_attempts: 2,
            state_dir: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

impl GovernanceConfig {
    /// Loads `path` (defaults if missing), applies the environment and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = read_json(path)?.unwrap_or_default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with the environment applied, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SB_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SB_ELIGIBLE_VOTERS") {
            self.eligible_voters = parse_var("SB_ELIGIBLE_VOTERS", v)?;
        }
        if let Some(v) = lookup("SB_QUORUM_PERCENT") {
            self.quorum_percent = parse_var("SB_QUORUM_PERCENT", v)?;
        }
        if let Some(v) = lookup("SB_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_var("SB_POLL_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("SB_MIN_COMMIT_SECS") {
            self.min_commit_duration_secs = parse_var("SB_MIN_COMMIT_SECS", v)?;
        }
        if let Some(v) = lookup("SB_MIN_REVEAL_SECS") {
            self.min_reveal_duration_secs = parse_var("SB_MIN_REVEAL_SECS", v)?;
        }
        if let Some(v) = lookup("SB_MAX_ATTEMPTS") {
            self.max_attempts = parse_var("SB_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("SB_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quorum_percent > 100 {
            return Err(ConfigError::QuorumOutOfRange(self.quorum_percent));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Quorum rule for the ledger.
    pub fn quorum(&self) -> QuorumRule {
        QuorumRule {
            eligible_voters: self.eligible_voters,
            quorum_percent: self.quorum_percent,
        }
    }

    /// Ledger rules.
    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            min_commit_duration_secs: self.min_commit_duration_secs,
            min_reveal_duration_secs: self.min_reveal_duration_secs,
            quorum: self.quorum(),
        }
    }

    /// Snapshot path for `name` under `state_dir`.
    pub fn state_path(&self, name: &str) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GovernanceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.ledger_params(), LedgerParams::default());
        assert_eq!(config.max_attempts, 2);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = GovernanceConfig::default();
        config
            .apply_overrides(lookup(&[
                ("SB_ELIGIBLE_VOTERS", "3"),
                ("SB_QUORUM_PERCENT", " 50 "),
                ("SB_STATE_DIR", "/var/lib/ballot"),
            ]))
            .unwrap();
        assert_eq!(config.eligible_voters, 3);
        assert_eq!(config.quorum_percent, 50);
        assert_eq!(
            config.state_path("ledger.json"),
            Some(PathBuf::from("/var/lib/ballot/ledger.json"))
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = GovernanceConfig::default();
        let err = config
            .apply_overrides(lookup(&[("SB_POLL_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                key: "SB_POLL_INTERVAL_SECS",
                ..
            }
        ));
        config.quorum_percent = 101;
        assert_eq!(config.validate(), Err(ConfigError::QuorumOutOfRange(101)));
        config.quorum_percent = 100;
        config.poll_interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollInterval));
        config.poll_interval_secs = 30;
        config
            .apply_overrides(lookup(&[("SB_MAX_ATTEMPTS", "0")]))
            .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::ZeroAttempts));
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let path = crate::io::scratch_path("config");
        std::fs::write(
            &path,
            r#"{ "eligible_voters": 3, "quorum_percent": 60, "max_commit_attempts": 4 }"#,
        )
        .unwrap();
        let mut config: GovernanceConfig = read_json(&path).unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();
        config.apply_overrides(lookup(&[])).unwrap();
        assert_eq!(config.eligible_voters, 3);
        assert_eq!(config.min_commit_duration_secs, 86_400);
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.max_attempts, 4);
    }
}
