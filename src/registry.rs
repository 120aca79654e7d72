//! Local proposal ids and their ledger anchors.
//!
//! Proposals are drafted under a local id before they exist on the ledger.
//! Anchoring maps the local id to the ledger-issued id exactly once; an
//! unanchored proposal simply resolves to `None`.

use crate::io::{read_json, write_json_atomic, PersistError};
use crate::ledger::ProposalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Identifier assigned by the off-ledger store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub String);

impl LocalId {
    /// Wraps a local identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anchoring failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The local id already maps to a ledger id.
    #[error("local proposal {local} is already anchored to ledger proposal {ledger}")]
    AlreadyAnchored {
        /// Local id.
        local: LocalId,
        /// Existing ledger id.
        ledger: ProposalId,
    },
    /// The ledger id already belongs to a different local id.
    #[error("ledger proposal {ledger} already belongs to local proposal {owner}")]
    LedgerIdTaken {
        /// Ledger id.
        ledger: ProposalId,
        /// Local id holding it.
        owner: LocalId,
    },
    /// Reading or writing the registry failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// One anchored proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalMapping {
    /// Local id.
    pub local_id: LocalId,
    /// Ledger-issued id.
    pub ledger_id: ProposalId,
    /// Title at anchoring time.
    pub title: String,
    /// Anchoring time.
    pub created_at: u64,
}

/// One-to-one map between local and ledger proposal ids.
#[derive(Debug, Clone, Default)]
pub struct ProposalRegistry {
    by_local: BTreeMap<LocalId, ProposalMapping>,
    by_ledger: BTreeMap<ProposalId, LocalId>,
}

impl ProposalRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the anchor of `local` at `ledger_id`.
    pub fn anchor(
        &mut self,
        local: LocalId,
        ledger_id: ProposalId,
        title: impl Into<String>,
        created_at: u64,
    ) -> Result<&ProposalMapping, RegistryError> {
        if let Some(existing) = self.by_local.get(&local) {
            return Err(RegistryError::AlreadyAnchored {
                local,
                ledger: existing.ledger_id,
            });
        }
        if let Some(owner) = self.by_ledger.get(&ledger_id) {
            return Err(RegistryError::LedgerIdTaken {
                ledger: ledger_id,
                owner: owner.clone(),
            });
        }
        info!(%local, ledger = %ledger_id, "proposal anchored");
        self.by_ledger.insert(ledger_id, local.clone());
        let mapping = ProposalMapping {
            local_id: local.clone(),
            ledger_id,
            title: title.into(),
            created_at,
        };
        Ok(&*self.by_local.entry(local).or_insert(mapping))
    }

    /// Ledger id of `local`, if anchored.
    pub fn resolve_local(&self, local: &LocalId) -> Option<ProposalId> {
        self.by_local.get(local).map(|m| m.ledger_id)
    }

    /// Local id owning `ledger_id`, if any.
    pub fn resolve_ledger(&self, ledger_id: ProposalId) -> Option<&LocalId> {
        self.by_ledger.get(&ledger_id)
    }

    /// Full mapping of `local`.
    pub fn mapping(&self, local: &LocalId) -> Option<&ProposalMapping> {
        self.by_local.get(local)
    }

    /// Anchored ledger ids in ascending order.
    pub fn ledger_ids(&self) -> impl Iterator<Item = ProposalId> + '_ {
        self.by_ledger.keys().copied()
    }

    /// Number of anchored proposals.
    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    /// True when nothing is anchored.
    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }

    /// Persists the mappings as JSON.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let rows: Vec<&ProposalMapping> = self.by_local.values().collect();
        Ok(write_json_atomic(path, &rows)?)
    }

    /// Loads mappings saved with [`Self::save`]; a missing file yields an empty registry.
    ///
    /// Rows are re-anchored one by one, so a file breaking the one-to-one
    /// rule is rejected.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let rows: Vec<ProposalMapping> = read_json(path)?.unwrap_or_default();
        let mut registry = Self::new();
        for row in rows {
            registry.anchor(row.local_id, row.ledger_id, row.title, row.created_at)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchoring_is_one_to_one() {
        let mut registry = ProposalRegistry::new();
        registry
            .anchor(LocalId::new("draft-1"), ProposalId(1), "Grant", 10)
            .unwrap();
        assert_eq!(
            registry.resolve_local(&LocalId::new("draft-1")),
            Some(ProposalId(1))
        );
        assert_eq!(
            registry.resolve_ledger(ProposalId(1)),
            Some(&LocalId::new("draft-1"))
        );

        let err = registry
            .anchor(LocalId::new("draft-1"), ProposalId(2), "Grant", 11)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyAnchored {
                local: LocalId::new("draft-1"),
                ledger: ProposalId(1)
            }
        );
        let err = registry
            .anchor(LocalId::new("draft-2"), ProposalId(1), "Other", 12)
            .unwrap_err();
        assert!(matches!(err, RegistryError::LedgerIdTaken { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unanchored_ids_resolve_to_none() {
        let registry = ProposalRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.resolve_local(&LocalId::new("missing")), None);
        assert_eq!(registry.resolve_ledger(ProposalId(3)), None);
    }

    #[test]
    fn registry_survives_a_restart() {
        let mut registry = ProposalRegistry::new();
        registry
            .anchor(LocalId::new("a"), ProposalId(1), "First", 1)
            .unwrap();
        registry
            .anchor(LocalId::new("b"), ProposalId(2), "Second", 2)
            .unwrap();
        let path = crate::io::scratch_path("registry");
        registry.save(&path).unwrap();
        let restored = ProposalRegistry::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.mapping(&LocalId::new("b")).unwrap().title,
            "Second"
        );
        assert_eq!(restored.ledger_ids().collect::<Vec<_>>(), vec![ProposalId(1), ProposalId(2)]);
    }
}
