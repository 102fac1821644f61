//! Mapping from backend-native status names to [`EntityStatus`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityStatus;

/// Case-insensitive lookup table with a fallback for unknown names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMap {
    entries: HashMap<String, EntityStatus>,
    fallback: EntityStatus,
}

impl Default for StatusMap {
    fn default() -> Self {
        Self::new(EntityStatus::Created)
    }
}

impl StatusMap {
    #[must_use]
    pub fn new(fallback: EntityStatus) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    /// Adds a native name.
    #[must_use]
    pub fn with(mut self, native: &str, status: EntityStatus) -> Self {
        self.insert(native, status);
        self
    }

    pub fn insert(&mut self, native: &str, status: EntityStatus) {
        self.entries.insert(native.trim().to_ascii_uppercase(), status);
    }

    /// Batch-scheduler vocabulary (`squeue`/`sacct` state names).
    #[must_use]
    pub fn slurm() -> Self {
        Self::new(EntityStatus::Created)
            .with("PENDING", EntityStatus::Running)
            .with("RUNNING", EntityStatus::Running)
            .with("COMPLETING", EntityStatus::Running)
            .with("COMPLETED", EntityStatus::Succeeded)
            .with("FAILED", EntityStatus::Failed)
            .with("CANCELLED", EntityStatus::Failed)
            .with("TIMEOUT", EntityStatus::Failed)
            .with("NODE_FAIL", EntityStatus::Failed)
            .with("OUT_OF_MEMORY", EntityStatus::Failed)
    }

    #[must_use]
    pub fn map(&self, native: &str) -> EntityStatus {
        self.entries
            .get(&native.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.fallback)
    }

    #[must_use]
    pub const fn fallback(&self) -> EntityStatus {
        self.fallback
    }
}
