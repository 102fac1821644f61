//! Error types for idmtools.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition. Entity and builder errors are never retried
//! internally; they surface to whoever orchestrates submission.

use thiserror::Error;

use crate::entity::{ItemId, ItemType};
use crate::platform::PlatformError;
use crate::storage::StorageError;

/// Input rejected at the call site.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Duplicate asset '{filename}' at relative path '{relative_path}'")]
    DuplicateAsset {
        relative_path: String,
        filename: String,
    },

    #[error("Asset requires either an absolute path or a filename with content")]
    AssetWithoutSource,

    #[error("Asset collection is locked and can no longer be modified")]
    AssetCollectionLocked,

    #[error("{item_type} is frozen after submission; only tags may change")]
    Frozen {
        item_type: ItemType,
    },

    #[error("For pair arms, all sweep domains must have the same length: {actual} != {expected}")]
    PairLengthMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("{item_type} {id} was already added")]
    DuplicateChild {
        item_type: ItemType,
        id: ItemId,
    },

    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("Cannot split command line '{command}': unbalanced quotes or trailing escape")]
    InvalidCommand {
        command: String,
    },

    #[error("Invalid script template: {reason}")]
    InvalidTemplate {
        reason: String,
    },

    #[error("Failed to serialize {context}: {message}")]
    Serialization {
        context: &'static str,
        message: String,
    },
}

/// Builder expansion failures. Expansion is all-or-nothing.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Sweep function failed on combination {combination}: {message}")]
    SweepFailed {
        combination: usize,
        message: String,
    },

    #[error("Malformed record {record} in {source_name}: {reason}")]
    MalformedRecord {
        source_name: String,
        record: usize,
        reason: String,
    },

    #[error("Failed to read sweep source {source_name}: {message}")]
    SourceUnreadable {
        source_name: String,
        message: String,
    },
}

/// Lookups that could not be resolved locally or on a platform.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{}", experiment_not_found_message(.id, .platform))]
    ExperimentNotFound {
        id: ItemId,
        platform: Option<String>,
    },

    #[error("Object {item_type} {id} not found")]
    UnknownItem {
        item_type: ItemType,
        id: ItemId,
    },
}

fn experiment_not_found_message(id: &ItemId, platform: &Option<String>) -> String {
    match platform {
        Some(platform) => {
            format!("Experiment with id '{id}' could not be retrieved on platform {platform}.")
        }
        None => format!("Experiment with id '{id}' could not be retrieved."),
    }
}

/// Top-level error type for idmtools.
#[derive(Debug, Error)]
pub enum IdmError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl IdmError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a builder expansion error.
    #[must_use]
    pub const fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }

    /// Returns true if a lookup failed to find the requested item.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a platform error.
    #[must_use]
    pub const fn is_platform(&self) -> bool {
        matches!(self, Self::Platform(_))
    }
}

/// Result type alias for idmtools operations.
pub type IdmResult<T> = Result<T, IdmError>;
