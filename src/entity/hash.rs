//! Canonical serialization and content hashing.
//!
//! Routing every value through `serde_json::Value` sorts object keys, so two
//! structurally identical items produce identical bytes regardless of map
//! insertion order. Fields marked `#[serde(skip)]` never reach the hash.

use serde::Serialize;

use crate::entity::ItemId;
use crate::error::ValidationError;

/// Serializes `value` to canonical JSON bytes.
///
/// # Errors
/// Returns [`ValidationError::Serialization`] if the value cannot be encoded.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ValidationError> {
    let tree = serde_json::to_value(value).map_err(|err| serialization_error(&err))?;
    serde_json::to_vec(&tree).map_err(|err| serialization_error(&err))
}

/// Computes the content-derived [`ItemId`] of a serializable value.
///
/// # Errors
/// Returns [`ValidationError::Serialization`] if the value cannot be encoded.
pub fn content_id<T: Serialize + ?Sized>(value: &T) -> Result<ItemId, ValidationError> {
    canonical_bytes(value).map(|bytes| ItemId::from_content(&bytes))
}

/// Hex-encoded blake3 digest of the canonical form.
///
/// # Errors
/// Returns [`ValidationError::Serialization`] if the value cannot be encoded.
pub fn stable_hash_string<T: Serialize + ?Sized>(value: &T) -> Result<String, ValidationError> {
    let bytes = canonical_bytes(value)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn serialization_error(err: &serde_json::Error) -> ValidationError {
    ValidationError::Serialization {
        context: "canonical form",
        message: err.to_string(),
    }
}
