//! Item identifiers and item kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a suite, experiment, simulation or asset collection.
///
/// An `ItemId` is either assigned explicitly (a random v4 UUID, or whatever a
/// platform hands back) or derived from the item's content hash.
///
/// # Examples
///
/// ```
/// use idmtools::ItemId;
///
/// let a = ItemId::from_content(b"payload");
/// let b = ItemId::from_content(b"payload");
/// assert_eq!(a, b);
/// assert_ne!(a, ItemId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Creates a new random item ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives an ID from canonical content bytes.
    ///
    /// The first 16 bytes of the blake3 digest form the UUID.
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes);
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&digest.as_bytes()[..16]);
        Self(Uuid::from_bytes(raw))
    }

    /// Creates an item ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Creates a nil item ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ItemId> for Uuid {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Kinds of items a platform knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Suite,
    Experiment,
    Simulation,
    AssetCollection,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suite => write!(f, "suite"),
            Self::Experiment => write!(f, "experiment"),
            Self::Simulation => write!(f, "simulation"),
            Self::AssetCollection => write!(f, "asset_collection"),
        }
    }
}
