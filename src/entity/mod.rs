//! Entity base: identity, tags and content equality.
//!
//! Every suite, experiment, simulation and asset collection carries an
//! [`EntityMeta`] block. Identity is the explicitly assigned UID when there is
//! one, otherwise the hash of the entity's persisted state. Equality is
//! content equality, never pointer identity.

mod hash;
mod id;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub use hash::{canonical_bytes, content_id, stable_hash_string};
pub use id::{ItemId, ItemType};

/// Tag mapping. Ordered so that the canonical form does not depend on
/// insertion order.
pub type Tags = BTreeMap<String, serde_json::Value>;

/// Canonical lifecycle status of a submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl EntityStatus {
    /// Returns true once the item reached a terminal state.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Identity and bookkeeping shared by every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Explicitly assigned UID. When absent the content hash is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<ItemId>,

    #[serde(default)]
    pub tags: Tags,

    /// Platform the entity came from. Lookup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<ItemId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ItemId>,

    /// Runtime status; never persisted or hashed.
    #[serde(skip)]
    pub status: Option<EntityStatus>,
}

impl EntityMeta {
    /// Creates metadata with the given tags.
    #[must_use]
    pub fn with_tags(tags: Tags) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }
}

/// Common behaviour of all persisted entities.
///
/// Implementors only provide access to their [`EntityMeta`]; identity,
/// tagging and equality come for free.
pub trait Entity: Serialize {
    /// Kind reported to platforms.
    const ITEM_TYPE: ItemType;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Returns the explicit UID if one was assigned, else the content hash.
    ///
    /// The content hash is recomputed on every call and never cached, so it
    /// is stable only while the persisted state is unchanged.
    ///
    /// # Errors
    /// Returns [`ValidationError::Serialization`] if hashing fails.
    fn uid(&self) -> Result<ItemId, ValidationError> {
        match self.meta().uid {
            Some(uid) => Ok(uid),
            None => content_id(self),
        }
    }

    /// Pins the UID, e.g. to a backend-assigned identifier.
    fn set_uid(&mut self, uid: ItemId) {
        self.meta_mut().uid = Some(uid);
    }

    fn has_explicit_uid(&self) -> bool {
        self.meta().uid.is_some()
    }

    fn tags(&self) -> &Tags {
        &self.meta().tags
    }

    /// Merges `tags` into the entity's tags; later keys overwrite.
    fn update_tags(&mut self, tags: Tags) {
        self.meta_mut().tags.extend(tags);
    }

    fn platform_id(&self) -> Option<ItemId> {
        self.meta().platform_id
    }

    fn set_platform_id(&mut self, platform_id: Option<ItemId>) {
        self.meta_mut().platform_id = platform_id;
    }

    fn parent_id(&self) -> Option<ItemId> {
        self.meta().parent_id
    }

    /// Content equality: true iff both persisted states hash identically.
    fn content_eq(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        match (content_id(self), content_id(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Returns true if `tags` contains every `(key, value)` pair in `query`.
///
/// A `null` query value only checks that the key is present.
#[must_use]
pub fn tags_match(tags: &Tags, query: &Tags) -> bool {
    query.iter().all(|(key, expected)| match tags.get(key) {
        None => false,
        Some(_) if expected.is_null() => true,
        Some(actual) => actual == expected,
    })
}

/// Implements `PartialEq` as content equality for an [`Entity`].
macro_rules! impl_content_eq {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::entity::Entity::content_eq(self, other)
            }
        }
    };
}

pub(crate) use impl_content_eq;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Probe {
        meta: EntityMeta,
        value: i64,
        #[serde(skip)]
        scratch: Vec<u8>,
    }

    impl Entity for Probe {
        const ITEM_TYPE: ItemType = ItemType::Simulation;

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    impl_content_eq!(Probe);

    fn probe(value: i64) -> Probe {
        Probe {
            meta: EntityMeta::default(),
            value,
            scratch: Vec::new(),
        }
    }

    #[test]
    fn test_uid_is_stable_while_state_unchanged() {
        let p = probe(7);
        assert_eq!(p.uid().unwrap(), p.uid().unwrap());
    }

    #[test]
    fn test_uid_follows_content() {
        let mut p = probe(7);
        let before = p.uid().unwrap();
        p.value = 8;
        assert_ne!(before, p.uid().unwrap());
    }

    #[test]
    fn test_explicit_uid_wins() {
        let mut p = probe(7);
        let id = ItemId::new();
        p.set_uid(id);
        p.value = 9;
        assert_eq!(p.uid().unwrap(), id);
        assert!(p.has_explicit_uid());
    }

    #[test]
    fn test_structural_equality() {
        let a = probe(3);
        let mut b = probe(3);
        b.scratch = vec![1, 2, 3];
        assert_eq!(a, b);
        assert_ne!(a, probe(4));
    }

    #[test]
    fn test_status_not_hashed() {
        let a = probe(1);
        let mut b = probe(1);
        b.meta.status = Some(EntityStatus::Running);
        assert_eq!(a.uid().unwrap(), b.uid().unwrap());
    }

    #[test]
    fn test_update_tags_overwrites() {
        let mut p = probe(1);
        p.update_tags(Tags::from([("a".to_string(), json!(1))]));
        p.update_tags(Tags::from([("a".to_string(), json!(2)), ("b".to_string(), json!("x"))]));
        assert_eq!(p.tags().get("a"), Some(&json!(2)));
        assert_eq!(p.tags().len(), 2);
    }

    #[test]
    fn test_tags_match_subset() {
        let tags = Tags::from([
            ("a".to_string(), json!(2)),
            ("b".to_string(), json!(1)),
            ("c".to_string(), json!("extra")),
        ]);
        let query = Tags::from([("a".to_string(), json!(2)), ("b".to_string(), json!(1))]);
        assert!(tags_match(&tags, &query));

        let miss = Tags::from([("a".to_string(), json!(3))]);
        assert!(!tags_match(&tags, &miss));
    }

    #[test]
    fn test_tags_match_null_is_presence_check() {
        let tags = Tags::from([("a".to_string(), json!(2))]);
        assert!(tags_match(&tags, &Tags::from([("a".to_string(), json!(null))])));
        assert!(!tags_match(&tags, &Tags::from([("z".to_string(), json!(null))])));
    }

    #[test]
    fn test_status_done() {
        assert!(EntityStatus::Succeeded.is_done());
        assert!(EntityStatus::Failed.is_done());
        assert!(!EntityStatus::Running.is_done());
    }
}
