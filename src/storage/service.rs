//! Typed persistence over a [`PersistStore`].
//!
//! Records are stored as JSON inside a small envelope that carries the
//! time of the save. Retrieval of an unknown UID is `Ok(None)`; only the
//! lookup helpers turn a miss into an error.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{InMemoryStore, PersistStore, StorageError};
use crate::entity::{content_id, Entity, ItemId, ItemType};
use crate::error::{IdmResult, LookupError, ValidationError};
use crate::experiment::Experiment;
use crate::platform::{Item, Platform, PlatformSpec};
use crate::simulation::Simulation;
use crate::suite::Suite;

pub const EXPERIMENTS_NAMESPACE: &str = "experiments";
pub const PLATFORMS_NAMESPACE: &str = "platforms";

/// Values that can be stored by a [`PersistService`].
pub trait Persistable: Serialize + DeserializeOwned {
    /// Key the value is stored under.
    ///
    /// # Errors
    /// Returns [`ValidationError::Serialization`] if the key is derived from
    /// content that cannot be serialized.
    fn persist_key(&self) -> Result<ItemId, ValidationError>;
}

macro_rules! persist_by_uid {
    ($($ty:ty),*) => {
        $(
            impl Persistable for $ty {
                fn persist_key(&self) -> Result<ItemId, ValidationError> {
                    self.uid()
                }
            }
        )*
    };
}

persist_by_uid!(Experiment, Simulation, Suite);

impl Persistable for PlatformSpec {
    fn persist_key(&self) -> Result<ItemId, ValidationError> {
        content_id(self)
    }
}

#[derive(Serialize)]
struct RecordRef<'a, T> {
    saved_at: DateTime<Utc>,
    value: &'a T,
}

#[derive(Deserialize)]
struct Record<T> {
    saved_at: DateTime<Utc>,
    value: T,
}

/// Typed, namespaced view over a shared store.
pub struct PersistService<T> {
    store: Arc<dyn PersistStore>,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PersistService<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for PersistService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistService")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<T: Persistable> PersistService<T> {
    #[must_use]
    pub fn new(store: Arc<dyn PersistStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stores `item` under its key, replacing any earlier record. Returns the
    /// key.
    ///
    /// # Errors
    /// Returns an error if the key cannot be derived, the item cannot be
    /// serialized, or the store rejects the write.
    pub fn save(&self, item: &T) -> IdmResult<ItemId> {
        let id = item.persist_key()?;
        let record = RecordRef {
            saved_at: Utc::now(),
            value: item,
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| StorageError::SerializationError(format!("failed to encode {id}: {e}")))?;
        self.store.put(&self.namespace, &id.to_string(), bytes)?;
        log::info!("saved {id} to '{}'", self.namespace);
        Ok(id)
    }

    /// Stored value for `id`, or `None`.
    ///
    /// # Errors
    /// Returns an error if the store fails or the record cannot be decoded.
    pub fn retrieve(&self, id: ItemId) -> Result<Option<T>, StorageError> {
        Ok(self.record(id)?.map(|record| record.value))
    }

    /// When `id` was last saved.
    ///
    /// # Errors
    /// Returns an error if the store fails or the record cannot be decoded.
    pub fn saved_at(&self, id: ItemId) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.record(id)?.map(|record| record.saved_at))
    }

    fn record(&self, id: ItemId) -> Result<Option<Record<T>>, StorageError> {
        let key = id.to_string();
        let Some(bytes) = self.store.get(&self.namespace, &key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::SerializationError(format!("failed to decode {key}: {e}")))
    }

    /// Removes the record for `id`. Returns whether it existed.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub fn delete(&self, id: ItemId) -> Result<bool, StorageError> {
        self.store.remove(&self.namespace, &id.to_string())
    }

    /// Removes every record of this service.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.clear(&self.namespace)
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub fn len(&self) -> Result<usize, StorageError> {
        self.store.len(&self.namespace)
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        self.store.is_empty(&self.namespace)
    }

    /// Keys of every stored record, ascending.
    ///
    /// # Errors
    /// Returns [`StorageError::Corrupt`] if a key is not a UID.
    pub fn ids(&self) -> Result<Vec<ItemId>, StorageError> {
        self.store
            .keys(&self.namespace)?
            .into_iter()
            .map(|key| {
                key.parse().map_err(|e| StorageError::Corrupt {
                    message: format!("key is not a UID: {e}"),
                    key,
                })
            })
            .collect()
    }
}

/// Experiment and platform services sharing one store.
///
/// Passed explicitly to whatever needs cross-call lookups.
#[derive(Debug, Clone)]
pub struct PersistenceContext {
    experiments: PersistService<Experiment>,
    platforms: PersistService<PlatformSpec>,
}

impl Default for PersistenceContext {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PersistenceContext {
    #[must_use]
    pub fn new(store: Arc<dyn PersistStore>) -> Self {
        Self {
            experiments: PersistService::new(Arc::clone(&store), EXPERIMENTS_NAMESPACE),
            platforms: PersistService::new(store, PLATFORMS_NAMESPACE),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    #[must_use]
    pub const fn experiments(&self) -> &PersistService<Experiment> {
        &self.experiments
    }

    #[must_use]
    pub const fn platforms(&self) -> &PersistService<PlatformSpec> {
        &self.platforms
    }

    /// Empties both services.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.experiments.clear()?;
        self.platforms.clear()
    }
}

/// Looks up an experiment locally, falling back to `platform`.
///
/// On a local miss the platform is queried; a platform hit records the
/// platform and stores the experiment. Either way, when `with_simulations`
/// is set and a platform is given, the platform's simulations are
/// reattached. Simulations are never stored locally.
///
/// # Errors
/// - [`LookupError::ExperimentNotFound`] on a local miss with no platform,
///   or when the platform does not know `id` either
/// - storage and platform failures
pub fn retrieve_experiment(
    ctx: &PersistenceContext,
    id: ItemId,
    platform: Option<&dyn Platform>,
    with_simulations: bool,
) -> IdmResult<Experiment> {
    if let Some(mut experiment) = ctx.experiments.retrieve(id)? {
        log::debug!("experiment {id} found in local store");
        if let (true, Some(platform)) = (with_simulations, platform) {
            restore_simulations(platform, id, &mut experiment)?;
        }
        return Ok(experiment);
    }

    let Some(platform) = platform else {
        return Err(LookupError::ExperimentNotFound { id, platform: None }.into());
    };

    let spec = platform.spec();
    let Some(mut experiment) = platform
        .get_item(id, ItemType::Experiment)?
        .and_then(Item::into_experiment)
    else {
        return Err(LookupError::ExperimentNotFound {
            id,
            platform: Some(spec.to_string()),
        }
        .into());
    };

    experiment.set_uid(id);
    let platform_id = ctx.platforms.save(&spec)?;
    experiment.set_platform_id(Some(platform_id));
    ctx.experiments.save(&experiment)?;
    log::info!("populated local store with experiment {id} from platform '{spec}'");

    if with_simulations {
        restore_simulations(platform, id, &mut experiment)?;
    }
    Ok(experiment)
}

fn restore_simulations(
    platform: &dyn Platform,
    id: ItemId,
    experiment: &mut Experiment,
) -> IdmResult<()> {
    let simulations: Vec<Simulation> = platform
        .get_children(id, ItemType::Experiment)?
        .into_iter()
        .filter_map(Item::into_simulation)
        .collect();
    log::debug!("restored {} simulations of experiment {id}", simulations.len());
    experiment.replace_simulations(simulations);
    Ok(())
}
