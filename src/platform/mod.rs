//! Platform operations contract.
//!
//! A platform is an execution backend: it registers items, runs them,
//! reports their status in its own vocabulary and knows where their output
//! lives. Backends are chosen at runtime from a [`PlatformSpec`] through a
//! [`PlatformFactory`].

mod memory;
mod status;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::asset::AssetCollection;
use crate::entity::{Entity, EntityStatus, ItemId, ItemType};
use crate::error::{IdmResult, ValidationError};
use crate::experiment::Experiment;
use crate::simulation::Simulation;
use crate::suite::Suite;

pub use memory::InMemoryPlatform;
pub use status::StatusMap;

/// Errors reported by a platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The backend cannot handle this kind of item for this operation.
    #[error("Platform {platform} does not support {item_type} items here")]
    UnsupportedItemType {
        platform: String,
        item_type: ItemType,
    },

    /// An operation referenced an item the backend does not know.
    #[error("Object {item_type} {id} not found on platform {platform}")]
    ItemNotFound {
        platform: String,
        item_type: ItemType,
        id: ItemId,
    },

    /// No constructor registered for the requested kind.
    #[error("Unknown platform kind '{0}'")]
    UnknownKind(String),

    #[error("Invalid platform options: {0}")]
    InvalidOptions(String),

    /// An item could not be identified or validated.
    #[error("Invalid item: {0}")]
    InvalidItem(#[from] ValidationError),

    #[error("Platform backend error: {0}")]
    BackendError(String),
}

/// Serializable description of a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSpec {
    pub kind: String,
    #[serde(default)]
    pub options: Value,
}

impl PlatformSpec {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Value::Null,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// String option, if present.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for PlatformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Any item a platform stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Suite(Suite),
    Experiment(Experiment),
    Simulation(Simulation),
    AssetCollection(AssetCollection),
}

impl Item {
    #[must_use]
    pub const fn item_type(&self) -> ItemType {
        match self {
            Self::Suite(_) => ItemType::Suite,
            Self::Experiment(_) => ItemType::Experiment,
            Self::Simulation(_) => ItemType::Simulation,
            Self::AssetCollection(_) => ItemType::AssetCollection,
        }
    }

    /// # Errors
    /// Returns [`ValidationError::Serialization`] if hashing fails.
    pub fn uid(&self) -> Result<ItemId, ValidationError> {
        match self {
            Self::Suite(item) => item.uid(),
            Self::Experiment(item) => item.uid(),
            Self::Simulation(item) => item.uid(),
            Self::AssetCollection(item) => item.uid(),
        }
    }

    /// Explicitly assigned UID, if any.
    #[must_use]
    pub fn explicit_uid(&self) -> Option<ItemId> {
        match self {
            Self::Suite(item) => item.meta().uid,
            Self::Experiment(item) => item.meta().uid,
            Self::Simulation(item) => item.meta().uid,
            Self::AssetCollection(item) => item.meta().uid,
        }
    }

    pub fn set_uid(&mut self, uid: ItemId) {
        match self {
            Self::Suite(item) => item.set_uid(uid),
            Self::Experiment(item) => item.set_uid(uid),
            Self::Simulation(item) => item.set_uid(uid),
            Self::AssetCollection(item) => item.set_uid(uid),
        }
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<ItemId> {
        match self {
            Self::Suite(item) => item.parent_id(),
            Self::Experiment(item) => item.parent_id(),
            Self::Simulation(item) => item.parent_id(),
            Self::AssetCollection(item) => item.parent_id(),
        }
    }

    pub fn set_platform_id(&mut self, platform_id: Option<ItemId>) {
        match self {
            Self::Suite(item) => item.set_platform_id(platform_id),
            Self::Experiment(item) => item.set_platform_id(platform_id),
            Self::Simulation(item) => item.set_platform_id(platform_id),
            Self::AssetCollection(item) => item.set_platform_id(platform_id),
        }
    }

    #[must_use]
    pub fn into_experiment(self) -> Option<Experiment> {
        match self {
            Self::Experiment(experiment) => Some(experiment),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_simulation(self) -> Option<Simulation> {
        match self {
            Self::Simulation(simulation) => Some(simulation),
            _ => None,
        }
    }
}

/// Operations every execution backend implements.
pub trait Platform: Send + Sync {
    /// Description this platform was built from.
    fn spec(&self) -> PlatformSpec;

    /// Registers items and returns their backend identifiers, in order.
    ///
    /// # Errors
    /// Returns [`PlatformError`] if any item cannot be registered.
    fn create_items(&self, items: &[Item]) -> Result<Vec<ItemId>, PlatformError>;

    /// Starts execution of a created item.
    ///
    /// # Errors
    /// Returns [`PlatformError::ItemNotFound`] for an unknown item.
    fn run_item(&self, id: ItemId, item_type: ItemType) -> Result<(), PlatformError>;

    /// Fetches a created item. `Ok(None)` when the backend does not know it.
    ///
    /// # Errors
    /// Returns [`PlatformError`] on backend failure.
    fn get_item(&self, id: ItemId, item_type: ItemType) -> Result<Option<Item>, PlatformError>;

    /// Direct children: experiments of a suite, simulations of an experiment.
    ///
    /// # Errors
    /// Returns [`PlatformError::UnsupportedItemType`] for childless kinds.
    fn get_children(&self, id: ItemId, item_type: ItemType) -> Result<Vec<Item>, PlatformError>;

    /// Working directory of an item.
    ///
    /// # Errors
    /// Returns [`PlatformError`] if the item is unknown or has no directory.
    fn get_directory(&self, id: ItemId, item_type: ItemType) -> Result<PathBuf, PlatformError>;

    /// Native status of an item, `Ok(None)` if it has none yet.
    ///
    /// # Errors
    /// Returns [`PlatformError`] on backend failure.
    fn native_status(&self, id: ItemId, item_type: ItemType) -> Result<Option<String>, PlatformError>;

    /// Vocabulary used to translate native statuses.
    fn status_map(&self) -> &StatusMap;

    /// Canonical status of an item.
    ///
    /// # Errors
    /// Same as [`Platform::native_status`].
    fn get_status(&self, id: ItemId, item_type: ItemType) -> Result<Option<EntityStatus>, PlatformError> {
        Ok(self
            .native_status(id, item_type)?
            .map(|native| self.status_map().map(&native)))
    }

    /// Updates the status of every simulation of `experiment`.
    ///
    /// # Errors
    /// Returns [`PlatformError`] if a status cannot be fetched.
    fn refresh_status(&self, experiment: &mut Experiment) -> Result<(), PlatformError> {
        for simulation in experiment.simulations_mut() {
            let id = simulation.uid()?;
            if let Some(status) = self.get_status(id, ItemType::Simulation)? {
                simulation.set_status(status);
            }
        }
        Ok(())
    }
}

type Constructor = Box<dyn Fn(&PlatformSpec) -> Result<Arc<dyn Platform>, PlatformError> + Send + Sync>;

/// Builds platforms from specs by kind.
pub struct PlatformFactory {
    constructors: HashMap<String, Constructor>,
}

impl PlatformFactory {
    /// Empty factory.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&PlatformSpec) -> Result<Arc<dyn Platform>, PlatformError> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    /// # Errors
    /// Returns [`PlatformError::UnknownKind`] if no constructor is registered,
    /// or whatever the constructor reports.
    pub fn create(&self, spec: &PlatformSpec) -> Result<Arc<dyn Platform>, PlatformError> {
        let constructor = self
            .constructors
            .get(&spec.kind)
            .ok_or_else(|| PlatformError::UnknownKind(spec.kind.clone()))?;
        log::debug!("creating platform of kind '{}'", spec.kind);
        constructor(spec)
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for PlatformFactory {
    /// Factory knowing the built-in `memory` backend.
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(InMemoryPlatform::KIND, |spec| {
            Ok(Arc::new(InMemoryPlatform::from_spec(spec)?) as Arc<dyn Platform>)
        });
        factory
    }
}

impl fmt::Debug for PlatformFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Creates and runs an experiment on `platform`.
///
/// Expands the builders if the experiment has no simulations yet, runs the
/// pre-creation hooks, registers the experiment and then its simulations,
/// starts the experiment and finally freezes everything. Returns the
/// experiment's backend id.
///
/// # Errors
/// Propagates builder, validation and platform errors. The experiment is
/// only frozen once the platform accepted it.
pub fn commission(platform: &dyn Platform, experiment: &mut Experiment) -> IdmResult<ItemId> {
    if experiment.simulation_count() == 0 {
        experiment.execute_builder()?;
    }
    experiment.pin_uid()?;
    experiment.pre_creation()?;
    for simulation in experiment.simulations_mut() {
        simulation.pre_creation()?;
    }

    let mut snapshot = experiment.clone();
    snapshot.replace_simulations(Vec::new());
    let experiment_id = first_id(platform, platform.create_items(&[Item::Experiment(snapshot)])?)?;
    experiment.set_uid(experiment_id);

    let mut items = Vec::with_capacity(experiment.simulation_count());
    for simulation in experiment.simulations_mut() {
        simulation.set_experiment_id(Some(experiment_id));
        items.push(Item::Simulation(simulation.clone()));
    }
    let ids = platform.create_items(&items)?;
    if ids.len() != items.len() {
        return Err(PlatformError::BackendError(format!(
            "expected {} simulation ids, got {}",
            items.len(),
            ids.len()
        ))
        .into());
    }
    for (simulation, id) in experiment.simulations_mut().iter_mut().zip(ids) {
        simulation.set_uid(id);
    }

    platform.run_item(experiment_id, ItemType::Experiment)?;

    experiment.post_creation();
    for simulation in experiment.simulations_mut() {
        simulation.post_creation();
    }
    log::info!(
        "commissioned experiment '{}' ({experiment_id}) with {} simulations on {}",
        experiment.name(),
        experiment.simulation_count(),
        platform.spec()
    );
    Ok(experiment_id)
}

fn first_id(platform: &dyn Platform, ids: Vec<ItemId>) -> Result<ItemId, PlatformError> {
    ids.into_iter().next().ok_or_else(|| {
        PlatformError::BackendError(format!("platform {} returned no id", platform.spec()))
    })
}
