//! In-memory platform.
//!
//! Reference backend for tests and embedded use. Items live in maps guarded
//! by `RwLock`s; nothing is executed. Statuses use the batch-scheduler
//! vocabulary and are advanced by the caller through
//! [`InMemoryPlatform::set_native_status`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::entity::{ItemId, ItemType};

use super::{Item, Platform, PlatformError, PlatformSpec, StatusMap};

fn lock_err(context: &'static str) -> PlatformError {
    PlatformError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory backend.
#[derive(Debug)]
pub struct InMemoryPlatform {
    spec: PlatformSpec,
    root: PathBuf,
    status_map: StatusMap,
    items: RwLock<HashMap<(ItemType, ItemId), Item>>,
    statuses: RwLock<HashMap<ItemId, String>>,
}

impl InMemoryPlatform {
    /// Kind name registered in the default factory.
    pub const KIND: &'static str = "memory";

    /// Native status of newly created items.
    pub const CREATED: &'static str = "PENDING";

    /// Native status after [`Platform::run_item`].
    pub const RUNNING: &'static str = "RUNNING";

    /// Creates a platform rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            spec: PlatformSpec::new(Self::KIND)
                .with_options(serde_json::json!({ "root": root.display().to_string() })),
            root,
            status_map: StatusMap::slurm(),
            items: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a platform from a spec. The optional `root` option sets the
    /// directory root.
    ///
    /// # Errors
    /// Returns [`PlatformError::InvalidOptions`] if `root` is present but
    /// not a string.
    pub fn from_spec(spec: &PlatformSpec) -> Result<Self, PlatformError> {
        let root = match spec.options.get("root") {
            None => PathBuf::from(Self::KIND),
            Some(value) => value
                .as_str()
                .map(PathBuf::from)
                .ok_or_else(|| PlatformError::InvalidOptions("'root' must be a string".to_string()))?,
        };
        Ok(Self {
            spec: spec.clone(),
            root,
            status_map: StatusMap::slurm(),
            items: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
        })
    }

    /// Replaces the status vocabulary.
    #[must_use]
    pub fn with_status_map(mut self, status_map: StatusMap) -> Self {
        self.status_map = status_map;
        self
    }

    /// Sets the native status of an item, e.g. to simulate completion.
    ///
    /// # Errors
    /// Returns [`PlatformError::BackendError`] if the status lock is poisoned.
    pub fn set_native_status(&self, id: ItemId, status: impl Into<String>) -> Result<(), PlatformError> {
        let mut statuses = self.statuses.write().map_err(|_| lock_err("statuses write"))?;
        statuses.insert(id, status.into());
        Ok(())
    }

    /// Number of stored items.
    ///
    /// # Errors
    /// Returns [`PlatformError::BackendError`] if the item lock is poisoned.
    pub fn len(&self) -> Result<usize, PlatformError> {
        Ok(self.items.read().map_err(|_| lock_err("items read"))?.len())
    }

    /// # Errors
    /// Returns [`PlatformError::BackendError`] if the item lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, PlatformError> {
        Ok(self.len()? == 0)
    }

    fn not_found(&self, id: ItemId, item_type: ItemType) -> PlatformError {
        PlatformError::ItemNotFound {
            platform: self.spec.kind.clone(),
            item_type,
            id,
        }
    }

    fn unsupported(&self, item_type: ItemType) -> PlatformError {
        PlatformError::UnsupportedItemType {
            platform: self.spec.kind.clone(),
            item_type,
        }
    }

    fn parent_of(&self, id: ItemId, item_type: ItemType) -> Result<Option<ItemId>, PlatformError> {
        let items = self.items.read().map_err(|_| lock_err("items read"))?;
        items
            .get(&(item_type, id))
            .map(Item::parent_id)
            .ok_or_else(|| self.not_found(id, item_type))
    }
}

impl Platform for InMemoryPlatform {
    fn spec(&self) -> PlatformSpec {
        self.spec.clone()
    }

    fn create_items(&self, items: &[Item]) -> Result<Vec<ItemId>, PlatformError> {
        let mut store = self.items.write().map_err(|_| lock_err("items write"))?;
        let mut statuses = self.statuses.write().map_err(|_| lock_err("statuses write"))?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = item.explicit_uid().unwrap_or_else(ItemId::new);
            let mut stored = item.clone();
            stored.set_uid(id);
            let item_type = stored.item_type();
            match &mut stored {
                Item::Experiment(experiment) => experiment.post_creation(),
                Item::Simulation(simulation) => simulation.post_creation(),
                Item::Suite(_) | Item::AssetCollection(_) => {}
            }
            if item_type == ItemType::Simulation {
                statuses.insert(id, Self::CREATED.to_string());
            }
            log::debug!("stored {item_type} {id} on platform {}", self.spec.kind);
            store.insert((item_type, id), stored);
            ids.push(id);
        }
        Ok(ids)
    }

    fn run_item(&self, id: ItemId, item_type: ItemType) -> Result<(), PlatformError> {
        let store = self.items.read().map_err(|_| lock_err("items read"))?;
        if !store.contains_key(&(item_type, id)) {
            return Err(self.not_found(id, item_type));
        }
        let targets: Vec<ItemId> = match item_type {
            ItemType::Simulation => vec![id],
            ItemType::Experiment => store
                .iter()
                .filter(|((kind, _), item)| {
                    *kind == ItemType::Simulation && item.parent_id() == Some(id)
                })
                .map(|((_, sim_id), _)| *sim_id)
                .collect(),
            ItemType::Suite | ItemType::AssetCollection => return Err(self.unsupported(item_type)),
        };
        drop(store);

        let mut statuses = self.statuses.write().map_err(|_| lock_err("statuses write"))?;
        for target in targets {
            statuses.insert(target, Self::RUNNING.to_string());
        }
        Ok(())
    }

    fn get_item(&self, id: ItemId, item_type: ItemType) -> Result<Option<Item>, PlatformError> {
        let item = {
            let store = self.items.read().map_err(|_| lock_err("items read"))?;
            store.get(&(item_type, id)).cloned()
        };
        let Some(mut item) = item else {
            return Ok(None);
        };
        if let Item::Simulation(simulation) = &mut item {
            if let Some(status) = self.get_status(id, item_type)? {
                simulation.set_status(status);
            }
        }
        Ok(Some(item))
    }

    fn get_children(&self, id: ItemId, item_type: ItemType) -> Result<Vec<Item>, PlatformError> {
        let child_type = match item_type {
            ItemType::Suite => ItemType::Experiment,
            ItemType::Experiment => ItemType::Simulation,
            ItemType::Simulation | ItemType::AssetCollection => {
                return Err(self.unsupported(item_type))
            }
        };
        let mut child_ids: Vec<ItemId> = {
            let store = self.items.read().map_err(|_| lock_err("items read"))?;
            if !store.contains_key(&(item_type, id)) {
                return Err(self.not_found(id, item_type));
            }
            store
                .iter()
                .filter(|((kind, _), item)| *kind == child_type && item.parent_id() == Some(id))
                .map(|((_, child_id), _)| *child_id)
                .collect()
        };
        child_ids.sort_unstable();

        let mut children = Vec::with_capacity(child_ids.len());
        for child_id in child_ids {
            if let Some(child) = self.get_item(child_id, child_type)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    fn get_directory(&self, id: ItemId, item_type: ItemType) -> Result<PathBuf, PlatformError> {
        let mut segments = vec![id];
        match item_type {
            ItemType::Suite => {
                self.parent_of(id, item_type)?;
            }
            ItemType::Experiment => {
                if let Some(suite_id) = self.parent_of(id, item_type)? {
                    segments.push(suite_id);
                }
            }
            ItemType::Simulation => {
                let experiment_id = self
                    .parent_of(id, item_type)?
                    .ok_or_else(|| self.not_found(id, item_type))?;
                segments.push(experiment_id);
                if let Some(suite_id) = self.parent_of(experiment_id, ItemType::Experiment)? {
                    segments.push(suite_id);
                }
            }
            ItemType::AssetCollection => return Err(self.unsupported(item_type)),
        }

        let mut directory = self.root.clone();
        for segment in segments.iter().rev() {
            directory.push(segment.to_string());
        }
        Ok(directory)
    }

    fn native_status(&self, id: ItemId, _item_type: ItemType) -> Result<Option<String>, PlatformError> {
        let statuses = self.statuses.read().map_err(|_| lock_err("statuses read"))?;
        Ok(statuses.get(&id).cloned())
    }

    fn status_map(&self) -> &StatusMap {
        &self.status_map
    }
}
