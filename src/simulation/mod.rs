//! Simulations: one concrete run of a task.
//!
//! A simulation owns its task by value. Experiments produce simulations by
//! cloning a template, so a clone never shares mutable state with the
//! template or with its siblings. Once a platform has created the
//! simulation it is frozen: the task and transient assets are fixed, tags
//! may still change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::{Asset, AssetCollection};
use crate::entity::{impl_content_eq, Entity, EntityMeta, EntityStatus, ItemId, ItemType, Tags};
use crate::error::ValidationError;
use crate::task::{Task, TaskOps};

/// Tag recording which kind of task a simulation runs.
pub const TASK_TYPE_TAG: &str = "task_type";

/// One concrete run: a task plus tags plus per-simulation assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Simulation {
    #[serde(default)]
    meta: EntityMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    task: Task,

    /// Per-simulation assets. Rebuilt from the task on pre-creation.
    #[serde(skip)]
    transient_assets: AssetCollection,

    /// Assets attached by hand; survive a rebuild of `transient_assets`.
    #[serde(skip)]
    attached_assets: AssetCollection,

    #[serde(default)]
    frozen: bool,
}

impl_content_eq!(Simulation);

impl Entity for Simulation {
    const ITEM_TYPE: ItemType = ItemType::Simulation;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl Simulation {
    /// Creates a simulation running `task`.
    #[must_use]
    pub fn from_task(task: impl Into<Task>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.update_tags(tags);
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Mutable access to the task.
    ///
    /// # Errors
    /// Returns [`ValidationError::Frozen`] once the simulation was created on
    /// a platform.
    pub fn task_mut(&mut self) -> Result<&mut Task, ValidationError> {
        self.ensure_mutable()?;
        Ok(&mut self.task)
    }

    /// Sets a task parameter and returns the tags the task reports for it.
    ///
    /// # Errors
    /// Returns [`ValidationError::Frozen`] once frozen.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<Tags, ValidationError> {
        Ok(self.task_mut()?.set_parameter(name, value))
    }

    /// Owning experiment, if any. Lookup only.
    #[must_use]
    pub fn experiment_id(&self) -> Option<ItemId> {
        self.meta.parent_id
    }

    pub(crate) fn set_experiment_id(&mut self, experiment_id: Option<ItemId>) {
        self.meta.parent_id = experiment_id;
    }

    #[must_use]
    pub const fn transient_assets(&self) -> &AssetCollection {
        &self.transient_assets
    }

    /// Adds a per-simulation asset.
    ///
    /// # Errors
    /// - [`ValidationError::Frozen`] once frozen
    /// - [`ValidationError::DuplicateAsset`] on a repeated key
    pub fn add_transient_asset(&mut self, asset: Asset) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        if self.transient_assets.contains(asset.relative_path(), asset.filename()) {
            return Err(ValidationError::DuplicateAsset {
                relative_path: asset.relative_path().to_string(),
                filename: asset.filename().to_string(),
            });
        }
        self.attached_assets.add_asset(asset.clone(), true)?;
        self.transient_assets.add_asset(asset, true).map(|_| ())
    }

    /// Records the task type and rebuilds the transient assets from the
    /// attached ones plus whatever the task gathers.
    ///
    /// Running it again after a failed submission yields the same assets.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if the simulation is frozen or the task's
    /// assets clash with ones attached by hand. On error the current
    /// assets are left untouched.
    pub fn pre_creation(&mut self) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        let mut assets = self.attached_assets.clone();
        assets.add_assets(self.task.gather_transient_assets()?, true)?;
        self.transient_assets = assets;
        let task_type = self.task.type_name();
        self.update_tags(Tags::from([(TASK_TYPE_TAG.to_string(), Value::from(task_type))]));
        Ok(())
    }

    /// Marks the simulation as created and freezes it.
    pub fn post_creation(&mut self) {
        self.meta.status = Some(EntityStatus::Created);
        self.transient_assets.lock();
        self.frozen = true;
    }

    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub const fn status(&self) -> Option<EntityStatus> {
        self.meta.status
    }

    /// Records the status reported by a platform.
    pub fn set_status(&mut self, status: EntityStatus) {
        self.meta.status = Some(status);
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.status().is_some_and(EntityStatus::is_done)
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status() == Some(EntityStatus::Succeeded)
    }

    /// Fresh, unfrozen copy for expansion: same task and tags, no identity
    /// or status.
    pub(crate) fn template_clone(&self, experiment_id: ItemId) -> Self {
        let mut clone = self.clone();
        clone.meta.uid = None;
        clone.meta.platform_id = None;
        clone.meta.status = None;
        clone.meta.parent_id = Some(experiment_id);
        clone.transient_assets = self.transient_assets.union(&AssetCollection::new());
        clone.attached_assets = self.attached_assets.union(&AssetCollection::new());
        clone.frozen = false;
        clone
    }

    fn ensure_mutable(&self) -> Result<(), ValidationError> {
        if self.frozen {
            return Err(ValidationError::Frozen {
                item_type: ItemType::Simulation,
            });
        }
        Ok(())
    }
}
