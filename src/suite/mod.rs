//! Suites group experiments.

use serde::{Deserialize, Serialize};

use crate::entity::{impl_content_eq, Entity, EntityMeta, ItemId, ItemType, Tags};
use crate::error::ValidationError;
use crate::experiment::Experiment;

/// Named, ordered group of experiments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    meta: EntityMeta,

    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(skip)]
    experiments: Vec<Experiment>,
}

impl_content_eq!(Suite);

impl Entity for Suite {
    const ITEM_TYPE: ItemType = ItemType::Suite;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl Suite {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.update_tags(tags);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Adds an experiment and points its suite back-reference here. Returns
    /// the experiment's UID.
    ///
    /// # Errors
    /// - [`ValidationError::DuplicateChild`] if an experiment with the same
    ///   UID is already in the suite
    /// - [`ValidationError::Serialization`] if either item cannot be hashed
    pub fn add_experiment(&mut self, mut experiment: Experiment) -> Result<ItemId, ValidationError> {
        let suite_id = self.uid()?;
        self.set_uid(suite_id);

        if !experiment.has_explicit_uid() {
            experiment.set_suite_id(Some(suite_id));
        }
        let experiment_id = experiment.pin_uid()?;
        for known in &self.experiments {
            if known.uid()? == experiment_id {
                return Err(ValidationError::DuplicateChild {
                    item_type: ItemType::Experiment,
                    id: experiment_id,
                });
            }
        }
        experiment.set_suite_id(Some(suite_id));

        log::info!("added experiment '{}' to suite '{}'", experiment.name(), self.name);
        self.experiments.push(experiment);
        Ok(experiment_id)
    }

    #[must_use]
    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn experiments_mut(&mut self) -> &mut [Experiment] {
        &mut self.experiments
    }

    /// Experiment with the given UID.
    #[must_use]
    pub fn experiment(&self, id: ItemId) -> Option<&Experiment> {
        self.experiments
            .iter()
            .find(|experiment| experiment.uid().is_ok_and(|uid| uid == id))
    }
}
