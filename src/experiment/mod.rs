//! Experiments: a template simulation, builders, and the simulations they
//! expand into.
//!
//! Every simulation an experiment holds is a deep copy of the template taken
//! when it was generated; later changes to the template never reach
//! simulations that already exist.
//!
//! Expansion is all-or-nothing and always starts from an empty list, so
//! running the builders twice yields the same simulations rather than
//! doubling them.

use std::slice::Chunks;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::AssetCollection;
use crate::builder::SimulationBuilder;
use crate::entity::{
    impl_content_eq, tags_match, Entity, EntityMeta, EntityStatus, ItemId, ItemType, Tags,
};
use crate::error::{BuildError, IdmResult, ValidationError};
use crate::simulation::{Simulation, TASK_TYPE_TAG};
use crate::task::{Task, TaskOps};

/// A parameterized set of simulations.
///
/// Simulations and builders are runtime state: they are neither persisted
/// nor part of the content hash.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use idmtools::{set_parameter_sweep, CommandTask, Experiment, ExperimentBuilder};
///
/// let mut builder = ExperimentBuilder::new();
/// builder.add_sweep_definition(set_parameter_sweep("beta"), [0.1, 0.2, 0.3]);
///
/// let mut experiment = Experiment::from_builder(
///     "sir",
///     Arc::new(builder),
///     CommandTask::from_command("model.exe").unwrap(),
/// );
/// assert_eq!(experiment.execute_builder().unwrap(), 3);
/// assert_eq!(experiment.simulation_count(), 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default)]
    meta: EntityMeta,

    name: String,

    #[serde(default)]
    base_simulation: Simulation,

    /// Shared by every simulation.
    #[serde(default)]
    assets: AssetCollection,

    #[serde(skip)]
    simulations: Vec<Simulation>,

    #[serde(skip)]
    builders: Vec<Arc<dyn SimulationBuilder>>,

    #[serde(default)]
    frozen: bool,
}

impl_content_eq!(Experiment);

impl Entity for Experiment {
    const ITEM_TYPE: ItemType = ItemType::Experiment;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl Experiment {
    /// Creates an empty experiment with a default task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates an experiment whose template runs `task`.
    #[must_use]
    pub fn from_task(name: impl Into<String>, task: impl Into<Task>) -> Self {
        Self {
            name: name.into(),
            base_simulation: Simulation::from_task(task),
            ..Self::default()
        }
    }

    /// Creates an experiment with a template task and one builder.
    #[must_use]
    pub fn from_builder(
        name: impl Into<String>,
        builder: Arc<dyn SimulationBuilder>,
        task: impl Into<Task>,
    ) -> Self {
        let mut experiment = Self::from_task(name, task);
        experiment.builders.push(builder);
        experiment
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
    pub const fn base_simulation(&self) -> &Simulation {
        &self.base_simulation
    }

    /// Mutable access to the template.
    ///
    /// # Errors
    /// Returns [`ValidationError::Frozen`] after submission.
    pub fn base_simulation_mut(&mut self) -> Result<&mut Simulation, ValidationError> {
        self.ensure_mutable()?;
        Ok(&mut self.base_simulation)
    }

    /// Task of the template simulation.
    #[must_use]
    pub const fn base_task(&self) -> &Task {
        self.base_simulation.task()
    }

    #[must_use]
    pub const fn assets(&self) -> &AssetCollection {
        &self.assets
    }

    /// # Errors
    /// Returns [`ValidationError::Frozen`] after submission.
    pub fn assets_mut(&mut self) -> Result<&mut AssetCollection, ValidationError> {
        self.ensure_mutable()?;
        Ok(&mut self.assets)
    }

    /// Suite this experiment belongs to. Lookup only.
    #[must_use]
    pub fn suite_id(&self) -> Option<ItemId> {
        self.meta.parent_id
    }

    pub(crate) fn set_suite_id(&mut self, suite_id: Option<ItemId>) {
        self.meta.parent_id = suite_id;
    }

    /// Fixes the current content UID so children keep a valid back-reference.
    ///
    /// # Errors
    /// Returns [`ValidationError::Serialization`] if hashing fails.
    pub fn pin_uid(&mut self) -> Result<ItemId, ValidationError> {
        let uid = self.uid()?;
        self.set_uid(uid);
        Ok(uid)
    }

    /// Registers a builder. Registering the same builder twice is ignored.
    pub fn add_builder(&mut self, builder: Arc<dyn SimulationBuilder>) {
        if self.builders.iter().any(|known| Arc::ptr_eq(known, &builder)) {
            log::warn!("builder already registered on experiment '{}'", self.name);
            return;
        }
        log::debug!(
            "registered builder with {} combinations on experiment '{}'",
            builder.count(),
            self.name
        );
        self.builders.push(builder);
    }

    /// Replaces every registered builder with `builder`.
    pub fn set_builder(&mut self, builder: Arc<dyn SimulationBuilder>) {
        self.builders.clear();
        self.builders.push(builder);
    }

    #[must_use]
    pub fn builders(&self) -> &[Arc<dyn SimulationBuilder>] {
        &self.builders
    }

    /// Clones the template, links it to this experiment, appends it and
    /// returns it for further changes.
    ///
    /// # Errors
    /// - [`ValidationError::Frozen`] after submission
    /// - [`ValidationError::Serialization`] if the experiment cannot be hashed
    pub fn simulation(&mut self) -> Result<&mut Simulation, ValidationError> {
        self.ensure_mutable()?;
        let experiment_id = self.pin_uid()?;
        let index = self.simulations.len();
        self.simulations
            .push(self.base_simulation.template_clone(experiment_id));
        Ok(&mut self.simulations[index])
    }

    /// Appends an externally built simulation and links it to this experiment.
    ///
    /// # Errors
    /// Same as [`Experiment::simulation`].
    pub fn add_simulation(&mut self, mut simulation: Simulation) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        let experiment_id = self.pin_uid()?;
        simulation.set_experiment_id(Some(experiment_id));
        self.simulations.push(simulation);
        Ok(())
    }

    /// Expands every registered builder into simulations, replacing the
    /// current list. Returns the number of simulations generated.
    ///
    /// Without builders this is a no-op. On error the current list is left
    /// untouched.
    ///
    /// # Errors
    /// - [`BuildError::SweepFailed`] if a sweep function fails
    /// - [`BuildError::MalformedRecord`] for a bad external record
    /// - [`ValidationError`] if the experiment is frozen or cannot be hashed
    pub fn execute_builder(&mut self) -> IdmResult<usize> {
        if self.builders.is_empty() {
            return Ok(0);
        }
        self.ensure_mutable()?;
        let experiment_id = self.pin_uid()?;

        let mut generated = Vec::new();
        for builder in &self.builders {
            for combination in builder.combinations()? {
                let index = generated.len();
                let mut simulation = self.base_simulation.template_clone(experiment_id);
                let tags = combination.apply(&mut simulation).map_err(|err| {
                    BuildError::SweepFailed {
                        combination: index,
                        message: err.to_string(),
                    }
                })?;
                simulation.update_tags(tags);
                log::debug!("expanded combination {index} of experiment '{}'", self.name);
                generated.push(simulation);
            }
        }

        log::info!(
            "experiment '{}' expanded into {} simulations",
            self.name,
            generated.len()
        );
        self.simulations = generated;
        Ok(self.simulations.len())
    }

    #[must_use]
    pub fn simulations(&self) -> &[Simulation] {
        &self.simulations
    }

    /// Mutable view of the simulations, e.g. for status updates. The list
    /// itself cannot grow or shrink through it.
    pub fn simulations_mut(&mut self) -> &mut [Simulation] {
        &mut self.simulations
    }

    #[must_use]
    pub fn simulation_count(&self) -> usize {
        self.simulations.len()
    }

    /// Drops every simulation.
    ///
    /// # Errors
    /// Returns [`ValidationError::Frozen`] after submission.
    pub fn clear_simulations(&mut self) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        self.simulations.clear();
        Ok(())
    }

    /// Restores simulations fetched from a platform.
    pub(crate) fn replace_simulations(&mut self, simulations: Vec<Simulation>) {
        self.simulations = simulations;
    }

    /// UIDs of the simulations whose tags contain every pair in `tags`.
    ///
    /// # Errors
    /// Returns [`ValidationError::Serialization`] if a simulation cannot be
    /// hashed.
    pub fn simulations_with_tags(&self, tags: &Tags) -> Result<Vec<ItemId>, ValidationError> {
        self.simulation_entities_with_tags(tags)
            .into_iter()
            .map(Entity::uid)
            .collect()
    }

    /// Same filter as [`Experiment::simulations_with_tags`], returning the
    /// simulations themselves.
    #[must_use]
    pub fn simulation_entities_with_tags(&self, tags: &Tags) -> Vec<&Simulation> {
        self.simulations
            .iter()
            .filter(|simulation| tags_match(simulation.tags(), tags))
            .collect()
    }

    /// Splits the simulations into submission batches of at most `size`.
    ///
    /// # Errors
    /// Returns [`ValidationError::ZeroBatchSize`] when `size` is zero.
    pub fn simulation_batches(&self, size: usize) -> Result<Chunks<'_, Simulation>, ValidationError> {
        if size == 0 {
            return Err(ValidationError::ZeroBatchSize);
        }
        Ok(self.simulations.chunks(size))
    }

    /// Experiment assets plus the template task's common assets. Experiment
    /// assets win on a clash.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if the task cannot gather its assets.
    pub fn gather_all_assets(&self) -> Result<AssetCollection, ValidationError> {
        let common = self.base_task().gather_common_assets()?;
        Ok(self.assets.union(&common))
    }

    /// Prepares the experiment for creation: gathers the common assets and
    /// records the task type.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if frozen or assets cannot be gathered.
    pub fn pre_creation(&mut self) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        self.assets = self.gather_all_assets()?;
        let task_type = self.base_task().type_name();
        self.update_tags(Tags::from([(TASK_TYPE_TAG.to_string(), Value::from(task_type))]));
        Ok(())
    }

    /// Freezes the experiment after a platform created it.
    pub fn post_creation(&mut self) {
        self.assets.lock();
        self.frozen = true;
    }

    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Status derived from the simulations.
    ///
    /// `None` until some simulation has a status. Otherwise any failure makes
    /// the experiment failed, all successes make it succeeded, any running
    /// simulation makes it running, and anything else is created.
    #[must_use]
    pub fn status(&self) -> Option<EntityStatus> {
        let statuses: Vec<EntityStatus> = self
            .simulations
            .iter()
            .filter_map(Simulation::status)
            .collect();
        if statuses.is_empty() {
            return None;
        }
        if statuses.contains(&EntityStatus::Failed) {
            Some(EntityStatus::Failed)
        } else if statuses.len() == self.simulations.len()
            && statuses.iter().all(|s| *s == EntityStatus::Succeeded)
        {
            Some(EntityStatus::Succeeded)
        } else if statuses.contains(&EntityStatus::Running) {
            Some(EntityStatus::Running)
        } else {
            Some(EntityStatus::Created)
        }
    }

    /// True when there are simulations and all of them finished.
    #[must_use]
    pub fn done(&self) -> bool {
        !self.simulations.is_empty() && self.simulations.iter().all(Simulation::done)
    }

    /// True when there are simulations and all of them succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.simulations.is_empty() && self.simulations.iter().all(Simulation::succeeded)
    }

    fn ensure_mutable(&self) -> Result<(), ValidationError> {
        if self.frozen {
            return Err(ValidationError::Frozen {
                item_type: ItemType::Experiment,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::asset::Asset;
    use crate::builder::{set_parameter_sweep, sweep_fn, ExperimentBuilder, SweepFn};
    use crate::error::IdmError;
    use crate::task::{CommandTask, JsonConfiguredTask, ScriptRunner};

    fn tag(key: &'static str) -> SweepFn {
        sweep_fn(move |_sim, value| Ok(Tags::from([(key.to_string(), value.clone())])))
    }

    fn experiment_with(builder: ExperimentBuilder) -> Experiment {
        Experiment::from_builder("test", Arc::new(builder), JsonConfiguredTask::default())
    }

    #[test]
    fn test_simulation_clones_are_independent() {
        let mut experiment = Experiment::from_task("e", JsonConfiguredTask::default());
        experiment.simulation().unwrap().set_parameter("a", json!(1)).unwrap();
        experiment.simulation().unwrap().set_parameter("a", json!(2)).unwrap();

        let sims = experiment.simulations();
        assert_eq!(sims[0].task().get_parameter("a"), Some(&json!(1)));
        assert_eq!(sims[1].task().get_parameter("a"), Some(&json!(2)));
        assert!(experiment.base_task().get_parameter("a").is_none());
        let uid = experiment.uid().unwrap();
        assert!(sims.iter().all(|s| s.experiment_id() == Some(uid)));
    }

    #[test]
    fn test_template_changes_do_not_reach_existing_simulations() {
        let mut experiment = Experiment::from_task("e", JsonConfiguredTask::default());
        experiment.simulation().unwrap();
        experiment
            .base_simulation_mut()
            .unwrap()
            .set_parameter("late", json!(true))
            .unwrap();
        assert!(experiment.simulations()[0].task().get_parameter("late").is_none());
    }

    #[test]
    fn test_execute_builder_sets_tags_and_parameters() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_definition(set_parameter_sweep("beta"), [0.1, 0.2, 0.3]);
        let mut experiment = experiment_with(builder);

        assert_eq!(experiment.execute_builder().unwrap(), 3);
        for (sim, beta) in experiment.simulations().iter().zip([0.1, 0.2, 0.3]) {
            assert_eq!(sim.tags(), &Tags::from([("beta".to_string(), json!(beta))]));
            assert_eq!(sim.task().get_parameter("beta"), Some(&json!(beta)));
        }
    }

    #[test]
    fn test_execute_builder_resets() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_definition(set_parameter_sweep("a"), [1, 2]);
        let mut experiment = experiment_with(builder);
        experiment.execute_builder().unwrap();
        experiment.execute_builder().unwrap();
        assert_eq!(experiment.simulation_count(), 2);
    }

    #[test]
    fn test_execute_builder_without_builder_is_noop() {
        let mut experiment = Experiment::from_task("e", CommandTask::from_command("run").unwrap());
        experiment.simulation().unwrap();
        assert_eq!(experiment.execute_builder().unwrap(), 0);
        assert_eq!(experiment.simulation_count(), 1);
    }

    #[test]
    fn test_empty_builder_expands_to_template_copy() {
        let mut experiment = experiment_with(ExperimentBuilder::new());
        experiment
            .base_simulation_mut()
            .unwrap()
            .set_parameter("seed", json!(7))
            .unwrap();

        assert_eq!(experiment.execute_builder().unwrap(), 1);
        let sim = &experiment.simulations()[0];
        assert!(sim.tags().is_empty());
        assert_eq!(sim.task().get_parameter("seed"), Some(&json!(7)));
    }

    #[test]
    fn test_sweep_failure_leaves_no_partial_list() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_definition(
            sweep_fn(|_sim, value| {
                if value == &json!(3) {
                    Err("three is not allowed".into())
                } else {
                    Ok(Tags::new())
                }
            }),
            [1, 2, 3, 4],
        );
        let mut experiment = experiment_with(builder);
        let err = experiment.execute_builder().unwrap_err();
        assert!(matches!(
            err,
            IdmError::Build(BuildError::SweepFailed { combination: 2, .. })
        ));
        assert_eq!(experiment.simulation_count(), 0);
    }

    #[test]
    fn test_later_definition_wins_tag_collision() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_value(tag("k"), "first");
        builder.add_sweep_value(tag("k"), "second");
        let mut experiment = experiment_with(builder);
        experiment.execute_builder().unwrap();
        assert_eq!(experiment.simulations()[0].tags().get("k"), Some(&json!("second")));
    }

    #[test]
    fn test_add_builder_ignores_same_builder() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_definition(tag("a"), [1, 2]);
        let shared: Arc<dyn SimulationBuilder> = Arc::new(builder);

        let mut experiment = Experiment::from_task("e", CommandTask::default());
        experiment.add_builder(Arc::clone(&shared));
        experiment.add_builder(Arc::clone(&shared));
        assert_eq!(experiment.builders().len(), 1);

        let mut other = ExperimentBuilder::new();
        other.add_sweep_definition(tag("b"), [1, 2, 3]);
        experiment.add_builder(Arc::new(other));
        assert_eq!(experiment.execute_builder().unwrap(), 5);

        let mut replacement = ExperimentBuilder::new();
        replacement.add_sweep_value(tag("c"), 1);
        experiment.set_builder(Arc::new(replacement));
        assert_eq!(experiment.execute_builder().unwrap(), 1);
    }

    #[test]
    fn test_simulations_with_tags() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_definition(tag("a"), [1, 2]);
        builder.add_sweep_definition(tag("b"), [1, 2]);
        builder.add_sweep_value(tag("noise"), "x");
        let mut experiment = experiment_with(builder);
        experiment.execute_builder().unwrap();

        let query = Tags::from([("a".to_string(), json!(2)), ("b".to_string(), json!(1))]);
        let found = experiment.simulation_entities_with_tags(&query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tags().get("a"), Some(&json!(2)));

        let ids = experiment.simulations_with_tags(&query).unwrap();
        assert_eq!(ids, vec![found[0].uid().unwrap()]);

        let present = Tags::from([("a".to_string(), json!(null))]);
        assert_eq!(experiment.simulations_with_tags(&present).unwrap().len(), 4);
    }

    #[test]
    fn test_simulation_batches() {
        let mut builder = ExperimentBuilder::new();
        builder.add_sweep_definition(tag("a"), 0..5);
        let mut experiment = experiment_with(builder);
        experiment.execute_builder().unwrap();

        let sizes: Vec<usize> = experiment.simulation_batches(2).unwrap().map(<[_]>::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(matches!(
            experiment.simulation_batches(0),
            Err(ValidationError::ZeroBatchSize)
        ));
    }

    #[test]
    fn test_gather_all_assets_includes_script() {
        let script = Asset::from_content("model.py", b"pass".to_vec()).unwrap();
        let task = JsonConfiguredTask::new(ScriptRunner::Python).with_script(script);
        let mut experiment = Experiment::from_task("e", task);
        experiment
            .assets_mut()
            .unwrap()
            .add_asset(Asset::from_content("data.csv", b"a".to_vec()).unwrap(), true)
            .unwrap();

        let assets = experiment.gather_all_assets().unwrap();
        assert!(assets.contains("", "model.py"));
        assert!(assets.contains("", "data.csv"));
    }

    #[test]
    fn test_pre_and_post_creation() {
        let mut experiment = Experiment::from_task("e", CommandTask::from_command("run").unwrap());
        experiment.pre_creation().unwrap();
        assert_eq!(experiment.tags().get(TASK_TYPE_TAG), Some(&json!("command_task")));
        experiment.post_creation();
        assert!(experiment.is_frozen());
        assert!(experiment.simulation().is_err());
        assert!(experiment.assets().is_locked());
    }

    #[test]
    fn test_status_derivation() {
        let mut experiment = Experiment::from_task("e", CommandTask::default());
        assert_eq!(experiment.status(), None);
        experiment.simulation().unwrap();
        experiment.simulation().unwrap();
        assert_eq!(experiment.status(), None);

        experiment.simulations_mut()[0].set_status(EntityStatus::Running);
        assert_eq!(experiment.status(), Some(EntityStatus::Running));

        experiment.simulations_mut()[0].set_status(EntityStatus::Succeeded);
        assert_eq!(experiment.status(), Some(EntityStatus::Created));
        assert!(!experiment.done());

        experiment.simulations_mut()[1].set_status(EntityStatus::Succeeded);
        assert_eq!(experiment.status(), Some(EntityStatus::Succeeded));
        assert!(experiment.done());
        assert!(experiment.succeeded());

        experiment.simulations_mut()[1].set_status(EntityStatus::Failed);
        assert_eq!(experiment.status(), Some(EntityStatus::Failed));
        assert!(experiment.done());
        assert!(!experiment.succeeded());
    }

    #[test]
    fn test_equal_experiments_ignore_simulations() {
        let a = Experiment::from_task("e", CommandTask::from_command("run").unwrap());
        let mut b = a.clone();
        b.add_simulation(Simulation::default()).unwrap();
        // b pinned its uid, so compare against a pinned copy of a
        let mut a = a;
        a.pin_uid().unwrap();
        assert_eq!(a, b);
    }
}
