use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use idmtools::entity::{EntityStatus, ItemId, ItemType};
use idmtools::platform::{Item, StatusMap};
use idmtools::{
    commission, set_parameter_sweep, CommandTask, Entity, Experiment, ExperimentBuilder,
    InMemoryPlatform, JsonConfiguredTask, Platform, PlatformError, PlatformFactory, PlatformSpec,
};

/// Rejects the `fail_on`-th `create_items` call once, then behaves.
struct FlakyPlatform {
    inner: InMemoryPlatform,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyPlatform {
    fn new(fail_on: usize) -> Self {
        Self {
            inner: InMemoryPlatform::new("/runs"),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Platform for FlakyPlatform {
    fn spec(&self) -> PlatformSpec {
        self.inner.spec()
    }

    fn create_items(&self, items: &[Item]) -> Result<Vec<ItemId>, PlatformError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(PlatformError::BackendError("connection reset".to_string()));
        }
        self.inner.create_items(items)
    }

    fn run_item(&self, id: ItemId, item_type: ItemType) -> Result<(), PlatformError> {
        self.inner.run_item(id, item_type)
    }

    fn get_item(&self, id: ItemId, item_type: ItemType) -> Result<Option<Item>, PlatformError> {
        self.inner.get_item(id, item_type)
    }

    fn get_children(&self, id: ItemId, item_type: ItemType) -> Result<Vec<Item>, PlatformError> {
        self.inner.get_children(id, item_type)
    }

    fn get_directory(&self, id: ItemId, item_type: ItemType) -> Result<PathBuf, PlatformError> {
        self.inner.get_directory(id, item_type)
    }

    fn native_status(&self, id: ItemId, item_type: ItemType) -> Result<Option<String>, PlatformError> {
        self.inner.native_status(id, item_type)
    }

    fn status_map(&self) -> &StatusMap {
        self.inner.status_map()
    }
}

fn two_simulation_experiment() -> Experiment {
    let mut builder = ExperimentBuilder::new();
    builder.add_sweep_definition(set_parameter_sweep("seed"), [1, 2]);
    Experiment::from_builder("seeds", Arc::new(builder), CommandTask::from_command("model").unwrap())
}

#[test]
fn commission_creates_runs_and_freezes() {
    let platform = InMemoryPlatform::new("/runs");
    let mut experiment = two_simulation_experiment();

    let id = commission(&platform, &mut experiment).unwrap();
    assert_eq!(experiment.uid().unwrap(), id);
    assert!(experiment.is_frozen());
    assert_eq!(platform.len().unwrap(), 3);

    for simulation in experiment.simulations() {
        assert!(simulation.is_frozen());
        assert_eq!(simulation.tags()["task_type"], "command_task");
        let sim_id = simulation.uid().unwrap();
        assert_eq!(
            platform.native_status(sim_id, ItemType::Simulation).unwrap().as_deref(),
            Some(InMemoryPlatform::RUNNING)
        );
    }

    let children = platform.get_children(id, ItemType::Experiment).unwrap();
    assert_eq!(children.len(), 2);
}

#[test]
fn refresh_status_follows_native_states() {
    let platform = InMemoryPlatform::new("/runs");
    let mut experiment = two_simulation_experiment();
    commission(&platform, &mut experiment).unwrap();

    platform.refresh_status(&mut experiment).unwrap();
    assert_eq!(experiment.status(), Some(EntityStatus::Running));
    assert!(!experiment.done());

    for simulation in experiment.simulations() {
        platform
            .set_native_status(simulation.uid().unwrap(), "COMPLETED")
            .unwrap();
    }
    platform.refresh_status(&mut experiment).unwrap();
    assert_eq!(experiment.status(), Some(EntityStatus::Succeeded));
    assert!(experiment.succeeded());

    let first = experiment.simulations()[0].uid().unwrap();
    platform.set_native_status(first, "FAILED").unwrap();
    platform.refresh_status(&mut experiment).unwrap();
    assert_eq!(experiment.status(), Some(EntityStatus::Failed));
    assert!(experiment.done());
    assert!(!experiment.succeeded());
}

#[test]
fn simulation_directory_nests_under_experiment() {
    let platform = InMemoryPlatform::new("/runs");
    let mut experiment = two_simulation_experiment();
    let experiment_id = commission(&platform, &mut experiment).unwrap();
    let sim_id = experiment.simulations()[0].uid().unwrap();

    let directory = platform.get_directory(sim_id, ItemType::Simulation).unwrap();
    let expected = Path::new("/runs")
        .join(experiment_id.to_string())
        .join(sim_id.to_string());
    assert_eq!(directory, expected);
}

#[test]
fn factory_builds_configured_memory_platform() {
    let factory = PlatformFactory::default();
    let spec = PlatformSpec::new("memory").with_options(json!({ "root": "/scratch" }));
    let platform = factory.create(&spec).unwrap();
    assert_eq!(platform.spec(), spec);

    let mut experiment = two_simulation_experiment();
    let id = commission(platform.as_ref(), &mut experiment).unwrap();
    let directory = platform.get_directory(id, ItemType::Experiment).unwrap();
    assert!(directory.starts_with("/scratch"));
}

#[test]
fn unsupported_items_are_rejected() {
    let platform = InMemoryPlatform::new("/runs");
    let mut experiment = two_simulation_experiment();
    let id = commission(&platform, &mut experiment).unwrap();

    let err = platform.run_item(id, ItemType::AssetCollection).unwrap_err();
    assert!(err.to_string().contains("memory"));
}

#[test]
fn commission_can_be_retried_after_backend_failure() {
    let mut builder = ExperimentBuilder::new();
    builder.add_sweep_definition(set_parameter_sweep("beta"), [0.1, 0.2]);
    let mut experiment =
        Experiment::from_builder("retry", Arc::new(builder), JsonConfiguredTask::default());

    // The experiment is accepted, its simulations are not.
    let platform = FlakyPlatform::new(1);
    let err = commission(&platform, &mut experiment).unwrap_err();
    assert!(err.is_platform());
    assert!(!experiment.is_frozen());
    assert_eq!(experiment.simulation_count(), 2);

    let id = commission(&platform, &mut experiment).unwrap();
    assert!(experiment.is_frozen());
    assert_eq!(experiment.simulation_count(), 2);
    assert_eq!(platform.inner.len().unwrap(), 3);
    assert_eq!(platform.get_children(id, ItemType::Experiment).unwrap().len(), 2);
    for simulation in experiment.simulations() {
        assert_eq!(simulation.transient_assets().len(), 1);
        assert!(simulation.transient_assets().contains("", "config.json"));
    }
}
