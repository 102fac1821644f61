//! # idmtools - experiments, sweeps and platforms for simulation models
//!
//! idmtools expands a parameterized experiment definition into concrete
//! simulations, submits them to an execution platform and persists the
//! resulting entities so they can be found again later.
//!
//! ## Core Concepts
//!
//! - **Entity**: Anything with a UID, tags and a platform id. The UID is
//!   explicit or a content hash
//! - **Task**: What a simulation runs (a command line plus its assets)
//! - **Builder**: Turns sweep definitions into combinations of parameter values
//! - **Platform**: Backend that creates, runs and reports on items
//! - **Persistence**: Local store of experiments with platform read-through
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use idmtools::{set_parameter_sweep, CommandTask, Entity, Experiment, ExperimentBuilder};
//!
//! let mut builder = ExperimentBuilder::new();
//! builder.add_sweep_definition(set_parameter_sweep("beta"), [0.1, 0.2, 0.3]);
//!
//! let mut experiment = Experiment::from_builder(
//!     "beta sweep",
//!     Arc::new(builder),
//!     CommandTask::from_command("python3 model.py").unwrap(),
//! );
//! assert_eq!(experiment.execute_builder().unwrap(), 3);
//! assert_eq!(experiment.simulations()[1].tags()["beta"], 0.2);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Entities
pub mod asset;
pub mod entity;
pub mod error;
pub mod experiment;
pub mod simulation;
pub mod suite;
pub mod task;

// Expansion, backends and persistence
pub mod builder;
pub mod platform;
pub mod storage;

pub use asset::{Asset, AssetCollection};
pub use entity::{Entity, EntityStatus, ItemId, ItemType, Tags};
pub use error::{BuildError, IdmError, IdmResult, LookupError, ValidationError};
pub use experiment::Experiment;
pub use simulation::Simulation;
pub use suite::Suite;
pub use task::{
    CommandLine, CommandTask, JsonConfiguredTask, ScriptRunner, Task, TaskOps, TemplatedScriptTask,
};

pub use builder::{
    set_parameter_sweep, sweep_fn, ArmExperimentBuilder, ArmType, CsvExperimentBuilder,
    ExperimentBuilder, SimulationBuilder, SweepArm, SweepError, SweepFn, YamlExperimentBuilder,
};
pub use platform::{commission, InMemoryPlatform, Platform, PlatformError, PlatformFactory, PlatformSpec};
pub use storage::{retrieve_experiment, InMemoryStore, PersistStore, PersistenceContext, StorageError};
