//! Sweep builders.
//!
//! A builder turns sweep definitions into an ordered list of
//! [`Combination`]s. The experiment clones its template once per combination
//! and applies the combination's calls to the clone.

mod arm;
mod cross;
mod records;
mod sweep;
mod table;
mod yaml;

use std::fmt::Debug;

use crate::error::BuildError;

pub use arm::{ArmExperimentBuilder, ArmType, SweepArm};
pub use cross::ExperimentBuilder;
pub use sweep::{
    set_parameter_sweep, sweep_fn, Combination, SweepCall, SweepDefinition, SweepError, SweepFn,
};
pub use table::{ColumnType, CsvExperimentBuilder};
pub use yaml::YamlExperimentBuilder;

/// Anything that enumerates simulation combinations.
pub trait SimulationBuilder: Debug + Send + Sync {
    /// Number of simulations the builder produces.
    fn count(&self) -> usize;

    /// Every combination in generation order.
    ///
    /// # Errors
    /// Returns [`BuildError`] if an external record is malformed.
    fn combinations(&self) -> Result<Vec<Combination>, BuildError>;
}
