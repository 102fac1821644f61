//! Cartesian-product builder.

use serde_json::Value;

use crate::error::BuildError;

use super::{Combination, SimulationBuilder, SweepDefinition, SweepFn};

/// Expands every combination of one value per axis.
///
/// Enumeration is nested-loop order: the first axis varies slowest.
///
/// # Examples
///
/// ```
/// use idmtools::{set_parameter_sweep, ExperimentBuilder, SimulationBuilder};
///
/// let mut builder = ExperimentBuilder::new();
/// builder.add_sweep_definition(set_parameter_sweep("a"), [1, 2, 3, 4, 5]);
/// builder.add_sweep_definition(set_parameter_sweep("b"), [true, false]);
/// assert_eq!(builder.count(), 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExperimentBuilder {
    sweeps: Vec<SweepDefinition>,
}

impl ExperimentBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an axis.
    pub fn add_sweep_definition(
        &mut self,
        function: SweepFn,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) {
        self.sweeps.push(SweepDefinition::new(function, values));
    }

    /// Adds an axis with a single value.
    pub fn add_sweep_value(&mut self, function: SweepFn, value: impl Into<Value>) {
        self.sweeps.push(SweepDefinition::single(function, value));
    }

    #[must_use]
    pub fn sweeps(&self) -> &[SweepDefinition] {
        &self.sweeps
    }
}

/// Nested-loop product of `axes`. No axes yields a single empty
/// combination, i.e. one unmodified simulation.
pub(crate) fn cartesian(axes: &[SweepDefinition]) -> Vec<Combination> {
    let mut combos = vec![Combination::default()];
    for axis in axes {
        let mut next = Vec::with_capacity(combos.len() * axis.len());
        for prefix in &combos {
            for index in 0..axis.len() {
                if let Some(call) = axis.call(index) {
                    let mut combo = prefix.clone();
                    combo.push(call);
                    next.push(combo);
                }
            }
        }
        combos = next;
    }
    combos
}

pub(crate) fn cartesian_count(axes: &[SweepDefinition]) -> usize {
    axes.iter().map(SweepDefinition::len).product()
}

impl SimulationBuilder for ExperimentBuilder {
    fn count(&self) -> usize {
        cartesian_count(&self.sweeps)
    }

    fn combinations(&self) -> Result<Vec<Combination>, BuildError> {
        Ok(cartesian(&self.sweeps))
    }
}
