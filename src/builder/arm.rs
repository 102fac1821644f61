//! Arms: groups of sweeps combined by cross, pair or union, then
//! concatenated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BuildError, ValidationError};

use super::cross::{cartesian, cartesian_count};
use super::{Combination, SimulationBuilder, SweepDefinition, SweepFn};

/// How the sweeps inside one arm are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmType {
    /// Cartesian product.
    #[default]
    Cross,
    /// Element-wise zip of equal-length domains.
    Pair,
    /// Each value of each sweep on its own, one after the other.
    Union,
}

/// A group of sweep definitions combined by its [`ArmType`].
#[derive(Debug, Clone, Default)]
pub struct SweepArm {
    arm_type: ArmType,
    sweeps: Vec<SweepDefinition>,
}

impl SweepArm {
    #[must_use]
    pub fn new(arm_type: ArmType) -> Self {
        Self {
            arm_type,
            sweeps: Vec::new(),
        }
    }

    #[must_use]
    pub const fn arm_type(&self) -> ArmType {
        self.arm_type
    }

    /// Adds a sweep to the arm.
    ///
    /// # Errors
    /// Returns [`ValidationError::PairLengthMismatch`] when a pair arm gets a
    /// domain whose length differs from the sweeps already present.
    pub fn add_sweep_definition(
        &mut self,
        function: SweepFn,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<(), ValidationError> {
        self.push(SweepDefinition::new(function, values))
    }

    /// Adds a single-value sweep.
    ///
    /// # Errors
    /// See [`SweepArm::add_sweep_definition`].
    pub fn add_sweep_value(
        &mut self,
        function: SweepFn,
        value: impl Into<Value>,
    ) -> Result<(), ValidationError> {
        self.push(SweepDefinition::single(function, value))
    }

    fn push(&mut self, sweep: SweepDefinition) -> Result<(), ValidationError> {
        if self.arm_type == ArmType::Pair {
            if let Some(first) = self.sweeps.first() {
                if first.len() != sweep.len() {
                    return Err(ValidationError::PairLengthMismatch {
                        expected: first.len(),
                        actual: sweep.len(),
                    });
                }
            }
        }
        self.sweeps.push(sweep);
        Ok(())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        match self.arm_type {
            ArmType::Cross => cartesian_count(&self.sweeps),
            ArmType::Pair => self.sweeps.first().map_or(0, SweepDefinition::len),
            ArmType::Union => self.sweeps.iter().map(SweepDefinition::len).sum(),
        }
    }

    #[must_use]
    pub fn combinations(&self) -> Vec<Combination> {
        match self.arm_type {
            ArmType::Cross => cartesian(&self.sweeps),
            ArmType::Pair => (0..self.count())
                .map(|index| {
                    Combination::new(self.sweeps.iter().filter_map(|s| s.call(index)).collect())
                })
                .collect(),
            ArmType::Union => self
                .sweeps
                .iter()
                .flat_map(|sweep| {
                    (0..sweep.len()).filter_map(|index| sweep.call(index).map(|c| Combination::new(vec![c])))
                })
                .collect(),
        }
    }
}

/// Concatenates the combinations of several arms.
#[derive(Debug, Clone, Default)]
pub struct ArmExperimentBuilder {
    arms: Vec<SweepArm>,
}

impl ArmExperimentBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_arm(&mut self, arm: SweepArm) {
        self.arms.push(arm);
    }

    #[must_use]
    pub fn with_arm(mut self, arm: SweepArm) -> Self {
        self.arms.push(arm);
        self
    }

    #[must_use]
    pub fn arms(&self) -> &[SweepArm] {
        &self.arms
    }
}

impl SimulationBuilder for ArmExperimentBuilder {
    fn count(&self) -> usize {
        self.arms.iter().map(SweepArm::count).sum()
    }

    fn combinations(&self) -> Result<Vec<Combination>, BuildError> {
        Ok(self.arms.iter().flat_map(SweepArm::combinations).collect())
    }
}
