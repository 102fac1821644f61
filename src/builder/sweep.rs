//! Sweep functions, sweep definitions and combinations.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::entity::Tags;
use crate::error::{IdmError, ValidationError};
use crate::simulation::Simulation;
use crate::task::TaskOps;

/// Error raised by a sweep function. Aborts the whole expansion.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SweepError {
    message: String,
}

impl SweepError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<IdmError> for SweepError {
    fn from(err: IdmError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ValidationError> for SweepError {
    fn from(err: ValidationError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for SweepError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for SweepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Mutates a simulation for one swept value and returns the tags to record.
pub type SweepFn = Arc<dyn Fn(&mut Simulation, &Value) -> Result<Tags, SweepError> + Send + Sync>;

/// Wraps a closure as a [`SweepFn`].
pub fn sweep_fn<F>(function: F) -> SweepFn
where
    F: Fn(&mut Simulation, &Value) -> Result<Tags, SweepError> + Send + Sync + 'static,
{
    Arc::new(function)
}

/// Sweep function that sets task parameter `name` to the swept value.
#[must_use]
pub fn set_parameter_sweep(name: impl Into<String>) -> SweepFn {
    let name = name.into();
    sweep_fn(move |simulation, value| {
        Ok(simulation.task_mut()?.set_parameter(&name, value.clone()))
    })
}

/// One axis of variation: a function and the values it is called with.
#[derive(Clone)]
pub struct SweepDefinition {
    function: SweepFn,
    values: Vec<Value>,
}

impl SweepDefinition {
    #[must_use]
    pub fn new(function: SweepFn, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            function,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Single-value domain.
    #[must_use]
    pub fn single(function: SweepFn, value: impl Into<Value>) -> Self {
        Self {
            function,
            values: vec![value.into()],
        }
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn call(&self, index: usize) -> Option<SweepCall> {
        self.values.get(index).map(|value| SweepCall {
            function: Arc::clone(&self.function),
            value: value.clone(),
        })
    }
}

impl fmt::Debug for SweepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepDefinition")
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

/// A sweep function bound to one value.
#[derive(Clone)]
pub struct SweepCall {
    function: SweepFn,
    value: Value,
}

impl SweepCall {
    #[must_use]
    pub fn new(function: SweepFn, value: Value) -> Self {
        Self { function, value }
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Debug for SweepCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepCall")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// The calls that produce one simulation, applied in order.
#[derive(Debug, Clone, Default)]
pub struct Combination {
    calls: Vec<SweepCall>,
}

impl Combination {
    #[must_use]
    pub fn new(calls: Vec<SweepCall>) -> Self {
        Self { calls }
    }

    #[must_use]
    pub fn calls(&self) -> &[SweepCall] {
        &self.calls
    }

    /// Swept values in call order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.calls.iter().map(SweepCall::value)
    }

    pub(crate) fn push(&mut self, call: SweepCall) {
        self.calls.push(call);
    }

    /// Runs every call against `simulation` and merges the returned tags.
    /// A key returned by a later call overwrites the earlier value.
    ///
    /// # Errors
    /// Returns the first [`SweepError`] raised by a sweep function.
    pub fn apply(&self, simulation: &mut Simulation) -> Result<Tags, SweepError> {
        let mut tags = Tags::new();
        for call in &self.calls {
            tags.extend((call.function)(simulation, &call.value)?);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::task::CommandTask;

    fn tag_as(key: &'static str) -> SweepFn {
        sweep_fn(move |_sim, value| Ok(Tags::from([(key.to_string(), value.clone())])))
    }

    #[test]
    fn test_later_call_wins_on_collision() {
        let combo = Combination::new(vec![
            SweepCall::new(tag_as("a"), json!(1)),
            SweepCall::new(tag_as("a"), json!(2)),
        ]);
        let mut sim = Simulation::from_task(CommandTask::from_command("run").unwrap());
        let tags = combo.apply(&mut sim).unwrap();
        assert_eq!(tags, Tags::from([("a".to_string(), json!(2))]));
    }

    #[test]
    fn test_set_parameter_sweep_updates_task() {
        let setter = set_parameter_sweep("beta");
        let mut sim = Simulation::from_task(CommandTask::from_command("run").unwrap());
        let tags = setter(&mut sim, &json!(0.5)).unwrap();
        assert_eq!(tags.get("beta"), Some(&json!(0.5)));
        assert_eq!(sim.task().get_parameter("beta"), Some(&json!(0.5)));
    }

    #[test]
    fn test_sweep_error_conversions() {
        let err: SweepError = "bad value".into();
        assert_eq!(err.to_string(), "bad value");
        let err: SweepError = ValidationError::ZeroBatchSize.into();
        assert!(err.message().contains("Batch size"));
    }
}
