//! Tasks: the executable unit a simulation runs.
//!
//! A task owns its command line, parameters and the assets it needs. Every
//! variant implements [`TaskOps`]; [`Task`] dispatches over the variants so
//! simulations can own one by value and deep-copy it on clone.

mod command;
mod json;
mod template;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::AssetCollection;
use crate::entity::Tags;
use crate::error::ValidationError;

pub use command::{CommandLine, CommandTask};
pub use json::{JsonConfiguredTask, ScriptRunner};
pub use template::TemplatedScriptTask;

/// Capabilities every task provides.
pub trait TaskOps {
    /// Command executed for each simulation.
    fn command_line(&self) -> CommandLine;

    /// Assets shared by every simulation of an experiment.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the assets cannot be assembled.
    fn gather_common_assets(&self) -> Result<AssetCollection, ValidationError>;

    /// Assets specific to one simulation.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the assets cannot be assembled.
    fn gather_transient_assets(&self) -> Result<AssetCollection, ValidationError>;

    /// Sets a parameter and returns the tags the change contributes.
    fn set_parameter(&mut self, name: &str, value: Value) -> Tags;

    fn get_parameter(&self, name: &str) -> Option<&Value>;

    fn parameters(&self) -> &Tags;

    /// Short name recorded in the `task_type` tag.
    fn type_name(&self) -> &'static str;
}

/// Any supported task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    Command(CommandTask),
    JsonConfigured(JsonConfiguredTask),
    TemplatedScript(TemplatedScriptTask),
}

impl Task {
    fn ops(&self) -> &dyn TaskOps {
        match self {
            Self::Command(task) => task,
            Self::JsonConfigured(task) => task,
            Self::TemplatedScript(task) => task,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn TaskOps {
        match self {
            Self::Command(task) => task,
            Self::JsonConfigured(task) => task,
            Self::TemplatedScript(task) => task,
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::Command(CommandTask::default())
    }
}

impl TaskOps for Task {
    fn command_line(&self) -> CommandLine {
        self.ops().command_line()
    }

    fn gather_common_assets(&self) -> Result<AssetCollection, ValidationError> {
        self.ops().gather_common_assets()
    }

    fn gather_transient_assets(&self) -> Result<AssetCollection, ValidationError> {
        self.ops().gather_transient_assets()
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Tags {
        self.ops_mut().set_parameter(name, value)
    }

    fn get_parameter(&self, name: &str) -> Option<&Value> {
        self.ops().get_parameter(name)
    }

    fn parameters(&self) -> &Tags {
        self.ops().parameters()
    }

    fn type_name(&self) -> &'static str {
        self.ops().type_name()
    }
}

impl From<CommandTask> for Task {
    fn from(task: CommandTask) -> Self {
        Self::Command(task)
    }
}

impl From<JsonConfiguredTask> for Task {
    fn from(task: JsonConfiguredTask) -> Self {
        Self::JsonConfigured(task)
    }
}

impl From<TemplatedScriptTask> for Task {
    fn from(task: TemplatedScriptTask) -> Self {
        Self::TemplatedScript(task)
    }
}
