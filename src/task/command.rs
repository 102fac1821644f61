//! Command lines and the plain command task.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::AssetCollection;
use crate::entity::Tags;
use crate::error::ValidationError;

use super::TaskOps;

/// Executable plus options and arguments.
///
/// Rendering order is executable, options, quoted arguments, raw arguments.
/// Options whose name ends in `:` are glued to their value.
///
/// # Examples
///
/// ```
/// use idmtools::CommandLine;
///
/// let mut cmd = CommandLine::new("python3");
/// cmd.add_argument("model.py");
/// cmd.add_option("--config", "config.json");
/// assert_eq!(cmd.to_string(), "python3 --config config.json model.py");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    executable: String,
    #[serde(default)]
    options: Vec<(String, String)>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    raw_args: Vec<String>,
}

impl CommandLine {
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    /// Splits a command into executable and arguments using POSIX shell
    /// word rules, so quoted words stay whole.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidCommand`] on unbalanced quotes or a
    /// trailing backslash.
    pub fn parse(command: &str) -> Result<Self, ValidationError> {
        let words = shlex::split(command).ok_or_else(|| ValidationError::InvalidCommand {
            command: command.to_string(),
        })?;
        let mut words = words.into_iter();
        let mut cmd = Self::new(words.next().unwrap_or_default());
        cmd.args = words.collect();
        Ok(cmd)
    }

    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn set_executable(&mut self, executable: impl Into<String>) {
        self.executable = executable.into();
    }

    pub fn add_argument(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Adds an argument that is rendered without quoting.
    pub fn add_raw_argument(&mut self, arg: impl Into<String>) {
        self.raw_args.push(arg.into());
    }

    /// Sets an option, replacing an existing option of the same name in place.
    pub fn add_option(&mut self, option: impl Into<String>, value: impl Into<String>) {
        let option = option.into();
        let value = value.into();
        match self.options.iter_mut().find(|(name, _)| *name == option) {
            Some(slot) => slot.1 = value,
            None => self.options.push((option, value)),
        }
    }

    #[must_use]
    pub fn option(&self, option: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(name, _)| name == option)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

/// POSIX shell quoting: safe words pass through, anything else is wrapped in
/// single quotes with embedded quotes escaped.
fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![self.executable.trim().to_string()];
        for (name, value) in &self.options {
            if name.ends_with(':') {
                parts.push(quote(&format!("{name}{value}")));
            } else {
                parts.push(quote(name));
                parts.push(quote(value));
            }
        }
        parts.extend(self.args.iter().filter(|a| !a.is_empty()).map(|a| quote(a)));
        parts.extend(self.raw_args.iter().filter(|a| !a.is_empty()).cloned());
        let rendered: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// Runs a command line as-is. Parameters become `--name value` options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandTask {
    command: CommandLine,
    #[serde(default)]
    parameters: Tags,
    #[serde(default)]
    common_assets: AssetCollection,
    #[serde(default)]
    transient_assets: AssetCollection,
}

impl CommandTask {
    #[must_use]
    pub fn new(command: CommandLine) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    /// Convenience for `CommandTask::new(CommandLine::parse(command)?)`.
    ///
    /// # Errors
    /// See [`CommandLine::parse`].
    pub fn from_command(command: &str) -> Result<Self, ValidationError> {
        CommandLine::parse(command).map(Self::new)
    }

    /// Assets shared by every simulation of an experiment.
    #[must_use]
    pub fn with_common_assets(mut self, assets: AssetCollection) -> Self {
        self.common_assets = assets;
        self
    }

    /// Assets copied next to each simulation.
    #[must_use]
    pub fn with_transient_assets(mut self, assets: AssetCollection) -> Self {
        self.transient_assets = assets;
        self
    }

    /// Command before parameters are applied.
    #[must_use]
    pub const fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn command_mut(&mut self) -> &mut CommandLine {
        &mut self.command
    }

    #[must_use]
    pub const fn common_assets(&self) -> &AssetCollection {
        &self.common_assets
    }

    pub fn common_assets_mut(&mut self) -> &mut AssetCollection {
        &mut self.common_assets
    }

    #[must_use]
    pub const fn transient_assets(&self) -> &AssetCollection {
        &self.transient_assets
    }

    pub fn transient_assets_mut(&mut self) -> &mut AssetCollection {
        &mut self.transient_assets
    }
}

fn option_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TaskOps for CommandTask {
    fn command_line(&self) -> CommandLine {
        let mut command = self.command.clone();
        for (name, value) in &self.parameters {
            command.add_option(format!("--{name}"), option_value(value));
        }
        command
    }

    fn gather_common_assets(&self) -> Result<AssetCollection, ValidationError> {
        Ok(self.common_assets.clone())
    }

    fn gather_transient_assets(&self) -> Result<AssetCollection, ValidationError> {
        Ok(self.transient_assets.clone())
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Tags {
        self.parameters.insert(name.to_string(), value.clone());
        Tags::from([(name.to_string(), value)])
    }

    fn get_parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    fn parameters(&self) -> &Tags {
        &self.parameters
    }

    fn type_name(&self) -> &'static str {
        "command_task"
    }
}
