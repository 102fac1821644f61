//! Script tasks rendered from a `{{ name }}` template.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::{Asset, AssetCollection};
use crate::entity::Tags;
use crate::error::ValidationError;

use super::{CommandLine, TaskOps};

static PLACEHOLDER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn placeholder() -> Result<&'static Regex, ValidationError> {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}"))
        .as_ref()
        .map_err(|err| ValidationError::InvalidTemplate {
            reason: err.to_string(),
        })
}

fn default_interpreter() -> String {
    "bash".to_string()
}

/// Writes a rendered script next to each simulation and runs it.
///
/// Placeholders without a variable render as the empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatedScriptTask {
    script_name: String,
    template: String,

    #[serde(default = "default_interpreter")]
    interpreter: String,

    #[serde(default)]
    variables: Tags,

    #[serde(default)]
    common_assets: AssetCollection,
}

impl TemplatedScriptTask {
    #[must_use]
    pub fn new(script_name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            script_name: script_name.into(),
            template: template.into(),
            interpreter: default_interpreter(),
            variables: Tags::new(),
            common_assets: AssetCollection::new(),
        }
    }

    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    #[must_use]
    pub fn with_common_assets(mut self, assets: AssetCollection) -> Self {
        self.common_assets = assets;
        self
    }

    #[must_use]
    pub const fn common_assets(&self) -> &AssetCollection {
        &self.common_assets
    }

    pub fn common_assets_mut(&mut self) -> &mut AssetCollection {
        &mut self.common_assets
    }

    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Substitutes the current variables into the template.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidTemplate`] if the placeholder
    /// pattern cannot be compiled.
    pub fn render(&self) -> Result<String, ValidationError> {
        let rendered = placeholder()?.replace_all(&self.template, |caps: &regex::Captures<'_>| {
            match self.variables.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        });
        Ok(rendered.into_owned())
    }
}

impl TaskOps for TemplatedScriptTask {
    fn command_line(&self) -> CommandLine {
        let mut command = CommandLine::new(self.interpreter.clone());
        command.add_argument(self.script_name.clone());
        command
    }

    fn gather_common_assets(&self) -> Result<AssetCollection, ValidationError> {
        Ok(self.common_assets.clone())
    }

    fn gather_transient_assets(&self) -> Result<AssetCollection, ValidationError> {
        let script = Asset::from_content(self.script_name.clone(), self.render()?.into_bytes())?;
        AssetCollection::from_assets([script])
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Tags {
        self.variables.insert(name.to_string(), value.clone());
        Tags::from([(name.to_string(), value)])
    }

    fn get_parameter(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn parameters(&self) -> &Tags {
        &self.variables
    }

    fn type_name(&self) -> &'static str {
        "templated_script_task"
    }
}
