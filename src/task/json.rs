//! Tasks driven by a JSON configuration file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::{Asset, AssetCollection};
use crate::builder::{set_parameter_sweep, SweepFn};
use crate::entity::Tags;
use crate::error::ValidationError;

use super::{CommandLine, TaskOps};

/// Interpreter that executes the task's script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptRunner {
    #[default]
    Python,
    R,
    /// Any other executable, e.g. a container wrapper.
    Custom(String),
}

impl ScriptRunner {
    #[must_use]
    pub fn executable(&self) -> &str {
        match self {
            Self::Python => "python3",
            Self::R => "Rscript",
            Self::Custom(executable) => executable,
        }
    }
}

fn default_config_file_name() -> String {
    "config.json".to_string()
}

/// A script whose parameters are written to a per-simulation JSON file.
///
/// The rendered command is `<runner> ./Assets/<script> --config <file>`.
/// The script travels as a common asset, the configuration as a transient
/// asset so every simulation gets its own copy.
///
/// # Examples
///
/// ```
/// use idmtools::{Asset, JsonConfiguredTask, ScriptRunner, TaskOps};
/// use serde_json::json;
///
/// let script = Asset::from_content("model.py", b"print(1)".to_vec()).unwrap();
/// let mut task = JsonConfiguredTask::new(ScriptRunner::Python).with_script(script);
/// task.set_parameter("beta", json!(0.1));
/// assert_eq!(
///     task.command_line().to_string(),
///     "python3 ./Assets/model.py --config config.json"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonConfiguredTask {
    #[serde(default)]
    runner: ScriptRunner,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<Asset>,

    #[serde(default)]
    parameters: Tags,

    /// Wraps the parameters under a single top-level key when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    envelope: Option<String>,

    #[serde(default = "default_config_file_name")]
    config_file_name: String,

    #[serde(default)]
    common_assets: AssetCollection,
}

impl Default for JsonConfiguredTask {
    fn default() -> Self {
        Self::new(ScriptRunner::default())
    }
}

impl JsonConfiguredTask {
    #[must_use]
    pub fn new(runner: ScriptRunner) -> Self {
        Self {
            runner,
            script: None,
            parameters: Tags::new(),
            envelope: None,
            config_file_name: default_config_file_name(),
            common_assets: AssetCollection::new(),
        }
    }

    #[must_use]
    pub fn with_script(mut self, script: Asset) -> Self {
        self.script = Some(script);
        self
    }

    #[must_use]
    pub fn with_envelope(mut self, envelope: impl Into<String>) -> Self {
        self.envelope = Some(envelope.into());
        self
    }

    #[must_use]
    pub fn with_config_file_name(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = name.into();
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Tags) -> Self {
        self.parameters.extend(parameters);
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
    pub const fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    #[must_use]
    pub fn config_file_name(&self) -> &str {
        &self.config_file_name
    }

    /// The JSON document written for each simulation.
    #[must_use]
    pub fn config(&self) -> Value {
        let body = Value::Object(self.parameters.clone().into_iter().collect());
        match &self.envelope {
            Some(key) => Value::Object([(key.clone(), body)].into_iter().collect()),
            None => body,
        }
    }

    /// Sweep function setting `name` on whatever task the simulation runs.
    #[must_use]
    pub fn parameter_setter(name: impl Into<String>) -> SweepFn {
        set_parameter_sweep(name)
    }
}

impl TaskOps for JsonConfiguredTask {
    fn command_line(&self) -> CommandLine {
        let mut command = CommandLine::new(self.runner.executable());
        if let Some(script) = &self.script {
            command.add_argument(format!("./Assets/{}", script.filename()));
        }
        command.add_argument("--config");
        command.add_argument(self.config_file_name.clone());
        command
    }

    fn gather_common_assets(&self) -> Result<AssetCollection, ValidationError> {
        let mut assets = self.common_assets.clone();
        if let Some(script) = &self.script {
            assets.add_asset(script.clone(), false)?;
        }
        Ok(assets)
    }

    fn gather_transient_assets(&self) -> Result<AssetCollection, ValidationError> {
        let body = serde_json::to_vec_pretty(&self.config()).map_err(|err| {
            ValidationError::Serialization {
                context: "task configuration",
                message: err.to_string(),
            }
        })?;
        AssetCollection::from_assets([Asset::from_content(self.config_file_name.clone(), body)?])
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
        "json_configured_task"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn script(name: &str) -> Asset {
        Asset::from_content(name, b"# model".to_vec()).unwrap()
    }

    #[test]
    fn test_r_command_line() {
        let task = JsonConfiguredTask::new(ScriptRunner::R).with_script(script("model.R"));
        assert_eq!(
            task.command_line().to_string(),
            "Rscript ./Assets/model.R --config config.json"
        );
    }

    #[test]
    fn test_custom_runner_and_config_name() {
        let task = JsonConfiguredTask::new(ScriptRunner::Custom("/opt/bin/sim".to_string()))
            .with_config_file_name("params.json");
        assert_eq!(task.command_line().to_string(), "/opt/bin/sim --config params.json");
    }

    #[test]
    fn test_transient_asset_is_config() {
        let mut task = JsonConfiguredTask::default();
        task.set_parameter("beta", json!(0.2));
        let assets = task.gather_transient_assets().unwrap();
        let config = assets.get("", "config.json").unwrap();
        let parsed: Value = serde_json::from_slice(config.content().unwrap()).unwrap();
        assert_eq!(parsed, json!({"beta": 0.2}));
    }

    #[test]
    fn test_envelope_wraps_parameters() {
        let mut task = JsonConfiguredTask::default().with_envelope("parameters");
        task.set_parameter("a", json!(1));
        assert_eq!(task.config(), json!({"parameters": {"a": 1}}));
    }

    #[test]
    fn test_script_is_common_asset() {
        let shared = AssetCollection::from_assets([script("helpers.py")]).unwrap();
        let task = JsonConfiguredTask::default()
            .with_common_assets(shared)
            .with_script(script("model.py"));
        let assets = task.gather_common_assets().unwrap();
        assert!(assets.contains("", "model.py"));
        assert!(assets.contains("", "helpers.py"));
        assert_eq!(task.common_assets().len(), 1);
        assert!(task.gather_transient_assets().unwrap().get("", "model.py").is_none());
    }

    #[test]
    fn test_set_parameter_returns_tag() {
        let mut task = JsonConfiguredTask::default();
        let tags = task.set_parameter("gamma", json!("high"));
        assert_eq!(tags, Tags::from([("gamma".to_string(), json!("high"))]));
        assert_eq!(task.get_parameter("gamma"), Some(&json!("high")));
        assert!(task.get_parameter("delta").is_none());
    }
}
