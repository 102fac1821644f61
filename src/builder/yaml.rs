//! Builder whose combinations come from a YAML list of records.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::error::BuildError;

use super::records::ColumnFunctions;
use super::{Combination, SimulationBuilder, SweepFn};

type Record = BTreeMap<String, Value>;

/// One simulation per YAML record.
///
/// The document must be a sequence of mappings:
///
/// ```yaml
/// - beta: 0.1
///   label: low
/// - beta: 0.9
///   label: high
/// ```
///
/// A missing or null key that has a sweep function is reported as
/// [`BuildError::MalformedRecord`].
#[derive(Debug, Clone)]
pub struct YamlExperimentBuilder {
    source_name: String,
    records: Vec<Record>,
    functions: ColumnFunctions,
}

impl YamlExperimentBuilder {
    /// # Errors
    /// Returns [`BuildError::SourceUnreadable`] on I/O or YAML errors, or if
    /// the document is not a list of mappings.
    pub fn from_reader<S, R>(
        source_name: impl Into<String>,
        reader: R,
        functions: impl IntoIterator<Item = (S, SweepFn)>,
    ) -> Result<Self, BuildError>
    where
        S: Into<String>,
        R: Read,
    {
        let source_name = source_name.into();
        let records: Vec<Record> =
            serde_yaml::from_reader(reader).map_err(|err| BuildError::SourceUnreadable {
                source_name: source_name.clone(),
                message: err.to_string(),
            })?;

        let functions = ColumnFunctions::new(functions);
        let keys: BTreeSet<&str> = records
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect();
        functions.warn_unmapped(&source_name, keys);
        log::debug!("loaded {} records from {source_name}", records.len());

        Ok(Self {
            source_name,
            records,
            functions,
        })
    }

    /// # Errors
    /// See [`YamlExperimentBuilder::from_reader`].
    pub fn from_path<S: Into<String>>(
        path: impl AsRef<Path>,
        functions: impl IntoIterator<Item = (S, SweepFn)>,
    ) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let file = File::open(path).map_err(|err| BuildError::SourceUnreadable {
            source_name: source_name.clone(),
            message: err.to_string(),
        })?;
        Self::from_reader(source_name, file, functions)
    }

    /// # Errors
    /// See [`YamlExperimentBuilder::from_reader`].
    pub fn from_text<S: Into<String>>(
        source_name: impl Into<String>,
        text: &str,
        functions: impl IntoIterator<Item = (S, SweepFn)>,
    ) -> Result<Self, BuildError> {
        Self::from_reader(source_name, text.as_bytes(), functions)
    }
}

impl SimulationBuilder for YamlExperimentBuilder {
    fn count(&self) -> usize {
        self.records.len()
    }

    fn combinations(&self) -> Result<Vec<Combination>, BuildError> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.functions.combination(&self.source_name, index + 1, |column| {
                    Ok(record.get(column).filter(|value| !value.is_null()).cloned())
                })
            })
            .collect()
    }
}
