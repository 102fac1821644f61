//! Builder whose combinations come from the rows of a CSV table.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BuildError;

use super::records::ColumnFunctions;
use super::{Combination, SimulationBuilder, SweepFn};

/// Declared type of a CSV column. Untyped columns are inferred per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    String,
}

impl ColumnType {
    fn parse(self, cell: &str) -> Result<Value, String> {
        let invalid = |kind: &str| format!("cannot parse '{cell}' as {kind}");
        match self {
            Self::Int => cell.parse::<i64>().map(Value::from).map_err(|_| invalid("int")),
            Self::Float => cell
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("float")),
            Self::Bool => parse_bool(cell).map(Value::Bool).ok_or_else(|| invalid("bool")),
            Self::String => Ok(Value::String(cell.to_string())),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn infer(cell: &str) -> Value {
    if let Ok(int) = cell.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(number) = cell.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(number);
    }
    if let Some(flag) = parse_bool(cell) {
        return Value::Bool(flag);
    }
    Value::String(cell.to_string())
}

/// One simulation per CSV row; each mapped column feeds its sweep function.
///
/// Rows are read eagerly. Missing or empty cells in a mapped column are
/// reported by [`SimulationBuilder::combinations`] as
/// [`BuildError::MalformedRecord`] with the 1-based row number.
#[derive(Debug, Clone)]
pub struct CsvExperimentBuilder {
    source_name: String,
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
    functions: ColumnFunctions,
    types: BTreeMap<String, ColumnType>,
}

impl CsvExperimentBuilder {
    /// Reads CSV with a header row from `reader`.
    ///
    /// # Errors
    /// Returns [`BuildError::SourceUnreadable`] on I/O or CSV syntax errors.
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
        let unreadable = |err: csv::Error| BuildError::SourceUnreadable {
            source_name: source_name.clone(),
            message: err.to_string(),
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(unreadable)?
            .iter()
            .map(str::to_string)
            .collect();
        let rows = csv_reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(unreadable)?;

        let functions = ColumnFunctions::new(functions);
        functions.warn_unmapped(&source_name, headers.iter().map(String::as_str));
        log::debug!("loaded {} rows from {source_name}", rows.len());

        Ok(Self {
            source_name,
            headers,
            rows,
            functions,
            types: BTreeMap::new(),
        })
    }

    /// # Errors
    /// See [`CsvExperimentBuilder::from_reader`].
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
    /// See [`CsvExperimentBuilder::from_reader`].
    pub fn from_text<S: Into<String>>(
        source_name: impl Into<String>,
        text: &str,
        functions: impl IntoIterator<Item = (S, SweepFn)>,
    ) -> Result<Self, BuildError> {
        Self::from_reader(source_name, text.as_bytes(), functions)
    }

    /// Declares the type of a column instead of inferring it.
    #[must_use]
    pub fn with_column_type(mut self, column: impl Into<String>, column_type: ColumnType) -> Self {
        self.types.insert(column.into(), column_type);
        self
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn cell(&self, row: &csv::StringRecord, column: &str) -> Result<Option<Value>, String> {
        let Some(cell) = self
            .headers
            .iter()
            .position(|header| header == column)
            .and_then(|index| row.get(index))
            .filter(|cell| !cell.is_empty())
        else {
            return Ok(None);
        };
        match self.types.get(column) {
            Some(column_type) => column_type
                .parse(cell)
                .map(Some)
                .map_err(|reason| format!("column '{column}': {reason}")),
            None => Ok(Some(infer(cell))),
        }
    }
}

impl SimulationBuilder for CsvExperimentBuilder {
    fn count(&self) -> usize {
        self.rows.len()
    }

    fn combinations(&self) -> Result<Vec<Combination>, BuildError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                self.functions
                    .combination(&self.source_name, index + 1, |column| self.cell(row, column))
            })
            .collect()
    }
}
