//! Shared plumbing for builders fed by external records.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::BuildError;

use super::{Combination, SweepCall, SweepFn};

/// Column name to sweep function, applied in the order given.
#[derive(Clone, Default)]
pub(crate) struct ColumnFunctions {
    functions: Vec<(String, SweepFn)>,
}

impl ColumnFunctions {
    pub(crate) fn new<S: Into<String>>(functions: impl IntoIterator<Item = (S, SweepFn)>) -> Self {
        Self {
            functions: functions
                .into_iter()
                .map(|(column, function)| (column.into(), function))
                .collect(),
        }
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(column, _)| column.as_str())
    }

    pub(crate) fn warn_unmapped<'a>(&self, source_name: &str, seen: impl IntoIterator<Item = &'a str>) {
        let mapped: BTreeSet<&str> = self.columns().collect();
        let unmapped: BTreeSet<&str> = seen.into_iter().filter(|c| !mapped.contains(c)).collect();
        for column in unmapped {
            log::warn!("ignoring column '{column}' in {source_name}: no sweep function mapped");
        }
    }

    /// Builds the combination for one record. `lookup` returns the parsed
    /// cell for a column, `Ok(None)` when it is missing.
    pub(crate) fn combination(
        &self,
        source_name: &str,
        record: usize,
        mut lookup: impl FnMut(&str) -> Result<Option<Value>, String>,
    ) -> Result<Combination, BuildError> {
        let malformed = |reason: String| BuildError::MalformedRecord {
            source_name: source_name.to_string(),
            record,
            reason,
        };
        let mut calls = Vec::with_capacity(self.functions.len());
        for (column, function) in &self.functions {
            let value = lookup(column)
                .map_err(malformed)?
                .ok_or_else(|| malformed(format!("missing value for column '{column}'")))?;
            calls.push(SweepCall::new(function.clone(), value));
        }
        Ok(Combination::new(calls))
    }
}

impl std::fmt::Debug for ColumnFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.columns()).finish()
    }
}
