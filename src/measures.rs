use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::workbook::{HOUSING, InputWorkbook};

/// Adaptation measures: per-exposure multiplicative factors, one per year.
///
/// A factor of 0.8 in a year removes a fifth of that year's impact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<f64>>")]
pub struct Measures(BTreeMap<String, Vec<f64>>);

impl From<BTreeMap<String, Vec<f64>>> for Measures {
    fn from(factors: BTreeMap<String, Vec<f64>>) -> Self {
        Measures::new(factors)
    }
}

impl Measures {
    pub fn new(factors: BTreeMap<String, Vec<f64>>) -> Self {
        Measures(factors.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, exposure: &str) -> Option<&[f64]> {
        self.0.get(&exposure.to_lowercase()).map(Vec::as_slice)
    }

    /// Check the measures fit `workbook`: equal lengths matching its years,
    /// and only its sectors or housing as keys. Missing sectors only warn.
    pub fn validate(&self, workbook: &InputWorkbook) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let lengths: BTreeSet<usize> = self.0.values().map(Vec::len).collect();
        if lengths.len() > 1 {
            return Err(Error::InvalidInput("provided measures have different lengths".to_string()));
        }
        let n = lengths.into_iter().next().unwrap_or(0);
        if n != workbook.n_sim_years() {
            return Err(Error::InvalidInput(format!(
                "measures cover {n} years but the input workbook has {}",
                workbook.n_sim_years()
            )));
        }

        let expected: BTreeSet<String> = workbook
            .sectors()
            .iter()
            .map(|s| s.to_lowercase())
            .chain(std::iter::once(HOUSING.to_string()))
            .collect();
        let provided: BTreeSet<String> = self.0.keys().cloned().collect();

        let unexpected: Vec<&String> = provided.difference(&expected).collect();
        if !unexpected.is_empty() {
            return Err(Error::InvalidInput(format!(
                "unexpected sectors in the specified measures: {unexpected:?}"
            )));
        }
        let uncovered: Vec<&String> = expected.difference(&provided).collect();
        if !uncovered.is_empty() {
            warn!("not all sectors have measures: {uncovered:?}");
        }
        Ok(())
    }

    /// Scale `values` by the exposure's factors; unchanged when it has none.
    pub fn apply(&self, exposure: &str, values: Vec<f64>) -> Vec<f64> {
        match self.get(exposure) {
            Some(factors) => values.iter().zip(factors).map(|(v, f)| v * f).collect(),
            None => values,
        }
    }
}
