use serde::Serialize;

use crate::error::{Error, Result};
use crate::workbook::{HOUSING_COLUMN, InputWorkbook};

/// Distribution of a shock series across simulated years.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Years with a non-zero impact.
    pub shock_years: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub label: String,
    pub stats: ColumnStats,
}

/// Percentiles interpolate linearly between order statistics; the standard
/// deviation is the sample one. `None` for an empty series.
pub fn column_stats(values: &[f64]) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let interp = |p: f64| -> f64 {
        let h = p * (n - 1) as f64;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = h - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    };

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(ColumnStats {
        n,
        min: sorted[0],
        p5: interp(0.05),
        p25: interp(0.25),
        p50: interp(0.50),
        p75: interp(0.75),
        p95: interp(0.95),
        max: sorted[n - 1],
        mean,
        std_dev: variance.sqrt(),
        shock_years: sorted.iter().filter(|&&v| v > 0.0).count(),
    })
}

/// Statistics for every shock column `scenario` carries, housing first,
/// then sectors in workbook order.
pub fn summarise_workbook(workbook: &InputWorkbook, scenario: &str) -> Result<Vec<ColumnSummary>> {
    let sheet = workbook
        .sheet(scenario)
        .ok_or_else(|| Error::UnknownKey(format!("scenario sheet '{scenario}'")))?;
    let labels = workbook.variable_labels();

    let mut columns = vec![HOUSING_COLUMN.to_string()];
    for i in 1..=workbook.sectors().len() {
        columns.extend([format!("exo_D_{i}_1"), format!("exo_D_N_{i}_1"), format!("exo_D_K_{i}_1")]);
    }

    Ok(columns
        .into_iter()
        .filter_map(|column| {
            let stats = column_stats(sheet.column(&column)?)?;
            let label = labels.get(&column).cloned().unwrap_or_else(|| column.clone());
            Some(ColumnSummary { column, label, stats })
        })
        .collect())
}

impl std::fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "{:<14} {:<36} mean={:.4} sd={:.4} p50={:.4} p95={:.4} max={:.4} shocks={}/{}",
            self.column, self.label, s.mean, s.std_dev, s.p50, s.p95, s.max, s.shock_years, s.n
        )
    }
}
