//! In-memory copy of the solver's input workbook.
//!
//! One sheet per scenario, one row per simulated year, columns named by the
//! solver's convention (`exo_DH`, `exo_D_{i}_1`, ...). Only the scenarios
//! opened for editing can be written; every sheet is kept for export.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::ImpactType;

/// The unshocked reference scenario. It never receives exogenous impacts.
pub const BASELINE: &str = "Baseline";
/// Exposure name routed to the housing damage column.
pub const HOUSING: &str = "housing";
pub const HOUSING_COLUMN: &str = "exo_DH";

/// Climate drivers the solver could derive shocks from; zeroed because
/// shocks are supplied directly.
const CLIMATE_COLUMNS: [&str; 6] =
    ["exo_tas_1", "exo_floods_1", "exo_droughts_1", HOUSING_COLUMN, "exo_I_A_DH", "exo_I_AP_DH"];

/// A row-per-year table with named columns, in insertion order.
///
/// Loaded sheets list each data column exactly once and are rectangular.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSheet")]
pub struct Sheet {
    columns: Vec<String>,
    data: BTreeMap<String, Vec<f64>>,
}

#[derive(Deserialize)]
struct RawSheet {
    columns: Vec<String>,
    data: BTreeMap<String, Vec<f64>>,
}

impl TryFrom<RawSheet> for Sheet {
    type Error = Error;

    fn try_from(raw: RawSheet) -> Result<Self> {
        let mut listed = BTreeSet::new();
        for c in &raw.columns {
            if !listed.insert(c.as_str()) {
                return Err(Error::InvalidInput(format!("column '{c}' is listed twice")));
            }
            if !raw.data.contains_key(c) {
                return Err(Error::InvalidInput(format!("column '{c}' has no data")));
            }
        }
        if let Some(extra) = raw.data.keys().find(|k| !listed.contains(k.as_str())) {
            return Err(Error::InvalidInput(format!("data column '{extra}' is not listed")));
        }
        let lengths: BTreeSet<usize> = raw.data.values().map(Vec::len).collect();
        if lengths.len() > 1 {
            return Err(Error::InvalidInput(format!("ragged sheet: column lengths {lengths:?}")));
        }
        Ok(Self { columns: raw.columns, data: raw.data })
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows: the shortest column, or zero for an empty sheet.
    pub fn n_rows(&self) -> usize {
        self.data.values().map(Vec::len).min().unwrap_or(0)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.data.get(name).map(Vec::as_slice)
    }

    /// Insert or overwrite a column.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) {
        if !self.data.contains_key(name) {
            self.columns.push(name.to_string());
        }
        self.data.insert(name.to_string(), values);
    }

    pub fn truncate(&mut self, n: usize) {
        for values in self.data.values_mut() {
            values.truncate(n);
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WorkbookFile {
    sectors: Vec<String>,
    sheets: BTreeMap<String, Sheet>,
}

#[derive(Debug, Clone)]
pub struct InputWorkbook {
    template: Option<PathBuf>,
    sectors: Vec<String>,
    sheets: BTreeMap<String, Sheet>,
    scenarios: Vec<String>,
    n_sim_years: usize,
}

impl InputWorkbook {
    /// Load a workbook and open `scenarios` for editing.
    pub fn open(path: &Path, scenarios: &[&str]) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let file: WorkbookFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let mut wb = Self::from_parts(file.sectors, file.sheets, scenarios)?;
        wb.template = Some(path.to_path_buf());
        Ok(wb)
    }

    pub fn from_parts(
        sectors: Vec<String>,
        sheets: BTreeMap<String, Sheet>,
        scenarios: &[&str],
    ) -> Result<Self> {
        let mut editable: Vec<String> = Vec::new();
        for &s in scenarios {
            if s == BASELINE {
                warn!("'{BASELINE}' has no exogenous impacts; removing it from the input scenarios");
            } else if !editable.iter().any(|e| e == s) {
                editable.push(s.to_string());
            }
        }
        if editable.is_empty() {
            return Err(Error::InvalidInput("no impact scenarios to edit".to_string()));
        }
        if let Some(missing) = editable.iter().find(|s| !sheets.contains_key(s.as_str())) {
            return Err(Error::UnknownKey(format!("scenario sheet '{missing}'")));
        }

        let rows: Vec<usize> = editable.iter().map(|s| sheets[s.as_str()].n_rows()).collect();
        let n_sim_years = rows.iter().copied().min().unwrap_or(0);

        let mut wb = Self { template: None, sectors, sheets, scenarios: editable, n_sim_years };
        if rows.iter().any(|&r| r != n_sim_years) {
            warn!("scenario sheets have different numbers of years; truncating to {n_sim_years}");
            wb.truncate_to_n_years(n_sim_years);
        }
        Ok(wb)
    }

    pub fn sectors(&self) -> &[String] {
        &self.sectors
    }

    pub fn scenarios(&self) -> &[String] {
        &self.scenarios
    }

    pub fn n_sim_years(&self) -> usize {
        self.n_sim_years
    }

    pub fn template(&self) -> Option<&Path> {
        self.template.as_deref()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    /// Keep only the first `n` years of every editable scenario.
    pub fn truncate_to_n_years(&mut self, n: usize) {
        for s in &self.scenarios {
            if let Some(sheet) = self.sheets.get_mut(s) {
                sheet.truncate(n);
            }
        }
        self.n_sim_years = self
            .scenarios
            .iter()
            .filter_map(|s| self.sheets.get(s))
            .map(Sheet::n_rows)
            .min()
            .unwrap_or(0);
    }

    /// Overwrite `column` of `scenario` with the first `n_sim_years` values.
    ///
    /// Fewer values than years is an error; more are truncated. Unit-interval
    /// columns reject anything outside [0, 1].
    pub fn set_scenario_column(
        &mut self,
        scenario: &str,
        column: &str,
        values: &[f64],
        unit_interval: bool,
    ) -> Result<()> {
        if !self.scenarios.iter().any(|s| s == scenario) {
            return Err(Error::UnknownKey(format!("scenario '{scenario}' is not open for editing")));
        }
        let n = self.n_sim_years;
        if values.len() < n {
            return Err(Error::InvalidInput(format!(
                "the provided values have fewer years ({}) than the input workbook ({n})",
                values.len()
            )));
        }
        if values.len() > n {
            warn!(
                "the provided values have more years ({}) than the input workbook ({n}); truncating",
                values.len()
            );
        }
        if unit_interval && values.iter().any(|v| !(0.0..=1.0).contains(v)) {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            return Err(Error::OutOfRange {
                what: format!("values for {column}"),
                lo: 0.0,
                hi: 1.0,
                min,
                max,
            });
        }

        let sheet = self
            .sheets
            .get_mut(scenario)
            .ok_or_else(|| Error::UnknownKey(format!("scenario sheet '{scenario}'")))?;
        sheet.set_column(column, values[..n].to_vec());
        Ok(())
    }

    /// 1-based position of `sector` in the workbook, matched case-insensitively.
    pub fn sector_index(&self, sector: &str) -> Result<usize> {
        let wanted = sector.to_lowercase();
        self.sectors
            .iter()
            .position(|s| s.to_lowercase() == wanted)
            .map(|i| i + 1)
            .ok_or_else(|| {
                Error::UnknownKey(format!(
                    "sector '{wanted}' not among workbook sectors {:?}",
                    self.sectors
                ))
            })
    }

    /// Column holding `impact` for the 1-based sector `index`.
    pub fn sector_column(&self, index: usize, impact: ImpactType) -> Result<String> {
        if index == 0 || index > self.sectors.len() {
            return Err(Error::UnknownKey(format!(
                "sector index {index} (workbook has {} sectors)",
                self.sectors.len()
            )));
        }
        match impact {
            ImpactType::AssetLoss => Ok(format!("exo_D_{index}_1")),
            ImpactType::LabourProductivity => Ok(format!("exo_D_N_{index}_1")),
            ImpactType::CapitalProductivity => Ok(format!("exo_D_K_{index}_1")),
            other => Err(Error::UnknownKey(format!("impact type '{other}' has no sector column"))),
        }
    }

    pub fn set_sector_annual_impacts(
        &mut self,
        scenario: &str,
        sector: &str,
        impact: ImpactType,
        annual_impacts: &[f64],
    ) -> Result<()> {
        let column = self.sector_column(self.sector_index(sector)?, impact)?;
        self.set_scenario_column(scenario, &column, annual_impacts, true)
    }

    pub fn set_housing_annual_impacts(&mut self, scenario: &str, annual_impacts: &[f64]) -> Result<()> {
        self.set_scenario_column(scenario, HOUSING_COLUMN, annual_impacts, true)
    }

    /// Zero the climate drivers and every damage column of the editable scenarios.
    pub fn set_impacts_to_zero(&mut self) {
        let mut columns: Vec<String> = CLIMATE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for i in 1..=self.sectors.len() {
            columns.extend([
                format!("exo_GA_{i}_1"),
                format!("exo_IAP_{i}_1"),
                format!("exo_D_{i}_1"),
                format!("exo_D_N_{i}_1"),
                format!("exo_D_K_{i}_1"),
            ]);
        }
        let zeros = vec![0.0; self.n_sim_years];
        for s in &self.scenarios {
            if let Some(sheet) = self.sheets.get_mut(s) {
                for c in &columns {
                    sheet.set_column(c, zeros.clone());
                }
            }
        }
    }

    /// Fill the damage columns with random shocks for testing the solver.
    ///
    /// Shock years are shared by every column (probability `frequency`).
    /// Asset losses are `U[0,1) * scale`; productivity losses are the
    /// sector's asset loss times `bi_scale`.
    pub fn set_dummy_impacts(
        &mut self,
        scale: f64,
        frequency: f64,
        bi_scale: f64,
        rng: &mut impl Rng,
    ) -> Result<()> {
        let shock = Bernoulli::new(frequency)
            .map_err(|e| Error::InvalidInput(format!("dummy shock frequency {frequency}: {e}")))?;
        self.set_impacts_to_zero();
        let n = self.n_sim_years;
        let shock_years: Vec<bool> = (0..n).map(|_| shock.sample(rng)).collect();

        for scenario in self.scenarios.clone() {
            let housing = dummy_series(&shock_years, scale, rng);
            self.set_housing_annual_impacts(&scenario, &housing)?;
            for i in 1..=self.sectors.len() {
                let asset = dummy_series(&shock_years, scale, rng);
                let bi: Vec<f64> = asset.iter().map(|v| v * bi_scale).collect();
                let c = self.sector_column(i, ImpactType::AssetLoss)?;
                self.set_scenario_column(&scenario, &c, &asset, true)?;
                let c = self.sector_column(i, ImpactType::LabourProductivity)?;
                self.set_scenario_column(&scenario, &c, &bi, true)?;
                let c = self.sector_column(i, ImpactType::CapitalProductivity)?;
                self.set_scenario_column(&scenario, &c, &bi, true)?;
            }
        }
        Ok(())
    }

    /// Human-readable label of every shock column.
    pub fn variable_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(HOUSING_COLUMN.to_string(), "Damage to housing stock".to_string());
        for (i, sector) in self.sectors.iter().enumerate() {
            let name = capitalize(sector);
            let i = i + 1;
            labels.insert(format!("exo_D_{i}_1"), format!("{name} damage"));
            labels.insert(format!("exo_D_N_{i}_1"), format!("{name} labour productivity"));
            labels.insert(format!("exo_D_K_{i}_1"), format!("{name} capital productivity"));
        }
        labels
    }

    /// Write every sheet to `path`. Nothing reaches disk before this call.
    pub fn export(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(Error::FileExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = WorkbookFile { sectors: self.sectors.clone(), sheets: self.sheets.clone() };
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &file)?;
        info!("wrote input workbook to {}", path.display());
        Ok(())
    }
}

fn dummy_series(shock_years: &[bool], scale: f64, rng: &mut impl Rng) -> Vec<f64> {
    shock_years
        .iter()
        .map(|&hit| {
            let v = rng.random::<f64>() * scale;
            if hit { v } else { 0.0 }
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
