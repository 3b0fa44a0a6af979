use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::ImpactCache;
use crate::error::{Error, Result};
use crate::generate::{BatchOptions, GenerationRequest};
use crate::measures::Measures;
use crate::provider::CatalogProvider;
use crate::solver::SolverConfig;
use crate::sources::SourceRegistry;
use crate::types::{ClimateScenario, Hazard};

/// Everything a generation batch and its solver runs need.
///
/// Fields missing from a TOML file take their `canonical()` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub country: String,
    pub climate_scenario: ClimateScenario,
    pub hazards: Vec<Hazard>,
    pub n_sim_years: Option<usize>,
    pub n_inputs: usize,
    pub seed: u64,
    /// Input workbook every generated input starts from.
    pub template: PathBuf,
    /// Sheets of the template that receive shocks.
    pub scenarios: Vec<String>,
    pub impacts_dir: PathBuf,
    pub catalogue: PathBuf,
    /// Source registry file. `None` uses the built-in wiring.
    pub sources: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub write_cache: bool,
    pub overwrite: bool,
    pub measures: Measures,
    pub business_interruption_factor: f64,
    pub solver: Option<SolverConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

impl GenerationConfig {
    pub fn canonical() -> Self {
        Self {
            country: "thailand".to_string(),
            climate_scenario: ClimateScenario::Rcp85,
            hazards: vec![Hazard::Flood],
            n_sim_years: None,
            n_inputs: 10,
            seed: 42,
            template: PathBuf::from("data/cred_input.json"),
            scenarios: vec!["Scenario".to_string()],
            impacts_dir: PathBuf::from("data/impacts"),
            catalogue: PathBuf::from("data/catalogue.json"),
            sources: None,
            output_dir: PathBuf::from("output/inputs"),
            write_cache: true,
            overwrite: false,
            measures: Measures::default(),
            business_interruption_factor: 1.0,
            solver: None,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hazards.is_empty() {
            return Err(Error::InvalidInput("no hazards configured".to_string()));
        }
        if self.scenarios.is_empty() {
            return Err(Error::InvalidInput("no template scenarios configured".to_string()));
        }
        if self.n_sim_years == Some(0) {
            return Err(Error::InvalidInput("n_sim_years must be positive".to_string()));
        }
        if !self.business_interruption_factor.is_finite() || self.business_interruption_factor < 0.0 {
            return Err(Error::InvalidInput(format!(
                "business_interruption_factor must be finite and non-negative, got {}",
                self.business_interruption_factor
            )));
        }
        Ok(())
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            country: self.country.clone(),
            climate_scenario: self.climate_scenario,
            hazards: self.hazards.clone(),
            n_sim_years: self.n_sim_years,
            measures: self.measures.clone(),
        }
    }

    pub fn batch(&self) -> BatchOptions {
        BatchOptions {
            output_dir: self.output_dir.clone(),
            n_inputs: self.n_inputs,
            seed: self.seed,
            overwrite: self.overwrite,
        }
    }

    /// The configured registry, checked for completeness.
    pub fn registry(&self) -> Result<SourceRegistry> {
        let registry = match &self.sources {
            Some(path) => SourceRegistry::from_toml_file(path)?,
            None => SourceRegistry::canonical(),
        };
        registry.validate()?;
        Ok(registry)
    }

    pub fn provider(&self) -> Result<CatalogProvider> {
        CatalogProvider::from_json_file(&self.catalogue, self.business_interruption_factor)
    }

    pub fn cache(&self) -> Result<ImpactCache> {
        ImpactCache::new(&self.impacts_dir, self.write_cache)
    }

    pub fn solver(&self) -> Result<&SolverConfig> {
        self.solver
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("no [solver] section configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_is_valid() {
        let c = GenerationConfig::canonical();
        c.validate().unwrap();
        c.registry().unwrap();
        assert!(c.solver().is_err());
    }

    #[test]
    fn toml_overrides_canonical_fields() {
        let c = GenerationConfig::from_toml_str(
            r#"
            country = "egypt"
            climate_scenario = "rcp26"
            hazards = ["flood", "heatwave"]
            n_sim_years = 50
            seed = 7

            [measures]
            housing = [0.9, 0.9]

            [solver]
            executable = "matlab"
            args = ["-batch", "run('{model_dir}/main.m')"]
            model_dir = "model"
            model_input = "input.json"
            model_output = "results.json"
            timeout_secs = 3600
            "#,
        )
        .unwrap();
        assert_eq!(c.country, "egypt");
        assert_eq!(c.climate_scenario, ClimateScenario::Rcp26);
        assert_eq!(c.hazards, vec![Hazard::Flood, Hazard::Heatwave]);
        assert_eq!(c.n_sim_years, Some(50));
        assert_eq!(c.n_inputs, 10);
        assert_eq!(c.measures.get("housing"), Some(&[0.9, 0.9][..]));
        assert_eq!(c.solver().unwrap().timeout_secs, Some(3600));
        assert_eq!(c.request().hazards.len(), 2);
        assert_eq!(c.batch().seed, 7);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            GenerationConfig::from_toml_str("hazards = []"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            GenerationConfig::from_toml_str("climate_scenario = \"rcp45\""),
            Err(Error::Toml(_))
        ));
        assert!(matches!(
            GenerationConfig::from_toml_file(Path::new("/nonexistent/config.toml")),
            Err(Error::FileNotFound(_))
        ));
    }
}
