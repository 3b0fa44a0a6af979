use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::impact::{ImpactDistribution, ImpactEvent};
use crate::sources::DataSource;
use crate::types::{ClimateScenario, Hazard, ImpactKey};

/// Produces the impact distribution for a key from its data source.
///
/// Implementations wrap whatever computes hazard impacts: a risk model, a
/// precomputed catalogue, a test double.
pub trait ImpactProvider {
    fn impact(&self, key: &ImpactKey, source: &DataSource) -> Result<ImpactDistribution>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub dataset: String,
    pub climate_scenario: ClimateScenario,
    pub distribution: ImpactDistribution,
}

/// Impact distributions precomputed per dataset, hazard and climate scenario.
///
/// Supply-chain sources resolve to the dataset `supply-chain:{sector}`.
/// Business-interruption sources are the sector's damage scaled by
/// `business_interruption_factor`.
#[derive(Debug, Clone)]
pub struct CatalogProvider {
    entries: BTreeMap<(String, Hazard, ClimateScenario), ImpactDistribution>,
    business_interruption_factor: f64,
}

impl CatalogProvider {
    pub fn new(entries: Vec<CatalogEntry>, business_interruption_factor: f64) -> Result<Self> {
        if !business_interruption_factor.is_finite() || business_interruption_factor < 0.0 {
            return Err(Error::InvalidInput(format!(
                "business interruption factor must be finite and non-negative, got {business_interruption_factor}"
            )));
        }
        let mut map = BTreeMap::new();
        for e in entries {
            let k = (e.dataset.to_lowercase(), e.distribution.hazard(), e.climate_scenario);
            if map.insert(k, e.distribution).is_some() {
                return Err(Error::InvalidInput(format!(
                    "catalogue lists {} / {} twice",
                    e.dataset, e.climate_scenario
                )));
            }
        }
        Ok(Self { entries: map, business_interruption_factor })
    }

    pub fn from_json_file(path: &Path, business_interruption_factor: f64) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let entries: Vec<CatalogEntry> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Self::new(entries, business_interruption_factor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn dataset(&self, name: &str, key: &ImpactKey) -> Result<&ImpactDistribution> {
        self.entries
            .get(&(name.to_lowercase(), key.hazard, key.climate_scenario))
            .ok_or_else(|| {
                Error::UnknownKey(format!(
                    "catalogue has no dataset '{name}' for {} / {}",
                    key.hazard, key.climate_scenario
                ))
            })
    }
}

impl ImpactProvider for CatalogProvider {
    fn impact(&self, key: &ImpactKey, source: &DataSource) -> Result<ImpactDistribution> {
        debug!("catalogue lookup for {key} via {source:?}");
        match source {
            DataSource::ClimateRisk { dataset } => Ok(self.dataset(dataset, key)?.clone()),
            DataSource::SupplyChain { sector, business_interruption } => {
                let damage = self.dataset(&format!("supply-chain:{sector}"), key)?;
                if *business_interruption {
                    damage.scaled(self.business_interruption_factor)
                } else {
                    Ok(damage.clone())
                }
            }
            DataSource::LinearResponse { dataset, slope } => {
                if !slope.is_finite() || *slope < 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "linear response slope must be finite and non-negative, got {slope}"
                    )));
                }
                let hazard = self.dataset(dataset, key)?;
                let events = hazard
                    .events()
                    .iter()
                    .map(|e| ImpactEvent { magnitude: (e.magnitude * slope).min(1.0), ..*e })
                    .collect();
                ImpactDistribution::new(key.hazard, true, events)
            }
        }
    }
}
