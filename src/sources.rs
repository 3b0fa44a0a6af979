//! Where each impact distribution comes from.
//!
//! A lookup table from (country, hazard, exposure, impact type) to a
//! `DataSource`, plus the list of exposure/impact pairs each country and
//! hazard must produce. `validate` checks the table is complete up front so
//! a missing wire-up fails at startup, not halfway through a batch.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Hazard, ImpactType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// A dataset from the external climate-risk library.
    ClimateRisk { dataset: String },
    /// Sector exposure and impact functions from the supply-chain project.
    SupplyChain { sector: String, business_interruption: bool },
    /// Impact linear in a hazard dataset's values, with slope `slope`.
    LinearResponse { dataset: String, slope: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub country: String,
    pub hazard: Hazard,
    pub exposure: String,
    pub impact: ImpactType,
    pub source: DataSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub country: String,
    pub hazard: Hazard,
    #[serde(default)]
    pub pairs: Vec<(String, ImpactType)>,
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    requirements: Vec<Requirement>,
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

type SourceKey = (String, Hazard, String, ImpactType);

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceKey, DataSource>,
    required: BTreeMap<(String, Hazard), Vec<(String, ImpactType)>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `country`/`hazard` must produce `exposure`/`impact`.
    pub fn require(&mut self, country: &str, hazard: Hazard, exposure: &str, impact: ImpactType) {
        let pairs = self.required.entry((country.to_lowercase(), hazard)).or_default();
        let pair = (exposure.to_lowercase(), impact);
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }

    /// Declare a hazard for `country` that produces nothing (yet).
    pub fn require_none(&mut self, country: &str, hazard: Hazard) {
        self.required.entry((country.to_lowercase(), hazard)).or_default();
    }

    pub fn insert(
        &mut self,
        country: &str,
        hazard: Hazard,
        exposure: &str,
        impact: ImpactType,
        source: DataSource,
    ) {
        self.sources.insert(
            (country.to_lowercase(), hazard, exposure.to_lowercase(), impact),
            source,
        );
    }

    /// Declare and wire in one step.
    pub fn provide(
        &mut self,
        country: &str,
        hazard: Hazard,
        exposure: &str,
        impact: ImpactType,
        source: DataSource,
    ) {
        self.require(country, hazard, exposure, impact);
        self.insert(country, hazard, exposure, impact, source);
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(text)?;
        let mut registry = Self::new();
        for r in file.requirements {
            registry.require_none(&r.country, r.hazard);
            for (exposure, impact) in r.pairs {
                registry.require(&r.country, r.hazard, &exposure, impact);
            }
        }
        for e in file.sources {
            registry.insert(&e.country, e.hazard, &e.exposure, e.impact, e.source);
        }
        Ok(registry)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Fail with every declared pair that has no data source.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .flat_map(|((country, hazard), pairs)| {
                pairs.iter().filter_map(move |(exposure, impact)| {
                    let key = (country.clone(), *hazard, exposure.clone(), *impact);
                    (!self.sources.contains_key(&key))
                        .then(|| format!("{country}/{hazard}/{exposure}/{impact}"))
                })
            })
            .collect();
        if missing.is_empty() { Ok(()) } else { Err(Error::MissingSources(missing)) }
    }

    pub fn countries(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.required.keys().map(|(c, _)| c.as_str()).collect();
        out.dedup();
        out
    }

    /// Exposure/impact pairs `country` must produce for `hazard`.
    pub fn exposure_impacts(&self, country: &str, hazard: Hazard) -> Result<&[(String, ImpactType)]> {
        let country = country.to_lowercase();
        if !self.required.keys().any(|(c, _)| *c == country) {
            return Err(Error::UnknownKey(format!("country '{country}'")));
        }
        self.required
            .get(&(country.clone(), hazard))
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownKey(format!("hazard '{hazard}' for {country}")))
    }

    pub fn lookup(
        &self,
        country: &str,
        hazard: Hazard,
        exposure: &str,
        impact: ImpactType,
    ) -> Result<&DataSource> {
        let key = (country.to_lowercase(), hazard, exposure.to_lowercase(), impact);
        self.sources.get(&key).ok_or_else(|| {
            Error::UnknownKey(format!("no data source for {country}/{hazard}/{exposure}/{impact}"))
        })
    }

    /// Thailand and Egypt as wired for the UNU ERA study.
    pub fn canonical() -> Self {
        use ImpactType::*;

        let mut r = Self::new();
        let era = |name: &str| DataSource::ClimateRisk { dataset: format!("unu-era:{name}") };
        let sector = |name: &str, bi: bool| DataSource::SupplyChain {
            sector: name.to_string(),
            business_interruption: bi,
        };
        let litpop = DataSource::ClimateRisk { dataset: "litpop:flood".to_string() };

        // ── Thailand ──────────────────────────────────────────────────────────
        let th = "thailand";
        for (exposure, impact) in [
            ("people", Diarrhea),
            ("people - students", Unspecified),
            ("people - monks", Unspecified),
            ("people - tree farmers", Unspecified),
            ("people - grass farmers", Unspecified),
            ("roads", Mobility),
            ("tree crops", AssetLoss),
            ("grass crops", AssetLoss),
            ("markets", AssetLoss),
        ] {
            r.provide(th, Hazard::Flood, exposure, impact, era(exposure));
        }
        r.provide(th, Hazard::Flood, "housing", AssetLoss, litpop.clone());
        // Agriculture is the two ERA crop types together; livestock is assumed
        // to behave like them.
        r.provide(th, Hazard::Flood, "agriculture", AssetLoss, era("tree crops+grass crops"));
        for impact in [LabourProductivity, CapitalProductivity] {
            r.provide(th, Hazard::Flood, "agriculture", impact, sector("agriculture", true));
        }
        for s in ["services", "energy", "manufacturing"] {
            r.provide(th, Hazard::Flood, s, AssetLoss, sector(s, false));
            r.provide(th, Hazard::Flood, s, LabourProductivity, sector(s, true));
            r.provide(th, Hazard::Flood, s, CapitalProductivity, sector(s, true));
        }
        // Tourism borrows the services sector.
        r.provide(th, Hazard::Flood, "tourism", AssetLoss, sector("services", false));
        r.provide(th, Hazard::Flood, "tourism", LabourProductivity, sector("services", true));
        r.provide(th, Hazard::Flood, "tourism", CapitalProductivity, sector("services", true));
        r.require_none(th, Hazard::Heatwave);
        r.require_none(th, Hazard::Drought);

        // ── Egypt ─────────────────────────────────────────────────────────────
        let eg = "egypt";
        for (exposure, impact) in [
            ("crops", AssetLoss),
            ("livestock", AssetLoss),
            ("hotels", AssetLoss),
            ("power plant", AssetLoss),
            ("roads", Mobility),
            ("people", Health),
            ("people - students", Unspecified),
        ] {
            r.provide(eg, Hazard::Flood, exposure, impact, era(exposure));
        }
        r.provide(eg, Hazard::Flood, "housing", AssetLoss, litpop);
        for s in ["agriculture", "services", "manufacturing"] {
            r.provide(eg, Hazard::Flood, s, AssetLoss, sector(s, false));
            r.provide(eg, Hazard::Flood, s, LabourProductivity, sector(s, true));
            r.provide(eg, Hazard::Flood, s, CapitalProductivity, sector(s, true));
        }
        // Energy uses the supply-chain asset damage function for every impact.
        for impact in [AssetLoss, LabourProductivity, CapitalProductivity] {
            r.provide(eg, Hazard::Flood, "energy", impact, sector("energy", false));
        }
        r.provide(eg, Hazard::Flood, "tourism", AssetLoss, sector("services", false));
        r.provide(eg, Hazard::Flood, "tourism", LabourProductivity, sector("services", true));
        r.provide(eg, Hazard::Flood, "tourism", CapitalProductivity, sector("services", true));
        r.provide(eg, Hazard::Heatwave, "agriculture", AssetLoss, era("heatwave crops+livestock"));
        for impact in [LabourProductivity, CapitalProductivity] {
            r.provide(eg, Hazard::Heatwave, "agriculture", impact, sector("agriculture", true));
        }

        r
    }
}
