use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hazard {
    Flood,
    Heatwave,
    Drought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateScenario {
    Historical,
    Rcp26,
    Rcp85,
}

/// How an exposure is affected. The first three map onto solver shock columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImpactType {
    #[serde(rename = "asset loss")]
    AssetLoss,
    #[serde(rename = "labour productivity")]
    LabourProductivity,
    #[serde(rename = "capital productivity")]
    CapitalProductivity,
    #[serde(rename = "mobility")]
    Mobility,
    #[serde(rename = "health")]
    Health,
    #[serde(rename = "diarrhea")]
    Diarrhea,
    /// Exposures modelled without a named impact (e.g. headcounts).
    #[serde(rename = "")]
    Unspecified,
}

/// Identifies one impact distribution: what hit what, how, under which climate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImpactKey {
    pub hazard: Hazard,
    pub exposure: String,
    pub impact: ImpactType,
    pub climate_scenario: ClimateScenario,
}

impl Hazard {
    pub const ALL: [Hazard; 3] = [Hazard::Flood, Hazard::Heatwave, Hazard::Drought];

    pub fn as_str(self) -> &'static str {
        match self {
            Hazard::Flood => "flood",
            Hazard::Heatwave => "heatwave",
            Hazard::Drought => "drought",
        }
    }
}

impl ClimateScenario {
    pub fn as_str(self) -> &'static str {
        match self {
            ClimateScenario::Historical => "historical",
            ClimateScenario::Rcp26 => "rcp26",
            ClimateScenario::Rcp85 => "rcp85",
        }
    }
}

impl ImpactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImpactType::AssetLoss => "asset loss",
            ImpactType::LabourProductivity => "labour productivity",
            ImpactType::CapitalProductivity => "capital productivity",
            ImpactType::Mobility => "mobility",
            ImpactType::Health => "health",
            ImpactType::Diarrhea => "diarrhea",
            ImpactType::Unspecified => "",
        }
    }

    /// Productivity losses are business interruption rather than asset damage.
    pub fn is_business_interruption(self) -> bool {
        matches!(self, ImpactType::LabourProductivity | ImpactType::CapitalProductivity)
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ClimateScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ImpactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ImpactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.hazard, self.climate_scenario, self.exposure, self.impact
        )
    }
}

impl FromStr for Hazard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flood" => Ok(Hazard::Flood),
            "heatwave" => Ok(Hazard::Heatwave),
            "drought" => Ok(Hazard::Drought),
            other => Err(Error::UnknownKey(format!("hazard '{other}'"))),
        }
    }
}

impl FromStr for ClimateScenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "historical" => Ok(ClimateScenario::Historical),
            "rcp26" => Ok(ClimateScenario::Rcp26),
            "rcp85" => Ok(ClimateScenario::Rcp85),
            other => Err(Error::UnknownKey(format!(
                "climate scenario '{other}' (choose historical, rcp26 or rcp85)"
            ))),
        }
    }
}

impl FromStr for ImpactType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asset loss" => Ok(ImpactType::AssetLoss),
            "labour productivity" => Ok(ImpactType::LabourProductivity),
            "capital productivity" => Ok(ImpactType::CapitalProductivity),
            "mobility" => Ok(ImpactType::Mobility),
            "health" => Ok(ImpactType::Health),
            "diarrhea" => Ok(ImpactType::Diarrhea),
            "" => Ok(ImpactType::Unspecified),
            other => Err(Error::UnknownKey(format!("impact type '{other}'"))),
        }
    }
}
