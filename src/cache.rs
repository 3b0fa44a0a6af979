use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::impact::ImpactDistribution;
use crate::provider::ImpactProvider;
use crate::sources::DataSource;
use crate::types::{Hazard, ImpactKey};

/// Impact distributions stored one JSON file per key under a directory.
///
/// Files are read if present and written if absent. There is no locking:
/// a single writer is assumed.
#[derive(Debug, Clone)]
pub struct ImpactCache {
    dir: PathBuf,
    write: bool,
}

impl ImpactCache {
    /// Files live at `{dir}/{hazard}/...`, so `dir` itself must not already
    /// name a hazard.
    pub fn new(dir: impl Into<PathBuf>, write: bool) -> Result<Self> {
        let dir = dir.into();
        let names_hazard = dir.components().any(|c| match c {
            Component::Normal(s) => Hazard::ALL.iter().any(|h| s.eq_ignore_ascii_case(h.as_str())),
            _ => false,
        });
        if names_hazard {
            return Err(Error::InvalidInput(format!(
                "impact cache directory should not include a hazard: {}. Hazard subfolders are added automatically",
                dir.display()
            )));
        }
        Ok(Self { dir, write })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &ImpactKey) -> PathBuf {
        let file = format!("{}_{}_{}.json", key.exposure, key.impact, key.climate_scenario)
            .replace(' ', "_");
        self.dir.join(key.hazard.as_str()).join(file)
    }

    /// The cached distribution for `key`, generating it through `provider`
    /// on a miss.
    pub fn load(
        &self,
        key: &ImpactKey,
        source: &DataSource,
        provider: &dyn ImpactProvider,
    ) -> Result<ImpactDistribution> {
        let path = self.path(key);
        if path.exists() {
            info!("reading {key} impacts from {}", path.display());
            let file = File::open(&path)?;
            return Ok(serde_json::from_reader(BufReader::new(file))?);
        }

        info!("no cached impacts for {key}; generating");
        let distribution = provider.impact(key, source)?;
        if self.write {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            serde_json::to_writer(BufWriter::new(File::create(&path)?), &distribution)?;
            info!("wrote {key} impacts to {}", path.display());
        }
        Ok(distribution)
    }
}
