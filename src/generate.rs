//! From impact distributions to solver input workbooks.
//!
//! Loading goes through the cache and happens once per batch. Sampling a
//! workbook only needs the loaded distributions and a generator, so a batch
//! samples its inputs in parallel, each with its own seed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cache::ImpactCache;
use crate::error::{Error, Result};
use crate::impact::ImpactDistribution;
use crate::measures::Measures;
use crate::provider::ImpactProvider;
use crate::sources::SourceRegistry;
use crate::types::{ClimateScenario, Hazard, ImpactKey, ImpactType};
use crate::workbook::{HOUSING, HOUSING_COLUMN, InputWorkbook};
use crate::yearset::{YearSet, blend, combine, sample_year_set};

/// Fractional impacts never exceed the whole exposure.
const EXPOSURE_CAP: f64 = 1.0;

/// Per-input seeds are drawn from `1..MAX_INPUT_SEED`.
const MAX_INPUT_SEED: u64 = 999_999;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub country: String,
    pub climate_scenario: ClimateScenario,
    pub hazards: Vec<Hazard>,
    /// Shorten the template to this many years. `None` keeps its length.
    pub n_sim_years: Option<usize>,
    pub measures: Measures,
}

/// Where and how many inputs a batch writes.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub n_inputs: usize,
    pub seed: u64,
    pub overwrite: bool,
}

/// One hazard's distributions for an exposure/impact pair.
#[derive(Debug, Clone)]
struct HazardImpacts {
    historical: ImpactDistribution,
    scenario: Option<ImpactDistribution>,
}

/// Every distribution a request needs, grouped by exposure and impact type.
#[derive(Debug, Clone, Default)]
pub struct LoadedImpacts {
    pairs: BTreeMap<(String, ImpactType), Vec<HazardImpacts>>,
}

impl LoadedImpacts {
    pub fn n_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &(String, ImpactType)> {
        self.pairs.keys()
    }
}

/// Fetch historical and, unless the request is historical, scenario
/// distributions for every pair the registry declares.
pub fn load_impacts(
    request: &GenerationRequest,
    registry: &SourceRegistry,
    cache: &ImpactCache,
    provider: &dyn ImpactProvider,
) -> Result<LoadedImpacts> {
    let mut pairs: BTreeMap<(String, ImpactType), Vec<HazardImpacts>> = BTreeMap::new();
    for &hazard in &request.hazards {
        for (exposure, impact) in registry.exposure_impacts(&request.country, hazard)? {
            let source = registry.lookup(&request.country, hazard, exposure, *impact)?;
            let key = |climate_scenario| ImpactKey {
                hazard,
                exposure: exposure.clone(),
                impact: *impact,
                climate_scenario,
            };
            let historical = cache.load(&key(ClimateScenario::Historical), source, provider)?;
            let scenario = match request.climate_scenario {
                ClimateScenario::Historical => None,
                s => Some(cache.load(&key(s), source, provider)?),
            };
            pairs
                .entry((exposure.clone(), *impact))
                .or_default()
                .push(HazardImpacts { historical, scenario });
        }
    }
    info!(
        "loaded impacts for {} exposure/impact pairs ({}, {})",
        pairs.len(),
        request.country,
        request.climate_scenario
    );
    Ok(LoadedImpacts { pairs })
}

/// The template, shortened to the requested years and checked against the
/// request's measures.
pub fn prepare_template(request: &GenerationRequest, template: &InputWorkbook) -> Result<InputWorkbook> {
    let mut workbook = template.clone();
    if let Some(n) = request.n_sim_years {
        if n > workbook.n_sim_years() {
            return Err(Error::InvalidInput(format!(
                "requested {n} simulated years but the template only has {}",
                workbook.n_sim_years()
            )));
        }
        workbook.truncate_to_n_years(n);
    }
    request.measures.validate(&workbook)?;
    Ok(workbook)
}

/// Workbook column an exposure/impact pair is written to, if it has one.
fn target_column(workbook: &InputWorkbook, exposure: &str, impact: ImpactType) -> Option<String> {
    if exposure.eq_ignore_ascii_case(HOUSING) {
        return (impact == ImpactType::AssetLoss).then(|| HOUSING_COLUMN.to_string());
    }
    let index = workbook.sector_index(exposure).ok()?;
    workbook.sector_column(index, impact).ok()
}

/// Sample one set of shocks into a copy of `template`.
///
/// Per exposure/impact pair: one year-set per hazard, combined with cap 1,
/// blended from historical to scenario, scaled by measures, capped at 1.
pub fn sample_input(
    impacts: &LoadedImpacts,
    template: &InputWorkbook,
    measures: &Measures,
    rng: &mut impl Rng,
) -> Result<InputWorkbook> {
    let mut workbook = template.clone();
    workbook.set_impacts_to_zero();
    let n = workbook.n_sim_years();

    for ((exposure, impact), hazards) in &impacts.pairs {
        let Some(column) = target_column(&workbook, exposure, *impact) else {
            debug!("no workbook column for {exposure} / {impact}; skipping");
            continue;
        };

        let historical: Vec<YearSet> = hazards
            .iter()
            .map(|h| sample_year_set(&h.historical, n, rng))
            .collect::<Result<_>>()?;
        let historical = combine(&historical, EXPOSURE_CAP)?;

        let scenario: Vec<YearSet> = hazards
            .iter()
            .filter_map(|h| h.scenario.as_ref())
            .map(|d| sample_year_set(d, n, rng))
            .collect::<Result<_>>()?;
        let annual = if scenario.is_empty() {
            historical
        } else {
            blend(&historical, &combine(&scenario, EXPOSURE_CAP)?, rng)?
        };

        let adapted = YearSet::new(measures.apply(exposure, annual.into_inner())).capped(EXPOSURE_CAP);
        for scenario in workbook.scenarios().to_vec() {
            workbook.set_scenario_column(&scenario, &column, adapted.values(), true)?;
        }
    }
    Ok(workbook)
}

/// Load, sample and return one input workbook.
pub fn generate_input(
    request: &GenerationRequest,
    registry: &SourceRegistry,
    cache: &ImpactCache,
    provider: &dyn ImpactProvider,
    template: &InputWorkbook,
    rng: &mut impl Rng,
) -> Result<InputWorkbook> {
    let template = prepare_template(request, template)?;
    let impacts = load_impacts(request, registry, cache, provider)?;
    sample_input(&impacts, &template, &request.measures, rng)
}

/// `sample_{number:03}.json`; batch inputs are numbered from 1.
pub fn input_file_name(number: usize) -> String {
    format!("sample_{number:03}.json")
}

/// Write `batch.n_inputs` sampled workbooks into `batch.output_dir`.
///
/// Seeds for every input are drawn from `batch.seed` before any sampling,
/// so skipping existing files does not change the others. Returns the path
/// of every input in the batch, skipped or written.
pub fn generate_many(
    request: &GenerationRequest,
    registry: &SourceRegistry,
    cache: &ImpactCache,
    provider: &dyn ImpactProvider,
    template: &InputWorkbook,
    batch: &BatchOptions,
) -> Result<Vec<PathBuf>> {
    let mut master = ChaCha20Rng::seed_from_u64(batch.seed);
    let jobs: Vec<(PathBuf, u64)> = (0..batch.n_inputs)
        .map(|i| {
            let seed = master.random_range(1..MAX_INPUT_SEED);
            (batch.output_dir.join(input_file_name(i + 1)), seed)
        })
        .collect();

    let todo: Vec<&(PathBuf, u64)> = jobs
        .iter()
        .filter(|(path, _)| {
            let skip = path.exists() && !batch.overwrite;
            if skip {
                info!("{} exists; skipping", path.display());
            }
            !skip
        })
        .collect();

    if !todo.is_empty() {
        std::fs::create_dir_all(&batch.output_dir)?;
        let template = prepare_template(request, template)?;
        let impacts = load_impacts(request, registry, cache, provider)?;

        todo.par_iter()
            .map(|(path, seed)| write_input(&impacts, &template, &request.measures, path, *seed, batch.overwrite))
            .collect::<Result<Vec<()>>>()?;
    }

    Ok(jobs.into_iter().map(|(path, _)| path).collect())
}

fn write_input(
    impacts: &LoadedImpacts,
    template: &InputWorkbook,
    measures: &Measures,
    path: &Path,
    seed: u64,
    overwrite: bool,
) -> Result<()> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let workbook = sample_input(impacts, template, measures, &mut rng)?;
    workbook.export(path, overwrite)?;
    debug!("seed {seed} → {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::thailand_catalogue;
    use crate::workbook::tests::workbook;

    fn request(climate_scenario: ClimateScenario) -> GenerationRequest {
        GenerationRequest {
            country: "thailand".to_string(),
            climate_scenario,
            hazards: vec![Hazard::Flood],
            n_sim_years: None,
            measures: Measures::default(),
        }
    }

    fn scenario_column<'a>(wb: &'a InputWorkbook, column: &str) -> &'a [f64] {
        wb.sheet("Scenario").and_then(|s| s.column(column)).unwrap()
    }

    #[test]
    fn writes_housing_and_sector_columns() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImpactCache::new(dir.path(), false).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let wb = generate_input(
            &request(ClimateScenario::Rcp85),
            &SourceRegistry::canonical(),
            &cache,
            &thailand_catalogue(),
            &workbook(200),
            &mut rng,
        )
        .unwrap();

        for column in [HOUSING_COLUMN, "exo_D_1_1", "exo_D_N_2_1", "exo_D_K_5_1"] {
            let values = scenario_column(&wb, column);
            assert_eq!(values.len(), 200);
            assert!(values.iter().all(|v| (0.0..=1.0).contains(v)), "{column}");
            assert!(values.iter().any(|&v| v > 0.0), "{column} never shocked");
        }
        // The baseline is never touched.
        assert!(wb.sheet("Baseline").unwrap().column(HOUSING_COLUMN).is_none());
    }

    #[test]
    fn same_seed_gives_same_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImpactCache::new(dir.path(), true).unwrap();
        let provider = thailand_catalogue();
        let registry = SourceRegistry::canonical();
        let run = |seed| {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            generate_input(&request(ClimateScenario::Rcp85), &registry, &cache, &provider, &workbook(50), &mut rng)
                .unwrap()
        };
        let (a, b, c) = (run(7), run(7), run(8));
        assert_eq!(scenario_column(&a, HOUSING_COLUMN), scenario_column(&b, HOUSING_COLUMN));
        assert_ne!(scenario_column(&a, HOUSING_COLUMN), scenario_column(&c, HOUSING_COLUMN));
    }

    #[test]
    fn measures_scale_the_shocks() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImpactCache::new(dir.path(), false).unwrap();
        let mut req = request(ClimateScenario::Historical);
        req.n_sim_years = Some(30);
        req.measures = Measures::new(BTreeMap::from([("housing".to_string(), vec![0.0; 30])]));
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let wb = generate_input(
            &req,
            &SourceRegistry::canonical(),
            &cache,
            &thailand_catalogue(),
            &workbook(40),
            &mut rng,
        )
        .unwrap();
        assert_eq!(wb.n_sim_years(), 30);
        assert!(scenario_column(&wb, HOUSING_COLUMN).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn too_many_years_are_rejected() {
        let mut req = request(ClimateScenario::Historical);
        req.n_sim_years = Some(100);
        assert!(matches!(prepare_template(&req, &workbook(10)), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn batch_writes_numbered_files_and_skips_existing() {
        let cache_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let cache = ImpactCache::new(cache_dir.path(), true).unwrap();
        let batch = BatchOptions {
            output_dir: out.path().join("inputs"),
            n_inputs: 3,
            seed: 42,
            overwrite: false,
        };
        let provider = thailand_catalogue();
        let registry = SourceRegistry::canonical();
        let req = request(ClimateScenario::Rcp85);

        let paths = generate_many(&req, &registry, &cache, &provider, &workbook(20), &batch).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("sample_001.json"));
        assert!(paths[2].ends_with("sample_003.json"));
        assert!(!out.path().join("inputs").join("sample_000.json").exists());
        assert!(paths.iter().all(|p| p.exists()));

        let first = std::fs::read_to_string(&paths[0]).unwrap();
        std::fs::remove_file(&paths[1]).unwrap();
        generate_many(&req, &registry, &cache, &provider, &workbook(20), &batch).unwrap();
        assert!(paths[1].exists());
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), first);
    }

    #[test]
    fn unknown_country_fails_before_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImpactCache::new(dir.path(), false).unwrap();
        let mut req = request(ClimateScenario::Rcp85);
        req.country = "atlantis".to_string();
        let err = load_impacts(&req, &SourceRegistry::canonical(), &cache, &thailand_catalogue());
        assert!(matches!(err, Err(Error::UnknownKey(_))));
    }
}
