//! Sample one year-set and dump it as NDJSON.
//!
//! One `{"year": i, "impact": v}` line per simulated year on stdout; the
//! distribution it was drawn from and summary statistics on stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::error;

use cred_shocks::analysis::column_stats;
use cred_shocks::config::GenerationConfig;
use cred_shocks::types::{ClimateScenario, Hazard, ImpactKey, ImpactType};
use cred_shocks::yearset::sample_year_set;
use cred_shocks::{Error, Result, init_logging};

#[derive(Parser, Debug)]
#[command(name = "yearset", about = "Sample one impact year-set as NDJSON")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "flood")]
    hazard: Hazard,
    #[arg(long, default_value = "housing")]
    exposure: String,
    #[arg(long, default_value = "asset loss")]
    impact: String,
    #[arg(long, default_value = "historical")]
    climate_scenario: ClimateScenario,
    #[arg(long, default_value_t = 100)]
    years: usize,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct YearImpact {
    year: usize,
    impact: f64,
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => GenerationConfig::from_toml_file(path)?,
        None => GenerationConfig::canonical(),
    };
    let impact: ImpactType = cli.impact.parse()?;
    let registry = config.registry()?;
    let source = registry.lookup(&config.country, cli.hazard, &cli.exposure, impact)?;
    let key = ImpactKey {
        hazard: cli.hazard,
        exposure: cli.exposure.to_lowercase(),
        impact,
        climate_scenario: cli.climate_scenario,
    };
    let distribution = config.cache()?.load(&key, source, &config.provider()?)?;

    let mut rng = ChaCha20Rng::seed_from_u64(cli.seed.unwrap_or(config.seed));
    let year_set = sample_year_set(&distribution, cli.years, &mut rng)?;

    for (year, &impact) in year_set.values().iter().enumerate() {
        println!("{}", serde_json::to_string(&YearImpact { year, impact })?);
    }

    let stats = column_stats(year_set.values())
        .ok_or_else(|| Error::InvalidInput("no years sampled".to_string()))?;
    eprintln!(
        "yearset: {key}: {} events, {:?}, aai={:.4}",
        distribution.len(),
        distribution.shape()?,
        distribution.average_annual_impact()
    );
    eprintln!(
        "  years={}  shocks={}  mean={:.4}  p50={:.4}  p95={:.4}  max={:.4}",
        stats.n, stats.shock_years, stats.mean, stats.p50, stats.p95, stats.max
    );
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
