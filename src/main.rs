use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{error, info};

use cred_shocks::config::GenerationConfig;
use cred_shocks::ensemble::Ensemble;
use cred_shocks::generate::{generate_input, generate_many};
use cred_shocks::solver::Solver;
use cred_shocks::types::ClimateScenario;
use cred_shocks::workbook::InputWorkbook;
use cred_shocks::{Result, init_logging};

#[derive(Parser, Debug)]
#[command(name = "cred-shocks", about = "Generate climate shock inputs and run the macroeconomic solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Overrides {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    climate_scenario: Option<ClimateScenario>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    n_sim_years: Option<usize>,
    #[arg(long)]
    template: Option<PathBuf>,
    #[arg(long)]
    overwrite: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample one input workbook
    Generate {
        #[command(flatten)]
        overrides: Overrides,
        #[arg(long, default_value = "input.json")]
        output: PathBuf,
    },
    /// Sample a batch of input workbooks
    GenerateMany {
        #[command(flatten)]
        overrides: Overrides,
        #[arg(long)]
        n_inputs: Option<usize>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Fill a workbook with random shocks to exercise the solver
    Dummy {
        #[command(flatten)]
        overrides: Overrides,
        #[arg(long, default_value = "dummy_input.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 0.1)]
        scale: f64,
        #[arg(long, default_value_t = 0.1)]
        frequency: f64,
        #[arg(long, default_value_t = 0.5)]
        bi_scale: f64,
    },
    /// Solve the baseline and every input in a directory
    Run {
        #[command(flatten)]
        overrides: Overrides,
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Check every declared exposure/impact pair has a data source
    ValidateSources {
        #[command(flatten)]
        overrides: Overrides,
    },
}

fn load_config(o: &Overrides) -> Result<GenerationConfig> {
    let mut config = match &o.config {
        Some(path) => GenerationConfig::from_toml_file(path)?,
        None => GenerationConfig::canonical(),
    };
    if let Some(c) = &o.country {
        config.country = c.clone();
    }
    if let Some(s) = o.climate_scenario {
        config.climate_scenario = s;
    }
    if let Some(s) = o.seed {
        config.seed = s;
    }
    if o.n_sim_years.is_some() {
        config.n_sim_years = o.n_sim_years;
    }
    if let Some(t) = &o.template {
        config.template = t.clone();
    }
    config.overwrite |= o.overwrite;
    config.validate()?;
    Ok(config)
}

fn open_template(config: &GenerationConfig) -> Result<InputWorkbook> {
    let scenarios: Vec<&str> = config.scenarios.iter().map(String::as_str).collect();
    InputWorkbook::open(&config.template, &scenarios)
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Generate { overrides, output } => {
            let config = load_config(&overrides)?;
            let registry = config.registry()?;
            let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
            let workbook = generate_input(
                &config.request(),
                &registry,
                &config.cache()?,
                &config.provider()?,
                &open_template(&config)?,
                &mut rng,
            )?;
            workbook.export(&output, config.overwrite)
        }
        Command::GenerateMany { overrides, n_inputs, output_dir } => {
            let mut config = load_config(&overrides)?;
            if let Some(n) = n_inputs {
                config.n_inputs = n;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            let registry = config.registry()?;
            let paths = generate_many(
                &config.request(),
                &registry,
                &config.cache()?,
                &config.provider()?,
                &open_template(&config)?,
                &config.batch(),
            )?;
            info!("{} inputs in {}", paths.len(), config.output_dir.display());
            Ok(())
        }
        Command::Dummy { overrides, output, scale, frequency, bi_scale } => {
            let config = load_config(&overrides)?;
            let mut workbook = open_template(&config)?;
            if let Some(n) = config.n_sim_years {
                workbook.truncate_to_n_years(n);
            }
            let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
            workbook.set_dummy_impacts(scale, frequency, bi_scale, &mut rng)?;
            workbook.export(&output, config.overwrite)
        }
        Command::Run { overrides, input_dir, output_dir } => {
            let config = load_config(&overrides)?;
            let ensemble = Ensemble::new(Solver::new(config.solver()?.clone()));
            let report = ensemble.run(&input_dir, &output_dir)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::ValidateSources { overrides } => {
            let config = load_config(&overrides)?;
            let registry = config.registry()?;
            for country in registry.countries() {
                info!("{country}: all declared exposure/impact pairs have sources");
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
