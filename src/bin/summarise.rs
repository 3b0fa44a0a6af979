//! Per-column shock statistics of an input workbook.
//!
//! Reads the workbook given as the first argument and prints one line per
//! shock column of each scenario. `--json` prints the summaries as NDJSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cred_shocks::analysis::summarise_workbook;
use cred_shocks::workbook::InputWorkbook;
use cred_shocks::{Result, init_logging};

#[derive(Parser, Debug)]
#[command(name = "summarise", about = "Summarise the shocks in an input workbook")]
struct Cli {
    workbook: PathBuf,
    #[arg(long, default_value = "Scenario")]
    scenario: Vec<String>,
    #[arg(long)]
    json: bool,
}

fn run(cli: Cli) -> Result<()> {
    let scenarios: Vec<&str> = cli.scenario.iter().map(String::as_str).collect();
    let workbook = InputWorkbook::open(&cli.workbook, &scenarios)?;

    for scenario in workbook.scenarios() {
        let summary = summarise_workbook(&workbook, scenario)?;
        if cli.json {
            for s in &summary {
                println!("{}", serde_json::to_string(s)?);
            }
            continue;
        }
        println!("=== {scenario} ({} years) ===", workbook.n_sim_years());
        if summary.is_empty() {
            println!("  no shock columns");
        }
        for s in &summary {
            println!("  {s}");
        }
    }
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
