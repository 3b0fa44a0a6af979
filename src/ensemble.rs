use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::solver::Solver;

/// Output file of the unshocked reference run.
pub const BASELINE_OUTPUT: &str = "baseline.json";

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnsembleReport {
    pub baseline: Option<PathBuf>,
    pub completed: Vec<PathBuf>,
    /// Inputs for which the solver produced no output, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl EnsembleReport {
    pub fn n_runs(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Runs the solver over a directory of input workbooks, one at a time.
pub struct Ensemble {
    solver: Solver,
}

impl Ensemble {
    pub fn new(solver: Solver) -> Self {
        Self { solver }
    }

    /// Input workbooks in `input_dir`, sorted by name.
    pub fn inputs(input_dir: &Path) -> Result<Vec<PathBuf>> {
        if !input_dir.is_dir() {
            return Err(Error::FileNotFound(input_dir.to_path_buf()));
        }
        let mut inputs: Vec<PathBuf> = fs::read_dir(input_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        inputs.sort();
        Ok(inputs)
    }

    /// Solve the baseline once, then every input in `input_dir`.
    ///
    /// Runs that end without solver output are recorded and skipped; any
    /// other error stops the batch.
    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<EnsembleReport> {
        let inputs = Self::inputs(input_dir)?;
        fs::create_dir_all(output_dir)?;
        if fs::canonicalize(input_dir)? == fs::canonicalize(output_dir)? {
            return Err(Error::InvalidInput(format!(
                "input and output directories must differ: {}",
                input_dir.display()
            )));
        }
        let Some(first) = inputs.first() else {
            return Err(Error::InvalidInput(format!("no input workbooks in {}", input_dir.display())));
        };
        info!("running {} inputs from {}", inputs.len(), input_dir.display());

        let mut report = EnsembleReport::default();

        // Every input carries the same baseline sheet.
        let baseline = output_dir.join(BASELINE_OUTPUT);
        match self.solver.run(first, &baseline) {
            Ok(()) => report.baseline = Some(baseline),
            Err(e) if e.is_missing_output() => {
                error!("baseline run failed: {e}");
                report.failed.push((baseline, e.to_string()));
            }
            Err(e) => return Err(e),
        }

        for (i, input) in inputs.iter().enumerate() {
            let Some(name) = input.file_name() else { continue };
            let output = output_dir.join(name);
            info!("run {}/{}: {}", i + 1, inputs.len(), input.display());
            match self.solver.run(input, &output) {
                Ok(()) => report.completed.push(output),
                Err(e) if e.is_missing_output() => {
                    warn!("no output for {}: {e}; continuing", input.display());
                    report.failed.push((input.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "ensemble finished: {} completed, {} failed",
            report.completed.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::solver::tests::shell_solver;

    fn write_inputs(dir: &Path, contents: &[&str]) {
        for (i, c) in contents.iter().enumerate() {
            fs::write(dir.join(format!("sample_{i:03}.json")), c).unwrap();
        }
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    #[test]
    fn runs_baseline_then_each_input() {
        let model = tempfile::tempdir().unwrap();
        let inputs = tempfile::tempdir().unwrap();
        let outputs = tempfile::tempdir().unwrap();
        write_inputs(inputs.path(), &["{\"a\":1}", "{\"b\":2}"]);

        let ensemble = Ensemble::new(shell_solver(model.path(), "cp in.json out.json", None));
        let report = ensemble.run(inputs.path(), outputs.path()).unwrap();

        assert_eq!(report.baseline, Some(outputs.path().join(BASELINE_OUTPUT)));
        assert_eq!(report.completed.len(), 2);
        assert!(report.failed.is_empty());
        let second = fs::read_to_string(outputs.path().join("sample_001.json")).unwrap();
        assert_eq!(second, "{\"b\":2}");
    }

    #[test]
    fn runs_without_output_are_skipped() {
        let model = tempfile::tempdir().unwrap();
        let inputs = tempfile::tempdir().unwrap();
        let outputs = tempfile::tempdir().unwrap();
        write_inputs(inputs.path(), &["ok", "skip", "ok"]);

        // Only inputs reading "ok" produce output.
        let script = "grep -q ok in.json && cp in.json out.json; true";
        let ensemble = Ensemble::new(shell_solver(model.path(), script, None));
        let report = ensemble.run(inputs.path(), outputs.path()).unwrap();

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("sample_001.json"));
        assert_eq!(report.n_runs(), 3);
    }

    #[test]
    fn other_errors_abort_the_batch() {
        let model = tempfile::tempdir().unwrap();
        let inputs = tempfile::tempdir().unwrap();
        let outputs = tempfile::tempdir().unwrap();
        write_inputs(inputs.path(), &["x"]);

        let ensemble = Ensemble::new(shell_solver(model.path(), "exit 1", None));
        assert!(matches!(ensemble.run(inputs.path(), outputs.path()), Err(Error::Solver(_))));
    }

    #[test]
    fn same_directory_is_rejected() {
        let model = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path(), &["x"]);
        let ensemble = Ensemble::new(shell_solver(model.path(), "true", None));
        assert!(matches!(ensemble.run(dir.path(), dir.path()), Err(Error::InvalidInput(_))));
    }
}
