use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Replaced by the model directory in `SolverConfig::args`.
pub const MODEL_DIR_PLACEHOLDER: &str = "{model_dir}";

/// How to invoke the macroeconomic solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory of the solver, holding its input and output files.
    pub model_dir: PathBuf,
    /// File name the solver reads its input from, relative to `model_dir`.
    pub model_input: String,
    /// File name the solver writes its results to, relative to `model_dir`.
    pub model_output: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Runs one solver process per input, blocking until it finishes.
#[derive(Debug, Clone)]
pub struct Solver {
    config: SolverConfig,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn model_input(&self) -> PathBuf {
        self.config.model_dir.join(&self.config.model_input)
    }

    fn model_output(&self) -> PathBuf {
        self.config.model_dir.join(&self.config.model_output)
    }

    /// Solve `input`, copying the solver's results to `output`.
    ///
    /// The output file is the success signal: a non-zero exit that still
    /// produced output only warns.
    pub fn run(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.exists() {
            return Err(Error::FileNotFound(input.to_path_buf()));
        }
        let model_output = self.model_output();
        if model_output.exists() {
            fs::remove_file(&model_output)?;
        }
        fs::copy(input, self.model_input())?;

        let model_dir = self.config.model_dir.to_string_lossy();
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| a.replace(MODEL_DIR_PLACEHOLDER, &model_dir))
            .collect();

        info!("solving {}", input.display());
        let mut child = Command::new(&self.config.executable)
            .args(&args)
            .current_dir(&self.config.model_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::Solver(format!("could not start {}: {e}", self.config.executable.display()))
            })?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if let Some(secs) = self.config.timeout_secs
                && started.elapsed() >= Duration::from_secs(secs)
            {
                warn!("solver exceeded {secs} s on {}; killing it", input.display());
                child.kill()?;
                child.wait()?;
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let produced = model_output.exists();
        match status {
            None if !produced => {
                return Err(Error::Timeout { secs: self.config.timeout_secs.unwrap_or(0) });
            }
            None => warn!("solver timed out but wrote output for {}", input.display()),
            Some(s) if !s.success() && !produced => {
                return Err(Error::Solver(format!("{} on {}", s, input.display())));
            }
            Some(s) if !s.success() => {
                warn!("solver {s} on {} but wrote output; continuing", input.display());
            }
            Some(_) if !produced => return Err(Error::FileNotFound(model_output)),
            Some(_) => {}
        }

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&model_output, output)?;
        info!("solver output written to {}", output.display());
        Ok(())
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;

    /// A `sh -c` solver in `model_dir` running `script`.
    pub(crate) fn shell_solver(model_dir: &Path, script: &str, timeout_secs: Option<u64>) -> Solver {
        Solver::new(SolverConfig {
            executable: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            model_dir: model_dir.to_path_buf(),
            model_input: "in.json".to_string(),
            model_output: "out.json".to_string(),
            timeout_secs,
        })
    }

    fn input(dir: &Path) -> PathBuf {
        let path = dir.join("sample_000.json");
        fs::write(&path, "{\"shock\": 0.25}").unwrap();
        path
    }

    #[test]
    fn copies_input_in_and_output_out() {
        let model = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let solver = shell_solver(model.path(), "cp {model_dir}/in.json {model_dir}/out.json", None);
        let output = work.path().join("results").join("out_000.json");

        solver.run(&input(work.path()), &output).unwrap();
        assert_eq!(fs::read_to_string(output).unwrap(), "{\"shock\": 0.25}");
    }

    #[test]
    fn failing_exit_with_output_is_a_soft_success() {
        let model = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let solver = shell_solver(model.path(), "cp in.json out.json; exit 3", None);
        solver.run(&input(work.path()), &work.path().join("out.json")).unwrap();
    }

    #[test]
    fn failing_exit_without_output_is_an_error() {
        let model = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let solver = shell_solver(model.path(), "exit 2", None);
        let err = solver.run(&input(work.path()), &work.path().join("out.json")).unwrap_err();
        assert!(matches!(err, Error::Solver(_)));
    }

    #[test]
    fn clean_exit_without_output_is_missing_output() {
        let model = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(model.path().join("out.json"), "stale").unwrap();
        let solver = shell_solver(model.path(), "true", None);
        let err = solver.run(&input(work.path()), &work.path().join("out.json")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
        assert!(err.is_missing_output());
    }

    #[test]
    fn slow_solver_is_killed() {
        let model = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let solver = shell_solver(model.path(), "sleep 10", Some(1));
        let started = Instant::now();
        let err = solver.run(&input(work.path()), &work.path().join("out.json")).unwrap_err();
        assert!(matches!(err, Error::Timeout { secs: 1 }));
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[test]
    fn missing_input_is_reported() {
        let model = tempfile::tempdir().unwrap();
        let solver = shell_solver(model.path(), "true", None);
        let err = solver.run(Path::new("/nonexistent/sample.json"), Path::new("out.json")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
