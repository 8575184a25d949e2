//! Suite orchestration: run every test definition in a directory.
//!
//! Discovery is deterministic: all `*.json` files directly in the suite
//! directory, sorted by file name. Tests run sequentially, each with its
//! own browser session, and a test that cannot even start (unreadable
//! definition, browser launch failure) counts as failed without aborting
//! the rest of the suite.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RunnerSettings;
use crate::runner::{run_test, RunResult};

/// Result type for suite operations
pub type SuiteResult<T> = Result<T, SuiteError>;

/// Errors preventing the suite from running
#[derive(Debug)]
pub enum SuiteError {
    /// Suite directory could not be read
    Discovery(std::io::Error),
}

impl std::fmt::Display for SuiteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuiteError::Discovery(e) => write!(f, "Could not read suite directory: {}", e),
        }
    }
}

impl std::error::Error for SuiteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SuiteError::Discovery(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SuiteError {
    fn from(e: std::io::Error) -> Self {
        SuiteError::Discovery(e)
    }
}

/// Aggregated outcome of a suite run.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    /// Per-test results in discovery order
    pub results: Vec<RunResult>,
}

impl SuiteReport {
    /// Number of passed tests
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Number of failed tests
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    /// Process exit code: zero only when every discovered test passed.
    /// An empty suite is a pass.
    pub fn exit_code(&self) -> i32 {
        if self.failed_count() == 0 { 0 } else { 1 }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let total = self.results.len();
        let failed = self.failed_count();
        if failed == 0 {
            format!("All {} tests passed.", total)
        } else {
            format!("{} of {} tests failed.", failed, total)
        }
    }
}

/// List the test definition files in `dir`: every `*.json` directly in
/// the directory, sorted by file name. Subdirectories are not descended.
pub fn discover_tests(dir: &Path) -> SuiteResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Run every test definition in `dir` sequentially and print a summary.
pub async fn run_suite(dir: &Path, settings: &RunnerSettings) -> SuiteResult<SuiteReport> {
    let paths = discover_tests(dir)?;
    if paths.is_empty() {
        println!("No test definitions (*.json) found in {}", dir.display());
        return Ok(SuiteReport { results: vec![] });
    }

    println!(
        "[{}] Starting suite: {} ({} tests)",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        dir.display(),
        paths.len()
    );

    let mut results = Vec::with_capacity(paths.len());
    for path in &paths {
        println!("----------------------------------------");
        let result = match run_test(path, settings).await {
            Ok(result) => result,
            Err(e) => {
                // A test that cannot start is a failed test, not a
                // failed suite.
                eprintln!("Error: {}: {}", path.display(), e);
                RunResult {
                    test_name: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.display().to_string()),
                    passed: false,
                    failed_step_index: None,
                }
            }
        };
        println!(
            "  {} ... {}",
            result.test_name,
            if result.passed { "PASSED" } else { "FAILED" }
        );
        results.push(result);
    }

    let report = SuiteReport { results };
    println!("========================================");
    println!(
        "[{}] {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        report.summary()
    );
    Ok(report)
}
