//! webmend: a self-healing replay runner for recorded browser tests.
//!
//! Test definitions are JSON files produced by an external recorder. The
//! runner replays each step against a headless Chrome session; when a
//! step's selector no longer matches, it asks a generative-model oracle
//! for a replacement, retries once, and writes a successful repair back
//! into the definition file so the fix persists across runs.
//!
//! # Modules
//!
//! - [`config`]: environment-driven settings
//! - [`step`]: step model and definition persistence
//! - [`driver`]: browser session lifecycle (CDP)
//! - [`executor`]: step planning and execution against a page
//! - [`oracle`]: selector recovery via the generateContent API
//! - [`runner`]: the per-step healing state machine and test runner
//! - [`suite`]: directory discovery and suite aggregation

pub mod config;
pub mod driver;
pub mod executor;
pub mod oracle;
pub mod runner;
pub mod step;
pub mod suite;

pub use config::{Config, OracleSettings, RunnerSettings};
pub use driver::BrowserSession;
pub use executor::{PageExecutor, StepExecutor};
pub use oracle::{GeminiOracle, RecoveryContext, RecoveryOracle};
pub use runner::{run_steps, run_test, RunResult, StepOutcome};
pub use step::{Step, TestDefinition};
pub use suite::{discover_tests, run_suite, SuiteReport};
