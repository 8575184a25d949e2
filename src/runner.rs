//! Step runner (self-healing state machine) and test case runner.
//!
//! A step moves through `Pending -> Executed` on first-try success, or
//! `Pending -> Repairing -> Repaired -> Executed/Failed` when the action
//! fails and the oracle is consulted. The escalation is deliberately
//! bounded: at most two executor invocations and one oracle call per
//! step, no recursive healing. Definition errors skip recovery entirely.
//!
//! A successful repair is written through to the definition file at the
//! instant the retry passes, so a crash later in the run retains the fix.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::RunnerSettings;
use crate::driver::{BrowserSession, DriverError};
use crate::executor::{ExecError, PageExecutor, StepExecutor};
use crate::oracle::{GeminiOracle, RecoveryContext, RecoveryOracle};
use crate::step::{DefinitionError, Step, TestDefinition};

/// Terminal outcome of one step, after any repair escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// First attempt succeeded
    Executed,
    /// The oracle's candidate succeeded on retry; carries the repaired
    /// step the caller must persist at this index
    Repaired(Step),
    /// Terminal failure; the enclosing test case aborts
    Failed,
}

/// Result of one test case, aggregated in memory by the suite runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Test name from the definition (or the file stem)
    pub test_name: String,
    /// Whether every step completed
    pub passed: bool,
    /// Index of the step that failed terminally, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step_index: Option<usize>,
}

/// Result type for test case runs
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors preventing a test case from running at all
#[derive(Debug)]
pub enum RunnerError {
    /// Definition could not be loaded
    Definition(DefinitionError),
    /// Browser session could not be opened
    Driver(DriverError),
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerError::Definition(e) => write!(f, "Definition error: {}", e),
            RunnerError::Driver(e) => write!(f, "Driver error: {}", e),
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunnerError::Definition(e) => Some(e),
            RunnerError::Driver(e) => Some(e),
        }
    }
}

impl From<DefinitionError> for RunnerError {
    fn from(e: DefinitionError) -> Self {
        RunnerError::Definition(e)
    }
}

impl From<DriverError> for RunnerError {
    fn from(e: DriverError) -> Self {
        RunnerError::Driver(e)
    }
}

/// Execute the step at `index` with at most one repair escalation.
///
/// Transition summary:
/// - executor succeeds: `Executed`
/// - definition error: `Failed` (the oracle is never consulted)
/// - action error: consult the oracle once
///   - no candidate, or the candidate repeats the broken selector: `Failed`
///   - candidate: retry exactly once; success is `Repaired`, anything
///     else is `Failed`
pub async fn run_step<E, O>(
    executor: &mut E,
    oracle: &O,
    steps: &[Step],
    index: usize,
) -> StepOutcome
where
    E: StepExecutor,
    O: RecoveryOracle + ?Sized,
{
    let step = &steps[index];

    let action_error = match executor.execute(step).await {
        Ok(()) => {
            println!("    ok");
            return StepOutcome::Executed;
        }
        Err(ExecError::Definition(msg)) => {
            eprintln!("    failed: {} [{}]", msg, step.describe());
            return StepOutcome::Failed;
        }
        Err(ExecError::Action(msg)) => msg,
    };

    eprintln!("    failed: {}", action_error);
    println!("    Attempting selector recovery...");

    let snapshot = match executor.dom_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("    Recovery aborted, no DOM snapshot: {}", e);
            return StepOutcome::Failed;
        }
    };

    let ctx = RecoveryContext {
        failed_step: step,
        preceding: &steps[..index],
        dom_snapshot: &snapshot,
    };

    let candidate = match oracle.recover(&ctx).await {
        Some(candidate) => candidate,
        None => {
            eprintln!("    Recovery failed: no replacement selector. [{}]", step.describe());
            return StepOutcome::Failed;
        }
    };

    // An unchanged selector is a no-fix; retrying it would only repeat
    // the same failure.
    if candidate.selector == step.selector {
        eprintln!("    Recovery returned the original selector, treating as no fix.");
        return StepOutcome::Failed;
    }

    println!(
        "    Oracle proposed: \"{}\"",
        candidate.selector.as_deref().unwrap_or("")
    );

    match executor.execute(&candidate).await {
        Ok(()) => {
            println!("    Retry succeeded.");
            StepOutcome::Repaired(candidate)
        }
        Err(e) => {
            eprintln!("    Retry failed: {} [{}]", e, step.describe());
            StepOutcome::Failed
        }
    }
}

/// Drive every step of `def` in order, persisting repairs to `path` as
/// they succeed. Stops at the first terminal failure.
pub async fn run_steps<E, O>(
    executor: &mut E,
    oracle: &O,
    def: &mut TestDefinition,
    path: &Path,
) -> RunResult
where
    E: StepExecutor,
    O: RecoveryOracle + ?Sized,
{
    let total = def.steps.len();
    let mut failed_step_index = None;

    for index in 0..total {
        println!("  Step {}/{}: {}", index + 1, total, def.steps[index].describe());

        match run_step(executor, oracle, &def.steps, index).await {
            StepOutcome::Executed => {}
            StepOutcome::Repaired(repaired) => {
                def.steps[index] = repaired;
                if let Err(e) = def.save(path) {
                    eprintln!("    Could not persist repaired selector: {}", e);
                    failed_step_index = Some(index);
                    break;
                }
                println!("    Repaired selector persisted to {}", path.display());
            }
            StepOutcome::Failed => {
                failed_step_index = Some(index);
                break;
            }
        }
    }

    RunResult {
        test_name: def.name.clone(),
        passed: failed_step_index.is_none(),
        failed_step_index,
    }
}

/// Run one test definition end to end.
///
/// Opens a browser session before the first step and closes it on every
/// exit path; `run_steps` itself is infallible, so the close always runs.
pub async fn run_test(path: &Path, settings: &RunnerSettings) -> RunnerResult<RunResult> {
    let mut def = TestDefinition::load(path)?;
    if def.name.is_empty() {
        def.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
    }
    println!("Running test: {} ({} steps)", def.name, def.steps.len());

    let session = BrowserSession::launch(settings.headless).await?;
    let mut executor = PageExecutor::new(session.page().clone(), settings);
    let oracle = GeminiOracle::new();

    let result = run_steps(&mut executor, &oracle, &mut def, path).await;
    session.close().await;

    if result.passed {
        println!("Test completed successfully: {}", def.name);
    } else {
        eprintln!(
            "Test finished with errors: {} (step {})",
            def.name,
            result.failed_step_index.map(|i| i + 1).unwrap_or(0)
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::executor::ExecResult;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executor driven by a queue of scripted results.
    struct ScriptedExecutor {
        results: VecDeque<ExecResult<()>>,
        calls: usize,
        snapshot_calls: usize,
    }

    impl ScriptedExecutor {
        fn new(results: Vec<ExecResult<()>>) -> Self {
            Self {
                results: results.into(),
                calls: 0,
                snapshot_calls: 0,
            }
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&mut self, _step: &Step) -> ExecResult<()> {
            self.calls += 1;
            self.results.pop_front().unwrap_or(Ok(()))
        }

        async fn dom_snapshot(&mut self) -> ExecResult<String> {
            self.snapshot_calls += 1;
            Ok("<html><body><button id=\"submit-button\"></button></body></html>".to_string())
        }
    }

    /// Oracle answering with a fixed selector (or nothing), counting calls.
    struct FixedOracle {
        selector: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedOracle {
        fn proposing(selector: &'static str) -> Self {
            Self {
                selector: Some(selector),
                calls: AtomicUsize::new(0),
            }
        }

        fn silent() -> Self {
            Self {
                selector: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecoveryOracle for FixedOracle {
        async fn recover(&self, ctx: &RecoveryContext<'_>) -> Option<Step> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.selector.map(|s| ctx.failed_step.with_selector(s))
        }
    }

    fn click_step(selector: &str) -> Step {
        Step {
            action: "click".to_string(),
            selector: Some(selector.to_string()),
            value: None,
            key: None,
            assertion: None,
            step_name: format!("Click {}", selector),
        }
    }

    fn action_error() -> ExecError {
        ExecError::Action("element '#submit' not found within 5000ms".to_string())
    }

    #[tokio::test]
    async fn test_first_try_success_skips_oracle() {
        let mut executor = ScriptedExecutor::new(vec![Ok(())]);
        let oracle = FixedOracle::proposing("#other");
        let steps = vec![click_step("#submit")];

        let outcome = run_step(&mut executor, &oracle, &steps, 0).await;
        assert_eq!(outcome, StepOutcome::Executed);
        assert_eq!(executor.calls, 1);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_definition_error_never_consults_oracle() {
        let mut executor = ScriptedExecutor::new(vec![Err(ExecError::Definition(
            "unsupported action 'hover'".to_string(),
        ))]);
        let oracle = FixedOracle::proposing("#other");
        let steps = vec![click_step("#submit")];

        let outcome = run_step(&mut executor, &oracle, &steps, 0).await;
        assert_eq!(outcome, StepOutcome::Failed);
        assert_eq!(executor.calls, 1);
        assert_eq!(oracle.call_count(), 0);
        assert_eq!(executor.snapshot_calls, 0);
    }

    #[tokio::test]
    async fn test_action_error_with_no_fix_fails() {
        let mut executor = ScriptedExecutor::new(vec![Err(action_error())]);
        let oracle = FixedOracle::silent();
        let steps = vec![click_step("#submit")];

        let outcome = run_step(&mut executor, &oracle, &steps, 0).await;
        assert_eq!(outcome, StepOutcome::Failed);
        assert_eq!(executor.calls, 1);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_retry_success_is_bounded() {
        let mut executor = ScriptedExecutor::new(vec![Err(action_error()), Ok(())]);
        let oracle = FixedOracle::proposing("#submit-button");
        let steps = vec![click_step("#submit")];

        let outcome = run_step(&mut executor, &oracle, &steps, 0).await;
        match outcome {
            StepOutcome::Repaired(step) => {
                assert_eq!(step.selector.as_deref(), Some("#submit-button"));
                assert_eq!(step.step_name, steps[0].step_name);
            }
            other => panic!("Expected Repaired, got {:?}", other),
        }
        // At most two executor invocations and one oracle call per step.
        assert_eq!(executor.calls, 2);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_retry_failure_is_terminal() {
        let mut executor =
            ScriptedExecutor::new(vec![Err(action_error()), Err(action_error())]);
        let oracle = FixedOracle::proposing("#submit-button");
        let steps = vec![click_step("#submit")];

        let outcome = run_step(&mut executor, &oracle, &steps, 0).await;
        assert_eq!(outcome, StepOutcome::Failed);
        // No recursive healing: exactly two executions, one oracle call.
        assert_eq!(executor.calls, 2);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_selector_is_no_fix() {
        let mut executor = ScriptedExecutor::new(vec![Err(action_error())]);
        let oracle = FixedOracle::proposing("#submit");
        let steps = vec![click_step("#submit")];

        let outcome = run_step(&mut executor, &oracle, &steps, 0).await;
        assert_eq!(outcome, StepOutcome::Failed);
        // The echoed selector is not retried.
        assert_eq!(executor.calls, 1);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_oracle_sees_preceding_steps_only() {
        struct ContextCheckingOracle;

        #[async_trait]
        impl RecoveryOracle for ContextCheckingOracle {
            async fn recover(&self, ctx: &RecoveryContext<'_>) -> Option<Step> {
                assert_eq!(ctx.preceding.len(), 1);
                assert_eq!(ctx.preceding[0].action, "goto");
                assert!(ctx.dom_snapshot.contains("submit-button"));
                None
            }
        }

        let mut executor = ScriptedExecutor::new(vec![Ok(()), Err(action_error())]);
        let steps = vec![
            Step {
                action: "goto".to_string(),
                selector: None,
                value: Some("https://example.com".to_string()),
                key: None,
                assertion: None,
                step_name: "Open site".to_string(),
            },
            click_step("#submit"),
        ];

        assert_eq!(
            run_step(&mut executor, &ContextCheckingOracle, &steps, 0).await,
            StepOutcome::Executed
        );
        assert_eq!(
            run_step(&mut executor, &ContextCheckingOracle, &steps, 1).await,
            StepOutcome::Failed
        );
    }

    #[tokio::test]
    async fn test_run_steps_persists_repair_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("login.json");

        let mut def = TestDefinition {
            name: "Login".to_string(),
            variables: Default::default(),
            steps: vec![click_step("#submit"), click_step("#next")],
        };
        def.save(&path).unwrap();

        // Step 1 fails once then passes with the repaired selector;
        // step 2 passes first try.
        let mut executor = ScriptedExecutor::new(vec![Err(action_error()), Ok(()), Ok(())]);
        let oracle = FixedOracle::proposing("#submit-button");

        let result = run_steps(&mut executor, &oracle, &mut def, &path).await;
        assert!(result.passed);
        assert_eq!(result.failed_step_index, None);

        let reloaded = TestDefinition::load(&path).unwrap();
        assert_eq!(reloaded.steps[0].selector.as_deref(), Some("#submit-button"));
        assert_eq!(reloaded.steps[0].step_name, "Click #submit");
        assert_eq!(reloaded.steps[1].selector.as_deref(), Some("#next"));
        assert_eq!(reloaded.name, "Login");
    }

    #[tokio::test]
    async fn test_run_steps_aborts_on_terminal_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");

        let mut def = TestDefinition {
            name: "Flow".to_string(),
            variables: Default::default(),
            steps: vec![click_step("#a"), click_step("#b"), click_step("#c")],
        };
        def.save(&path).unwrap();

        let mut executor = ScriptedExecutor::new(vec![Ok(()), Err(action_error())]);
        let oracle = FixedOracle::silent();

        let result = run_steps(&mut executor, &oracle, &mut def, &path).await;
        assert!(!result.passed);
        assert_eq!(result.failed_step_index, Some(1));
        // The third step is never attempted.
        assert_eq!(executor.calls, 2);

        // File untouched: no repair happened.
        let reloaded = TestDefinition::load(&path).unwrap();
        assert_eq!(reloaded.steps[1].selector.as_deref(), Some("#b"));
    }
}
