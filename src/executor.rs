//! Action executor: maps a recorded step to a concrete browser operation.
//!
//! Execution happens in two phases. [`plan`] is a pure classification of
//! the step record: it rejects unsupported actions and missing required
//! fields as definition errors without touching the browser. The
//! [`PageExecutor`] then performs the planned action against a live page,
//! resolving the locator by polling within the per-step timeout.
//!
//! The [`StepExecutor`] trait is the seam the step runner drives, so the
//! recovery state machine can be exercised without a browser.

use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

use crate::config::RunnerSettings;
use crate::step::Step;

/// Poll interval for locator resolution and visibility checks
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result type for executor operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised while executing a step
#[derive(Debug)]
pub enum ExecError {
    /// Contract violation in the definition itself (unsupported action,
    /// missing required field, unparseable wait duration). Fatal, never
    /// recoverable.
    Definition(String),
    /// Runtime action failure (locator missing, not interactable,
    /// timeout, assertion unmet). Recoverable exactly once via the
    /// oracle.
    Action(String),
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Definition(msg) => write!(f, "Step definition error: {}", msg),
            ExecError::Action(msg) => write!(f, "Action failed: {}", msg),
        }
    }
}

impl std::error::Error for ExecError {}

/// A step classified into a concrete browser operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction<'a> {
    /// Navigate to a URL
    Goto(&'a str),
    /// Resolve the locator and click
    Click(&'a str),
    /// Resolve the locator, clear it, and type text
    Fill { selector: &'a str, value: &'a str },
    /// Resolve the locator and press a key
    Press { selector: &'a str, key: &'a str },
    /// Suspend the flow without touching the DOM
    Wait(Duration),
    /// Block until the locator is visible or the timeout elapses
    ExpectVisible(&'a str),
}

/// Classify a step record into a [`PlannedAction`], validating the
/// step's contract. Never touches the browser.
pub fn plan(step: &Step) -> ExecResult<PlannedAction<'_>> {
    match step.action.as_str() {
        "goto" => Ok(PlannedAction::Goto(required_value(step)?)),
        "click" => Ok(PlannedAction::Click(required_selector(step)?)),
        "fill" => Ok(PlannedAction::Fill {
            selector: required_selector(step)?,
            value: required_value(step)?,
        }),
        "press" => Ok(PlannedAction::Press {
            selector: required_selector(step)?,
            // The recorder stores the key in `value`; `key` wins when set.
            key: match step.key.as_deref() {
                Some(k) => k,
                None => required_value(step)?,
            },
        }),
        "wait" => {
            let raw = required_value(step)?;
            let ms: u64 = raw.parse().map_err(|_| {
                ExecError::Definition(format!(
                    "wait value '{}' is not a non-negative integer",
                    raw
                ))
            })?;
            Ok(PlannedAction::Wait(Duration::from_millis(ms)))
        }
        "expect" => match step.assertion.as_deref() {
            Some("toBeVisible") => Ok(PlannedAction::ExpectVisible(required_selector(step)?)),
            Some(other) => Err(ExecError::Definition(format!(
                "unsupported assertion '{}'",
                other
            ))),
            None => Err(ExecError::Definition(
                "expect step is missing an assertion".to_string(),
            )),
        },
        other => Err(ExecError::Definition(format!(
            "unsupported action '{}'",
            other
        ))),
    }
}

fn required_selector(step: &Step) -> ExecResult<&str> {
    step.selector.as_deref().ok_or_else(|| {
        ExecError::Definition(format!("'{}' step is missing a selector", step.action))
    })
}

fn required_value(step: &Step) -> ExecResult<&str> {
    step.value.as_deref().ok_or_else(|| {
        ExecError::Definition(format!("'{}' step is missing a value", step.action))
    })
}

/// Executes steps against some target. The step runner only sees this
/// trait; the production implementation is [`PageExecutor`].
#[async_trait]
pub trait StepExecutor: Send {
    /// Execute one step to completion.
    async fn execute(&mut self, step: &Step) -> ExecResult<()>;

    /// Serialize the current DOM, for building a recovery context.
    async fn dom_snapshot(&mut self) -> ExecResult<String>;
}

/// Executes steps against a live CDP page.
pub struct PageExecutor {
    page: Page,
    step_timeout: Duration,
    settle_delay: Duration,
}

impl PageExecutor {
    /// Create an executor for `page` using the given runner settings.
    pub fn new(page: Page, settings: &RunnerSettings) -> Self {
        Self {
            page,
            step_timeout: Duration::from_millis(settings.step_timeout_ms),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
        }
    }

    /// Poll for an element matching `selector` until the step timeout.
    async fn resolve(&self, selector: &str) -> ExecResult<Element> {
        let deadline = Instant::now() + self.step_timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if Instant::now() < deadline => sleep(POLL_INTERVAL).await,
                Err(_) => {
                    return Err(ExecError::Action(format!(
                        "element '{}' not found within {}ms",
                        selector,
                        self.step_timeout.as_millis()
                    )));
                }
            }
        }
    }

    /// Poll a visibility predicate for `selector` until the step timeout.
    async fn wait_visible(&self, selector: &str) -> ExecResult<()> {
        // Selector is embedded as a JSON string literal so quoting in
        // recorded selectors cannot break the expression.
        let sel_literal = serde_json::to_string(selector)
            .map_err(|e| ExecError::Action(format!("selector not encodable: {}", e)))?;
        let expr = format!(
            "(() => {{ \
                const el = document.querySelector({sel}); \
                if (!el) return false; \
                const style = window.getComputedStyle(el); \
                if (style.display === 'none' || style.visibility === 'hidden') return false; \
                const rect = el.getBoundingClientRect(); \
                return rect.width > 0 && rect.height > 0; \
            }})()",
            sel = sel_literal
        );

        let deadline = Instant::now() + self.step_timeout;
        loop {
            let visible = self
                .page
                .evaluate(expr.as_str())
                .await
                .ok()
                .and_then(|v| v.into_value::<bool>().ok())
                .unwrap_or(false);
            if visible {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ExecError::Action(format!(
                    "element '{}' not visible within {}ms",
                    selector,
                    self.step_timeout.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn perform(&self, action: PlannedAction<'_>) -> ExecResult<()> {
        match action {
            PlannedAction::Goto(url) => {
                match timeout(self.step_timeout, self.page.goto(url)).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(ExecError::Action(format!(
                        "navigation to '{}' failed: {}",
                        url, e
                    ))),
                    Err(_) => Err(ExecError::Action(format!(
                        "navigation to '{}' timed out after {}ms",
                        url,
                        self.step_timeout.as_millis()
                    ))),
                }
            }
            PlannedAction::Click(selector) => {
                let element = self.resolve(selector).await?;
                element
                    .click()
                    .await
                    .map_err(|e| ExecError::Action(format!("click on '{}' failed: {}", selector, e)))?;
                Ok(())
            }
            PlannedAction::Fill { selector, value } => {
                let element = self.resolve(selector).await?;
                element.click().await.map_err(|e| {
                    ExecError::Action(format!("failed to focus '{}': {}", selector, e))
                })?;
                // Clear any recorded-over content before typing.
                element
                    .call_js_fn(
                        "function() { this.value = ''; \
                         this.dispatchEvent(new Event('input', { bubbles: true })); }",
                        false,
                    )
                    .await
                    .map_err(|e| {
                        ExecError::Action(format!("failed to clear '{}': {}", selector, e))
                    })?;
                element.type_str(value).await.map_err(|e| {
                    ExecError::Action(format!("failed to type into '{}': {}", selector, e))
                })?;
                Ok(())
            }
            PlannedAction::Press { selector, key } => {
                let element = self.resolve(selector).await?;
                element.press_key(key).await.map_err(|e| {
                    ExecError::Action(format!("pressing '{}' on '{}' failed: {}", key, selector, e))
                })?;
                Ok(())
            }
            PlannedAction::Wait(duration) => {
                sleep(duration).await;
                Ok(())
            }
            PlannedAction::ExpectVisible(selector) => self.wait_visible(selector).await,
        }
    }
}

#[async_trait]
impl StepExecutor for PageExecutor {
    async fn execute(&mut self, step: &Step) -> ExecResult<()> {
        let action = plan(step)?;
        self.perform(action).await?;
        // Settling delay so pages visibly catch up between steps.
        // Zero-able via config; not a correctness requirement.
        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }
        Ok(())
    }

    async fn dom_snapshot(&mut self) -> ExecResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| ExecError::Action(format!("DOM serialization failed: {}", e)))
    }
}
