//! Recovery oracle client: asks a generative language model for a
//! replacement locator when a step fails.
//!
//! The oracle gets one shot per failure: one prompt (failed step,
//! preceding steps for context, truncated DOM snapshot), one
//! `generateContent` request, one reply. A missing API key disables
//! recovery with a warning rather than failing, and every transport or
//! service error degrades to "no recovery". The caller alone decides
//! whether the test aborts.
//!
//! # Configuration
//!
//! Oracle settings come from the environment (see [`crate::config`]):
//! - `WEBMEND_GEMINI_API_KEY` (or legacy `GEMINI_API_KEY`)
//! - `WEBMEND_ORACLE_MODEL`, `WEBMEND_ORACLE_ENDPOINT`
//! - `WEBMEND_ORACLE_TIMEOUT`, `WEBMEND_ORACLE_CONNECT_TIMEOUT`
//! - `WEBMEND_DOM_LIMIT`

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{self, OracleSettings};
use crate::step::Step;

/// Context assembled for one recovery attempt, discarded afterwards.
#[derive(Debug)]
pub struct RecoveryContext<'a> {
    /// The step whose execution failed
    pub failed_step: &'a Step,
    /// Steps already executed successfully before the failure
    pub preceding: &'a [Step],
    /// Full-page DOM serialization at the time of failure
    pub dom_snapshot: &'a str,
}

/// Source of replacement locators for failed steps.
#[async_trait]
pub trait RecoveryOracle: Send + Sync {
    /// Propose a repaired step, or `None` when no fix is available.
    /// Must never fail: unavailability is expressed as `None`.
    async fn recover(&self, ctx: &RecoveryContext<'_>) -> Option<Step>;
}

/// Errors inside the oracle client. These never escape [`RecoveryOracle::recover`];
/// they are logged and mapped to `None`.
#[derive(Debug)]
enum OracleError {
    /// curl failed to run or the service was unreachable
    Transport(String),
    /// Reply was not in the expected shape
    InvalidResponse(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Transport(msg) => write!(f, "Transport error: {}", msg),
            OracleError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

/// Recovery oracle backed by the Gemini generateContent API.
pub struct GeminiOracle {
    settings: OracleSettings,
}

impl GeminiOracle {
    /// Create an oracle from the global configuration.
    pub fn new() -> Self {
        Self {
            settings: config::get().oracle.clone(),
        }
    }

    /// Create an oracle with explicit settings.
    pub fn with_settings(settings: OracleSettings) -> Self {
        Self { settings }
    }

    /// Issue exactly one model request and return the raw reply text.
    async fn request(&self, api_key: &str, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": 0.2
            }
        });
        let body_json = serde_json::to_string(&body)
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        let output = Command::new("curl")
            .args([
                "-s",
                "-X",
                "POST",
                &self.settings.endpoint_url(),
                "-H",
                "Content-Type: application/json",
                "-H",
                &format!("x-goog-api-key: {}", api_key),
                "-d",
                &body_json,
                "--connect-timeout",
                &self.settings.connect_timeout.to_string(),
                "--max-time",
                &self.settings.request_timeout.to_string(),
            ])
            .output()
            .await
            .map_err(|e| OracleError::Transport(format!("failed to run curl: {}", e)))?;

        if !output.status.success() {
            return Err(OracleError::Transport(format!(
                "curl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let response: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        extract_reply_text(&response)
    }
}

impl Default for GeminiOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryOracle for GeminiOracle {
    async fn recover(&self, ctx: &RecoveryContext<'_>) -> Option<Step> {
        let Some(api_key) = self.settings.api_key.clone() else {
            eprintln!(
                "Warning: {} not set, selector recovery is disabled.",
                config::ENV_API_KEY
            );
            return None;
        };

        let dom = truncate_dom(ctx.dom_snapshot, self.settings.dom_limit);
        let prompt = build_recovery_prompt(ctx.failed_step, ctx.preceding, dom);

        let reply = match self.request(&api_key, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("Warning: recovery request failed: {}", e);
                return None;
            }
        };

        let candidate = clean_reply(&reply);
        if candidate.is_empty() || Some(candidate.as_str()) == ctx.failed_step.selector.as_deref()
        {
            return None;
        }
        Some(ctx.failed_step.with_selector(candidate))
    }
}

/// Build the recovery prompt: the failed step, the preceding steps for
/// context, the DOM excerpt, and an instruction to answer with exactly
/// one selector.
pub fn build_recovery_prompt(failed_step: &Step, preceding: &[Step], dom_excerpt: &str) -> String {
    let failed_json =
        serde_json::to_string(failed_step).unwrap_or_else(|_| failed_step.describe());
    let preceding_json =
        serde_json::to_string_pretty(preceding).unwrap_or_else(|_| "[]".to_string());
    let selector = failed_step.selector.as_deref().unwrap_or("");

    format!(
        "A recorded browser test step failed.\n\
         Original step: {failed}\n\
         The selector \"{selector}\" was not found.\n\
         \n\
         Here are the previous successful steps:\n\
         {preceding}\n\
         \n\
         Here is the current DOM structure of the page:\n\
         ```html\n\
         {dom}\n\
         ```\n\
         \n\
         Based on the failed step's description (\"{name}\") and the DOM, \
         find a more robust CSS selector for the intended element.\n\
         Respond with ONLY the new CSS selector as a single line of plain text.",
        failed = failed_json,
        selector = selector,
        preceding = preceding_json,
        dom = dom_excerpt,
        name = failed_step.step_name,
    )
}

/// Extract the reply text from a generateContent response body.
fn extract_reply_text(response: &serde_json::Value) -> Result<String, OracleError> {
    response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| OracleError::InvalidResponse("no candidate text in reply".to_string()))
}

/// Strip incidental formatting from a model reply, keeping the first
/// useful line. Code fences and language tags are discarded.
pub fn clean_reply(reply: &str) -> String {
    reply
        .replace('`', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| !matches!(line.to_lowercase().as_str(), "css" | "html" | "text"))
        .unwrap_or("")
        .to_string()
}

/// Bound a DOM snapshot to at most `limit` characters, respecting
/// UTF-8 boundaries.
pub fn truncate_dom(dom: &str, limit: usize) -> &str {
    match dom.char_indices().nth(limit) {
        Some((idx, _)) => &dom[..idx],
        None => dom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_step() -> Step {
        Step {
            action: "click".to_string(),
            selector: Some("#submit".to_string()),
            value: None,
            key: None,
            assertion: None,
            step_name: "Submit the form".to_string(),
        }
    }

    #[test]
    fn test_prompt_embeds_step_context_and_dom() {
        let failed = failed_step();
        let preceding = vec![Step {
            action: "goto".to_string(),
            selector: None,
            value: Some("https://example.com".to_string()),
            key: None,
            assertion: None,
            step_name: "Open site".to_string(),
        }];
        let prompt = build_recovery_prompt(&failed, &preceding, "<button id=\"submit-button\">");
        assert!(prompt.contains("#submit"));
        assert!(prompt.contains("Submit the form"));
        assert!(prompt.contains("https://example.com"));
        assert!(prompt.contains("<button id=\"submit-button\">"));
        assert!(prompt.contains("ONLY the new CSS selector"));
    }

    #[test]
    fn test_clean_reply_plain() {
        assert_eq!(clean_reply("#submit-button"), "#submit-button");
        assert_eq!(clean_reply("  #submit-button \n"), "#submit-button");
    }

    #[test]
    fn test_clean_reply_strips_code_fence() {
        assert_eq!(clean_reply("```css\n#submit-button\n```"), "#submit-button");
        assert_eq!(clean_reply("`#submit-button`"), "#submit-button");
    }

    #[test]
    fn test_clean_reply_empty() {
        assert_eq!(clean_reply(""), "");
        assert_eq!(clean_reply("```\n```"), "");
    }

    #[test]
    fn test_truncate_dom_char_boundary() {
        assert_eq!(truncate_dom("abcdef", 4), "abcd");
        assert_eq!(truncate_dom("abc", 8000), "abc");
        // Multibyte content must not split a character.
        assert_eq!(truncate_dom("äöüß", 2), "äö");
    }

    #[test]
    fn test_extract_reply_text() {
        let response = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "#submit-button" }] }
            }]
        });
        assert_eq!(extract_reply_text(&response).unwrap(), "#submit-button");
        assert!(extract_reply_text(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn test_recover_without_api_key_is_disabled() {
        let oracle = GeminiOracle::with_settings(OracleSettings::defaults());
        let failed = failed_step();
        let ctx = RecoveryContext {
            failed_step: &failed,
            preceding: &[],
            dom_snapshot: "<html></html>",
        };
        assert!(oracle.recover(&ctx).await.is_none());
    }
}
