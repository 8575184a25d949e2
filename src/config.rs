//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for webmend, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults matching the recorded-test replay contract
//! - Legacy variable names used by earlier tooling
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEBMEND_GEMINI_API_KEY` | API key for the recovery oracle | (unset: recovery disabled) |
//! | `WEBMEND_ORACLE_MODEL` | Oracle model name | `gemini-2.5-flash` |
//! | `WEBMEND_ORACLE_ENDPOINT` | Full oracle endpoint URL override | derived from model |
//! | `WEBMEND_ORACLE_TIMEOUT` | Oracle request timeout (seconds) | `60` |
//! | `WEBMEND_ORACLE_CONNECT_TIMEOUT` | Oracle connection timeout (seconds) | `10` |
//! | `WEBMEND_DOM_LIMIT` | Max DOM snapshot characters sent to the oracle | `8000` |
//! | `WEBMEND_STEP_TIMEOUT_MS` | Per-step browser action timeout (ms) | `5000` |
//! | `WEBMEND_SETTLE_DELAY_MS` | Settling delay after each successful step (ms) | `250` |
//! | `WEBMEND_HEADLESS` | Run the browser headless (`true`/`false`) | `true` |
//!
//! # Example
//!
//! ```bash
//! export WEBMEND_GEMINI_API_KEY="..."
//! export WEBMEND_ORACLE_MODEL="gemini-2.5-flash"
//! export WEBMEND_SETTLE_DELAY_MS=0
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default oracle model name
pub const DEFAULT_ORACLE_MODEL: &str = "gemini-2.5-flash";

/// Default oracle request timeout (seconds)
pub const DEFAULT_ORACLE_TIMEOUT: u64 = 60;

/// Default oracle connection timeout (seconds)
pub const DEFAULT_ORACLE_CONNECT_TIMEOUT: u64 = 10;

/// Default maximum DOM snapshot length sent to the oracle (characters)
pub const DEFAULT_DOM_LIMIT: usize = 8000;

/// Default per-step browser action timeout (milliseconds)
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5000;

/// Default settling delay applied after each successful step (milliseconds)
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 250;

/// Base URL for the generative language service
pub const ORACLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the oracle API key
pub const ENV_API_KEY: &str = "WEBMEND_GEMINI_API_KEY";

/// Environment variable for the oracle model name
pub const ENV_ORACLE_MODEL: &str = "WEBMEND_ORACLE_MODEL";

/// Environment variable for a full oracle endpoint URL override
pub const ENV_ORACLE_ENDPOINT: &str = "WEBMEND_ORACLE_ENDPOINT";

/// Environment variable for the oracle request timeout
pub const ENV_ORACLE_TIMEOUT: &str = "WEBMEND_ORACLE_TIMEOUT";

/// Environment variable for the oracle connection timeout
pub const ENV_ORACLE_CONNECT_TIMEOUT: &str = "WEBMEND_ORACLE_CONNECT_TIMEOUT";

/// Environment variable for the DOM snapshot limit
pub const ENV_DOM_LIMIT: &str = "WEBMEND_DOM_LIMIT";

/// Environment variable for the per-step timeout
pub const ENV_STEP_TIMEOUT_MS: &str = "WEBMEND_STEP_TIMEOUT_MS";

/// Environment variable for the settling delay
pub const ENV_SETTLE_DELAY_MS: &str = "WEBMEND_SETTLE_DELAY_MS";

/// Environment variable for headless mode
pub const ENV_HEADLESS: &str = "WEBMEND_HEADLESS";

// ============================================================================
// Legacy Environment Variable Support (names used by earlier tooling)
// ============================================================================

/// Legacy environment variable for the oracle API key
pub const ENV_API_KEY_LEGACY: &str = "GEMINI_API_KEY";

/// Legacy environment variable for the oracle model name
pub const ENV_ORACLE_MODEL_LEGACY: &str = "GEMINI_MODEL";

/// Legacy environment variable for headless mode
pub const ENV_HEADLESS_LEGACY: &str = "HEADLESS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for webmend
#[derive(Debug, Clone)]
pub struct Config {
    /// Recovery oracle configuration
    pub oracle: OracleSettings,
    /// Step execution configuration
    pub runner: RunnerSettings,
}

/// Recovery-oracle-related settings
#[derive(Debug, Clone)]
pub struct OracleSettings {
    /// API key; `None` disables recovery
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Full endpoint URL override (`None` means derive from the model name)
    pub endpoint: Option<String>,
    /// Request timeout (seconds)
    pub request_timeout: u64,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Maximum DOM snapshot length (characters)
    pub dom_limit: usize,
}

/// Step-execution-related settings
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Per-step browser action timeout (milliseconds)
    pub step_timeout_ms: u64,
    /// Settling delay after each successful step (milliseconds)
    pub settle_delay_ms: u64,
    /// Whether the browser runs headless
    pub headless: bool,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            oracle: OracleSettings::from_env(),
            runner: RunnerSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            oracle: OracleSettings::defaults(),
            runner: RunnerSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl OracleSettings {
    /// Create oracle settings from environment variables
    pub fn from_env() -> Self {
        Self {
            api_key: env::var(ENV_API_KEY)
                .or_else(|_| env::var(ENV_API_KEY_LEGACY))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: env::var(ENV_ORACLE_MODEL)
                .or_else(|_| env::var(ENV_ORACLE_MODEL_LEGACY))
                .unwrap_or_else(|_| DEFAULT_ORACLE_MODEL.to_string()),
            endpoint: env::var(ENV_ORACLE_ENDPOINT).ok(),
            request_timeout: env::var(ENV_ORACLE_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ORACLE_TIMEOUT),
            connect_timeout: env::var(ENV_ORACLE_CONNECT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ORACLE_CONNECT_TIMEOUT),
            dom_limit: env::var(ENV_DOM_LIMIT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DOM_LIMIT),
        }
    }

    /// Create oracle settings with defaults (no API key: recovery disabled)
    pub fn defaults() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_ORACLE_MODEL.to_string(),
            endpoint: None,
            request_timeout: DEFAULT_ORACLE_TIMEOUT,
            connect_timeout: DEFAULT_ORACLE_CONNECT_TIMEOUT,
            dom_limit: DEFAULT_DOM_LIMIT,
        }
    }

    /// The endpoint URL to call: the explicit override, or the standard
    /// generateContent URL for the configured model.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.clone(),
            None => format!("{}/{}:generateContent", ORACLE_API_BASE, self.model),
        }
    }
}

impl RunnerSettings {
    /// Create runner settings from environment variables
    pub fn from_env() -> Self {
        Self {
            step_timeout_ms: env::var(ENV_STEP_TIMEOUT_MS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STEP_TIMEOUT_MS),
            settle_delay_ms: env::var(ENV_SETTLE_DELAY_MS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            headless: env::var(ENV_HEADLESS)
                .or_else(|_| env::var(ENV_HEADLESS_LEGACY))
                .map(|s| parse_bool(&s))
                .unwrap_or(true),
        }
    }

    /// Create runner settings with defaults
    pub fn defaults() -> Self {
        Self {
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            headless: true,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a boolean environment value ("true"/"1"/"t"/"yes" are truthy)
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "t" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool("t"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.oracle.model, DEFAULT_ORACLE_MODEL);
        assert!(config.oracle.api_key.is_none());
        assert_eq!(config.runner.step_timeout_ms, DEFAULT_STEP_TIMEOUT_MS);
        assert_eq!(config.runner.settle_delay_ms, DEFAULT_SETTLE_DELAY_MS);
        assert!(config.runner.headless);
    }

    #[test]
    fn test_endpoint_url_derived_from_model() {
        let settings = OracleSettings::defaults();
        assert_eq!(
            settings.endpoint_url(),
            format!(
                "{}/{}:generateContent",
                ORACLE_API_BASE, DEFAULT_ORACLE_MODEL
            )
        );
    }

    #[test]
    fn test_endpoint_url_override() {
        let mut settings = OracleSettings::defaults();
        settings.endpoint = Some("http://127.0.0.1:9999/v1beta".to_string());
        assert_eq!(settings.endpoint_url(), "http://127.0.0.1:9999/v1beta");
    }
}
