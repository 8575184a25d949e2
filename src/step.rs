//! Step model and test definition persistence.
//!
//! A [`TestDefinition`] is the on-disk record produced by the external
//! recorder: a name, a reserved `variables` mapping, and an ordered list
//! of [`Step`]s. Definitions are read at run start and rewritten in place
//! (pretty-printed JSON, same encoding the recorder emits) immediately
//! after a successful selector repair, so a crash after a repair retains
//! the fix.
//!
//! The `action` field is deliberately kept as a free string: an
//! unsupported action must reach the executor and fail there as a
//! definition error for that one step, not blow up deserialization of the
//! whole file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One recorded action with its execution contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Action verb: `goto`, `click`, `fill`, `press`, `wait`, or `expect`
    pub action: String,

    /// Locator string, required for `click`/`fill`/`press`/`expect`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Action payload: URL for `goto`, text for `fill`, milliseconds for
    /// `wait`; the recorder also stores the `press` key here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Key name for `press` (takes precedence over `value` when present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Assertion name for `expect`, e.g. `toBeVisible`. Kept as a free
    /// string for the same reason as `action`: an unrecognized assertion
    /// fails at execution, for that one step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,

    /// Human-readable label for log lines
    #[serde(rename = "stepName", default)]
    pub step_name: String,
}

impl Step {
    /// Short human-readable description for log lines,
    /// e.g. `click '#submit' (Submit the form)`.
    pub fn describe(&self) -> String {
        let target = self
            .selector
            .as_deref()
            .or(self.value.as_deref())
            .unwrap_or("");
        if self.step_name.is_empty() {
            format!("{} '{}'", self.action, target)
        } else {
            format!("{} '{}' ({})", self.action, target, self.step_name)
        }
    }

    /// Copy of this step with only the selector replaced.
    pub fn with_selector(&self, selector: impl Into<String>) -> Self {
        let mut step = self.clone();
        step.selector = Some(selector.into());
        step
    }
}

/// The persisted, mutable record of one test's steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Test name shown in reports
    #[serde(default)]
    pub name: String,

    /// Reserved parameter mapping; parsed and preserved on rewrite,
    /// never substituted
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Ordered steps; tolerated missing in recorder output
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl TestDefinition {
    /// Load a definition from a JSON file.
    pub fn load(path: &Path) -> DefinitionResult<Self> {
        let data = fs::read_to_string(path)?;
        let def = serde_json::from_str(&data)?;
        Ok(def)
    }

    /// Rewrite the definition to `path` in the recorder's encoding
    /// (pretty-printed JSON). Called immediately after each repair.
    pub fn save(&self, path: &Path) -> DefinitionResult<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Result type for definition operations
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Errors reading or writing a test definition
#[derive(Debug)]
pub enum DefinitionError {
    /// I/O error
    Io(std::io::Error),
    /// Malformed JSON
    Parse(serde_json::Error),
}

impl std::fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionError::Io(e) => write!(f, "I/O error: {}", e),
            DefinitionError::Parse(e) => write!(f, "Malformed definition: {}", e),
        }
    }
}

impl std::error::Error for DefinitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DefinitionError::Io(e) => Some(e),
            DefinitionError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for DefinitionError {
    fn from(e: std::io::Error) -> Self {
        DefinitionError::Io(e)
    }
}

impl From<serde_json::Error> for DefinitionError {
    fn from(e: serde_json::Error) -> Self {
        DefinitionError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r##"{
        "name": "Login flow",
        "variables": {},
        "steps": [
            {"action": "goto", "value": "https://example.com", "stepName": "Open site"},
            {"action": "click", "selector": "#submit", "stepName": "Submit"},
            {"action": "expect", "selector": ".welcome", "assertion": "toBeVisible", "stepName": "Greeting shown"}
        ]
    }"##;

    #[test]
    fn test_deserialize_recorder_shape() {
        let def: TestDefinition = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(def.name, "Login flow");
        assert_eq!(def.steps.len(), 3);
        assert_eq!(def.steps[0].action, "goto");
        assert_eq!(def.steps[1].selector.as_deref(), Some("#submit"));
        assert_eq!(def.steps[2].assertion.as_deref(), Some("toBeVisible"));
        assert_eq!(def.steps[2].step_name, "Greeting shown");
    }

    #[test]
    fn test_missing_steps_and_variables_default_empty() {
        let def: TestDefinition = serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert!(def.steps.is_empty());
        assert!(def.variables.is_empty());
    }

    #[test]
    fn test_unknown_action_survives_parsing() {
        let def: TestDefinition = serde_json::from_str(
            r##"{"name": "x", "steps": [{"action": "hover", "selector": "#a"}]}"##,
        )
        .unwrap();
        assert_eq!(def.steps[0].action, "hover");
    }

    #[test]
    fn test_unknown_assertion_survives_parsing() {
        let def: TestDefinition = serde_json::from_str(
            r##"{"steps": [{"action": "expect", "selector": "#a", "assertion": "toBeHidden"}]}"##,
        )
        .unwrap();
        assert_eq!(def.steps[0].assertion.as_deref(), Some("toBeHidden"));
    }

    #[test]
    fn test_serialize_omits_absent_fields_and_renames_step_name() {
        let step = Step {
            action: "wait".to_string(),
            selector: None,
            value: Some("500".to_string()),
            key: None,
            assertion: None,
            step_name: "Pause".to_string(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["stepName"], "Pause");
        assert!(json.get("selector").is_none());
        assert!(json.get("key").is_none());
        assert!(json.get("assertion").is_none());
    }

    #[test]
    fn test_describe() {
        let def: TestDefinition = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(def.steps[1].describe(), "click '#submit' (Submit)");
        let mut unnamed = def.steps[1].clone();
        unnamed.step_name = String::new();
        assert_eq!(unnamed.describe(), "click '#submit'");
    }

    #[test]
    fn test_with_selector_replaces_only_selector() {
        let def: TestDefinition = serde_json::from_str(SAMPLE).unwrap();
        let repaired = def.steps[1].with_selector("#submit-button");
        assert_eq!(repaired.selector.as_deref(), Some("#submit-button"));
        assert_eq!(repaired.action, def.steps[1].action);
        assert_eq!(repaired.step_name, def.steps[1].step_name);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("login.json");
        let def: TestDefinition = serde_json::from_str(SAMPLE).unwrap();
        def.save(&path).unwrap();
        let reloaded = TestDefinition::load(&path).unwrap();
        assert_eq!(reloaded, def);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = TestDefinition::load(Path::new("/nonexistent/def.json")).unwrap_err();
        assert!(matches!(err, DefinitionError::Io(_)));
    }

    #[test]
    fn test_load_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = TestDefinition::load(&path).unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }
}
