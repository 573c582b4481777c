use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MacroError;

/// Import sources that can name a macro: `ms.macro`, `@scope/style/macro`.
pub const DEFAULT_IMPORT_PATTERN: &str = r"\.macro$|/macro$";

/// Options for one run of the preprocessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MacroConfig {
    /// Regex an import source must match before the registry is consulted.
    pub import_pattern: String,
    /// Parse the module as TypeScript when no program is supplied.
    pub typescript: bool,
    /// Allow JSX when no program is supplied.
    pub jsx: bool,
    /// Upper bound on the whole run, including replacement tasks.
    pub timeout_ms: Option<u64>,
}

impl Default for MacroConfig {
    fn default() -> Self {
        MacroConfig {
            import_pattern: DEFAULT_IMPORT_PATTERN.to_string(),
            typescript: false,
            jsx: false,
            timeout_ms: None,
        }
    }
}

impl MacroConfig {
    /// Every registered source is a macro source, whatever its name.
    pub fn any_source() -> Self {
        MacroConfig {
            import_pattern: String::new(),
            ..MacroConfig::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, MacroError> {
        serde_json::from_str(json).map_err(|e| MacroError::Config {
            message: e.to_string(),
        })
    }

    pub fn import_regex(&self) -> Result<Regex, MacroError> {
        Regex::new(&self.import_pattern).map_err(|e| MacroError::Config {
            message: format!("importPattern {:?}: {}", self.import_pattern, e),
        })
    }

    pub fn source_type(&self) -> SourceType {
        SourceType::default()
            .with_module(true)
            .with_typescript(self.typescript)
            .with_jsx(self.jsx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern() {
        let re = MacroConfig::default().import_regex().unwrap();
        assert!(re.is_match("ms.macro"));
        assert!(re.is_match("@acme/style/macro"));
        assert!(!re.is_match("react"));
        assert!(!re.is_match("./macro.js"));
    }

    #[test]
    fn test_any_source_matches_everything() {
        let re = MacroConfig::any_source().import_regex().unwrap();
        assert!(re.is_match("m"));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = MacroConfig::from_json(r#"{ "typescript": true, "timeoutMs": 250 }"#).unwrap();
        assert!(config.typescript);
        assert!(!config.jsx);
        assert_eq!(config.timeout_ms, Some(250));
        assert_eq!(config.import_pattern, DEFAULT_IMPORT_PATTERN);
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let config = MacroConfig::from_json(r#"{ "importPattern": "(" }"#).unwrap();
        assert_eq!(config.import_regex().unwrap_err().code(), "M-ERR-CONFIG");
    }
}
