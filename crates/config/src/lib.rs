//! Configuration loading and validation for triact.
//!
//! Loads engine settings from a TOML file with serde field defaults, so a
//! partial (or absent) file always yields a usable configuration. Settings
//! cover the loop's ambient knobs: the iteration cap, the fallback answer
//! used when a final turn carries no visible text, and the business-context
//! strings appended to the phase prompts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to an `engine.toml` file:
///
/// ```toml
/// max_iterations = 10
/// fallback_answer = "Sorry, I could not produce an answer this time."
///
/// [context]
/// default = "You are assisting users of the Acme transcription suite."
/// thought = "Prefer summarizing over re-fetching transcripts."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum loop iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Override for the apologetic fallback used when a final answer has
    /// no visible text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_answer: Option<String>,

    /// Business-context strings appended to the phase prompts
    #[serde(default)]
    pub context: ContextConfig,
}

/// Per-phase business contexts with a shared default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Fallback applied to any phase without its own entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            fallback_answer: None,
            context: ContextConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults rather than an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert!(config.fallback_answer.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = EngineConfig {
            max_iterations: 5,
            fallback_answer: Some("No answer available.".into()),
            context: ContextConfig {
                default: Some("shared".into()),
                thought: Some("think context".into()),
                ..ContextConfig::default()
            },
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = EngineConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.max_iterations, 5);
        assert_eq!(parsed.fallback_answer.as_deref(), Some("No answer available."));
        assert_eq!(parsed.context.thought.as_deref(), Some("think context"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed = EngineConfig::from_toml_str("[context]\ndefault = \"x\"\n").unwrap();
        assert_eq!(parsed.max_iterations, 10);
        assert_eq!(parsed.context.default.as_deref(), Some("x"));
        assert!(parsed.context.observation.is_none());
    }

    #[test]
    fn zero_iterations_rejected() {
        let err = EngineConfig::from_toml_str("max_iterations = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = EngineConfig::load_from(Path::new("/nonexistent/engine.toml")).unwrap();
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_iterations = 3").unwrap();
        writeln!(file, "[context]").unwrap();
        writeln!(file, "observation = \"keep summaries short\"").unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(
            config.context.observation.as_deref(),
            Some("keep summaries short")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_iterations = \"lots\"").unwrap();

        let err = EngineConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
