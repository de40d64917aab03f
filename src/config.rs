use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Pipeline tunables, loaded from `config.toml` when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Hard cap on candidates emitted per run
    pub max_candidates: usize,
    /// Lines shorter than this are discarded as noise
    pub min_line_length: usize,
    /// Context lines searched on each side of a qualifying line
    pub context_window: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_candidates: 50,
            min_line_length: 10,
            context_window: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Weighted score at or above which a record is labelled negative
    pub negative_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            negative_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Confidence deduction per warning
    pub warning_penalty: f64,
    /// Confidence deduction per error
    pub error_penalty: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            warning_penalty: 0.1,
            error_penalty: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Parsed counts below this produce a soft-fail warning
    pub min_expected_candidates: usize,
    /// Parsed counts above this produce a soft-fail warning
    pub max_expected_candidates: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_expected_candidates: 1,
            max_expected_candidates: 40,
        }
    }
}

impl Config {
    /// Load configuration from `config.toml`, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        if !Path::new(config_path).exists() {
            return Ok(Config::default());
        }
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;
        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}
