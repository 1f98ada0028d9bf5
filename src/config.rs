//! Configuration for the evaluation engine
//!
//! Reads configuration from `.match-eval.yaml` / `.match-eval.yml` /
//! `.match-eval.json` in the working directory, or from an explicit path.

use crate::evaluator::EvaluationFlags;
use crate::finding::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Evaluation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Allow `pattern-where` predicates to run
    pub allow_arbitrary_code_execution: bool,

    /// Keep the per-unit evaluation traces in the report
    pub collect_traces: bool,
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable parallel processing
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub evaluation: EvaluationConfig,

    pub engine: EngineConfig,

    pub rules: RulesConfig,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };
        Ok(config)
    }

    /// Load configuration from the working directory, or defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load the first configuration file found in `dir`, or defaults
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config_names = [".match-eval.yaml", ".match-eval.yml", ".match-eval.json"];

        for name in &config_names {
            let path: PathBuf = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.evaluation.allow_arbitrary_code_execution {
            self.evaluation.allow_arbitrary_code_execution = true;
        }
        if other.evaluation.collect_traces {
            self.evaluation.collect_traces = true;
        }

        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        // parallel always inherits from other
        self.engine.parallel = other.engine.parallel;

        self.rules.disabled.extend(other.rules.disabled);
        self.rules.severity.extend(other.rules.severity);
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        allow_exec: Option<bool>,
        collect_traces: Option<bool>,
        jobs: Option<usize>,
        disabled_rules: Option<Vec<String>>,
    ) {
        if let Some(allow) = allow_exec {
            self.evaluation.allow_arbitrary_code_execution = allow;
        }
        if let Some(traces) = collect_traces {
            self.evaluation.collect_traces = traces;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
        }
        if let Some(disabled) = disabled_rules {
            self.rules.disabled.extend(disabled);
        }
    }

    /// Check if a rule is enabled
    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        !self.rules.disabled.iter().any(|id| id == rule_id)
    }

    /// Get severity override for a rule
    pub fn get_severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.rules.severity.get(rule_id).copied()
    }

    /// Capabilities granted to every evaluation
    pub fn flags(&self) -> EvaluationFlags {
        EvaluationFlags::allow_exec(self.evaluation.allow_arbitrary_code_execution)
    }
}
