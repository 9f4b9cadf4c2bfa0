//! # Engine Configuration
//!
//! Static YAML configuration for the resilience engine, with optional
//! environment overrides applied on top of the file.
//!
//! ## Environment Variables
//!
//! - `LIFELINE_MAX_STEPS` - Step budget per task
//! - `LIFELINE_MAX_LIFELINES` - Retries granted after each primary attempt
//! - `LIFELINE_PLANNING_MODE` - `conservative` or `exploratory`
//! - `LIFELINE_SIMULATION_ENABLED` - Enable failure injection (`true`/`false`)
//! - `LIFELINE_FAILURE_RATE` - Injection probability in `[0, 1]`
//! - `LIFELINE_HUMAN_TIMEOUT_SECS` - Human intervention wait in seconds

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::FailureKind;
use crate::retry::{Backoff, RetryPolicy};
use crate::tool::ProviderDescriptor;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration value for '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// How the orchestrator reacts to a step that ends in terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningMode {
    /// Halt the plan on the first terminal step failure.
    #[default]
    Conservative,
    /// Keep going; the planner decides whether to branch or skip.
    Exploratory,
}

impl FromStr for PlanningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(PlanningMode::Conservative),
            "exploratory" => Ok(PlanningMode::Exploratory),
            other => Err(format!("unknown planning mode '{other}'")),
        }
    }
}

/// Whether exploratory branches may run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationMode {
    #[default]
    Sequential,
    Parallel,
}

/// Optional delay between lifeline retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 50,
            max_ms: 1_000,
            jitter: true,
        }
    }
}

/// Step budget, lifelines and fallback switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub planning_mode: PlanningMode,
    pub exploration_mode: ExplorationMode,
    pub memory_fallback_enabled: bool,
    pub max_steps: usize,
    pub max_lifelines_per_step: u32,
    /// Absent means retries are immediate.
    pub retry_backoff: Option<BackoffConfig>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            planning_mode: PlanningMode::Conservative,
            exploration_mode: ExplorationMode::Sequential,
            memory_fallback_enabled: true,
            max_steps: 3,
            max_lifelines_per_step: 3,
            retry_backoff: None,
        }
    }
}

impl StrategyConfig {
    /// The retry policy applied uniformly to every step.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_lifelines_per_step);
        match &self.retry_backoff {
            Some(backoff) => policy.with_backoff(Backoff {
                initial: Duration::from_millis(backoff.initial_ms),
                max: Duration::from_millis(backoff.max_ms),
                jitter: backoff.jitter,
            }),
            None => policy,
        }
    }

    /// Concurrent dispatch only happens for exploratory, parallel plans.
    pub fn runs_parallel(&self) -> bool {
        self.planning_mode == PlanningMode::Exploratory
            && self.exploration_mode == ExplorationMode::Parallel
    }
}

/// Human escalation tier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanInterventionConfig {
    pub enabled: bool,
    pub prompt: String,
    pub timeout_seconds: u64,
}

impl Default for HumanInterventionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prompt: "Tool execution failed. Please provide the expected output:".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl HumanInterventionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// One weighted synthetic failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureType {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub message: String,
    pub probability: f64,
}

impl FailureType {
    pub fn new(kind: FailureKind, message: impl Into<String>, probability: f64) -> Self {
        Self {
            kind,
            message: message.into(),
            probability,
        }
    }
}

/// Process-wide failure injection settings (`tool_simulation` in YAML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureInjectionPolicy {
    pub enabled: bool,
    /// Probability in `[0, 1]` that a dispatch is forced to fail.
    pub failure_rate: f64,
    /// Fixed seed for reproducible sampling.
    pub seed: Option<u64>,
    pub failure_types: Vec<FailureType>,
}

impl Default for FailureInjectionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_rate: 0.0,
            seed: None,
            failure_types: Vec::new(),
        }
    }
}

impl FailureInjectionPolicy {
    /// The distribution used by the bundled sample configuration.
    pub fn standard_failure_types() -> Vec<FailureType> {
        vec![
            FailureType::new(FailureKind::Timeout, "Tool execution timed out", 0.4),
            FailureType::new(FailureKind::Connection, "Failed to connect to tool server", 0.3),
            FailureType::new(FailureKind::Validation, "Invalid tool arguments", 0.2),
            FailureType::new(FailureKind::Permission, "Permission denied", 0.1),
        ]
    }

    pub fn enabled(failure_rate: f64, failure_types: Vec<FailureType>) -> Self {
        Self {
            enabled: true,
            failure_rate,
            seed: None,
            failure_types,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check rate and weight bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ConfigError::invalid(
                "tool_simulation.failure_rate",
                format!("{} is outside [0, 1]", self.failure_rate),
            ));
        }
        for ft in &self.failure_types {
            if !ft.probability.is_finite() || ft.probability < 0.0 {
                return Err(ConfigError::invalid(
                    "tool_simulation.failure_types",
                    format!("probability {} for '{}' is negative", ft.probability, ft.kind),
                ));
            }
        }
        if !self.failure_types.is_empty() {
            let total: f64 = self.failure_types.iter().map(|ft| ft.probability).sum();
            if (total - 1.0).abs() > 1e-6 {
                warn!(total, "Failure type probabilities do not sum to 1; weights will be normalized");
            }
        }
        Ok(())
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy: StrategyConfig,
    pub human_intervention: HumanInterventionConfig,
    pub tool_simulation: FailureInjectionPolicy,
    pub providers: Vec<ProviderDescriptor>,
}

impl EngineConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_yaml(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate bounds that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy.max_steps == 0 {
            return Err(ConfigError::invalid("strategy.max_steps", "must be at least 1"));
        }
        if let Some(backoff) = &self.strategy.retry_backoff {
            if backoff.initial_ms > backoff.max_ms {
                return Err(ConfigError::invalid(
                    "strategy.retry_backoff",
                    format!("initial_ms {} exceeds max_ms {}", backoff.initial_ms, backoff.max_ms),
                ));
            }
        }
        if self.human_intervention.enabled && self.human_intervention.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "human_intervention.timeout_seconds",
                "must be at least 1 when human intervention is enabled",
            ));
        }
        self.tool_simulation.validate()
    }

    /// Apply `LIFELINE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then re-validate.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(steps) = parse_var::<usize, _>(&lookup, "LIFELINE_MAX_STEPS")? {
            self.strategy.max_steps = steps;
        }
        if let Some(lifelines) = parse_var::<u32, _>(&lookup, "LIFELINE_MAX_LIFELINES")? {
            self.strategy.max_lifelines_per_step = lifelines;
        }
        if let Some(mode) = parse_var::<PlanningMode, _>(&lookup, "LIFELINE_PLANNING_MODE")? {
            self.strategy.planning_mode = mode;
        }
        if let Some(enabled) = parse_var::<bool, _>(&lookup, "LIFELINE_SIMULATION_ENABLED")? {
            self.tool_simulation.enabled = enabled;
        }
        if let Some(rate) = parse_var::<f64, _>(&lookup, "LIFELINE_FAILURE_RATE")? {
            self.tool_simulation.failure_rate = rate;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "LIFELINE_HUMAN_TIMEOUT_SECS")? {
            self.human_intervention.timeout_seconds = secs;
        }
        self.validate()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(None),
    }
}
