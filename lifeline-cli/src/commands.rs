use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lifeline_core::{
    CapabilityProvider, CapabilityRegistry, ConfigError, EngineConfig, FailureInjector,
    FailureKind, MemoryError, MemoryService, PlannedStep, RegistryError, StepOrchestrator,
    TaskResult,
};
use lifeline_memory::{InMemoryStore, SessionLog, SessionMemory, tool_success_rates};
use lifeline_testing::ScriptedPlanner;
use lifeline_tools::standard_providers;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::human::StdinHumanChannel;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("invalid step '{0}': expected CAPABILITY=JSON_ARGS")]
    InvalidStep(String),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Load a config file (or defaults) and apply `LIFELINE_*` overrides.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let mut config = match path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// Registry over the bundled providers, narrowed to the configured ones when
/// the config lists any.
pub fn build_registry(config: &EngineConfig) -> Result<CapabilityRegistry, RegistryError> {
    let providers: Vec<Arc<dyn CapabilityProvider>> = standard_providers();
    if !config.providers.is_empty() {
        return CapabilityRegistry::from_descriptors(&config.providers, providers);
    }
    providers
        .into_iter()
        .fold(CapabilityRegistry::builder(), |builder, provider| builder.register(provider))
        .build()
}

/// Parse `add=[5,3]` into a step. Arguments that are not JSON become a string.
pub fn parse_step(raw: &str) -> Result<PlannedStep, CliError> {
    let (capability, arguments) = raw
        .split_once('=')
        .ok_or_else(|| CliError::InvalidStep(raw.to_string()))?;
    let capability = capability.trim();
    if capability.is_empty() {
        return Err(CliError::InvalidStep(raw.to_string()));
    }
    let arguments = serde_json::from_str(arguments)
        .unwrap_or_else(|_| Value::String(arguments.to_string()));
    Ok(PlannedStep::new(capability, arguments))
}

pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub query: String,
    pub steps: Vec<String>,
    pub memory_dir: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<TaskResult, CliError> {
    let config = load_config(args.config.as_deref())?;
    let registry = Arc::new(build_registry(&config)?);
    let steps = args
        .steps
        .iter()
        .map(|raw| parse_step(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let memory: Arc<dyn MemoryService> = match &args.memory_dir {
        Some(dir) => Arc::new(SessionMemory::open(SessionLog::new(dir))?),
        None => Arc::new(InMemoryStore::new()),
    };

    let mut orchestrator = StepOrchestrator::from_config(
        &config,
        registry,
        Arc::new(ScriptedPlanner::steps(steps)),
    )
    .with_memory(memory);
    if config.human_intervention.enabled {
        orchestrator = orchestrator.with_human(Arc::new(StdinHumanChannel::new()));
    }

    let result = orchestrator.run(&args.query).await;
    for (capability, stats) in tool_success_rates(&result.steps) {
        info!(
            capability = %capability,
            successes = stats.successes,
            total = stats.total,
            "Tool success rate"
        );
    }
    Ok(result)
}

/// Summarize a valid configuration.
pub fn validate(path: &Path) -> Result<Value, CliError> {
    let config = load_config(Some(path))?;
    let registry = build_registry(&config)?;
    Ok(json!({
        "valid": true,
        "planning_mode": config.strategy.planning_mode,
        "exploration_mode": config.strategy.exploration_mode,
        "max_steps": config.strategy.max_steps,
        "max_attempts_per_step": config.strategy.retry_policy().max_attempts(),
        "simulation_enabled": config.tool_simulation.enabled,
        "human_intervention_enabled": config.human_intervention.enabled,
        "capabilities": registry.describe(),
    }))
}

/// Draw `samples` decisions from the configured injector, forced on.
pub fn sample_injector(
    path: Option<&Path>,
    samples: usize,
    rate: Option<f64>,
    seed: Option<u64>,
) -> Result<Value, CliError> {
    let config = load_config(path)?;
    let mut policy = config.tool_simulation;
    policy.enabled = true;
    if let Some(rate) = rate {
        policy.failure_rate = rate;
    }
    if let Some(seed) = seed {
        policy.seed = Some(seed);
    }
    policy.validate()?;

    let injector = FailureInjector::new(policy);
    let mut counts: BTreeMap<FailureKind, usize> = BTreeMap::new();
    let mut passed = 0usize;
    for _ in 0..samples {
        match injector.maybe_fail("sample") {
            Some(failure) => *counts.entry(failure.kind).or_default() += 1,
            None => passed += 1,
        }
    }

    let share = |n: usize| if samples == 0 { 0.0 } else { n as f64 / samples as f64 };
    let kinds: BTreeMap<&str, Value> = counts
        .iter()
        .map(|(kind, &n)| (kind.as_str(), json!({ "count": n, "share": share(n) })))
        .collect();
    Ok(json!({
        "samples": samples,
        "passed": passed,
        "injected": samples - passed,
        "kinds": kinds,
    }))
}
