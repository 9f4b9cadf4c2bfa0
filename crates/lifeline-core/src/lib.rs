//! # Lifeline Core - Resilient Step Execution
//!
//! This crate carries out the steps of a reasoning agent's plan and keeps
//! the task alive when the tools behind those steps fail.
//!
//! ## Components
//!
//! - **Capability Registry**: routes a capability name to the single provider serving it
//! - **Failure Injector**: seeded, probabilistic synthetic failures for simulation runs
//! - **Tool Dispatcher**: one call in, a value or a classified [`ToolFailure`] out
//! - **Lifeline Retry Controller**: primary attempt plus a bounded number of retries
//! - **Fallback Chain**: memory recall, then human intervention with a timeout
//! - **Step Orchestrator**: runs the plan within `max_steps`, sequentially or in parallel
//!
//! ## Example
//!
//! ```rust,ignore
//! use lifeline_core::{CapabilityRegistry, EngineConfig, StepOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::load_from_file("lifeline.yaml")?;
//!     let registry = CapabilityRegistry::from_descriptors(&config.providers, providers)?;
//!
//!     let orchestrator = StepOrchestrator::from_config(&config, Arc::new(registry), planner)
//!         .with_memory(memory);
//!
//!     let result = orchestrator.run("What is 5 + 3?").await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod human;
pub mod injection;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod retry;
pub mod step;
pub mod tool;

pub use config::{
    BackoffConfig, ConfigError, EngineConfig, ExplorationMode, FailureInjectionPolicy,
    FailureType, HumanInterventionConfig, PlanningMode, StrategyConfig,
};
pub use dispatch::ToolDispatcher;
pub use error::{
    DispatchError, FailureKind, InterventionError, MemoryError, PlanError, ProviderError,
    RegistryError, StepExhausted, StepFailed, ToolFailure,
};
pub use fallback::{Escalation, FallbackChain, FallbackOutcome, HumanIntervention};
pub use human::HumanChannel;
pub use injection::FailureInjector;
pub use memory::{Interaction, MemoryService, RecallQuery, ToolUsage};
pub use orchestrator::{StepExecutor, StepOrchestrator, TaskOutcome, TaskResult};
pub use planner::{Planner, PlannerDecision, TaskHistory};
pub use registry::{CapabilityRegistry, Registration, RegistryBuilder};
pub use retry::{Backoff, LifelineController, RetryPolicy, StepRun, Transition, next_transition};
pub use step::{FailureRecord, PlannedStep, ResultSource, Step, StepReport, StepStatus};
pub use tool::{CapabilityProvider, ProviderDescriptor, ToolCall};
