//! Fallback chain for steps whose lifelines ran out.
//!
//! Tiers run once each, in a fixed order: memory recall, human intervention,
//! terminal failure. A disabled or unconfigured tier is skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HumanInterventionConfig;
use crate::error::{InterventionError, StepFailed};
use crate::human::HumanChannel;
use crate::memory::{MemoryService, RecallQuery};
use crate::step::{ResultSource, Step, StepStatus};

/// Audit record of one human-tier attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanIntervention {
    pub timestamp: DateTime<Utc>,
    pub step_index: usize,
    pub capability: String,
    pub arguments: Value,
    pub error_message: String,
    pub human_input: Option<String>,
    pub attempt_number: u32,
    pub lifelines_remaining: u32,
    pub was_successful: bool,
}

/// Result of escalating an exhausted step.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    Memory(Value),
    Human(Value),
    Failed(StepFailed),
}

impl FallbackOutcome {
    /// Provenance of the value, [`ResultSource::None`] for a terminal failure.
    pub fn source(&self) -> ResultSource {
        match self {
            FallbackOutcome::Memory(_) => ResultSource::Memory,
            FallbackOutcome::Human(_) => ResultSource::Human,
            FallbackOutcome::Failed(_) => ResultSource::None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            FallbackOutcome::Memory(value) | FallbackOutcome::Human(value) => Some(value),
            FallbackOutcome::Failed(_) => None,
        }
    }

    pub fn is_recovered(&self) -> bool {
        !matches!(self, FallbackOutcome::Failed(_))
    }
}

/// Outcome plus the human audit record, if the human tier was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub outcome: FallbackOutcome,
    pub intervention: Option<HumanIntervention>,
}

/// Ordered escalation tiers.
#[derive(Clone, Default)]
pub struct FallbackChain {
    memory_enabled: bool,
    memory: Option<Arc<dyn MemoryService>>,
    human_config: HumanInterventionConfig,
    human: Option<Arc<dyn HumanChannel>>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("memory_enabled", &self.memory_enabled)
            .field("has_memory", &self.memory.is_some())
            .field("human_config", &self.human_config)
            .field("has_human", &self.human.is_some())
            .finish()
    }
}

impl FallbackChain {
    pub fn new(memory_enabled: bool, human_config: HumanInterventionConfig) -> Self {
        Self {
            memory_enabled,
            memory: None,
            human_config,
            human: None,
        }
    }

    /// A chain that goes straight to terminal failure.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_human(mut self, human: Arc<dyn HumanChannel>) -> Self {
        self.human = Some(human);
        self
    }

    pub fn memory(&self) -> Option<&Arc<dyn MemoryService>> {
        self.memory.as_ref()
    }

    /// Escalate an exhausted step and move it to `escalated` or `failed`.
    pub async fn escalate(&self, query: &str, step: &mut Step, lifelines_remaining: u32) -> Escalation {
        if let Some(value) = self.try_memory(query, step).await {
            step.set_status(StepStatus::Escalated);
            return Escalation {
                outcome: FallbackOutcome::Memory(value),
                intervention: None,
            };
        }

        let mut intervention = None;
        if let Some(record) = self.try_human(step, lifelines_remaining).await {
            let answer = record
                .human_input
                .as_deref()
                .filter(|_| record.was_successful)
                .map(parse_human_input);
            intervention = Some(record);
            if let Some(value) = answer {
                step.set_status(StepStatus::Escalated);
                return Escalation {
                    outcome: FallbackOutcome::Human(value),
                    intervention,
                };
            }
        }

        step.set_status(StepStatus::Failed);
        let failure = step.to_failure();
        warn!(
            step = failure.step_index,
            capability = %failure.capability,
            attempts = failure.attempts,
            code = %failure.error_code,
            "Fallback chain exhausted; step failed"
        );
        Escalation {
            outcome: FallbackOutcome::Failed(failure),
            intervention,
        }
    }

    async fn try_memory(&self, query: &str, step: &Step) -> Option<Value> {
        if !self.memory_enabled {
            return None;
        }
        let memory = self.memory.as_ref()?;
        match memory.recall(&RecallQuery::for_step(query, step)).await {
            Ok(Some(value)) => {
                info!(step = step.index(), capability = %step.capability(), "Recovered step from memory");
                Some(value)
            }
            Ok(None) => {
                debug!(step = step.index(), "Memory had nothing for step");
                None
            }
            Err(err) => {
                warn!(step = step.index(), error = %err, "Memory recall failed");
                None
            }
        }
    }

    async fn try_human(&self, step: &Step, lifelines_remaining: u32) -> Option<HumanIntervention> {
        if !self.human_config.enabled {
            return None;
        }
        let Some(channel) = self.human.as_ref() else {
            debug!(step = step.index(), "Human intervention enabled without a channel");
            return None;
        };

        let error_message = step
            .last_failure()
            .map(|f| f.message.clone())
            .unwrap_or_default();
        let message = self.compose_prompt(step, &error_message, lifelines_remaining);
        let timeout = self.human_config.timeout();

        let human_input = match tokio::time::timeout(timeout, channel.prompt(&message)).await {
            Ok(Ok(Some(answer))) if !answer.trim().is_empty() => Some(answer.trim().to_string()),
            Ok(Ok(_)) => {
                info!(step = step.index(), "Human declined to answer");
                None
            }
            Ok(Err(InterventionError::Cancelled)) => {
                info!(step = step.index(), "Human intervention cancelled");
                None
            }
            Ok(Err(err)) => {
                warn!(step = step.index(), error = %err, "Human channel failed");
                None
            }
            Err(_) => {
                warn!(
                    step = step.index(),
                    timeout_secs = timeout.as_secs(),
                    "Human intervention timed out"
                );
                None
            }
        };

        Some(HumanIntervention {
            timestamp: Utc::now(),
            step_index: step.index(),
            capability: step.capability().to_string(),
            arguments: step.call().arguments.clone(),
            error_message,
            was_successful: human_input.is_some(),
            human_input,
            attempt_number: step.attempts(),
            lifelines_remaining,
        })
    }

    fn compose_prompt(&self, step: &Step, error_message: &str, lifelines_remaining: u32) -> String {
        let mut message = self.human_config.prompt.clone();
        let _ = write!(message, "\n\nStep {}", step.index());
        if !step.description().is_empty() {
            let _ = write!(message, ": {}", step.description());
        }
        let _ = write!(
            message,
            "\nCapability: {}\nArguments: {}\nLast error: {}\nAttempts: {} (lifelines remaining: {})",
            step.capability(),
            step.call().arguments,
            error_message,
            step.attempts(),
            lifelines_remaining
        );
        message
    }
}

/// Human answers that parse as JSON are kept structured; anything else is a string.
fn parse_human_input(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}
