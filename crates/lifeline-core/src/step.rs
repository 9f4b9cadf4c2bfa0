//! Steps: one planned action and the record of carrying it out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DispatchError, FailureKind, StepFailed};
use crate::fallback::HumanIntervention;
use crate::tool::ToolCall;

/// Lifecycle of a step.
///
/// `pending → in_progress → succeeded`, or `in_progress → exhausted` once
/// lifelines run out, after which the fallback chain moves the step to
/// `escalated` (a fallback tier answered) or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Succeeded,
    Exhausted,
    Escalated,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Escalated | StepStatus::Failed
        )
    }
}

/// What the planner asks for: a call plus a human-readable intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub call: ToolCall,
    #[serde(default)]
    pub description: String,
}

impl PlannedStep {
    pub fn new(capability: impl Into<String>, arguments: Value) -> Self {
        Self {
            call: ToolCall::new(capability, arguments),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One failed attempt, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub attempt: u32,
    pub error_code: String,
    pub kind: Option<FailureKind>,
    pub message: String,
    pub injected: bool,
}

impl FailureRecord {
    fn from_error(attempt: u32, err: &DispatchError) -> Self {
        let (message, injected) = match err {
            DispatchError::Tool(failure) => (failure.message.clone(), failure.injected),
            other => (other.to_string(), false),
        };
        Self {
            attempt,
            error_code: err.error_code().to_string(),
            kind: err.kind(),
            message,
            injected,
        }
    }
}

/// A step in flight, owned by exactly one controller at a time.
#[derive(Debug, Clone)]
pub struct Step {
    index: usize,
    call: ToolCall,
    description: String,
    attempts: u32,
    status: StepStatus,
    failures: Vec<FailureRecord>,
}

impl Step {
    pub fn new(index: usize, planned: PlannedStep) -> Self {
        Self {
            index,
            call: planned.call,
            description: planned.description,
            attempts: 0,
            status: StepStatus::Pending,
            failures: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn call(&self) -> &ToolCall {
        &self.call
    }

    pub fn capability(&self) -> &str {
        &self.call.capability
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn last_failure(&self) -> Option<&FailureRecord> {
        self.failures.last()
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.status = StepStatus::InProgress;
        self.attempts
    }

    pub(crate) fn record_failure(&mut self, err: &DispatchError) {
        self.failures.push(FailureRecord::from_error(self.attempts, err));
    }

    pub(crate) fn set_status(&mut self, status: StepStatus) {
        self.status = status;
    }

    /// Build the terminal failure for this step from its last recorded error.
    pub fn to_failure(&self) -> StepFailed {
        let last = self.failures.last();
        StepFailed {
            step_index: self.index,
            capability: self.call.capability.clone(),
            attempts: self.attempts,
            error_code: last
                .map(|f| f.error_code.clone())
                .unwrap_or_else(|| "STEP_FAILED".to_string()),
            kind: last.and_then(|f| f.kind),
            message: last
                .map(|f| f.message.clone())
                .unwrap_or_else(|| "step failed".to_string()),
        }
    }
}

/// Where a step's final value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Tool,
    Memory,
    Human,
    None,
}

/// Final, serializable account of one step.
///
/// Failures of every attempt stay attached even when a fallback tier
/// supplied the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub capability: String,
    pub arguments: Value,
    pub description: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub source: ResultSource,
    pub output: Option<Value>,
    pub failures: Vec<FailureRecord>,
    pub error: Option<StepFailed>,
    pub intervention: Option<HumanIntervention>,
}

impl StepReport {
    pub(crate) fn new(step: Step, source: ResultSource, output: Option<Value>) -> Self {
        let error = (step.status == StepStatus::Failed).then(|| step.to_failure());
        Self {
            index: step.index,
            capability: step.call.capability,
            arguments: step.call.arguments,
            description: step.description,
            status: step.status,
            attempts: step.attempts,
            source,
            output,
            failures: step.failures,
            error,
            intervention: None,
        }
    }

    pub(crate) fn with_intervention(mut self, intervention: Option<HumanIntervention>) -> Self {
        self.intervention = intervention;
        self
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, StepStatus::Succeeded | StepStatus::Escalated)
    }

    /// Lifelines consumed beyond the primary attempt.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolFailure;
    use serde_json::json;

    #[test]
    fn test_attempt_bookkeeping() {
        let mut step = Step::new(0, PlannedStep::new("add", json!([5, 3])).with_description("sum"));
        assert_eq!(step.status(), StepStatus::Pending);
        assert_eq!(step.attempts(), 0);

        assert_eq!(step.begin_attempt(), 1);
        assert_eq!(step.status(), StepStatus::InProgress);
        step.record_failure(&DispatchError::Tool(ToolFailure::injected(FailureKind::Timeout, "slow")));

        let record = step.last_failure().unwrap();
        assert_eq!(record.attempt, 1);
        assert_eq!(record.error_code, "TOOL_TIMEOUT");
        assert!(record.injected);
    }

    #[test]
    fn test_failed_report_carries_error() {
        let mut step = Step::new(2, PlannedStep::new("add", json!({})));
        step.begin_attempt();
        step.record_failure(&DispatchError::UnknownCapability("add".into()));
        step.set_status(StepStatus::Failed);

        let report = StepReport::new(step, ResultSource::None, None);
        let error = report.error.as_ref().unwrap();
        assert_eq!(error.step_index, 2);
        assert_eq!(error.error_code, "UNKNOWN_CAPABILITY");
        assert!(!report.succeeded());
        assert_eq!(report.retries(), 0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&StepStatus::InProgress).unwrap(), "\"in_progress\"");
        assert!(StepStatus::Escalated.is_terminal());
        assert!(!StepStatus::Exhausted.is_terminal());
    }
}
