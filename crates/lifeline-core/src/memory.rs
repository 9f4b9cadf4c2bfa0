//! Memory collaborator interface.
//!
//! The engine only stores summaries and asks for recalls; how a backend
//! summarizes, tags or partitions what it keeps is its own business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::MemoryError;
use crate::step::{ResultSource, Step, StepReport, StepStatus};

/// How one capability call was resolved within a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub capability: String,
    pub arguments: Value,
    pub status: StepStatus,
    pub source: ResultSource,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl From<&StepReport> for ToolUsage {
    fn from(report: &StepReport) -> Self {
        Self {
            capability: report.capability.clone(),
            arguments: report.arguments.clone(),
            status: report.status,
            source: report.source,
            output: report.output.clone(),
            error: report
                .error
                .as_ref()
                .map(|e| e.to_string())
                .or_else(|| report.failures.last().map(|f| f.message.clone())),
        }
    }
}

/// Summary of a finished task handed to [`MemoryService::summarize_and_store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub session_id: Uuid,
    pub query: String,
    pub answer: Option<String>,
    pub outcome: String,
    pub tools: Vec<ToolUsage>,
    pub recorded_at: DateTime<Utc>,
}

/// Context for recalling a value on behalf of an exhausted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallQuery {
    /// The user task the step belongs to.
    pub query: String,
    pub capability: String,
    pub arguments: Value,
    /// What the step was trying to achieve.
    pub description: String,
}

impl RecallQuery {
    pub fn for_step(query: &str, step: &Step) -> Self {
        Self {
            query: query.to_string(),
            capability: step.capability().to_string(),
            arguments: step.call().arguments.clone(),
            description: step.description().to_string(),
        }
    }
}

/// Long-term memory consulted by the fallback chain.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Persist a summary of a finished task.
    async fn summarize_and_store(&self, interaction: &Interaction) -> Result<(), MemoryError>;

    /// Look up a previously stored value usable in place of a failed call.
    async fn recall(&self, query: &RecallQuery) -> Result<Option<Value>, MemoryError>;
}
