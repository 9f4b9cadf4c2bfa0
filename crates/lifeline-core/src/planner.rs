//! Planner interface and the history it plans from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{PlanError, StepFailed};
use crate::step::{PlannedStep, StepReport};

/// Number of failed steps remembered for the planner.
pub const RECENT_FAILURE_WINDOW: usize = 3;

/// What the planner wants to happen next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerDecision {
    /// Run one step.
    Next(PlannedStep),
    /// Run several alternative steps. Only exploratory plans honor more
    /// than the first.
    Branches(Vec<PlannedStep>),
    /// Stop with a final answer.
    Complete { answer: String },
}

/// Everything the planner may look at when choosing the next step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub query: String,
    /// Capabilities on offer, one description line each.
    pub tools: Vec<String>,
    pub reports: Vec<StepReport>,
    pub recent_failures: VecDeque<StepFailed>,
    pub steps_remaining: usize,
}

impl TaskHistory {
    pub fn new(query: impl Into<String>, tools: Vec<String>, max_steps: usize) -> Self {
        Self {
            query: query.into(),
            tools,
            reports: Vec::new(),
            recent_failures: VecDeque::with_capacity(RECENT_FAILURE_WINDOW),
            steps_remaining: max_steps,
        }
    }

    pub(crate) fn record(&mut self, report: StepReport) {
        if let Some(failure) = &report.error {
            if self.recent_failures.len() == RECENT_FAILURE_WINDOW {
                self.recent_failures.pop_front();
            }
            self.recent_failures.push_back(failure.clone());
        }
        self.steps_remaining = self.steps_remaining.saturating_sub(1);
        self.reports.push(report);
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.reports.last()
    }
}

/// Chooses steps; the engine never looks inside.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn next_step(&self, history: &TaskHistory) -> Result<PlannerDecision, PlanError>;
}
