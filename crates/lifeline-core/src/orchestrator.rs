//! Step orchestrator: runs a task's plan within its step budget.
//!
//! The planner is asked for the next step after every batch. Each admitted
//! step is carried by its own [`StepExecutor`] copy through the lifeline
//! controller and, when exhausted, the fallback chain. In parallel
//! exploratory mode a batch of branches runs concurrently; every branch owns
//! its [`Step`] and hands its report back through its own future.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, HumanInterventionConfig, PlanningMode, StrategyConfig};
use crate::dispatch::ToolDispatcher;
use crate::error::{PlanError, StepFailed};
use crate::fallback::FallbackChain;
use crate::human::HumanChannel;
use crate::injection::FailureInjector;
use crate::memory::{Interaction, MemoryService, ToolUsage};
use crate::planner::{Planner, PlannerDecision, TaskHistory};
use crate::registry::CapabilityRegistry;
use crate::retry::{LifelineController, StepRun};
use crate::step::{PlannedStep, ResultSource, Step, StepReport, StepStatus};

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskOutcome {
    /// The planner concluded with an answer.
    Completed { answer: String },
    /// `max_steps` were spent before the planner concluded.
    StepBudgetExhausted,
    /// A step failed terminally under conservative planning.
    PlanFailed { failure: StepFailed },
    /// The planner itself errored.
    PlannerFailed { message: String },
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed { .. } => "completed",
            TaskOutcome::StepBudgetExhausted => "step_budget_exhausted",
            TaskOutcome::PlanFailed { .. } => "plan_failed",
            TaskOutcome::PlannerFailed { .. } => "planner_failed",
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            TaskOutcome::Completed { answer } => Some(answer),
            _ => None,
        }
    }

    /// The task-ending error, if the outcome is one.
    pub fn error(&self) -> Option<PlanError> {
        match self {
            TaskOutcome::PlanFailed { failure } => Some(PlanError::PlanFailed(failure.clone())),
            TaskOutcome::PlannerFailed { message } => Some(PlanError::Planner(message.clone())),
            _ => None,
        }
    }
}

/// Everything recorded about one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub session_id: Uuid,
    pub query: String,
    pub outcome: TaskOutcome,
    pub steps: Vec<StepReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Summary handed to the memory service.
    pub fn interaction(&self) -> Interaction {
        Interaction {
            session_id: self.session_id,
            query: self.query.clone(),
            answer: self.outcome.answer().map(str::to_string),
            outcome: self.outcome.as_str().to_string(),
            tools: self.steps.iter().map(ToolUsage::from).collect(),
            recorded_at: self.finished_at,
        }
    }

    /// Steps that reached terminal failure.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed)
    }
}

/// Runs one step from dispatch to final report.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    controller: LifelineController,
    fallback: FallbackChain,
}

impl StepExecutor {
    pub fn new(controller: LifelineController, fallback: FallbackChain) -> Self {
        Self { controller, fallback }
    }

    pub async fn execute(&self, query: &str, index: usize, planned: PlannedStep) -> StepReport {
        let mut step = Step::new(index, planned);

        match self.controller.run(&mut step).await {
            StepRun::Succeeded(value) => StepReport::new(step, ResultSource::Tool, Some(value)),
            StepRun::Exhausted(exhausted) => {
                info!(
                    step = index,
                    capability = %step.capability(),
                    attempts = exhausted.attempts,
                    "Lifelines exhausted; escalating"
                );
                let remaining = self.controller.policy().lifelines_remaining(exhausted.attempts);
                let escalation = self.fallback.escalate(query, &mut step, remaining).await;
                let source = escalation.outcome.source();
                let output = escalation.outcome.value().cloned();
                StepReport::new(step, source, output).with_intervention(escalation.intervention)
            }
        }
    }
}

/// Drives tasks from query to [`TaskResult`].
pub struct StepOrchestrator {
    executor: StepExecutor,
    planner: Arc<dyn Planner>,
    strategy: StrategyConfig,
    tools: Vec<String>,
}

impl StepOrchestrator {
    pub fn new(dispatcher: ToolDispatcher, planner: Arc<dyn Planner>, strategy: StrategyConfig) -> Self {
        let tools = dispatcher.registry().describe();
        let controller = LifelineController::new(dispatcher, strategy.retry_policy());
        Self {
            executor: StepExecutor::new(
                controller,
                FallbackChain::new(strategy.memory_fallback_enabled, HumanInterventionConfig::default()),
            ),
            planner,
            strategy,
            tools,
        }
    }

    /// Wire an orchestrator from configuration: the failure injector when
    /// simulation is enabled, and the fallback tier switches.
    pub fn from_config(
        config: &EngineConfig,
        registry: Arc<CapabilityRegistry>,
        planner: Arc<dyn Planner>,
    ) -> Self {
        let mut dispatcher = ToolDispatcher::new(registry);
        if config.tool_simulation.enabled {
            dispatcher = dispatcher.with_injector(Arc::new(FailureInjector::new(config.tool_simulation.clone())));
        }
        let fallback = FallbackChain::new(
            config.strategy.memory_fallback_enabled,
            config.human_intervention.clone(),
        );
        Self::new(dispatcher, planner, config.strategy.clone()).with_fallback(fallback)
    }

    pub fn with_fallback(mut self, fallback: FallbackChain) -> Self {
        self.executor.fallback = fallback;
        self
    }

    /// Attach a memory service, used for recall and for storing task summaries.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.executor.fallback = self.executor.fallback.with_memory(memory);
        self
    }

    pub fn with_human(mut self, human: Arc<dyn HumanChannel>) -> Self {
        self.executor.fallback = self.executor.fallback.with_human(human);
        self
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub async fn run(&self, query: &str) -> TaskResult {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(session = %session_id, query = %query, "Starting task");

        let mut history = TaskHistory::new(query, self.tools.clone(), self.strategy.max_steps);
        let outcome = self.drive(&mut history).await;

        let result = TaskResult {
            session_id,
            query: query.to_string(),
            outcome,
            steps: history.reports,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            session = %session_id,
            outcome = result.outcome.as_str(),
            steps = result.steps.len(),
            "Task finished"
        );

        self.summarize(&result).await;
        result
    }

    async fn drive(&self, history: &mut TaskHistory) -> TaskOutcome {
        let max_steps = self.strategy.max_steps;
        let mut next_index = 0;

        loop {
            let decision = match self.planner.next_step(history).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(error = %err, "Planner failed");
                    return TaskOutcome::PlannerFailed {
                        message: err.to_string(),
                    };
                }
            };

            let planned = match decision {
                PlannerDecision::Complete { answer } => return TaskOutcome::Completed { answer },
                PlannerDecision::Next(step) => vec![step],
                PlannerDecision::Branches(steps) if steps.is_empty() => {
                    return TaskOutcome::PlannerFailed {
                        message: "planner returned no branches".to_string(),
                    };
                }
                PlannerDecision::Branches(steps) => steps,
            };

            if next_index >= max_steps {
                warn!(max_steps, "Step budget exhausted before the planner concluded");
                return TaskOutcome::StepBudgetExhausted;
            }

            let batch = self.admit(planned, max_steps - next_index);
            let reports = self.execute_batch(&history.query, next_index, batch).await;
            next_index += reports.len();

            let halt = self.strategy.planning_mode == PlanningMode::Conservative;
            let mut failure = None;
            for report in reports {
                if failure.is_none() && halt {
                    failure = report.error.clone();
                }
                history.record(report);
            }
            if let Some(failure) = failure {
                warn!(
                    step = failure.step_index,
                    capability = %failure.capability,
                    "Conservative plan halted on failed step"
                );
                return TaskOutcome::PlanFailed { failure };
            }
        }
    }

    /// Trim a planner batch to what the mode and budget allow.
    fn admit(&self, mut planned: Vec<PlannedStep>, budget: usize) -> Vec<PlannedStep> {
        let limit = match self.strategy.planning_mode {
            PlanningMode::Conservative => 1,
            PlanningMode::Exploratory => budget,
        };
        if planned.len() > limit {
            warn!(
                requested = planned.len(),
                admitted = limit,
                "Dropping branches beyond the step budget"
            );
            planned.truncate(limit);
        }
        planned
    }

    async fn execute_batch(&self, query: &str, first_index: usize, batch: Vec<PlannedStep>) -> Vec<StepReport> {
        if self.strategy.runs_parallel() && batch.len() > 1 {
            debug!(branches = batch.len(), "Dispatching branches concurrently");
            let branches = batch.into_iter().enumerate().map(|(offset, planned)| {
                let executor = self.executor.clone();
                async move { executor.execute(query, first_index + offset, planned).await }
            });
            return join_all(branches).await;
        }

        let mut reports = Vec::with_capacity(batch.len());
        for (offset, planned) in batch.into_iter().enumerate() {
            reports.push(self.executor.execute(query, first_index + offset, planned).await);
        }
        reports
    }

    async fn summarize(&self, result: &TaskResult) {
        let Some(memory) = self.executor.fallback.memory() else {
            return;
        };
        if let Err(err) = memory.summarize_and_store(&result.interaction()).await {
            warn!(session = %result.session_id, error = %err, "Failed to store task summary");
        }
    }
}
