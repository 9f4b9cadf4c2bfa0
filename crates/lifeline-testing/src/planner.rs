//! Planners that follow a script instead of a model.

use async_trait::async_trait;
use lifeline_core::{PlanError, PlannedStep, Planner, PlannerDecision, TaskHistory};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
enum Mode {
    /// Play decisions in order, then complete.
    Script(Mutex<VecDeque<PlannerDecision>>),
    /// Ask for the same step forever.
    Repeat(PlannedStep),
    Fail(String),
}

/// A deterministic [`Planner`].
///
/// Once a script runs out, the planner completes with the last step's
/// output rendered as a string (empty when there is none).
#[derive(Debug)]
pub struct ScriptedPlanner {
    mode: Mode,
    consulted: Mutex<Vec<TaskHistory>>,
}

impl ScriptedPlanner {
    pub fn new(decisions: impl IntoIterator<Item = PlannerDecision>) -> Self {
        Self::with_mode(Mode::Script(Mutex::new(decisions.into_iter().collect())))
    }

    /// One step per decision.
    pub fn steps(steps: impl IntoIterator<Item = PlannedStep>) -> Self {
        Self::new(steps.into_iter().map(PlannerDecision::Next))
    }

    /// Keep asking for `step` until the budget runs out.
    pub fn repeat(step: PlannedStep) -> Self {
        Self::with_mode(Mode::Repeat(step))
    }

    /// Error on every call.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_mode(Mode::Fail(message.into()))
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            consulted: Mutex::new(Vec::new()),
        }
    }

    /// How often the planner was asked for a decision.
    pub fn consultations(&self) -> usize {
        self.consulted.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Histories the planner was shown, in order.
    pub fn histories(&self) -> Vec<TaskHistory> {
        self.consulted.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn next_step(&self, history: &TaskHistory) -> Result<PlannerDecision, PlanError> {
        self.consulted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(history.clone());

        match &self.mode {
            Mode::Script(queue) => {
                let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                Ok(next.unwrap_or_else(|| PlannerDecision::Complete {
                    answer: history
                        .last_report()
                        .and_then(|r| r.output.as_ref())
                        .map(|v| match v.as_str() {
                            Some(s) => s.to_string(),
                            None => v.to_string(),
                        })
                        .unwrap_or_default(),
                }))
            }
            Mode::Repeat(step) => Ok(PlannerDecision::Next(step.clone())),
            Mode::Fail(message) => Err(PlanError::Planner(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_then_complete() {
        let planner = ScriptedPlanner::steps([PlannedStep::new("add", json!([1, 2]))]);
        let history = TaskHistory::new("q", vec![], 3);

        assert!(matches!(planner.next_step(&history).await.unwrap(), PlannerDecision::Next(_)));
        assert_eq!(
            planner.next_step(&history).await.unwrap(),
            PlannerDecision::Complete { answer: String::new() }
        );
        assert_eq!(planner.consultations(), 2);
    }

    #[tokio::test]
    async fn test_failing_planner() {
        let planner = ScriptedPlanner::failing("offline");
        let err = planner.next_step(&TaskHistory::default()).await.unwrap_err();
        assert_eq!(err, PlanError::Planner("offline".into()));
    }
}
