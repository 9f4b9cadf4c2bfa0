//! Per-capability success statistics.

use lifeline_core::{Interaction, StepReport, StepStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Successful tool resolutions out of all calls of one capability.
///
/// Only values produced by the tool itself count as successes; a step
/// rescued by memory or a human counts against the tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStats {
    pub successes: u32,
    pub total: u32,
}

impl ToolStats {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.total)
        }
    }

    fn record(&mut self, succeeded: bool) {
        self.total += 1;
        if succeeded {
            self.successes += 1;
        }
    }
}

/// Success rates over a finished task's step reports.
pub fn tool_success_rates(steps: &[StepReport]) -> BTreeMap<String, ToolStats> {
    let mut stats: BTreeMap<String, ToolStats> = BTreeMap::new();
    for step in steps {
        stats
            .entry(step.capability.clone())
            .or_default()
            .record(step.status == StepStatus::Succeeded);
    }
    stats
}

/// Success rates over stored interactions.
pub fn interaction_success_rates<'a>(
    interactions: impl IntoIterator<Item = &'a Interaction>,
) -> BTreeMap<String, ToolStats> {
    let mut stats: BTreeMap<String, ToolStats> = BTreeMap::new();
    for usage in interactions.into_iter().flat_map(|i| &i.tools) {
        stats
            .entry(usage.capability.clone())
            .or_default()
            .record(usage.status == StepStatus::Succeeded);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lifeline_core::{ResultSource, ToolUsage};
    use serde_json::json;
    use uuid::Uuid;

    fn usage(capability: &str, status: StepStatus) -> ToolUsage {
        ToolUsage {
            capability: capability.into(),
            arguments: json!({}),
            status,
            source: ResultSource::Tool,
            output: None,
            error: None,
        }
    }

    #[test]
    fn test_interaction_rates() {
        let interaction = Interaction {
            session_id: Uuid::new_v4(),
            query: "q".into(),
            answer: None,
            outcome: "completed".into(),
            tools: vec![
                usage("add", StepStatus::Succeeded),
                usage("add", StepStatus::Failed),
                usage("search", StepStatus::Escalated),
            ],
            recorded_at: Utc::now(),
        };

        let stats = interaction_success_rates([&interaction]);
        assert_eq!(stats["add"], ToolStats { successes: 1, total: 2 });
        assert_eq!(stats["search"], ToolStats { successes: 0, total: 1 });
        assert_eq!(stats["add"].rate(), 0.5);
        assert_eq!(ToolStats::default().rate(), 0.0);
    }
}
