//! In-process memory with keyword recall.

use async_trait::async_trait;
use lifeline_core::{Interaction, MemoryError, MemoryService, RecallQuery, StepStatus};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "for", "how", "is", "of", "the", "to", "what", "with",
];

/// Default share of query keywords a stored task must contain to be recalled.
pub const DEFAULT_MIN_SCORE: f64 = 0.5;

/// Interactions kept in memory for the lifetime of the process.
///
/// Recall prefers an earlier successful call with the same capability and
/// identical arguments. Failing that, it returns the answer of the stored
/// task whose query best overlaps the current one.
#[derive(Debug)]
pub struct InMemoryStore {
    interactions: RwLock<Vec<Interaction>>,
    min_score: f64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            interactions: RwLock::new(Vec::new()),
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn insert(&self, interaction: Interaction) {
        self.interactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interaction);
    }

    pub fn len(&self) -> usize {
        self.interactions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous lookup behind [`MemoryService::recall`].
    pub fn lookup(&self, query: &RecallQuery) -> Option<Value> {
        let interactions = self.interactions.read().unwrap_or_else(PoisonError::into_inner);

        // Newest first, so a fresher result wins over an older one.
        let exact = interactions.iter().rev().find_map(|interaction| {
            interaction.tools.iter().find_map(|usage| {
                let reusable = usage.status == StepStatus::Succeeded
                    && usage.capability == query.capability
                    && usage.arguments == query.arguments;
                if reusable { usage.output.clone() } else { None }
            })
        });
        if exact.is_some() {
            debug!(capability = %query.capability, "Recalled identical tool call");
            return exact;
        }

        let wanted = keywords(&format!("{} {}", query.query, query.description));
        if wanted.is_empty() {
            return None;
        }
        let mut best: Option<(f64, &str)> = None;
        for interaction in interactions.iter().rev() {
            let Some(answer) = interaction.answer.as_deref() else {
                continue;
            };
            let score = overlap(&wanted, &keywords(&interaction.query));
            if score >= self.min_score && best.is_none_or(|(top, _)| score > top) {
                best = Some((score, answer));
            }
        }
        best.map(|(score, answer)| {
            debug!(score, "Recalled answer of a similar task");
            Value::String(answer.to_string())
        })
    }
}

#[async_trait]
impl MemoryService for InMemoryStore {
    async fn summarize_and_store(&self, interaction: &Interaction) -> Result<(), MemoryError> {
        self.insert(interaction.clone());
        Ok(())
    }

    async fn recall(&self, query: &RecallQuery) -> Result<Option<Value>, MemoryError> {
        Ok(self.lookup(query))
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Share of `wanted` found in `candidate`.
fn overlap(wanted: &HashSet<String>, candidate: &HashSet<String>) -> f64 {
    wanted.intersection(candidate).count() as f64 / wanted.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lifeline_core::{ResultSource, ToolUsage};
    use serde_json::json;
    use uuid::Uuid;

    fn interaction(query: &str, answer: Option<&str>, tools: Vec<ToolUsage>) -> Interaction {
        Interaction {
            session_id: Uuid::new_v4(),
            query: query.into(),
            answer: answer.map(str::to_string),
            outcome: "completed".into(),
            tools,
            recorded_at: Utc::now(),
        }
    }

    fn usage(capability: &str, arguments: Value, status: StepStatus, output: Option<Value>) -> ToolUsage {
        ToolUsage {
            capability: capability.into(),
            arguments,
            status,
            source: ResultSource::Tool,
            output,
            error: None,
        }
    }

    fn recall_query(query: &str, capability: &str, arguments: Value) -> RecallQuery {
        RecallQuery {
            query: query.into(),
            capability: capability.into(),
            arguments,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_recalls_identical_call() {
        let store = InMemoryStore::new();
        store
            .summarize_and_store(&interaction(
                "sum numbers",
                Some("8"),
                vec![usage("add", json!([5, 3]), StepStatus::Succeeded, Some(json!(8)))],
            ))
            .await
            .unwrap();

        let value = store.recall(&recall_query("anything", "add", json!([5, 3]))).await.unwrap();
        assert_eq!(value, Some(json!(8)));
    }

    #[test]
    fn test_failed_calls_are_not_reused() {
        let store = InMemoryStore::new();
        store.insert(interaction(
            "zzz",
            None,
            vec![usage("add", json!([5, 3]), StepStatus::Failed, None)],
        ));
        assert_eq!(store.lookup(&recall_query("q", "add", json!([5, 3]))), None);
    }

    #[test]
    fn test_keyword_recall_picks_best_match() {
        let store = InMemoryStore::new();
        store.insert(interaction("capital of France", Some("Paris"), vec![]));
        store.insert(interaction("population of France in 2020", Some("67 million"), vec![]));

        let value = store.lookup(&recall_query("What is the capital of France?", "search", json!({})));
        assert_eq!(value, Some(json!("Paris")));
    }

    #[test]
    fn test_weak_match_is_ignored() {
        let store = InMemoryStore::new();
        store.insert(interaction("capital of France", Some("Paris"), vec![]));
        assert!(store.lookup(&recall_query("weather in Tokyo today", "search", json!({}))).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keywords_drop_stopwords() {
        let words = keywords("What is the Sum of 5 and 3?");
        assert!(words.contains("sum"));
        assert!(words.contains("5"));
        assert!(!words.contains("the"));
    }
}
