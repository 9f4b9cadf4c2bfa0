//! Memory double with a fixed recall answer.

use async_trait::async_trait;
use lifeline_core::{Interaction, MemoryError, MemoryService, RecallQuery};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Returns the same recall answer every time and keeps what it was given.
#[derive(Debug, Default)]
pub struct StaticMemory {
    answer: Option<Value>,
    fail: bool,
    recalls: AtomicUsize,
    queries: Mutex<Vec<RecallQuery>>,
    stored: Mutex<Vec<Interaction>>,
}

impl StaticMemory {
    /// Recall always yields `value`.
    pub fn returning(value: Value) -> Self {
        Self {
            answer: Some(value),
            ..Self::default()
        }
    }

    /// Recall always finds nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every operation fails with a backend error.
    pub fn broken() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn recall_count(&self) -> usize {
        self.recalls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<RecallQuery> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stored(&self) -> Vec<Interaction> {
        self.stored.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl MemoryService for StaticMemory {
    async fn summarize_and_store(&self, interaction: &Interaction) -> Result<(), MemoryError> {
        if self.fail {
            return Err(MemoryError::Backend("static memory is broken".into()));
        }
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interaction.clone());
        Ok(())
    }

    async fn recall(&self, query: &RecallQuery) -> Result<Option<Value>, MemoryError> {
        self.recalls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.clone());
        if self.fail {
            return Err(MemoryError::Backend("static memory is broken".into()));
        }
        Ok(self.answer.clone())
    }
}
