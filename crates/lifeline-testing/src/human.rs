//! Human channel doubles.

use async_trait::async_trait;
use lifeline_core::{HumanChannel, InterventionError};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What the scripted person does when prompted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanScript {
    Respond(String),
    /// Respond after a delay.
    RespondAfter(Duration, String),
    /// Return without an answer.
    Decline,
    /// Never answer.
    Silent,
    Cancel,
}

/// A [`HumanChannel`] that follows a [`HumanScript`] and records prompts.
#[derive(Debug)]
pub struct ScriptedHuman {
    script: HumanScript,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new(script: HumanScript) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(answer: impl Into<String>) -> Self {
        Self::new(HumanScript::Respond(answer.into()))
    }

    pub fn silent() -> Self {
        Self::new(HumanScript::Silent)
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl HumanChannel for ScriptedHuman {
    async fn prompt(&self, message: &str) -> Result<Option<String>, InterventionError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());

        match &self.script {
            HumanScript::Respond(answer) => Ok(Some(answer.clone())),
            HumanScript::RespondAfter(delay, answer) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(answer.clone()))
            }
            HumanScript::Decline => Ok(None),
            HumanScript::Silent => std::future::pending().await,
            HumanScript::Cancel => Err(InterventionError::Cancelled),
        }
    }
}
