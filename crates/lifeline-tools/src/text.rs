//! # Text Provider
//!
//! Text transformation capabilities. Arguments are either a bare JSON string
//! or an object with a `text` field.

use async_trait::async_trait;
use lifeline_core::{CapabilityProvider, ProviderDescriptor, ProviderError};
use serde::Deserialize;
use serde_json::{Value, json};

pub const TEXT_CAPABILITIES: [&str; 3] = ["text_uppercase", "text_reverse", "text_length"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextInput {
    Bare(String),
    Object { text: String },
}

impl TextInput {
    fn into_text(self) -> String {
        match self {
            TextInput::Bare(text) | TextInput::Object { text } => text,
        }
    }
}

/// Text provider, id `text`.
#[derive(Debug, Clone)]
pub struct TextProvider {
    descriptor: ProviderDescriptor,
}

impl TextProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new("text", TEXT_CAPABILITIES)
                .with_description("Text manipulation"),
        }
    }
}

impl Default for TextProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProvider for TextProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, capability: &str, arguments: &Value) -> Result<Value, ProviderError> {
        let text = serde_json::from_value::<TextInput>(arguments.clone())?.into_text();

        let (operation, result) = match capability {
            "text_uppercase" => ("uppercase", json!(text.to_uppercase())),
            "text_reverse" => ("reverse", json!(text.chars().rev().collect::<String>())),
            "text_length" => ("length", json!(text.chars().count())),
            other => return Err(ProviderError::UnsupportedCapability(other.to_string())),
        };

        Ok(json!({
            "original": text,
            "result": result,
            "operation": operation,
        }))
    }
}
