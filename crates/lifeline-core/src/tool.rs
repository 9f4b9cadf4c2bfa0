//! Capability providers and the calls routed to them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::ProviderError;

/// A request to invoke one capability with JSON arguments.
///
/// `ToolCall` is what a planner hands the engine; the dispatcher resolves
/// the capability to its owning provider. Retries reuse the same call, so
/// arguments are never rewritten between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Capability name, the routing key.
    pub capability: String,
    /// Arguments passed through to the provider untouched.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(capability: impl Into<String>, arguments: Value) -> Self {
        Self {
            capability: capability.into(),
            arguments,
        }
    }
}

/// Static description of a provider, supplied by configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider identifier.
    pub id: String,
    /// Entry point (script, binary or module) the provider is launched from.
    #[serde(default)]
    pub script: Option<String>,
    /// Working directory of the provider.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub description: String,
    /// Capability names this provider serves.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ProviderDescriptor {
    pub fn new<I, S>(id: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            script: None,
            cwd: None,
            description: String::new(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn serves(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// An external endpoint that performs one or more named capabilities.
///
/// Implementations report failures as [`ProviderError`]; the dispatcher
/// classifies them. Providers are shared across concurrent steps, so any
/// internal state must be synchronized.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Describe this provider and the capabilities it serves.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Perform `capability` with `arguments`.
    async fn invoke(&self, capability: &str, arguments: &Value) -> Result<Value, ProviderError>;
}
