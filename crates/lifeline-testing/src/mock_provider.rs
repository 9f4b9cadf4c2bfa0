//! # Mock Capability Providers
//!
//! A provider that returns predictable values, fails on a script and
//! records every call, so dispatch and retry behavior can be asserted on.

use async_trait::async_trait;
use lifeline_core::{CapabilityProvider, FailureKind, ProviderDescriptor, ProviderError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How many calls fail before the provider starts answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureScript {
    Never,
    First(u32),
    Always,
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub capability: String,
    pub arguments: Value,
}

/// A provider with canned responses and scripted failures.
#[derive(Debug, Clone)]
pub struct MockProvider {
    descriptor: ProviderDescriptor,
    responses: HashMap<String, Value>,
    default_response: Option<Value>,
    script: FailureScript,
    failure_kind: FailureKind,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProvider {
    /// Create a mock serving `capabilities` under `id`.
    pub fn new<I, S>(id: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            descriptor: ProviderDescriptor::new(id, capabilities),
            responses: HashMap::new(),
            default_response: None,
            script: FailureScript::Never,
            failure_kind: FailureKind::Connection,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer `capability` with `value`.
    pub fn with_response(mut self, capability: impl Into<String>, value: Value) -> Self {
        self.responses.insert(capability.into(), value);
        self
    }

    /// Answer any capability without its own response with `value`.
    pub fn with_default_response(mut self, value: Value) -> Self {
        self.default_response = Some(value);
        self
    }

    /// Fail the first `n` calls with `kind`, then answer normally.
    pub fn failing_first(mut self, n: u32, kind: FailureKind) -> Self {
        self.script = FailureScript::First(n);
        self.failure_kind = kind;
        self
    }

    /// Fail every call with `kind`.
    pub fn always_failing(mut self, kind: FailureKind) -> Self {
        self.script = FailureScript::Always;
        self.failure_kind = kind;
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls_to(&self, capability: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.capability == capability)
            .count()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn scripted_error(&self, call_number: usize) -> Option<ProviderError> {
        let fails = match self.script {
            FailureScript::Never => false,
            FailureScript::First(n) => call_number <= n as usize,
            FailureScript::Always => true,
        };
        fails.then(|| provider_error(self.failure_kind, format!("scripted failure on call {call_number}")))
    }
}

/// The provider error a real provider would raise for `kind`.
pub fn provider_error(kind: FailureKind, message: impl Into<String>) -> ProviderError {
    let message = message.into();
    match kind {
        FailureKind::Timeout => ProviderError::Timeout(message),
        FailureKind::Connection => ProviderError::Connection(message),
        FailureKind::Validation => ProviderError::InvalidArguments(message),
        FailureKind::Permission => ProviderError::PermissionDenied(message),
        FailureKind::Unknown => ProviderError::Other(message),
    }
}

#[async_trait]
impl CapabilityProvider for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, capability: &str, arguments: &Value) -> Result<Value, ProviderError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(MockCall {
                capability: capability.to_string(),
                arguments: arguments.clone(),
            });
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.scripted_error(call_number) {
            return Err(err);
        }

        Ok(self
            .responses
            .get(capability)
            .or(self.default_response.as_ref())
            .cloned()
            .unwrap_or_else(|| Value::String(format!("Mock response for: {capability}"))))
    }
}
