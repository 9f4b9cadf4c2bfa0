//! Tool dispatcher: one call in, one classified result out.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{DispatchError, ToolFailure};
use crate::injection::FailureInjector;
use crate::registry::CapabilityRegistry;
use crate::tool::ToolCall;

/// Resolves a call to its provider and performs it.
///
/// Each `invoke` makes exactly one provider call, or none when the
/// capability is unknown or the failure injector fires.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<CapabilityRegistry>,
    injector: Option<Arc<FailureInjector>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            injector: None,
        }
    }

    /// Consult `injector` before every real call.
    pub fn with_injector(mut self, injector: Arc<FailureInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn injector(&self) -> Option<&Arc<FailureInjector>> {
        self.injector.as_ref()
    }

    pub async fn invoke(&self, call: &ToolCall) -> Result<Value, DispatchError> {
        let registration = self.registry.resolve(&call.capability)?;

        if let Some(failure) = self
            .injector
            .as_ref()
            .and_then(|injector| injector.maybe_fail(&call.capability))
        {
            warn!(
                capability = %call.capability,
                provider = %registration.id(),
                kind = %failure.kind,
                error = %failure.message,
                "Injected tool failure"
            );
            return Err(DispatchError::Tool(failure));
        }

        debug!(
            capability = %call.capability,
            provider = %registration.id(),
            "Invoking capability provider"
        );

        registration
            .provider()
            .invoke(&call.capability, &call.arguments)
            .await
            .map_err(|err| {
                let failure = ToolFailure::from(err);
                warn!(
                    capability = %call.capability,
                    provider = %registration.id(),
                    kind = %failure.kind,
                    error = %failure.message,
                    "Capability provider failed"
                );
                DispatchError::Tool(failure)
            })
    }
}
