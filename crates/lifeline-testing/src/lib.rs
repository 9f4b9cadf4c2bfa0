//! # Lifeline Testing
//!
//! Test doubles for every collaborator the engine talks to.
//!
//! - **[MockProvider]**: canned responses, scripted failures, call recording
//! - **[ScriptedPlanner]**: replays decisions, repeats a step, or errors
//! - **[StaticMemory]**: fixed recall answer, counts recalls, keeps summaries
//! - **[ScriptedHuman]**: answers, declines, cancels or never answers
//!
//! ## Example
//!
//! ```rust,ignore
//! use lifeline_core::FailureKind;
//! use lifeline_testing::{MockProvider, registry_with};
//! use serde_json::json;
//!
//! let mock = MockProvider::new("math", ["add"])
//!     .with_response("add", json!(8))
//!     .failing_first(2, FailureKind::Timeout)
//!     .into_arc();
//! let registry = registry_with([mock.clone()]);
//! ```

pub mod human;
pub mod memory;
pub mod mock_provider;
pub mod planner;

pub use human::{HumanScript, ScriptedHuman};
pub use memory::StaticMemory;
pub use mock_provider::{MockCall, MockProvider, provider_error};
pub use planner::ScriptedPlanner;

use lifeline_core::{CapabilityRegistry, RegistryError};
use std::sync::Arc;

/// Build a shared registry from mock providers.
pub fn registry_with(
    providers: impl IntoIterator<Item = Arc<MockProvider>>,
) -> Result<Arc<CapabilityRegistry>, RegistryError> {
    let mut builder = CapabilityRegistry::builder();
    for provider in providers {
        builder = builder.register(provider);
    }
    builder.build().map(Arc::new)
}
