//! Human channel interface.

use async_trait::async_trait;

use crate::error::InterventionError;

/// Somewhere a person can be asked to supply a missing result.
///
/// Implementations may wait indefinitely; the fallback chain imposes the
/// timeout and drops the future when it expires.
#[async_trait]
pub trait HumanChannel: Send + Sync {
    /// Show `message` and wait for an answer. `Ok(None)` means the person
    /// declined to answer.
    async fn prompt(&self, message: &str) -> Result<Option<String>, InterventionError>;
}
