//! Error types for the resilience engine.
//!
//! Errors are layered the same way failures propagate at runtime:
//! provider errors are classified into [`ToolFailure`]s, tool failures are
//! absorbed by lifelines, exhausted steps become [`StepExhausted`], a fallback
//! chain with nothing left to try yields [`StepFailed`], and only a
//! conservative plan turns that into [`PlanError::PlanFailed`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Classified reason a tool invocation did not produce a result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider did not answer in time.
    Timeout,
    /// The provider could not be reached.
    Connection,
    /// Arguments were rejected.
    Validation,
    /// The provider refused the operation.
    Permission,
    /// Anything that does not fit the categories above.
    #[serde(other)]
    Unknown,
}

impl FailureKind {
    /// All kinds, in declaration order.
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::Validation,
        FailureKind::Permission,
        FailureKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Validation => "validation",
            FailureKind::Permission => "permission",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Classify an I/O error kind.
    pub fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof => FailureKind::Connection,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => FailureKind::Validation,
            io::ErrorKind::PermissionDenied => FailureKind::Permission,
            _ => FailureKind::Unknown,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified tool-level failure, real or injected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
    /// True when the failure was synthesized by the failure injector.
    #[serde(default)]
    pub injected: bool,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            injected: false,
        }
    }

    /// Create a failure produced by simulation rather than a provider.
    pub fn injected(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            injected: true,
        }
    }
}

/// Errors returned by capability providers.
///
/// The dispatcher never lets these escape: every variant is translated into
/// a [`ToolFailure`] through [`ProviderError::kind`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capability '{0}' is not served by this provider")]
    UnsupportedCapability(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Map this error onto the engine's failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Timeout(_) => FailureKind::Timeout,
            ProviderError::Connection(_) => FailureKind::Connection,
            ProviderError::InvalidArguments(_) | ProviderError::Json(_) => FailureKind::Validation,
            ProviderError::PermissionDenied(_) => FailureKind::Permission,
            ProviderError::Io(err) => FailureKind::from_io_kind(err.kind()),
            ProviderError::UnsupportedCapability(_) | ProviderError::Other(_) => {
                FailureKind::Unknown
            }
        }
    }
}

impl From<ProviderError> for ToolFailure {
    fn from(err: ProviderError) -> Self {
        ToolFailure::new(err.kind(), err.to_string())
    }
}

/// Errors raised while building or querying the capability registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no provider declares capability '{0}'")]
    UnknownCapability(String),

    #[error("capability '{capability}' is declared by both '{first}' and '{second}'")]
    AmbiguousCapability {
        capability: String,
        first: String,
        second: String,
    },

    #[error("provider '{0}' is registered more than once")]
    DuplicateProvider(String),

    #[error("provider '{0}' is configured but no implementation was supplied")]
    MissingImplementation(String),
}

/// Outcome of a single failed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no provider declares capability '{0}'")]
    UnknownCapability(String),

    #[error(transparent)]
    Tool(#[from] ToolFailure),
}

impl DispatchError {
    /// Whether spending a lifeline on this error can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Tool(_))
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            DispatchError::UnknownCapability(_) => None,
            DispatchError::Tool(failure) => Some(failure.kind),
        }
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::UnknownCapability(_) => "UNKNOWN_CAPABILITY",
            DispatchError::Tool(failure) => match failure.kind {
                FailureKind::Timeout => "TOOL_TIMEOUT",
                FailureKind::Connection => "TOOL_CONNECTION",
                FailureKind::Validation => "TOOL_VALIDATION",
                FailureKind::Permission => "TOOL_PERMISSION",
                FailureKind::Unknown => "TOOL_UNKNOWN",
            },
        }
    }
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownCapability(name) => DispatchError::UnknownCapability(name),
            other => DispatchError::Tool(ToolFailure::new(FailureKind::Unknown, other.to_string())),
        }
    }
}

/// A step whose primary attempt and every lifeline failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step exhausted after {attempts} attempt(s): {last_error}")]
pub struct StepExhausted {
    pub attempts: u32,
    pub last_error: DispatchError,
}

/// Terminal failure of one step after the fallback chain had nothing to offer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("step {step_index} ({capability}) failed after {attempts} attempt(s): {error_code}: {message}")]
pub struct StepFailed {
    pub step_index: usize,
    pub capability: String,
    pub attempts: u32,
    pub error_code: String,
    pub kind: Option<FailureKind>,
    pub message: String,
}

/// Errors that end a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan failed: {0}")]
    PlanFailed(StepFailed),

    #[error("planner error: {0}")]
    Planner(String),
}

/// Errors reported by the memory collaborator.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("memory serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("memory backend error: {0}")]
    Backend(String),
}

/// Errors reported by a human channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterventionError {
    #[error("human input was cancelled")]
    Cancelled,

    #[error("human channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(io::ErrorKind::TimedOut, FailureKind::Timeout)]
    #[case(io::ErrorKind::ConnectionRefused, FailureKind::Connection)]
    #[case(io::ErrorKind::BrokenPipe, FailureKind::Connection)]
    #[case(io::ErrorKind::InvalidData, FailureKind::Validation)]
    #[case(io::ErrorKind::PermissionDenied, FailureKind::Permission)]
    #[case(io::ErrorKind::NotFound, FailureKind::Unknown)]
    fn test_io_kind_classification(#[case] io_kind: io::ErrorKind, #[case] expected: FailureKind) {
        assert_eq!(FailureKind::from_io_kind(io_kind), expected);
        let err = ProviderError::from(io::Error::new(io_kind, "boom"));
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn test_provider_error_translation() {
        let failure: ToolFailure = ProviderError::InvalidArguments("b missing".into()).into();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.message, "invalid arguments: b missing");
        assert!(!failure.injected);

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ProviderError::from(json_err).kind(), FailureKind::Validation);
    }

    #[test]
    fn test_failure_kind_serde() {
        let kind: FailureKind = serde_json::from_str("\"permission\"").unwrap();
        assert_eq!(kind, FailureKind::Permission);

        // Unrecognized kinds from configuration degrade to unknown
        let kind: FailureKind = serde_json::from_str("\"generic\"").unwrap();
        assert_eq!(kind, FailureKind::Unknown);

        assert_eq!(serde_json::to_string(&FailureKind::Timeout).unwrap(), "\"timeout\"");
    }

    #[test]
    fn test_dispatch_error_retryable() {
        let unknown = DispatchError::UnknownCapability("fly".into());
        assert!(!unknown.is_retryable());
        assert_eq!(unknown.error_code(), "UNKNOWN_CAPABILITY");
        assert_eq!(unknown.kind(), None);

        let tool = DispatchError::from(ToolFailure::injected(FailureKind::Timeout, "slow"));
        assert!(tool.is_retryable());
        assert_eq!(tool.error_code(), "TOOL_TIMEOUT");
        assert_eq!(tool.to_string(), "timeout failure: slow");
    }

    #[test]
    fn test_registry_error_into_dispatch() {
        let err: DispatchError = RegistryError::UnknownCapability("add".into()).into();
        assert_eq!(err, DispatchError::UnknownCapability("add".into()));
    }
}
