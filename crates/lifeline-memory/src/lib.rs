//! # Lifeline Memory Backends
//!
//! Memory collaborators for the resilience engine.
//!
//! ## Backends
//!
//! - **[InMemoryStore]**: process-lifetime store with keyword recall
//! - **[SessionMemory]**: the same recall index, persisted through a [SessionLog]
//!
//! [SessionLog] writes one JSON file per session under
//! `<base>/YYYY/MM/DD/<session_id>.json`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lifeline_memory::{SessionLog, SessionMemory};
//! use std::sync::Arc;
//!
//! let memory = Arc::new(SessionMemory::open(SessionLog::new("memory/session_logs"))?);
//! let orchestrator = orchestrator.with_memory(memory);
//! ```

pub mod session_log;
pub mod stats;
pub mod store;

pub use session_log::{DEFAULT_BASE_DIR, SessionLog, SessionMemory};
pub use stats::{ToolStats, interaction_success_rates, tool_success_rates};
pub use store::{DEFAULT_MIN_SCORE, InMemoryStore};
