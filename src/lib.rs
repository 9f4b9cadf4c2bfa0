//! # Lifeline
//!
//! Resilience engine for step-based reasoning agents. This facade re-exports
//! the engine core at the top level, with the bundled providers under
//! [`tools`] and the memory backends under [`stores`].

pub use lifeline_core::*;
pub use lifeline_memory as stores;
pub use lifeline_tools as tools;
