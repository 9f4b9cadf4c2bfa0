//! # Lifeline Tools
//!
//! Capability providers shipped with the engine.
//!
//! - **[MathProvider]** (`math`): `add`, `subtract`, `multiply`, `divide`, `power`
//! - **[TextProvider]** (`text`): `text_uppercase`, `text_reverse`, `text_length`
//!
//! ## Example
//!
//! ```rust,ignore
//! use lifeline_core::CapabilityRegistry;
//! use lifeline_tools::standard_providers;
//!
//! let mut builder = CapabilityRegistry::builder();
//! for provider in standard_providers() {
//!     builder = builder.register(provider);
//! }
//! let registry = builder.build()?;
//! ```

pub mod math;
pub mod text;

pub use math::{MATH_CAPABILITIES, MathProvider};
pub use text::{TEXT_CAPABILITIES, TextProvider};

use lifeline_core::CapabilityProvider;
use std::sync::Arc;

/// Every bundled provider, ready for registration.
pub fn standard_providers() -> Vec<Arc<dyn CapabilityProvider>> {
    vec![Arc::new(MathProvider::new()), Arc::new(TextProvider::new())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_core::CapabilityRegistry;

    #[test]
    fn test_standard_providers_do_not_overlap() {
        let mut builder = CapabilityRegistry::builder();
        for provider in standard_providers() {
            builder = builder.register(provider);
        }
        let registry = builder.build().unwrap();
        assert_eq!(registry.len(), MATH_CAPABILITIES.len() + TEXT_CAPABILITIES.len());
        assert_eq!(registry.resolve("add").unwrap().id(), "math");
    }
}
