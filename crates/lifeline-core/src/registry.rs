//! Capability registry: routes a capability name to the one provider serving it.
//!
//! The registry is validated once, when it is built. Duplicate provider ids
//! and capabilities declared by more than one provider are rejected there, so
//! [`CapabilityRegistry::resolve`] can assume uniqueness. After construction
//! the registry is immutable and shared behind an `Arc` without locking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::RegistryError;
use crate::tool::{CapabilityProvider, ProviderDescriptor};

/// A provider together with the descriptor it was registered under.
#[derive(Clone)]
pub struct Registration {
    descriptor: ProviderDescriptor,
    provider: Arc<dyn CapabilityProvider>,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn provider(&self) -> &Arc<dyn CapabilityProvider> {
        &self.provider
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Read-only dispatch table keyed by capability name.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    registrations: Vec<Registration>,
    routes: HashMap<String, usize>,
}

impl CapabilityRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Bind configured provider descriptors to their implementations by id.
    ///
    /// The configured descriptor (not the implementation's own) decides
    /// which capabilities are routed to the provider.
    pub fn from_descriptors(
        descriptors: &[ProviderDescriptor],
        implementations: impl IntoIterator<Item = Arc<dyn CapabilityProvider>>,
    ) -> Result<Self, RegistryError> {
        let mut by_id: HashMap<String, Arc<dyn CapabilityProvider>> = implementations
            .into_iter()
            .map(|provider| (provider.descriptor().id.clone(), provider))
            .collect();

        let mut builder = Self::builder();
        for descriptor in descriptors {
            let provider = by_id
                .remove(&descriptor.id)
                .ok_or_else(|| RegistryError::MissingImplementation(descriptor.id.clone()))?;
            builder = builder.register_as(descriptor.clone(), provider);
        }
        builder.build()
    }

    /// Resolve the provider owning `capability`.
    pub fn resolve(&self, capability: &str) -> Result<&Registration, RegistryError> {
        self.routes
            .get(capability)
            .map(|&idx| &self.registrations[idx])
            .ok_or_else(|| RegistryError::UnknownCapability(capability.to_string()))
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.routes.contains_key(capability)
    }

    /// Every routed capability name, sorted.
    pub fn capabilities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.registrations.iter().map(|r| &r.descriptor)
    }

    /// One line per capability, used when describing available tools to a planner.
    pub fn describe(&self) -> Vec<String> {
        self.capabilities()
            .into_iter()
            .filter_map(|name| {
                let reg = self.resolve(name).ok()?;
                Some(if reg.descriptor.description.is_empty() {
                    format!("{} ({})", name, reg.id())
                } else {
                    format!("{} ({}): {}", name, reg.id(), reg.descriptor.description)
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collects providers and validates them into a [`CapabilityRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    pending: Vec<Registration>,
}

impl RegistryBuilder {
    /// Register a provider under its own descriptor.
    pub fn register(self, provider: Arc<dyn CapabilityProvider>) -> Self {
        let descriptor = provider.descriptor().clone();
        self.register_as(descriptor, provider)
    }

    /// Register a provider under an explicit descriptor.
    pub fn register_as(
        mut self,
        descriptor: ProviderDescriptor,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Self {
        self.pending.push(Registration {
            descriptor,
            provider,
        });
        self
    }

    /// Validate uniqueness and build the routing table.
    pub fn build(self) -> Result<CapabilityRegistry, RegistryError> {
        let mut routes: HashMap<String, usize> = HashMap::new();
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (idx, registration) in self.pending.iter().enumerate() {
            if !seen_ids.insert(registration.id()) {
                return Err(RegistryError::DuplicateProvider(registration.id().to_string()));
            }
            for capability in &registration.descriptor.capabilities {
                if let Some(&owner) = routes.get(capability) {
                    let first = self.pending[owner].id().to_string();
                    return Err(RegistryError::AmbiguousCapability {
                        capability: capability.clone(),
                        first,
                        second: registration.id().to_string(),
                    });
                }
                routes.insert(capability.clone(), idx);
            }
            debug!(
                provider = %registration.id(),
                capabilities = registration.descriptor.capabilities.len(),
                "Registered capability provider"
            );
        }

        Ok(CapabilityRegistry {
            registrations: self.pending,
            routes,
        })
    }
}
