//! Failure injection for exercising the resilience logic.
//!
//! The injector is a pure decision inserted in front of dispatch: it never
//! touches a provider. Sampling draws from a seedable [`StdRng`] behind a
//! mutex, so concurrent steps share one reproducible stream.

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::config::{FailureInjectionPolicy, FailureType};
use crate::error::{FailureKind, ToolFailure};

const GENERIC_FAILURE_MESSAGE: &str = "Simulated tool failure";

/// Probabilistic source of synthetic tool failures.
#[derive(Debug)]
pub struct FailureInjector {
    policy: FailureInjectionPolicy,
    weights: Option<WeightedIndex<f64>>,
    rng: Mutex<StdRng>,
}

impl FailureInjector {
    /// Build an injector, seeded from the policy when it carries a seed.
    pub fn new(policy: FailureInjectionPolicy) -> Self {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(policy, rng)
    }

    /// Build an injector with an explicit seed, ignoring the policy's.
    pub fn with_seed(policy: FailureInjectionPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    /// An injector that never fires.
    pub fn disabled() -> Self {
        Self::with_seed(FailureInjectionPolicy::default(), 0)
    }

    fn with_rng(policy: FailureInjectionPolicy, rng: StdRng) -> Self {
        // All-zero or empty weight sets have no distribution; selection
        // falls back to the first configured type or a generic failure.
        let weights = WeightedIndex::new(policy.failure_types.iter().map(|ft| ft.probability)).ok();
        Self {
            policy,
            weights,
            rng: Mutex::new(rng),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    pub fn policy(&self) -> &FailureInjectionPolicy {
        &self.policy
    }

    /// Decide whether the dispatch of `capability` is forced to fail.
    pub fn maybe_fail(&self, capability: &str) -> Option<ToolFailure> {
        if !self.policy.enabled {
            return None;
        }
        let failure = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.sample(&mut *rng)
        }?;
        debug!(
            capability = %capability,
            kind = %failure.kind,
            "Sampled injected failure"
        );
        Some(failure)
    }

    /// Draw one decision from `rng`.
    ///
    /// One Bernoulli draw with probability `failure_rate`; on a hit, a second
    /// independent draw picks the failure type by weight.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<ToolFailure> {
        if !self.policy.enabled {
            return None;
        }
        if rng.random::<f64>() >= self.policy.failure_rate {
            return None;
        }
        Some(match self.pick_failure_type(rng) {
            Some(ft) => ToolFailure::injected(ft.kind, ft.message.clone()),
            None => ToolFailure::injected(FailureKind::Unknown, GENERIC_FAILURE_MESSAGE),
        })
    }

    fn pick_failure_type<R: Rng>(&self, rng: &mut R) -> Option<&FailureType> {
        match &self.weights {
            Some(dist) => self.policy.failure_types.get(dist.sample(rng)),
            None => self.policy.failure_types.first(),
        }
    }
}
