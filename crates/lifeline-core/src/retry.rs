//! Lifeline retry controller.
//!
//! Each step gets one primary attempt plus `max_lifelines` retries. The
//! decision after a failed attempt is the pure function [`next_transition`];
//! [`LifelineController`] only performs the I/O around it.

use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::error::{DispatchError, StepExhausted};
use crate::step::{Step, StepStatus};

/// Exponential delay between retries, optionally with full jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Backoff {
    /// Upper bound of the delay before retry number `retry` (1-based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry number `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = rand::rng().random_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Retry budget applied uniformly to every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries granted after the primary attempt.
    pub max_lifelines: u32,
    /// `None` retries immediately.
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_lifelines: u32) -> Self {
        Self {
            max_lifelines,
            backoff: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_lifelines.saturating_add(1)
    }

    /// Lifelines left after `attempts` attempts.
    pub fn lifelines_remaining(&self, attempts: u32) -> u32 {
        self.max_attempts().saturating_sub(attempts)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Spend a lifeline and dispatch the same call again.
    Retry,
    /// Stop and hand the step to the fallback chain.
    Exhaust,
}

/// Decide the next state after attempt number `attempts_made` failed with `err`.
pub fn next_transition(attempts_made: u32, policy: &RetryPolicy, err: &DispatchError) -> Transition {
    if err.is_retryable() && attempts_made < policy.max_attempts() {
        Transition::Retry
    } else {
        Transition::Exhaust
    }
}

/// How a step left the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum StepRun {
    Succeeded(Value),
    Exhausted(StepExhausted),
}

/// Drives one step through its attempts.
///
/// Cheap to clone; parallel branches each take their own copy.
#[derive(Debug, Clone)]
pub struct LifelineController {
    dispatcher: ToolDispatcher,
    policy: RetryPolicy,
}

impl LifelineController {
    pub fn new(dispatcher: ToolDispatcher, policy: RetryPolicy) -> Self {
        Self { dispatcher, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run(&self, step: &mut Step) -> StepRun {
        loop {
            let attempt = step.begin_attempt();
            debug!(
                step = step.index(),
                capability = %step.capability(),
                attempt,
                "Dispatching step"
            );

            let err = match self.dispatcher.invoke(step.call()).await {
                Ok(value) => {
                    step.set_status(StepStatus::Succeeded);
                    info!(
                        step = step.index(),
                        capability = %step.capability(),
                        attempts = attempt,
                        "Step succeeded"
                    );
                    return StepRun::Succeeded(value);
                }
                Err(err) => err,
            };

            step.record_failure(&err);
            warn!(
                step = step.index(),
                capability = %step.capability(),
                attempt,
                code = err.error_code(),
                lifelines_remaining = self.policy.lifelines_remaining(attempt),
                error = %err,
                "Step attempt failed"
            );

            match next_transition(attempt, &self.policy, &err) {
                Transition::Retry => {
                    if let Some(backoff) = &self.policy.backoff {
                        tokio::time::sleep(backoff.delay(attempt)).await;
                    }
                }
                Transition::Exhaust => {
                    step.set_status(StepStatus::Exhausted);
                    return StepRun::Exhausted(StepExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, ProviderError, ToolFailure};
    use crate::registry::CapabilityRegistry;
    use crate::step::PlannedStep;
    use crate::tool::{CapabilityProvider, ProviderDescriptor};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times with a timeout, then answers `ok`.
    struct Flaky {
        descriptor: ProviderDescriptor,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CapabilityProvider for Flaky {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, _capability: &str, _arguments: &Value) -> Result<Value, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ProviderError::Timeout(format!("call {call}")))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    fn controller(failures: u32, lifelines: u32) -> (LifelineController, Arc<Flaky>) {
        let flaky = Arc::new(Flaky {
            descriptor: ProviderDescriptor::new("flaky", ["ping"]),
            failures,
            calls: AtomicU32::new(0),
        });
        let registry = CapabilityRegistry::builder()
            .register(flaky.clone())
            .build()
            .unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry));
        (LifelineController::new(dispatcher, RetryPolicy::new(lifelines)), flaky)
    }

    fn step(capability: &str) -> Step {
        Step::new(0, PlannedStep::new(capability, json!({})))
    }

    #[tokio::test]
    async fn test_first_attempt_success_uses_no_lifelines() {
        let (controller, flaky) = controller(0, 3);
        let mut step = step("ping");

        assert_eq!(controller.run(&mut step).await, StepRun::Succeeded(json!("ok")));
        assert_eq!(step.attempts(), 1);
        assert_eq!(step.status(), StepStatus::Succeeded);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let (controller, _) = controller(2, 3);
        let mut step = step("ping");

        assert!(matches!(controller.run(&mut step).await, StepRun::Succeeded(_)));
        assert_eq!(step.attempts(), 3);
        assert_eq!(step.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausts_after_one_plus_lifelines() {
        let (controller, flaky) = controller(u32::MAX, 3);
        let mut step = step("ping");

        match controller.run(&mut step).await {
            StepRun::Exhausted(exhausted) => {
                assert_eq!(exhausted.attempts, 4);
                assert_eq!(exhausted.last_error.kind(), Some(FailureKind::Timeout));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(step.status(), StepStatus::Exhausted);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_unknown_capability_is_not_retried() {
        let (controller, flaky) = controller(0, 3);
        let mut step = step("teleport");

        match controller.run(&mut step).await {
            StepRun::Exhausted(exhausted) => {
                assert_eq!(exhausted.attempts, 1);
                assert_eq!(exhausted.last_error, DispatchError::UnknownCapability("teleport".into()));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_retries() {
        let (controller, _) = controller(2, 3);
        let controller = LifelineController::new(
            controller.dispatcher.clone(),
            RetryPolicy::new(3).with_backoff(Backoff {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(1),
                jitter: false,
            }),
        );
        let start = tokio::time::Instant::now();
        let mut step = step("ping");

        assert!(matches!(controller.run(&mut step).await, StepRun::Succeeded(_)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
    }

    #[test]
    fn test_backoff_ceiling_is_capped() {
        let backoff = Backoff {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(300),
            jitter: true,
        };
        assert_eq!(backoff.ceiling(1), Duration::from_millis(50));
        assert_eq!(backoff.ceiling(3), Duration::from_millis(200));
        assert_eq!(backoff.ceiling(10), Duration::from_millis(300));
        assert_eq!(backoff.ceiling(u32::MAX), Duration::from_millis(300));
        assert!(backoff.delay(4) <= Duration::from_millis(300));
    }

    #[test]
    fn test_transition_table() {
        let policy = RetryPolicy::new(1);
        let tool = DispatchError::Tool(ToolFailure::new(FailureKind::Connection, "down"));
        let unknown = DispatchError::UnknownCapability("x".into());

        assert_eq!(next_transition(1, &policy, &tool), Transition::Retry);
        assert_eq!(next_transition(2, &policy, &tool), Transition::Exhaust);
        assert_eq!(next_transition(1, &policy, &unknown), Transition::Exhaust);
        assert_eq!(next_transition(1, &RetryPolicy::new(0), &tool), Transition::Exhaust);
    }

    proptest! {
        #[test]
        fn prop_attempts_never_exceed_budget(lifelines in 0u32..8, failures in 0u32..20) {
            let policy = RetryPolicy::new(lifelines);
            let err = DispatchError::Tool(ToolFailure::new(FailureKind::Timeout, "slow"));
            let mut attempts = 0;
            loop {
                attempts += 1;
                if attempts > failures {
                    break;
                }
                if next_transition(attempts, &policy, &err) == Transition::Exhaust {
                    break;
                }
            }
            prop_assert!(attempts <= 1 + lifelines);
            prop_assert_eq!(attempts, (failures + 1).min(1 + lifelines));
        }
    }
}
