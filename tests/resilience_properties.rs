//! Resilience Properties
//!
//! End-to-end checks of the guarantees the engine makes about attempt
//! budgets, failure injection, routing and the fallback chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lifeline_testing::{MockProvider, ScriptedHuman, ScriptedPlanner, StaticMemory, registry_with};
use lifeline_workspace::{
    DispatchError, FailureInjectionPolicy, FailureInjector, FailureKind, FallbackChain,
    HumanInterventionConfig, PlannedStep, PlanningMode, ResultSource, StepOrchestrator,
    StepStatus, StrategyConfig, TaskOutcome, ToolCall, ToolDispatcher,
};
use proptest::prelude::*;
use serde_json::json;

fn ping_provider() -> Arc<MockProvider> {
    MockProvider::new("mock", ["ping"])
        .with_response("ping", json!("pong"))
        .into_arc()
}

fn no_fallback(lifelines: u32) -> StrategyConfig {
    StrategyConfig {
        memory_fallback_enabled: false,
        max_lifelines_per_step: lifelines,
        ..StrategyConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// No step ever makes more than one primary attempt plus its lifelines.
    #[test]
    fn prop_attempts_never_exceed_lifeline_budget(
        lifelines in 0u32..6,
        failures in 0u32..12,
        max_steps in 1usize..4,
    ) {
        let result = tokio_test::block_on(async {
            let mock = MockProvider::new("mock", ["ping"])
                .with_response("ping", json!("pong"))
                .failing_first(failures, FailureKind::Timeout)
                .into_arc();
            let strategy = StrategyConfig {
                planning_mode: PlanningMode::Exploratory,
                max_steps,
                ..no_fallback(lifelines)
            };
            StepOrchestrator::new(
                ToolDispatcher::new(registry_with([mock]).unwrap()),
                Arc::new(ScriptedPlanner::repeat(PlannedStep::new("ping", json!({})))),
                strategy,
            )
            .run("ping until the budget runs out")
            .await
        });

        prop_assert_eq!(result.steps.len(), max_steps);
        prop_assert_eq!(result.outcome, TaskOutcome::StepBudgetExhausted);
        for step in &result.steps {
            prop_assert!(step.attempts >= 1);
            prop_assert!(step.attempts <= 1 + lifelines);
            prop_assert_eq!(step.failures.len() as u32 + u32::from(step.status == StepStatus::Succeeded), step.attempts);
        }
    }
}

#[tokio::test]
async fn test_disabled_simulation_never_injects() {
    let mock = ping_provider();
    let mut policy = FailureInjectionPolicy::enabled(1.0, FailureInjectionPolicy::standard_failure_types());
    policy.enabled = false;
    let dispatcher = ToolDispatcher::new(registry_with([mock.clone()]).unwrap())
        .with_injector(Arc::new(FailureInjector::with_seed(policy, 17)));

    for _ in 0..500 {
        let value = dispatcher.invoke(&ToolCall::new("ping", json!({}))).await.unwrap();
        assert_eq!(value, json!("pong"));
    }
    assert_eq!(mock.call_count(), 500);
}

#[tokio::test]
async fn test_full_failure_rate_injects_every_dispatch_with_configured_mix() {
    let mock = ping_provider();
    let policy = FailureInjectionPolicy::enabled(1.0, FailureInjectionPolicy::standard_failure_types());
    let dispatcher = ToolDispatcher::new(registry_with([mock.clone()]).unwrap())
        .with_injector(Arc::new(FailureInjector::with_seed(policy, 2024)));

    let samples = 4_000;
    let mut counts: HashMap<FailureKind, usize> = HashMap::new();
    for _ in 0..samples {
        match dispatcher.invoke(&ToolCall::new("ping", json!({}))).await {
            Err(DispatchError::Tool(failure)) => {
                assert!(failure.injected);
                *counts.entry(failure.kind).or_default() += 1;
            }
            other => panic!("expected an injected failure, got {other:?}"),
        }
    }

    assert_eq!(mock.call_count(), 0);
    for (kind, expected) in [
        (FailureKind::Timeout, 0.4),
        (FailureKind::Connection, 0.3),
        (FailureKind::Validation, 0.2),
        (FailureKind::Permission, 0.1),
    ] {
        let observed = counts.get(&kind).copied().unwrap_or(0) as f64 / samples as f64;
        assert!((observed - expected).abs() < 0.03, "{kind}: observed {observed}, expected {expected}");
    }
}

#[tokio::test]
async fn test_unregistered_capability_never_reaches_a_provider() {
    let mock = ping_provider();
    let registry = registry_with([mock.clone()]).unwrap();

    let err = ToolDispatcher::new(registry.clone())
        .invoke(&ToolCall::new("pong", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::UnknownCapability("pong".into()));

    let result = StepOrchestrator::new(
        ToolDispatcher::new(registry),
        Arc::new(ScriptedPlanner::steps([PlannedStep::new("pong", json!({}))])),
        no_fallback(3),
    )
    .run("q")
    .await;

    let step = &result.steps[0];
    assert_eq!(step.attempts, 1);
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_ref().unwrap().error_code, "UNKNOWN_CAPABILITY");
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_memory_recall_resolves_exhausted_step_without_human() {
    let mock = MockProvider::new("math", ["add"])
        .always_failing(FailureKind::Connection)
        .into_arc();
    let memory = Arc::new(StaticMemory::returning(json!(8)));
    let human = Arc::new(ScriptedHuman::responding("9"));
    let human_config = HumanInterventionConfig {
        enabled: true,
        ..HumanInterventionConfig::default()
    };

    let result = StepOrchestrator::new(
        ToolDispatcher::new(registry_with([mock.clone()]).unwrap()),
        Arc::new(ScriptedPlanner::steps([PlannedStep::new("add", json!([5, 3]))])),
        StrategyConfig::default(),
    )
    .with_fallback(FallbackChain::new(true, human_config))
    .with_memory(memory.clone())
    .with_human(human.clone())
    .run("what is 5 + 3")
    .await;

    let step = &result.steps[0];
    assert_eq!(step.source, ResultSource::Memory);
    assert_eq!(step.status, StepStatus::Escalated);
    assert_eq!(step.output, Some(json!(8)));
    assert_eq!(step.attempts, 4);
    // Failures stay attached for audit even though memory supplied the value
    assert_eq!(step.failures.len(), 4);
    assert!(step.failures.iter().all(|f| f.kind == Some(FailureKind::Connection)));

    assert_eq!(memory.recall_count(), 1);
    assert_eq!(human.prompt_count(), 0);
    assert!(step.intervention.is_none());
    assert_eq!(result.outcome, TaskOutcome::Completed { answer: "8".into() });
}

#[tokio::test]
async fn test_memory_fallback_follows_strategy_flag() {
    for enabled in [true, false] {
        let mock = MockProvider::new("math", ["add"])
            .always_failing(FailureKind::Timeout)
            .into_arc();
        let memory = Arc::new(StaticMemory::returning(json!(8)));
        let strategy = StrategyConfig {
            memory_fallback_enabled: enabled,
            ..StrategyConfig::default()
        };

        let result = StepOrchestrator::new(
            ToolDispatcher::new(registry_with([mock]).unwrap()),
            Arc::new(ScriptedPlanner::steps([PlannedStep::new("add", json!([5, 3]))])),
            strategy,
        )
        .with_memory(memory.clone())
        .run("what is 5 + 3")
        .await;

        let step = &result.steps[0];
        if enabled {
            assert_eq!(step.source, ResultSource::Memory);
            assert_eq!(step.output, Some(json!(8)));
            assert_eq!(memory.recall_count(), 1);
        } else {
            assert_eq!(step.source, ResultSource::None);
            assert_eq!(step.status, StepStatus::Failed);
            assert_eq!(memory.recall_count(), 0);
        }
        // Summaries are stored either way
        assert_eq!(memory.stored().len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_human_times_out_to_terminal_failure() {
    let mock = MockProvider::new("math", ["add"])
        .always_failing(FailureKind::Timeout)
        .into_arc();
    let human = Arc::new(ScriptedHuman::silent());
    let human_config = HumanInterventionConfig {
        enabled: true,
        timeout_seconds: 1,
        ..HumanInterventionConfig::default()
    };

    let start = tokio::time::Instant::now();
    let result = StepOrchestrator::new(
        ToolDispatcher::new(registry_with([mock]).unwrap()),
        Arc::new(ScriptedPlanner::steps([PlannedStep::new("add", json!([5, 3]))])),
        StrategyConfig::default(),
    )
    .with_fallback(FallbackChain::new(false, human_config))
    .with_human(human.clone())
    .run("what is 5 + 3")
    .await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(1), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_500), "elapsed {elapsed:?}");
    assert_eq!(human.prompt_count(), 1);

    let step = &result.steps[0];
    assert_eq!(step.status, StepStatus::Failed);
    let intervention = step.intervention.as_ref().unwrap();
    assert!(!intervention.was_successful);
    assert_eq!(intervention.attempt_number, 4);
    assert!(matches!(result.outcome, TaskOutcome::PlanFailed { .. }));
}

#[tokio::test]
async fn test_human_answer_recovers_step() {
    let mock = MockProvider::new("math", ["add"])
        .always_failing(FailureKind::Permission)
        .into_arc();
    let human = Arc::new(ScriptedHuman::responding("8"));
    let human_config = HumanInterventionConfig {
        enabled: true,
        prompt: "Tool execution failed. Please provide the expected output:".into(),
        timeout_seconds: 5,
    };

    let result = StepOrchestrator::new(
        ToolDispatcher::new(registry_with([mock]).unwrap()),
        Arc::new(ScriptedPlanner::steps([
            PlannedStep::new("add", json!([5, 3])).with_description("Add the two numbers")
        ])),
        no_fallback(1),
    )
    .with_fallback(FallbackChain::new(false, human_config))
    .with_human(human.clone())
    .run("what is 5 + 3")
    .await;

    let step = &result.steps[0];
    assert_eq!(step.source, ResultSource::Human);
    assert_eq!(step.output, Some(json!(8)));
    assert_eq!(step.attempts, 2);

    let prompt = &human.prompts()[0];
    assert!(prompt.starts_with("Tool execution failed."));
    assert!(prompt.contains("Add the two numbers"));
    assert!(prompt.contains("Attempts: 2"));
    assert_eq!(step.intervention.as_ref().unwrap().human_input.as_deref(), Some("8"));
}
