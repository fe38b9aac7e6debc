// tests/engine_test.rs — Integration test: Echo engine with mock provider

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use nexus_echo::echo::engine::{AnalysisOutcome, EchoEngine, Recorded};
use nexus_echo::echo::types::{
    HealthStatus, InsightType, JsonMap, NewInteraction, SuggestionAction, SuggestionSource,
};
use nexus_echo::infra::config::EchoConfig;
use nexus_echo::infra::errors::EchoError;
use nexus_echo::provider::*;
use nexus_echo::storage::MemoryStorage;

const CANNED: &str = r#"Sure! Here is what I found:
```json
[
  {"title": "Batch your export workflow", "description": "You export after every edit.",
   "confidence": 80, "impact": "high", "actionable": true, "suggestedAction": "Enable batch export"},
  {"title": "You prefer short sessions", "description": "Sessions rarely pass 20 minutes.",
   "confidence": "70%", "impact": "low", "actionable": false},
  {"title": "Improve render presets", "description": "Renders use the slowest preset.",
   "confidence": 65, "impact": "medium", "actionable": true, "suggestedAction": "Switch preset"}
]
```"#;

enum Behavior {
    Reply(String),
    Fail,
    Hang,
}

/// A mock provider that returns canned responses without making any network calls.
struct MockProvider {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockProvider {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, EchoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Reply(content) => Ok(ChatResponse {
                content: content.clone(),
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: 50,
                },
                stop_reason: StopReason::EndTurn,
            }),
            Behavior::Fail => Err(EchoError::Provider {
                provider: "mock".into(),
                message: "HTTP 500: upstream unavailable".into(),
                retriable: true,
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(EchoError::Other(anyhow::anyhow!("unreachable")))
            }
        }
    }
}

fn quick_config() -> EchoConfig {
    EchoConfig {
        progress_step_ms: 0,
        ..EchoConfig::default()
    }
}

fn local_engine() -> EchoEngine {
    EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(quick_config())
        .build()
}

fn engine_with(provider: Arc<MockProvider>) -> EchoEngine {
    EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(quick_config())
        .provider(provider)
        .build()
}

/// Wait for a triggered analysis and its external merge, if any.
async fn settle(recorded: Recorded) {
    if let Some(handle) = recorded.analysis {
        if let Some(report) = handle.await.unwrap().into_report() {
            if let Some(external) = report.external {
                external.await.unwrap();
            }
        }
    }
}

async fn record_all(engine: &EchoEngine, pairs: &[(&str, &str)]) {
    for (module, action) in pairs {
        settle(engine.record(NewInteraction::new(*module, *action))).await;
    }
}

/// navigate(studio), edit(studio), export(library), repeated to `n` events.
fn studio_library(n: usize) -> Vec<(&'static str, &'static str)> {
    [("studio", "navigate"), ("studio", "edit"), ("library", "export")]
        .into_iter()
        .cycle()
        .take(n)
        .collect()
}

#[tokio::test]
async fn test_total_interactions_counts_every_record() {
    let engine = local_engine();
    record_all(&engine, &studio_library(25)).await;
    assert_eq!(engine.get_state().total_interactions, 25);
    assert_eq!(engine.interactions().len(), 25);
}

#[tokio::test]
async fn test_navigation_only_yields_no_pattern() {
    let engine = local_engine();
    record_all(
        &engine,
        &[
            ("studio", "navigate"),
            ("studio", "edit"),
            ("library", "navigate"),
            ("library", "browse"),
        ],
    )
    .await;

    let report = engine.analyze().await.into_report().unwrap();
    assert_eq!(report.patterns, 0);
    assert!(engine.get_state().patterns.is_empty());
}

#[tokio::test]
async fn test_cross_module_action_yields_pattern() {
    let engine = local_engine();
    record_all(&engine, &studio_library(3)).await;
    engine.analyze().await;

    let state = engine.get_state();
    assert_eq!(state.patterns.len(), 1);
    assert_eq!(state.patterns[0].modules, vec!["studio", "library"]);
    assert!(state.patterns[0].confidence > 0.0 && state.patterns[0].confidence <= 1.0);
}

#[tokio::test]
async fn test_tenth_record_triggers_analysis() {
    let engine = local_engine();
    let pairs = studio_library(10);
    let mut handles = Vec::new();
    for (m, a) in &pairs {
        if let Some(h) = engine.record(NewInteraction::new(*m, *a)).analysis {
            handles.push(h);
        }
    }
    assert_eq!(handles.len(), 1);
    let outcome = handles.pop().unwrap().await.unwrap();
    assert!(outcome.is_completed());
    assert!(!engine.get_state().patterns.is_empty());
}

#[tokio::test]
async fn test_learning_flag_and_progress_sequence() {
    let engine = local_engine();
    record_all(&engine, &studio_library(3)).await;
    assert!(!engine.get_state().is_learning);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = engine.subscribe(move |state| {
        sink.lock()
            .unwrap()
            .push((state.is_learning, state.learning_progress));
    });

    engine.analyze().await;
    sub.unsubscribe();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&(true, 0)));
    assert_eq!(seen.last(), Some(&(false, 100)));
    let progress: Vec<u8> = seen.iter().map(|(_, p)| *p).collect();
    assert_eq!(progress, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    assert!(seen[..seen.len() - 1].iter().all(|(learning, _)| *learning));
    assert!(!engine.get_state().is_learning);
}

#[tokio::test]
async fn test_reentrant_analyze_is_noop() {
    let engine = EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(EchoConfig {
            progress_step_ms: 5,
            ..EchoConfig::default()
        })
        .build();
    record_all(&engine, &studio_library(3)).await;

    let (a, b) = tokio::join!(engine.analyze(), engine.analyze());
    let completed = [&a, &b].iter().filter(|o| o.is_completed()).count();
    assert_eq!(completed, 1);
    assert!(matches!(b, AnalysisOutcome::AlreadyRunning));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_pass_releases_learning_flag() {
    let engine = EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(EchoConfig {
            progress_step_ms: 100,
            ..EchoConfig::default()
        })
        .build();
    record_all(&engine, &studio_library(3)).await;

    let cancelled = tokio::time::timeout(Duration::from_millis(150), engine.analyze()).await;
    assert!(cancelled.is_err());

    let state = engine.get_state();
    assert!(!state.is_learning);
    assert_eq!(state.learning_progress, 0);

    assert!(engine.analyze().await.is_completed());
    assert_eq!(engine.get_state().patterns.len(), 1);
}

#[tokio::test]
async fn test_local_only_has_no_external_insights() {
    let engine = local_engine();
    record_all(&engine, &studio_library(12)).await;
    let report = engine.analyze().await.into_report().unwrap();

    assert!(report.external.is_none());
    let state = engine.get_state();
    assert!(!state.insights.is_empty());
    assert!(state.insights.iter().all(|i| !i.is_external()));
    assert_eq!(state.insights[0].insight_type, InsightType::Workflow);
    assert_eq!(state.system_health.status, HealthStatus::Good);
}

#[tokio::test]
async fn test_external_insights_merge_in_front() {
    let provider = MockProvider::new(Behavior::Reply(CANNED.into()));
    let engine = engine_with(provider.clone());
    record_all(&engine, &studio_library(11)).await;

    let report = engine.analyze().await.into_report().unwrap();
    let merged = report.external.expect("external fetch").await.unwrap();
    assert_eq!(merged, 3);

    let insights = engine.insights();
    assert_eq!(insights[0].title, "Batch your export workflow");
    assert!(insights[0].is_external());
    assert_eq!(insights[0].insight_type, InsightType::Workflow);
    assert!((insights[0].confidence - 0.8).abs() < 1e-6);
    assert_eq!(insights[0].metadata["examples"].as_array().unwrap().len(), 3);
    assert_eq!(insights[1].insight_type, InsightType::Preference);
    assert_eq!(insights[2].insight_type, InsightType::Optimization);
    assert_eq!(engine.get_state().system_health.status, HealthStatus::Optimal);
}

#[tokio::test]
async fn test_oversized_external_response_is_capped() {
    let items: Vec<String> = (0..8)
        .map(|i| {
            format!(
                r#"{{"title": "Improve step {i}", "description": "d", "confidence": 50, "impact": "low", "actionable": false}}"#
            )
        })
        .collect();
    let reply = format!("[{}]", items.join(","));
    let engine = engine_with(MockProvider::new(Behavior::Reply(reply)));
    record_all(&engine, &studio_library(11)).await;

    let report = engine.analyze().await.into_report().unwrap();
    assert_eq!(report.external.unwrap().await.unwrap(), 3);

    let insights = engine.insights();
    assert_eq!(insights.iter().filter(|i| i.is_external()).count(), 3);
    assert!(insights.iter().any(|i| !i.is_external()));
}

#[tokio::test]
async fn test_external_needs_more_than_ten_interactions() {
    let provider = MockProvider::new(Behavior::Reply(CANNED.into()));
    let engine = engine_with(provider.clone());
    record_all(&engine, &studio_library(9)).await;

    let report = engine.analyze().await.into_report().unwrap();
    assert!(report.external.is_none());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_disabled_generation_adds_no_external_insights() {
    let provider = MockProvider::new(Behavior::Reply(CANNED.into()));
    let engine = engine_with(provider.clone());
    engine.set_gemini_enabled(false);
    assert!(!engine.is_gemini_available());

    record_all(&engine, &studio_library(15)).await;
    let report = engine.analyze().await.into_report().unwrap();

    assert!(report.external.is_none());
    assert_eq!(provider.calls(), 0);
    assert!(engine.insights().iter().all(|i| !i.is_external()));
    assert_eq!(engine.get_state().system_health.status, HealthStatus::Good);
}

#[tokio::test]
async fn test_malformed_response_yields_nothing() {
    let provider = MockProvider::new(Behavior::Reply("I'd rather not answer in JSON.".into()));
    let engine = engine_with(provider.clone());
    record_all(&engine, &studio_library(11)).await;

    let report = engine.analyze().await.into_report().unwrap();
    assert_eq!(report.external.unwrap().await.unwrap(), 0);
    assert!(engine.insights().iter().all(|i| !i.is_external()));
}

#[tokio::test]
async fn test_provider_failure_degrades_health() {
    let provider = MockProvider::new(Behavior::Fail);
    let engine = engine_with(provider.clone());
    record_all(&engine, &studio_library(11)).await;

    let report = engine.analyze().await.into_report().unwrap();
    assert_eq!(report.external.unwrap().await.unwrap(), 0);

    let health = engine.get_state().system_health;
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.performance, 90);
    assert!(!engine.insights().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let provider = MockProvider::new(Behavior::Hang);
    let engine = EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(EchoConfig {
            progress_step_ms: 0,
            external_timeout_secs: 2,
            ..EchoConfig::default()
        })
        .provider(provider)
        .build();
    record_all(&engine, &studio_library(11)).await;

    let report = engine.analyze().await.into_report().unwrap();
    assert_eq!(report.external.unwrap().await.unwrap(), 0);
    assert_eq!(
        engine.get_state().system_health.status,
        HealthStatus::Degraded
    );
}

#[tokio::test]
async fn test_insights_capped_at_fifty() {
    let engine = local_engine();
    record_all(&engine, &studio_library(6)).await;
    for _ in 0..40 {
        engine.analyze().await;
    }
    let insights = engine.insights();
    assert_eq!(insights.len(), 50);
    for w in insights.windows(2) {
        assert!(w[0].created_at >= w[1].created_at);
    }
}

#[tokio::test]
async fn test_suggestions_never_exceed_five() {
    let engine = local_engine();
    let mut pairs = Vec::new();
    for target in ["library", "export", "billing", "team", "agents", "assets", "review"] {
        pairs.push(("studio", "navigate"));
        pairs.push(("studio", "edit"));
        pairs.push((target, "open"));
    }
    record_all(&engine, &pairs).await;
    engine.analyze().await;
    assert_eq!(engine.get_state().patterns.len(), 7);

    let batch = engine.get_suggestions("studio", &JsonMap::new());
    assert_eq!(batch.suggestions.len(), 5);
    assert!(batch.refresh.is_none());
    assert!(batch
        .suggestions
        .iter()
        .any(|s| s.source == SuggestionSource::Pattern));
}

#[tokio::test]
async fn test_external_suggestions_are_cached_per_module() {
    let provider = MockProvider::new(Behavior::Reply(CANNED.into()));
    let engine = engine_with(provider.clone());
    record_all(&engine, &studio_library(3)).await;
    engine.analyze().await;

    let mut ctx = JsonMap::new();
    ctx.insert("project".into(), serde_json::json!("launch-video"));
    let first = engine.get_suggestions("studio", &ctx);
    assert!(first
        .suggestions
        .iter()
        .all(|s| s.source != SuggestionSource::External));
    assert_eq!(first.refresh.expect("refresh").await.unwrap(), 3);

    let second = engine.get_suggestions("studio", &ctx);
    assert!(second.suggestions.len() <= 5);
    let external: Vec<_> = second
        .suggestions
        .iter()
        .take_while(|s| s.source == SuggestionSource::External)
        .collect();
    assert_eq!(external.len(), 3);
    assert_eq!(
        external[0].action,
        SuggestionAction::Custom {
            action: "Enable batch export".into()
        }
    );

    // Other modules keep their own cache
    let other = engine.get_suggestions("billing", &ctx);
    assert!(other.suggestions.is_empty());
    assert!(other.refresh.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_orchestrated_workflow_completes() {
    let engine = EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(EchoConfig {
            progress_step_ms: 0,
            workflow_duration_ms: 3000,
            ..EchoConfig::default()
        })
        .build();
    record_all(&engine, &studio_library(3)).await;
    engine.analyze().await;

    let pattern_id = engine.patterns()[0].id.clone();
    let task = engine
        .orchestrate_workflow(&pattern_id, &JsonMap::new())
        .expect("known pattern");
    assert_eq!(engine.get_state().active_workflows, vec![task.clone()]);
    assert_eq!(engine.get_state().total_interactions, 4);

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert!(engine.get_state().active_workflows.is_empty());
    assert!(engine.orchestrate_workflow("wf-unknown", &JsonMap::new()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_scheduler_analyzes_idle_log() {
    let engine = EchoEngine::builder(Arc::new(MemoryStorage::new()))
        .config(EchoConfig {
            progress_step_ms: 0,
            analysis_interval_secs: 30,
            ..EchoConfig::default()
        })
        .build();
    assert!(engine.start());
    assert!(!engine.start());

    record_all(&engine, &studio_library(3)).await;
    assert!(engine.get_state().patterns.is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(engine.get_state().patterns.len(), 1);

    engine.shutdown();
}
