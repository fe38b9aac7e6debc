// src/echo/engine.rs — Echo interaction-learning engine
//
// One engine per process, constructed by the composition root with its
// storage and (optional) generation provider. All state lives behind a
// single mutex; the lock is never held across an await or while
// subscribers run.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::event_log::EventLog;
use super::insights::{local_insights, merge_insights, parse_external_insights};
use super::patterns::extract_patterns;
use super::prompts::{insight_prompt, suggestion_prompt};
use super::publisher::{load_state, PersistedState, StatePublisher, Subscription};
use super::scheduler::LearningScheduler;
use super::suggestions::{parse_external_suggestions, rank_suggestions};
use super::types::{
    EchoInsight, EchoState, HealthStatus, Interaction, JsonMap, NewInteraction, Suggestion,
    SystemHealth, WorkflowComplexity, WorkflowPattern,
};
use crate::infra::config::EchoConfig;
use crate::infra::errors::EchoError;
use crate::provider::{self, GenerationOptions, ModelProvider};
use crate::storage::Storage;

/// Interactions sent with an insight request.
const INSIGHT_CONTEXT: usize = 50;
/// External insights require more than this many logged interactions.
const MIN_LOG_FOR_EXTERNAL: usize = 10;
/// External insights merged per response.
const EXTERNAL_INSIGHTS: usize = 3;
/// Module interactions sent with a suggestion request.
const SUGGESTION_CONTEXT: usize = 20;
/// External suggestions cached per module.
const CACHED_SUGGESTIONS: usize = 3;
/// More patterns than this marks the user's workflows as advanced.
const ADVANCED_PATTERN_COUNT: usize = 5;

/// Result of `record`.
#[derive(Debug)]
pub struct Recorded {
    pub id: String,
    /// Set when this record crossed an analysis boundary and a runtime was
    /// available to run the pass.
    pub analysis: Option<JoinHandle<AnalysisOutcome>>,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    /// Another pass was in flight; nothing happened.
    AlreadyRunning,
    Completed(AnalysisReport),
}

impl AnalysisOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }

    pub fn into_report(self) -> Option<AnalysisReport> {
        match self {
            AnalysisOutcome::Completed(report) => Some(report),
            AnalysisOutcome::AlreadyRunning => None,
        }
    }
}

#[derive(Debug)]
pub struct AnalysisReport {
    pub patterns: usize,
    pub local_insights: usize,
    /// Pending external insight merge; resolves to the number merged.
    pub external: Option<JoinHandle<usize>>,
}

/// Suggestions available now, plus a pending external refresh whose results
/// land in the per-module cache for the next call.
#[derive(Debug)]
pub struct SuggestionBatch {
    pub suggestions: Vec<Suggestion>,
    pub refresh: Option<JoinHandle<usize>>,
}

struct Core {
    state: EchoState,
    log: EventLog,
    consecutive_failures: u32,
    last_external_ok: Option<bool>,
}

struct Shared {
    config: EchoConfig,
    generation: GenerationOptions,
    provider: Option<Arc<dyn ModelProvider>>,
    external_enabled: AtomicBool,
    storage: Arc<dyn Storage>,
    core: Mutex<Core>,
    publisher: StatePublisher,
    scheduler: Mutex<Option<LearningScheduler>>,
}

/// Builder for [`EchoEngine`].
pub struct EchoEngineBuilder {
    config: EchoConfig,
    storage: Arc<dyn Storage>,
    provider: Option<Arc<dyn ModelProvider>>,
    generation: GenerationOptions,
    external_enabled: bool,
}

impl EchoEngineBuilder {
    pub fn config(mut self, config: EchoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.generation = options;
        self
    }

    pub fn external_enabled(mut self, enabled: bool) -> Self {
        self.external_enabled = enabled;
        self
    }

    /// Load persisted state and build the engine. Does not start the
    /// periodic scheduler; call [`EchoEngine::start`] for that.
    pub fn build(self) -> EchoEngine {
        let (mut state, log) = match load_state(self.storage.as_ref(), &self.config.storage_key)
        {
            Some(persisted) => {
                tracing::info!(
                    "Restored Echo state: {} interactions, {} patterns, {} insights",
                    persisted.interactions.len(),
                    persisted.state.patterns.len(),
                    persisted.state.insights.len()
                );
                (persisted.state, EventLog::from_entries(persisted.interactions))
            }
            None => (EchoState::default(), EventLog::new()),
        };

        // A pass or workflow interrupted by shutdown does not resume
        if state.is_learning {
            state.is_learning = false;
            state.learning_progress = 0;
        }
        state.active_workflows.clear();

        let available = self.provider.is_some() && self.external_enabled;
        state.system_health.status = if available {
            HealthStatus::Optimal
        } else {
            HealthStatus::Good
        };
        state.system_health.performance = 100;

        EchoEngine {
            shared: Arc::new(Shared {
                config: self.config,
                generation: self.generation,
                provider: self.provider,
                external_enabled: AtomicBool::new(self.external_enabled),
                storage: self.storage,
                core: Mutex::new(Core {
                    state,
                    log,
                    consecutive_failures: 0,
                    last_external_ok: None,
                }),
                publisher: StatePublisher::new(),
                scheduler: Mutex::new(None),
            }),
        }
    }
}

/// Learns workflow patterns, insights and preferences from the UI's
/// interaction stream. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EchoEngine {
    shared: Arc<Shared>,
}

impl EchoEngine {
    pub fn builder(storage: Arc<dyn Storage>) -> EchoEngineBuilder {
        EchoEngineBuilder {
            config: EchoConfig::default(),
            storage,
            provider: None,
            generation: GenerationOptions::default(),
            external_enabled: true,
        }
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Finish a mutation: persist (while still holding the lock so saves
    /// land in mutation order), release, then notify subscribers.
    fn commit(&self, core: MutexGuard<'_, Core>, persist: bool) {
        if persist {
            self.save_locked(&core);
        }
        let snapshot = core.state.clone();
        drop(core);
        self.shared.publisher.notify(&snapshot);
    }

    fn mutate<R>(&self, persist: bool, f: impl FnOnce(&mut Core) -> R) -> R {
        let mut core = self.core();
        let result = f(&mut core);
        self.commit(core, persist);
        result
    }

    fn save_locked(&self, core: &Core) {
        let snapshot =
            PersistedState::capture(&core.state, core.log.entries(), self.shared.config.persist_limit);
        match snapshot.to_blob() {
            Ok(blob) => {
                if let Err(e) = self.shared.storage.save(&self.shared.config.storage_key, &blob) {
                    tracing::warn!("Failed to persist Echo state: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize Echo state: {}", e),
        }
    }

    // ─── Event log ──────────────────────────────────────────────

    /// Log an interaction. Every `analyze_every`-th entry schedules an
    /// analysis pass on the current runtime.
    pub fn record(&self, interaction: NewInteraction) -> Recorded {
        let every = self.shared.config.analyze_every.max(1);
        let (id, due) = self.mutate(true, |core| {
            let entry = core.log.append(interaction);
            tracing::debug!("Recorded {} ({})", entry.label(), entry.id);
            let id = entry.id.clone();
            core.state.total_interactions += 1;
            (id, core.log.len() % every == 0)
        });

        let analysis = if due { self.spawn_analysis() } else { None };
        Recorded { id, analysis }
    }

    /// [`record`](Self::record) without the analysis handle.
    pub fn record_interaction(&self, interaction: NewInteraction) -> String {
        self.record(interaction).id
    }

    fn spawn_analysis(&self) -> Option<JoinHandle<AnalysisOutcome>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime; analysis deferred to next trigger");
            return None;
        };
        let engine = self.clone();
        Some(runtime.spawn(async move { engine.analyze().await }))
    }

    // ─── Analysis ───────────────────────────────────────────────

    /// Run one learning pass. Returns immediately with `AlreadyRunning` if
    /// a pass is in flight.
    pub async fn analyze(&self) -> AnalysisOutcome {
        {
            let mut core = self.core();
            if core.state.is_learning {
                tracing::debug!("Analysis already running; skipping");
                return AnalysisOutcome::AlreadyRunning;
            }
            core.state.is_learning = true;
            core.state.learning_progress = 0;
            self.commit(core, false);
        }
        let mut guard = PassGuard {
            engine: self,
            finished: false,
        };

        let step = self.shared.config.progress_step();
        for tenth in 1..10u8 {
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
            self.mutate(false, |core| core.state.learning_progress = tenth * 10);
        }

        let config = &self.shared.config;
        let available = self.is_gemini_available();
        let now = Utc::now();

        let (patterns, added, recent) = self.mutate(true, |core| {
            core.state.patterns =
                extract_patterns(core.log.entries(), config.pattern_window, config.max_patterns);

            let local = local_insights(&core.state.patterns, &core.log, now);
            let added = local.len();
            merge_insights(&mut core.state.insights, local, config.max_insights);

            refresh_preferences(core, now);
            refresh_health(core, available, now);

            core.state.learning_progress = 100;
            core.state.is_learning = false;

            let recent = (available && core.log.len() > MIN_LOG_FOR_EXTERNAL)
                .then(|| core.log.recent(INSIGHT_CONTEXT).to_vec());
            (core.state.patterns.len(), added, recent)
        });
        guard.finished = true;

        tracing::info!(
            "Analysis complete: {} patterns, {} local insights",
            patterns,
            added
        );

        let external = recent.and_then(|recent| {
            let engine = self.clone();
            tokio::runtime::Handle::try_current()
                .ok()
                .map(|rt| rt.spawn(async move { engine.fetch_external_insights(recent).await }))
        });

        AnalysisOutcome::Completed(AnalysisReport {
            patterns,
            local_insights: added,
            external,
        })
    }

    async fn fetch_external_insights(&self, recent: Vec<Interaction>) -> usize {
        let text = match self.call_external(insight_prompt(&recent)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("External insight request failed: {}", e);
                return 0;
            }
        };

        let mut insights =
            match parse_external_insights(&text, &recent, &self.shared.generation.model, Utc::now())
            {
                Ok(insights) => insights,
                Err(e) => {
                    tracing::warn!("Discarding malformed insight response: {}", e);
                    return 0;
                }
            };

        insights.truncate(EXTERNAL_INSIGHTS);

        if insights.is_empty() {
            return 0;
        }
        if !self.is_gemini_available() {
            tracing::debug!("External generation disabled mid-flight; dropping insights");
            return 0;
        }

        let count = insights.len();
        let cap = self.shared.config.max_insights;
        self.mutate(true, |core| {
            merge_insights(&mut core.state.insights, insights, cap)
        });
        tracing::info!("Merged {} external insights", count);
        count
    }

    /// Call the provider with a timeout and fold the result into health.
    async fn call_external(&self, prompt: String) -> Result<String, EchoError> {
        let provider = match &self.shared.provider {
            Some(p) if self.is_gemini_available() => p.clone(),
            _ => return Err(EchoError::GenerationUnavailable),
        };

        let timeout = self.shared.config.external_timeout();
        let result = match tokio::time::timeout(
            timeout,
            provider::generate(&provider, prompt, &self.shared.generation),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EchoError::Timeout {
                secs: timeout.as_secs(),
            }),
        };

        let succeeded = match &result {
            Ok(_) => Some(true),
            Err(e) if e.is_external_failure() => Some(false),
            Err(_) => None,
        };
        let Some(succeeded) = succeeded else {
            return result;
        };
        self.mutate(false, |core| {
            if succeeded {
                core.consecutive_failures = 0;
            } else {
                core.consecutive_failures += 1;
            }
            core.last_external_ok = Some(succeeded);
            refresh_health(core, true, Utc::now());
        });
        result
    }

    // ─── Suggestions ────────────────────────────────────────────

    /// Ranked suggestions for `module`. When external generation is
    /// available and the module has history, a background refresh of the
    /// cached external suggestions is started as well.
    pub fn get_suggestions(&self, module: &str, context: &JsonMap) -> SuggestionBatch {
        let available = self.is_gemini_available();
        let (suggestions, recent) = {
            let core = self.core();
            let cached = core
                .state
                .user_preferences
                .external_suggestions
                .get(module)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let suggestions = rank_suggestions(
                module,
                cached,
                &core.state.patterns,
                &core.state.insights,
                self.shared.config.max_suggestions,
            );
            let recent = (available && core.log.count_for_module(module) > 0)
                .then(|| core.log.recent_for_module(module, SUGGESTION_CONTEXT));
            (suggestions, recent)
        };

        let refresh = recent.and_then(|recent| {
            let engine = self.clone();
            let module = module.to_string();
            let context = context.clone();
            tokio::runtime::Handle::try_current().ok().map(|rt| {
                rt.spawn(async move {
                    engine
                        .fetch_external_suggestions(module, context, recent)
                        .await
                })
            })
        });

        SuggestionBatch {
            suggestions,
            refresh,
        }
    }

    async fn fetch_external_suggestions(
        &self,
        module: String,
        context: JsonMap,
        recent: Vec<Interaction>,
    ) -> usize {
        let prompt = suggestion_prompt(&module, &context, &recent);
        let text = match self.call_external(prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("External suggestion request for '{}' failed: {}", module, e);
                return 0;
            }
        };

        let mut suggestions = match parse_external_suggestions(&text) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Discarding malformed suggestion response: {}", e);
                return 0;
            }
        };
        suggestions.truncate(CACHED_SUGGESTIONS);

        if suggestions.is_empty() || !self.is_gemini_available() {
            return 0;
        }

        let count = suggestions.len();
        self.mutate(true, |core| {
            core.state
                .user_preferences
                .external_suggestions
                .insert(module.clone(), suggestions);
        });
        tracing::debug!("Cached {} external suggestions for '{}'", count, module);
        count
    }

    // ─── Workflows ──────────────────────────────────────────────

    /// Start a known workflow. Returns the task id, or `None` if no pattern
    /// has `pattern_id`. The task is removed from `active_workflows` after
    /// the configured duration (or by [`complete_workflow`](Self::complete_workflow)).
    pub fn orchestrate_workflow(&self, pattern_id: &str, context: &JsonMap) -> Option<String> {
        let task_id = format!("task-{}", Uuid::new_v4());
        let chain = {
            let mut core = self.core();
            let pattern = core
                .state
                .patterns
                .iter_mut()
                .find(|p| p.id == pattern_id)?;
            pattern.last_used = Utc::now();
            let chain = pattern.chain();
            core.state.active_workflows.push(task_id.clone());
            self.commit(core, true);
            chain
        };
        tracing::info!("Orchestrating workflow {} ({}) as {}", pattern_id, chain, task_id);

        let mut entry = NewInteraction::new("echo", "orchestrate_workflow")
            .context("pattern_id", pattern_id)
            .context("task_id", task_id.as_str());
        if !context.is_empty() {
            entry = entry.context("workflow_context", serde_json::Value::Object(context.clone()));
        }
        self.record(entry);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let engine = self.clone();
            let id = task_id.clone();
            let duration = self.shared.config.workflow_duration();
            runtime.spawn(async move {
                tokio::time::sleep(duration).await;
                engine.complete_workflow(&id);
            });
        }

        Some(task_id)
    }

    /// Mark a workflow task finished. Returns false for unknown ids.
    pub fn complete_workflow(&self, task_id: &str) -> bool {
        let mut core = self.core();
        let before = core.state.active_workflows.len();
        core.state.active_workflows.retain(|t| t != task_id);
        if core.state.active_workflows.len() == before {
            return false;
        }
        self.commit(core, true);
        tracing::debug!("Workflow {} completed", task_id);
        true
    }

    // ─── State access ───────────────────────────────────────────

    pub fn subscribe(
        &self,
        listener: impl Fn(&EchoState) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.publisher.subscribe(Arc::new(listener))
    }

    pub fn get_state(&self) -> EchoState {
        self.core().state.clone()
    }

    pub fn patterns(&self) -> Vec<WorkflowPattern> {
        self.core().state.patterns.clone()
    }

    pub fn insights(&self) -> Vec<EchoInsight> {
        self.core().state.insights.clone()
    }

    /// Copy of the interaction log, oldest first.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.core().log.entries().to_vec()
    }

    // ─── External generation toggles ────────────────────────────

    pub fn set_gemini_enabled(&self, enabled: bool) {
        self.shared.external_enabled.store(enabled, Ordering::SeqCst);
        let available = self.is_gemini_available();
        tracing::info!(
            "External generation {}",
            if available { "enabled" } else { "disabled" }
        );
        self.mutate(false, |core| refresh_health(core, available, Utc::now()));
    }

    /// A provider is configured and enabled.
    pub fn is_gemini_available(&self) -> bool {
        self.shared.provider.is_some() && self.shared.external_enabled.load(Ordering::SeqCst)
    }

    // ─── Lifecycle ──────────────────────────────────────────────

    /// Start the periodic re-analysis timer. Returns false if it is already
    /// running or no runtime is available.
    pub fn start(&self) -> bool {
        let mut slot = self
            .shared
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }

        let weak = Arc::downgrade(&self.shared);
        let scheduler = LearningScheduler::spawn(self.shared.config.analysis_interval(), move || {
            let weak = weak.clone();
            async move {
                let Some(shared) = weak.upgrade() else {
                    return false;
                };
                let engine = EchoEngine { shared };
                if engine.should_run_periodic() {
                    engine.analyze().await;
                }
                true
            }
        });

        match scheduler {
            Some(s) => {
                *slot = Some(s);
                tracing::info!(
                    "Echo learning started ({}s interval)",
                    self.shared.config.analysis_interval_secs
                );
                true
            }
            None => false,
        }
    }

    fn should_run_periodic(&self) -> bool {
        let core = self.core();
        !core.log.is_empty() && !core.state.is_learning
    }

    /// Write the current state to storage without notifying subscribers.
    pub fn persist_now(&self) {
        let core = self.core();
        self.save_locked(&core);
    }

    /// Flush a final persist, then stop the periodic timer.
    pub fn shutdown(&self) {
        self.persist_now();
        let scheduler = self
            .shared
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
        tracing::info!("Echo engine shut down");
    }

    /// Forget everything learned: log, patterns, insights, preferences.
    pub fn reset(&self) {
        let available = self.is_gemini_available();
        self.mutate(true, |core| {
            core.log.clear();
            core.state = EchoState::default();
            core.consecutive_failures = 0;
            core.last_external_ok = None;
            refresh_health(core, available, Utc::now());
        });
        tracing::info!("Echo state reset");
    }
}

/// Clears the learning flag if an analysis future is dropped mid-pass.
struct PassGuard<'a> {
    engine: &'a EchoEngine,
    finished: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!("Analysis pass cancelled");
        self.engine.mutate(false, |core| {
            core.state.is_learning = false;
            core.state.learning_progress = 0;
        });
    }
}

fn refresh_preferences(core: &mut Core, now: DateTime<Utc>) {
    let total = core.log.len();
    let advanced = core.state.patterns.len() > ADVANCED_PATTERN_COUNT;
    let prefs = &mut core.state.user_preferences;

    prefs.primary_module = core.log.primary_module().map(|(module, _)| module);
    prefs.module_usage = core
        .log
        .usage_counts()
        .into_iter()
        .map(|(module, count)| (module, count as f64 / total as f64))
        .collect();
    prefs.workflow_complexity = if advanced {
        WorkflowComplexity::Advanced
    } else {
        WorkflowComplexity::Standard
    };
    prefs.last_updated = Some(now);
}

fn refresh_health(core: &mut Core, available: bool, now: DateTime<Utc>) {
    let status = if !available {
        HealthStatus::Good
    } else if core.last_external_ok == Some(false) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Optimal
    };
    let penalty = core.consecutive_failures.saturating_mul(10);
    let performance = 100u32.saturating_sub(penalty).max(50) as u8;

    core.state.system_health = SystemHealth {
        status,
        performance,
        last_update: now,
    };
}
