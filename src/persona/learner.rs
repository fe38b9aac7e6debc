// src/persona/learner.rs — Style learning from fine-grained UI feedback

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::types::{
    PersonaFeedback, PersonaState, PersonalizedSuggestions, StyleCategory, StyleInsight,
};
use crate::echo::types::JsonMap;
use crate::infra::config::PersonaConfig;
use crate::storage::Storage;

const EXAMPLE_COUNT: usize = 3;

/// Result of `track`.
#[derive(Debug)]
pub struct Tracked {
    pub id: String,
    /// Set when this feedback crossed an analysis boundary.
    pub analysis: Option<JoinHandle<Option<StyleInsight>>>,
}

struct Shared {
    config: PersonaConfig,
    storage: Arc<dyn Storage>,
    state: Mutex<PersonaState>,
}

/// Learns style preferences from edit-level feedback. Clones share state.
#[derive(Clone)]
pub struct PersonaLearner {
    shared: Arc<Shared>,
}

impl PersonaLearner {
    pub fn new(config: PersonaConfig, storage: Arc<dyn Storage>) -> Self {
        let mut state = load(storage.as_ref(), &config.storage_key).unwrap_or_default();
        state.is_learning = false;

        Self {
            shared: Arc::new(Shared {
                config,
                storage,
                state: Mutex::new(state),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PersonaState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &PersonaState) {
        match serde_json::to_string(state) {
            Ok(blob) => {
                if let Err(e) = self.shared.storage.save(&self.shared.config.storage_key, &blob) {
                    tracing::warn!("Failed to persist persona state: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize persona state: {}", e),
        }
    }

    /// Record one feedback event. Every `analyze_every`-th event schedules
    /// an analysis on the current runtime.
    pub fn track(
        &self,
        action: impl Into<String>,
        context: JsonMap,
        value: serde_json::Value,
        component: impl Into<String>,
    ) -> Tracked {
        let every = self.shared.config.analyze_every.max(1) as u64;
        let feedback = PersonaFeedback {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            context,
            value,
            component: component.into(),
            timestamp: Utc::now(),
        };
        let id = feedback.id.clone();

        let due = {
            let mut state = self.state();
            tracing::debug!("Persona feedback {}:{}", feedback.component, feedback.action);
            state.feedback.push(feedback);
            let excess = state
                .feedback
                .len()
                .saturating_sub(self.shared.config.max_feedback);
            if excess > 0 {
                state.feedback.drain(..excess);
            }
            state.total_feedback += 1;
            self.persist(&state);
            state.total_feedback % every == 0
        };

        let analysis = if due {
            tokio::runtime::Handle::try_current().ok().map(|rt| {
                let learner = self.clone();
                rt.spawn(async move { learner.analyze_patterns().await })
            })
        } else {
            None
        };
        Tracked { id, analysis }
    }

    pub fn track_feedback(
        &self,
        action: impl Into<String>,
        context: JsonMap,
        value: serde_json::Value,
        component: impl Into<String>,
    ) -> String {
        self.track(action, context, value, component).id
    }

    /// Mine the feedback history for one new style insight. Returns `None`
    /// if a pass is already running or no group qualifies.
    pub async fn analyze_patterns(&self) -> Option<StyleInsight> {
        {
            let mut state = self.state();
            if state.is_learning {
                return None;
            }
            state.is_learning = true;
        }
        let mut guard = PassGuard {
            learner: self,
            finished: false,
        };

        let delay = self.shared.config.analysis_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let found = mine_style_insight(
            &state.feedback,
            &state.insights,
            self.shared.config.min_group_size,
            Utc::now(),
        );
        if let Some(insight) = &found {
            tracing::info!(
                "Learned {} preference: {} ({}%)",
                insight.category.as_str(),
                insight.title,
                insight.confidence
            );
            state.insights.push(insight.clone());
        }
        state.is_learning = false;
        guard.finished = true;
        self.persist(&state);
        found
    }

    /// Mark an insight as applied. Returns false for unknown ids.
    pub fn apply_insight(&self, insight_id: &str) -> bool {
        let mut state = self.state();
        let Some(insight) = state.insights.iter_mut().find(|i| i.id == insight_id) else {
            return false;
        };
        insight.applied = true;
        self.persist(&state);
        true
    }

    /// Preference snapshot derived from the feedback history. A `component`
    /// string in `context` narrows it to that component's feedback.
    pub fn get_personalized_suggestions(&self, context: &JsonMap) -> PersonalizedSuggestions {
        let state = self.state();
        let component = context.get("component").and_then(|v| v.as_str());
        let relevant: Vec<&PersonaFeedback> = state
            .feedback
            .iter()
            .filter(|f| component.map_or(true, |c| f.component == c))
            .collect();

        PersonalizedSuggestions {
            averages: numeric_averages(&relevant),
            dominant_category: dominant_category(&relevant),
            applied_insights: state
                .insights
                .iter()
                .filter(|i| i.applied)
                .cloned()
                .collect(),
            feedback_considered: relevant.len(),
        }
    }

    /// Clear feedback history and insights.
    pub fn reset_learning(&self) {
        let mut state = self.state();
        *state = PersonaState::default();
        self.persist(&state);
        tracing::info!("Persona learning reset");
    }

    pub fn snapshot(&self) -> PersonaState {
        self.state().clone()
    }

    pub fn insights(&self) -> Vec<StyleInsight> {
        self.state().insights.clone()
    }
}

/// Clears the learning flag if an analysis future is dropped mid-pass.
struct PassGuard<'a> {
    learner: &'a PersonaLearner,
    finished: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.learner.state().is_learning = false;
        }
    }
}

fn load(storage: &dyn Storage, key: &str) -> Option<PersonaState> {
    let blob = match storage.load(key) {
        Ok(blob) => blob?,
        Err(e) => {
            tracing::warn!("Failed to load persona state: {}", e);
            return None;
        }
    };
    match serde_json::from_str(&blob) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!("Ignoring corrupt persona state: {}", e);
            None
        }
    }
}

/// Group feedback by (component, action) and turn the largest group that
/// has at least `min_group_size` entries and no existing insight into a new
/// insight. Ties go to the group seen first.
pub fn mine_style_insight(
    feedback: &[PersonaFeedback],
    existing: &[StyleInsight],
    min_group_size: usize,
    now: DateTime<Utc>,
) -> Option<StyleInsight> {
    let mut groups: Vec<((&str, &str), Vec<&PersonaFeedback>)> = Vec::new();
    for f in feedback {
        let key = (f.component.as_str(), f.action.as_str());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(f),
            None => groups.push((key, vec![f])),
        }
    }

    let ((component, action), members) = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= min_group_size.max(1))
        .filter(|((c, a), _)| {
            !existing
                .iter()
                .any(|i| i.component == *c && i.action == *a)
        })
        .fold(None, |best: Option<((&str, &str), Vec<&PersonaFeedback>)>, group| match best {
            Some(b) if b.1.len() >= group.1.len() => Some(b),
            _ => Some(group),
        })?;

    let total = feedback.len();
    let count = members.len();
    let confidence = ((count * 100) as f64 / total as f64).round().min(100.0) as u8;
    let start = count.saturating_sub(EXAMPLE_COUNT);
    let examples = members[start..].iter().map(|f| f.value_label()).collect();

    Some(StyleInsight {
        id: Uuid::new_v4().to_string(),
        category: StyleCategory::classify(component, action),
        title: format!("Consistent {} adjustments in {}", action, component),
        description: format!(
            "{} of your last {} edits change {} on {}",
            count, total, action, component
        ),
        confidence,
        examples,
        applied: false,
        component: component.to_string(),
        action: action.to_string(),
        created_at: now,
    })
}

fn numeric_averages(feedback: &[&PersonaFeedback]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for f in feedback {
        if let Some(v) = f.value.as_f64() {
            let entry = sums.entry(f.action.clone()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(action, (sum, n))| (action, sum / n as f64))
        .collect()
}

fn dominant_category(feedback: &[&PersonaFeedback]) -> Option<StyleCategory> {
    let mut counts: Vec<(StyleCategory, usize)> = Vec::new();
    for f in feedback {
        let category = StyleCategory::classify(&f.component, &f.action);
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }
    counts
        .into_iter()
        .fold(None, |best, (category, n)| match best {
            Some((_, best_n)) if best_n >= n => best,
            _ => Some((category, n)),
        })
        .map(|(category, _)| category)
}
