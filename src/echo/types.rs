// src/echo/types.rs — Echo engine data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open-ended key-value payload attached by UI producers.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Action name that seals the current module sequence.
pub const NAVIGATE: &str = "navigate";

/// How an interaction ended, when the producer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Abandoned,
}

/// One observed user action. Never mutated after it is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub user_id: String,
    pub module: String,
    pub action: String,
    #[serde(default)]
    pub context: JsonMap,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
}

impl Interaction {
    /// `module:action` label used in prompts and provenance metadata.
    pub fn label(&self) -> String {
        format!("{}:{}", self.module, self.action)
    }
}

/// An interaction as submitted by a producer, before id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInteraction {
    #[serde(default = "default_user")]
    pub user_id: String,
    pub module: String,
    pub action: String,
    #[serde(default)]
    pub context: JsonMap,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
}

fn default_user() -> String {
    "anonymous".into()
}

impl NewInteraction {
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: default_user(),
            module: module.into(),
            action: action.into(),
            context: JsonMap::new(),
            outcome: None,
            metadata: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A recurring module sequence detected in the recent log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPattern {
    pub id: String,
    pub name: String,
    pub frequency: u32,
    pub modules: Vec<String>,
    pub actions: Vec<String>,
    pub confidence: f32,
    pub last_used: DateTime<Utc>,
}

impl WorkflowPattern {
    /// "studio → library → export"
    pub fn chain(&self) -> String {
        self.modules.join(" → ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Workflow,
    Preference,
    Optimization,
    Prediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    /// Lenient parse of model output; anything unrecognized is `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Impact::Low,
            "high" => Impact::High,
            _ => Impact::Medium,
        }
    }
}

/// A typed observation with an optional suggested action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoInsight {
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub confidence: f32,
    pub impact: Impact,
    pub actionable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(default)]
    pub metadata: JsonMap,
    pub created_at: DateTime<Utc>,
}

impl EchoInsight {
    /// Provenance tag (`local`, `external`).
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    pub fn is_external(&self) -> bool {
        self.source() == Some("external")
    }

    /// Whether the metadata ties this insight to `module`, either through a
    /// `module` string or a `modules` array.
    pub fn names_module(&self, module: &str) -> bool {
        let single = self
            .metadata
            .get("module")
            .and_then(|v| v.as_str())
            .is_some_and(|m| m == module);
        let listed = self
            .metadata
            .get("modules")
            .and_then(|v| v.as_array())
            .is_some_and(|ms| ms.iter().any(|m| m.as_str() == Some(module)));
        single || listed
    }
}

/// What happens when a suggestion is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionAction {
    OrchestrateWorkflow { pattern_id: String },
    ApplyInsight {
        insight_id: String,
        #[serde(default)]
        action: Option<String>,
    },
    Custom { action: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    External,
    Pattern,
    Insight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub confidence: f32,
    pub action: SuggestionAction,
    pub source: SuggestionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowComplexity {
    #[default]
    Standard,
    Advanced,
}

/// Preferences derived from the log on every analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub primary_module: Option<String>,
    /// Share of all logged interactions per module, in [0, 1].
    pub module_usage: BTreeMap<String, f64>,
    pub workflow_complexity: WorkflowComplexity,
    pub last_updated: Option<DateTime<Utc>>,
    /// Externally generated suggestions, keyed by module.
    pub external_suggestions: BTreeMap<String, Vec<Suggestion>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// External augmentation available and the last call succeeded.
    Optimal,
    /// Running local-only.
    Good,
    /// The last external call failed or timed out.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    /// 0-100
    pub performance: u8,
    pub last_update: DateTime<Utc>,
}

impl Default for SystemHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Good,
            performance: 100,
            last_update: Utc::now(),
        }
    }
}

/// The engine's externally visible snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoState {
    pub is_learning: bool,
    /// 0-100
    pub learning_progress: u8,
    pub total_interactions: u64,
    pub patterns: Vec<WorkflowPattern>,
    /// Newest first.
    pub insights: Vec<EchoInsight>,
    pub user_preferences: UserPreferences,
    pub active_workflows: Vec<String>,
    pub system_health: SystemHealth,
}
