// src/persona/types.rs — Persona feedback data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::echo::types::JsonMap;

/// Which part of the creative style a feedback group speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleCategory {
    Editing,
    Color,
    Audio,
    Content,
    Platform,
}

impl StyleCategory {
    /// Derive the category from keywords in the component and action names.
    /// Anything unrecognized is `Editing`.
    pub fn classify(component: &str, action: &str) -> Self {
        let text = format!("{} {}", component, action).to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

        if has(&["color", "colour", "grade", "lut"]) {
            StyleCategory::Color
        } else if has(&["audio", "music", "voice", "pause"]) {
            StyleCategory::Audio
        } else if has(&["caption", "script", "text", "content"]) {
            StyleCategory::Content
        } else if has(&["platform", "export", "aspect"]) {
            StyleCategory::Platform
        } else {
            StyleCategory::Editing
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StyleCategory::Editing => "editing",
            StyleCategory::Color => "color",
            StyleCategory::Audio => "audio",
            StyleCategory::Content => "content",
            StyleCategory::Platform => "platform",
        }
    }
}

/// One fine-grained UI edit, e.g. "pause length nudged to 0.4s".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaFeedback {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub context: JsonMap,
    pub value: serde_json::Value,
    pub component: String,
    pub timestamp: DateTime<Utc>,
}

impl PersonaFeedback {
    /// Display form of the value: strings verbatim, everything else as JSON.
    pub fn value_label(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A learned style preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleInsight {
    pub id: String,
    pub category: StyleCategory,
    pub title: String,
    pub description: String,
    /// 0-100
    pub confidence: u8,
    /// Recent values that support the insight.
    pub examples: Vec<String>,
    #[serde(default)]
    pub applied: bool,
    pub component: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Snapshot returned by `get_personalized_suggestions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonalizedSuggestions {
    /// Mean numeric value per action.
    pub averages: BTreeMap<String, f64>,
    pub dominant_category: Option<StyleCategory>,
    pub applied_insights: Vec<StyleInsight>,
    pub feedback_considered: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaState {
    pub is_learning: bool,
    pub total_feedback: u64,
    /// Oldest first, bounded.
    pub feedback: Vec<PersonaFeedback>,
    /// Oldest first.
    pub insights: Vec<StyleInsight>,
}
