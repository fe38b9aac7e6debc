// src/echo/insights.rs — Rule-based and model-generated insights

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::event_log::EventLog;
use super::prompts::{extract_json_array, parse_percentage};
use super::types::{EchoInsight, Impact, InsightType, Interaction, JsonMap, WorkflowPattern};
use crate::infra::errors::EchoError;

const WORKFLOW_CONFIDENCE: f32 = 0.85;
const PREFERENCE_CONFIDENCE: f32 = 0.9;

/// Local insights, in rule order:
/// 1. the top pattern as a `workflow` insight,
/// 2. the most-used module as a `preference` insight.
pub fn local_insights(
    patterns: &[WorkflowPattern],
    log: &EventLog,
    now: DateTime<Utc>,
) -> Vec<EchoInsight> {
    let mut insights = Vec::new();

    if let Some(top) = patterns.first() {
        let mut metadata = JsonMap::new();
        metadata.insert("source".into(), json!("local"));
        metadata.insert("pattern_id".into(), json!(top.id));
        metadata.insert("modules".into(), json!(top.modules));
        metadata.insert("frequency".into(), json!(top.frequency));

        insights.push(EchoInsight {
            id: Uuid::new_v4().to_string(),
            insight_type: InsightType::Workflow,
            title: "Workflow pattern detected".into(),
            description: format!("You frequently move through: {}", top.chain()),
            confidence: WORKFLOW_CONFIDENCE,
            impact: Impact::Medium,
            actionable: true,
            suggested_action: Some("Create automated workflow".into()),
            metadata,
            created_at: now,
        });
    }

    if let Some((module, count)) = log.primary_module() {
        let mut metadata = JsonMap::new();
        metadata.insert("source".into(), json!("local"));
        metadata.insert("module".into(), json!(module));
        metadata.insert("usage_count".into(), json!(count));

        insights.push(EchoInsight {
            id: Uuid::new_v4().to_string(),
            insight_type: InsightType::Preference,
            title: format!("You prefer the {module} module"),
            description: format!(
                "{module} accounts for {count} of your {} recorded interactions.",
                log.len()
            ),
            confidence: PREFERENCE_CONFIDENCE,
            impact: Impact::High,
            actionable: true,
            suggested_action: Some("Customize interface".into()),
            metadata,
            created_at: now,
        });
    }

    insights
}

/// Classify a model-generated insight by keywords in its title.
pub fn classify_title(title: &str) -> InsightType {
    let t = title.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| t.contains(w));

    if has(&["workflow", "pattern", "sequence"]) {
        InsightType::Workflow
    } else if has(&["prefer", "like", "favor"]) {
        InsightType::Preference
    } else if has(&["optim", "improve", "enhance"]) {
        InsightType::Optimization
    } else {
        InsightType::Prediction
    }
}

/// Raw insight object as the model returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInsight {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: serde_json::Value,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    actionable: bool,
    #[serde(default, alias = "suggested_action")]
    suggested_action: Option<String>,
}

/// Parse the model's text response into insights.
///
/// `recent` supplies three `module:action` examples for provenance.
pub fn parse_external_insights(
    text: &str,
    recent: &[Interaction],
    model: &str,
    now: DateTime<Utc>,
) -> Result<Vec<EchoInsight>, EchoError> {
    let json = extract_json_array(text)
        .ok_or_else(|| EchoError::MalformedResponse("no JSON array in response".into()))?;
    let raw: Vec<RawInsight> = serde_json::from_str(json)?;

    let examples: Vec<String> = recent.iter().rev().take(3).map(Interaction::label).collect();

    let insights = raw
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .map(|r| {
            let mut metadata = JsonMap::new();
            metadata.insert("source".into(), json!("external"));
            metadata.insert("model".into(), json!(model));
            metadata.insert("examples".into(), json!(examples));

            EchoInsight {
                id: Uuid::new_v4().to_string(),
                insight_type: classify_title(&r.title),
                confidence: parse_percentage(&r.confidence).unwrap_or(0.5),
                impact: Impact::parse_lenient(&r.impact),
                actionable: r.actionable,
                suggested_action: r.suggested_action.filter(|s| !s.trim().is_empty()),
                title: r.title,
                description: r.description,
                metadata,
                created_at: now,
            }
        })
        .collect();

    Ok(insights)
}

/// Prepend `new` (keeping its order) and keep the `cap` most recent.
pub fn merge_insights(existing: &mut Vec<EchoInsight>, new: Vec<EchoInsight>, cap: usize) {
    if new.is_empty() {
        existing.truncate(cap);
        return;
    }
    let mut merged = new;
    merged.append(existing);
    merged.truncate(cap);
    *existing = merged;
}
