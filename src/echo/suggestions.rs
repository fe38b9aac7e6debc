// src/echo/suggestions.rs — Suggestion ranking for the current module

use serde::Deserialize;
use uuid::Uuid;

use super::prompts::{extract_json_array, parse_percentage};
use super::types::{
    EchoInsight, Suggestion, SuggestionAction, SuggestionSource, WorkflowPattern,
};
use crate::infra::errors::EchoError;

/// Combine suggestion sources for `module`, in priority order:
/// cached external suggestions, patterns that include the module, then
/// actionable insights whose metadata names it. At most `cap` entries.
pub fn rank_suggestions(
    module: &str,
    cached: &[Suggestion],
    patterns: &[WorkflowPattern],
    insights: &[EchoInsight],
    cap: usize,
) -> Vec<Suggestion> {
    let from_patterns = patterns
        .iter()
        .filter(|p| p.modules.iter().any(|m| m == module))
        .map(|p| Suggestion {
            id: format!("sugg-{}", p.id),
            title: format!("Run {}", p.name),
            description: format!("Automate {} ({}x observed)", p.chain(), p.frequency),
            confidence: p.confidence,
            action: SuggestionAction::OrchestrateWorkflow {
                pattern_id: p.id.clone(),
            },
            source: SuggestionSource::Pattern,
        });

    let from_insights = insights
        .iter()
        .filter(|i| i.actionable && i.names_module(module))
        .map(|i| Suggestion {
            id: format!("sugg-{}", i.id),
            title: i.title.clone(),
            description: i.description.clone(),
            confidence: i.confidence,
            action: SuggestionAction::ApplyInsight {
                insight_id: i.id.clone(),
                action: i.suggested_action.clone(),
            },
            source: SuggestionSource::Insight,
        });

    cached
        .iter()
        .cloned()
        .chain(from_patterns)
        .chain(from_insights)
        .take(cap)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuggestion {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: serde_json::Value,
    #[serde(default, alias = "suggested_action", alias = "action")]
    suggested_action: Option<String>,
}

/// Parse the model's suggestion list.
pub fn parse_external_suggestions(text: &str) -> Result<Vec<Suggestion>, EchoError> {
    let json = extract_json_array(text)
        .ok_or_else(|| EchoError::MalformedResponse("no JSON array in response".into()))?;
    let raw: Vec<RawSuggestion> = serde_json::from_str(json)?;

    Ok(raw
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .map(|r| {
            let action = r
                .suggested_action
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| r.title.clone());
            Suggestion {
                id: Uuid::new_v4().to_string(),
                confidence: parse_percentage(&r.confidence).unwrap_or(0.5),
                title: r.title,
                description: r.description,
                action: SuggestionAction::Custom { action },
                source: SuggestionSource::External,
            }
        })
        .collect())
}
