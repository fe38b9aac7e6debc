// src/echo/prompts.rs — Prompt construction and defensive JSON extraction

use serde::Serialize;

use super::types::{Interaction, JsonMap};

/// Compact view of an interaction sent to the model.
#[derive(Serialize)]
struct PromptEvent<'a> {
    module: &'a str,
    action: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a str>,
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    context: &'a JsonMap,
}

fn serialize_events(interactions: &[Interaction]) -> String {
    let events: Vec<PromptEvent<'_>> = interactions
        .iter()
        .map(|i| PromptEvent {
            module: &i.module,
            action: &i.action,
            timestamp: i.timestamp.to_rfc3339(),
            outcome: i.outcome.map(|o| match o {
                super::types::Outcome::Success => "success",
                super::types::Outcome::Failure => "failure",
                super::types::Outcome::Abandoned => "abandoned",
            }),
            context: &i.context,
        })
        .collect();
    serde_json::to_string_pretty(&events).unwrap_or_else(|_| "[]".into())
}

/// Ask for exactly three insights about the recent interaction stream.
pub fn insight_prompt(recent: &[Interaction]) -> String {
    format!(
        "You are Echo, the learning assistant of a creative-production dashboard.\n\
         Analyze these {count} recent user interactions and identify exactly 3 insights \
         about the user's workflows, preferences, or optimization opportunities.\n\n\
         Interactions:\n{events}\n\n\
         Respond ONLY with a JSON array of 3 objects, each with these fields:\n\
         - \"title\": short insight title\n\
         - \"description\": one or two sentences\n\
         - \"confidence\": integer percentage 0-100\n\
         - \"impact\": \"low\" | \"medium\" | \"high\"\n\
         - \"actionable\": true | false\n\
         - \"suggestedAction\": concrete next step for the user",
        count = recent.len(),
        events = serialize_events(recent),
    )
}

/// Ask for exactly three suggestions for the user's current module.
pub fn suggestion_prompt(module: &str, context: &JsonMap, recent: &[Interaction]) -> String {
    let context_json = serde_json::to_string(context).unwrap_or_else(|_| "{}".into());
    format!(
        "You are Echo, the learning assistant of a creative-production dashboard.\n\
         The user is currently in the \"{module}\" module with context {context_json}.\n\
         Their {count} most recent interactions in this module:\n{events}\n\n\
         Suggest exactly 3 next actions. Respond ONLY with a JSON array of 3 objects, \
         each with these fields:\n\
         - \"title\": short suggestion title\n\
         - \"description\": one sentence\n\
         - \"confidence\": integer percentage 0-100\n\
         - \"suggestedAction\": the action to take",
        count = recent.len(),
        events = serialize_events(recent),
    )
}

/// Locate the JSON array in a model response.
///
/// Models often wrap JSON in markdown fences or surround it with prose; take
/// the span from the first `[` to the last `]`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse a confidence value that may be a number (`85`, `0.85`) or a
/// string (`"85%"`) into [0, 1], treating the input as a percentage.
pub fn parse_percentage(value: &serde_json::Value) -> Option<f32> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    Some(((raw / 100.0) as f32).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::event_log::EventLog;
    use crate::echo::types::NewInteraction;
    use serde_json::json;

    #[test]
    fn test_extract_from_fenced_block() {
        let text = "Here you go:\n```json\n[{\"title\":\"x\"}]\n```\nThanks";
        assert_eq!(extract_json_array(text), Some("[{\"title\":\"x\"}]"));
    }

    #[test]
    fn test_extract_missing_array() {
        assert!(extract_json_array("no json here").is_none());
        assert!(extract_json_array("] backwards [").is_none());
    }

    #[test]
    fn test_parse_percentage_forms() {
        assert!((parse_percentage(&json!(85)).unwrap() - 0.85).abs() < 1e-6);
        assert!((parse_percentage(&json!("90%")).unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(parse_percentage(&json!(250)), Some(1.0));
        assert_eq!(parse_percentage(&json!(null)), None);
        assert_eq!(parse_percentage(&json!("high")), None);
    }

    #[test]
    fn test_insight_prompt_mentions_events() {
        let mut log = EventLog::new();
        log.append(NewInteraction::new("studio", "render").context("clip", "intro"));
        let prompt = insight_prompt(log.entries());
        assert!(prompt.contains("exactly 3 insights"));
        assert!(prompt.contains("\"module\": \"studio\""));
        assert!(prompt.contains("suggestedAction"));
    }

    #[test]
    fn test_suggestion_prompt_includes_module_and_context() {
        let mut ctx = JsonMap::new();
        ctx.insert("project".into(), json!("p-1"));
        let prompt = suggestion_prompt("library", &ctx, &[]);
        assert!(prompt.contains("\"library\" module"));
        assert!(prompt.contains("\"project\":\"p-1\""));
    }
}
