// src/cli/status.rs — status, insights and suggest output

use crate::echo::engine::EchoEngine;
use crate::echo::types::{EchoInsight, HealthStatus, Suggestion};
use crate::infra::paths;

pub fn show_status(engine: &EchoEngine, json: bool) -> anyhow::Result<()> {
    let state = engine.get_state();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let health = match state.system_health.status {
        HealthStatus::Optimal => "optimal",
        HealthStatus::Good => "good",
        HealthStatus::Degraded => "degraded",
    };

    println!("nexus-echo v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Data:          {}", paths::data_dir().display());
    println!(
        "  External:      {}",
        if engine.is_gemini_available() {
            "enabled"
        } else {
            "local only"
        }
    );
    println!(
        "  Health:        {} ({}%)",
        health, state.system_health.performance
    );
    println!("  Interactions:  {}", state.total_interactions);
    println!("  Patterns:      {}", state.patterns.len());
    println!("  Insights:      {}", state.insights.len());
    if let Some(module) = &state.user_preferences.primary_module {
        let share = state
            .user_preferences
            .module_usage
            .get(module)
            .copied()
            .unwrap_or(0.0);
        println!("  Primary:       {} ({:.0}%)", module, share * 100.0);
    }

    if !state.patterns.is_empty() {
        println!();
        println!("  Workflow patterns:");
        for p in &state.patterns {
            println!(
                "    {:<24} {}x  {:.0}%  {}",
                p.id,
                p.frequency,
                p.confidence * 100.0,
                p.chain()
            );
        }
    }
    Ok(())
}

/// Serialized (lower-case) name of a unit enum.
fn tag<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn insight_line(insight: &EchoInsight) -> String {
    format!(
        "[{}/{}] {} ({:.0}%, {})",
        tag(&insight.insight_type),
        tag(&insight.impact),
        insight.title,
        insight.confidence * 100.0,
        insight.source().unwrap_or("unknown")
    )
}

pub fn show_insights(engine: &EchoEngine, limit: usize) -> anyhow::Result<()> {
    let insights = engine.insights();
    if insights.is_empty() {
        println!("No insights yet. Record some interactions and run `nexus-echo analyze`.");
        return Ok(());
    }
    for insight in insights.iter().take(limit) {
        println!("{}", insight_line(insight));
        if !insight.description.is_empty() {
            println!("    {}", insight.description);
        }
        if let Some(action) = &insight.suggested_action {
            println!("    -> {}", action);
        }
    }
    Ok(())
}

fn print_suggestions(suggestions: &[Suggestion]) {
    for s in suggestions {
        println!(
            "  {:>3.0}%  {}  ({})",
            s.confidence * 100.0,
            s.title,
            tag(&s.source)
        );
    }
}

pub async fn show_suggestions(
    engine: &EchoEngine,
    module: &str,
    context: &[(String, String)],
    wait: bool,
) -> anyhow::Result<()> {
    let ctx = super::context_map(context);
    let batch = engine.get_suggestions(module, &ctx);

    if batch.suggestions.is_empty() {
        println!("No suggestions for '{}' yet.", module);
    } else {
        print_suggestions(&batch.suggestions);
    }

    if let (true, Some(refresh)) = (wait, batch.refresh) {
        let cached = refresh.await.unwrap_or(0);
        if cached > 0 {
            println!();
            println!("Updated with {} external suggestions:", cached);
            let updated = engine.get_suggestions(module, &ctx);
            if let Some(again) = updated.refresh {
                again.abort();
            }
            print_suggestions(&updated.suggestions);
        }
    }
    Ok(())
}
