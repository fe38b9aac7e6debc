// src/cli/persona.rs — feedback and persona commands

use crate::echo::types::JsonMap;
use crate::persona::PersonaLearner;

pub async fn run_feedback(
    learner: &PersonaLearner,
    component: String,
    action: String,
    value: &str,
) -> anyhow::Result<()> {
    let tracked = learner.track(action, JsonMap::new(), super::parse_value(value), component);
    println!("{}", tracked.id);
    if let Some(handle) = tracked.analysis {
        if let Ok(Some(insight)) = handle.await {
            println!("  learned: {} ({}%)", insight.title, insight.confidence);
        }
    }
    Ok(())
}

pub async fn show_persona(
    learner: &PersonaLearner,
    analyze: bool,
    apply: Option<&str>,
    component: Option<&str>,
) -> anyhow::Result<()> {
    if analyze {
        match learner.analyze_patterns().await {
            Some(insight) => println!("Learned: {} ({}%)", insight.title, insight.confidence),
            None => println!("No new style preference found."),
        }
    }
    if let Some(id) = apply {
        if !learner.apply_insight(id) {
            anyhow::bail!("no style insight with id '{id}'");
        }
        println!("Applied {id}.");
    }

    let state = learner.snapshot();
    println!("Feedback events: {}", state.total_feedback);
    if state.insights.is_empty() {
        println!("No style insights yet.");
    } else {
        println!("Style insights:");
        for i in &state.insights {
            println!(
                "  {} [{}] {} ({}%){}",
                i.id,
                i.category.as_str(),
                i.title,
                i.confidence,
                if i.applied { " applied" } else { "" }
            );
            if !i.examples.is_empty() {
                println!("      e.g. {}", i.examples.join(", "));
            }
        }
    }

    let mut context = JsonMap::new();
    if let Some(c) = component {
        context.insert("component".into(), serde_json::Value::String(c.to_string()));
    }
    let suggestions = learner.get_personalized_suggestions(&context);
    if let Some(category) = suggestions.dominant_category {
        println!("Dominant focus: {}", category.as_str());
    }
    for (action, avg) in &suggestions.averages {
        println!("  typical {}: {:.2}", action, avg);
    }
    Ok(())
}
