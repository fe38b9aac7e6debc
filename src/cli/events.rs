// src/cli/events.rs — record, replay, analyze and reset commands

use anyhow::Context;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::echo::engine::{AnalysisOutcome, EchoEngine};
use crate::echo::types::{NewInteraction, Outcome};
use crate::persona::PersonaLearner;

/// Wait for a triggered analysis and any external merge it started, so the
/// results are persisted before the process exits.
async fn settle(handle: JoinHandle<AnalysisOutcome>) {
    let Ok(outcome) = handle.await else {
        return;
    };
    if let Some(report) = outcome.into_report() {
        if let Some(external) = report.external {
            let _ = external.await;
        }
    }
}

fn parse_outcome(raw: &str) -> anyhow::Result<Outcome> {
    match raw.to_lowercase().as_str() {
        "success" => Ok(Outcome::Success),
        "failure" => Ok(Outcome::Failure),
        "abandoned" => Ok(Outcome::Abandoned),
        other => anyhow::bail!("unknown outcome '{other}' (expected success, failure or abandoned)"),
    }
}

pub async fn run_record(
    engine: &EchoEngine,
    module: String,
    action: String,
    context: &[(String, String)],
    user: Option<String>,
    outcome: Option<String>,
) -> anyhow::Result<()> {
    let mut interaction = NewInteraction::new(module, action);
    interaction.context = super::context_map(context);
    if let Some(user) = user {
        interaction = interaction.user(user);
    }
    if let Some(raw) = outcome {
        interaction = interaction.outcome(parse_outcome(&raw)?);
    }

    let recorded = engine.record(interaction);
    println!("{}", recorded.id);
    if let Some(handle) = recorded.analysis {
        settle(handle).await;
        println!("  (analysis ran: {} patterns)", engine.get_state().patterns.len());
    }
    Ok(())
}

/// Record each line of a JSON Lines file. Blank lines are skipped; a bad
/// line aborts with its line number.
pub async fn run_replay(engine: &EchoEngine, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    let mut recorded = 0usize;
    let mut passes = 0usize;
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let interaction: NewInteraction = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid interaction", file.display(), idx + 1))?;
        let result = engine.record(interaction);
        recorded += 1;
        if let Some(handle) = result.analysis {
            settle(handle).await;
            passes += 1;
        }
    }

    let state = engine.get_state();
    println!(
        "Replayed {} interactions ({} analysis passes). {} patterns, {} insights.",
        recorded,
        passes,
        state.patterns.len(),
        state.insights.len()
    );
    Ok(())
}

/// Long-running mode: the periodic scheduler is active and every completed
/// pass is reported on stderr.
pub async fn run_listen(engine: &EchoEngine) -> anyhow::Result<()> {
    engine.start();

    let was_learning = Arc::new(AtomicBool::new(false));
    let flag = was_learning.clone();
    let subscription = engine.subscribe(move |state| {
        let before = flag.swap(state.is_learning, Ordering::SeqCst);
        if before && !state.is_learning {
            eprintln!(
                "analysis: {} patterns, {} insights",
                state.patterns.len(),
                state.insights.len()
            );
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<NewInteraction>(&line) {
                    Ok(interaction) => {
                        engine.record(interaction);
                    }
                    Err(e) => tracing::warn!("stdin:{}: skipping invalid interaction: {}", line_no, e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    subscription.unsubscribe();
    Ok(())
}

pub async fn run_analyze(engine: &EchoEngine) -> anyhow::Result<()> {
    match engine.analyze().await {
        AnalysisOutcome::AlreadyRunning => println!("Analysis already running."),
        AnalysisOutcome::Completed(report) => {
            println!(
                "Analysis complete: {} patterns, {} local insights.",
                report.patterns, report.local_insights
            );
            if let Some(external) = report.external {
                let merged = external.await.unwrap_or(0);
                println!("  {} external insights merged.", merged);
            }
        }
    }
    Ok(())
}

pub fn run_reset(engine: &EchoEngine, persona: Option<&PersonaLearner>) -> anyhow::Result<()> {
    engine.reset();
    println!("Echo state cleared.");
    if let Some(learner) = persona {
        learner.reset_learning();
        println!("Persona learning cleared.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outcome() {
        assert_eq!(parse_outcome("Success").unwrap(), Outcome::Success);
        assert_eq!(parse_outcome("abandoned").unwrap(), Outcome::Abandoned);
        assert!(parse_outcome("meh").is_err());
    }
}
