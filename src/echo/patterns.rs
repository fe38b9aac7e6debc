// src/echo/patterns.rs — Workflow pattern extraction from module-visit sequences
//
// The recent log is cut into sequences at every `navigate` action. Each
// sequence lists the distinct modules touched, in order. Identical sequences
// are grouped: frequency is the number of occurrences, confidence the share
// of all qualifying sequences in the window.

use chrono::{DateTime, Utc};

use super::types::{Interaction, WorkflowPattern, NAVIGATE};

/// Representative actions kept per pattern.
const MAX_ACTIONS: usize = 5;

/// A sealed run of interactions between two `navigate` actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub modules: Vec<String>,
    pub actions: Vec<String>,
    pub last_at: Option<DateTime<Utc>>,
}

impl Sequence {
    fn starting_at(interaction: &Interaction) -> Self {
        Self {
            modules: vec![interaction.module.clone()],
            actions: Vec::new(),
            last_at: Some(interaction.timestamp),
        }
    }

    fn absorb(&mut self, interaction: &Interaction) {
        if !self.modules.contains(&interaction.module) {
            self.modules.push(interaction.module.clone());
        }
        if !self.actions.contains(&interaction.action) {
            self.actions.push(interaction.action.clone());
        }
        self.last_at = Some(interaction.timestamp);
    }
}

/// Split interactions into module sequences.
///
/// `navigate` seals the open sequence (if non-empty) and starts a new one
/// holding the navigated-to module. Any other action appends its module
/// unless the sequence already contains it. The open sequence is sealed at
/// the end.
pub fn segment(interactions: &[Interaction]) -> Vec<Sequence> {
    let mut sealed = Vec::new();
    let mut current: Option<Sequence> = None;

    for interaction in interactions {
        if interaction.action == NAVIGATE {
            if let Some(seq) = current.take() {
                if !seq.modules.is_empty() {
                    sealed.push(seq);
                }
            }
            current = Some(Sequence::starting_at(interaction));
        } else {
            current
                .get_or_insert_with(Sequence::default)
                .absorb(interaction);
        }
    }

    if let Some(seq) = current {
        if !seq.modules.is_empty() {
            sealed.push(seq);
        }
    }
    sealed
}

/// Derive workflow patterns from the most recent `window` interactions.
///
/// Returns at most `max_patterns` patterns in order of first detection.
/// Every pattern spans at least two distinct modules.
pub fn extract_patterns(
    log: &[Interaction],
    window: usize,
    max_patterns: usize,
) -> Vec<WorkflowPattern> {
    let start = log.len().saturating_sub(window);
    let qualifying: Vec<Sequence> = segment(&log[start..])
        .into_iter()
        .filter(|s| s.modules.len() >= 2)
        .collect();

    if qualifying.is_empty() {
        return Vec::new();
    }

    let mut patterns: Vec<WorkflowPattern> = Vec::new();
    for seq in &qualifying {
        let last_used = seq.last_at.unwrap_or_else(Utc::now);

        if let Some(existing) = patterns.iter_mut().find(|p| p.modules == seq.modules) {
            existing.frequency += 1;
            for action in &seq.actions {
                if existing.actions.len() < MAX_ACTIONS && !existing.actions.contains(action) {
                    existing.actions.push(action.clone());
                }
            }
            if last_used > existing.last_used {
                existing.last_used = last_used;
            }
            continue;
        }

        // Later candidates beyond the cap are dropped; repeats of kept
        // patterns above still count toward their frequency.
        if patterns.len() >= max_patterns {
            continue;
        }

        patterns.push(WorkflowPattern {
            id: unique_id(pattern_id(&seq.modules), &patterns),
            name: pattern_name(&seq.modules),
            frequency: 1,
            modules: seq.modules.clone(),
            actions: seq.actions.iter().take(MAX_ACTIONS).cloned().collect(),
            confidence: 0.0,
            last_used,
        });
    }

    let total = qualifying.len() as f32;
    for p in &mut patterns {
        p.confidence = (p.frequency as f32 / total).clamp(0.0, 1.0);
    }

    tracing::debug!(
        "Extracted {} pattern(s) from {} qualifying sequence(s)",
        patterns.len(),
        qualifying.len()
    );
    patterns
}

/// Stable id for a module sequence, so ids survive re-extraction. Module
/// slugs are joined with `.`, which `slugify` never emits.
pub fn pattern_id(modules: &[String]) -> String {
    let slugs: Vec<String> = modules.iter().map(|m| slugify(m)).collect();
    format!("wf-{}", slugs.join("."))
}

/// `base`, or `base-2`, `base-3`, ... if an earlier pattern already uses it.
fn unique_id(base: String, patterns: &[WorkflowPattern]) -> String {
    let taken = |id: &str| patterns.iter().any(|p| p.id == id);
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn pattern_name(modules: &[String]) -> String {
    match (modules.first(), modules.last()) {
        (Some(first), Some(last)) => format!("{first} → {last} workflow"),
        _ => "Empty workflow".into(),
    }
}

/// Convert a description into a URL/filename-safe slug.
fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
