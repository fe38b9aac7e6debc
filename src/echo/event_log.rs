// src/echo/event_log.rs — Append-only interaction log

use chrono::Utc;
use uuid::Uuid;

use super::types::{Interaction, NewInteraction};

/// In-memory, append-only sequence of interactions in time order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<Interaction>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from persisted interactions, assumed to be in log order.
    pub fn from_entries(entries: Vec<Interaction>) -> Self {
        Self { entries }
    }

    /// Assign an id and timestamp and append. The timestamp is clamped so
    /// that log order always equals time order, even if the clock steps back.
    pub fn append(&mut self, new: NewInteraction) -> &Interaction {
        let mut timestamp = Utc::now();
        if let Some(last) = self.entries.last() {
            if timestamp < last.timestamp {
                timestamp = last.timestamp;
            }
        }

        self.entries.push(Interaction {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            module: new.module,
            action: new.action,
            context: new.context,
            timestamp,
            outcome: new.outcome,
            metadata: new.metadata,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Interaction] {
        &self.entries
    }

    /// The most recent `n` interactions, oldest first.
    pub fn recent(&self, n: usize) -> &[Interaction] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// The most recent `n` interactions produced by `module`, oldest first.
    pub fn recent_for_module(&self, module: &str, n: usize) -> Vec<Interaction> {
        let mut picked: Vec<Interaction> = self
            .entries
            .iter()
            .rev()
            .filter(|i| i.module == module)
            .take(n)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    pub fn count_for_module(&self, module: &str) -> usize {
        self.entries.iter().filter(|i| i.module == module).count()
    }

    /// Per-module interaction counts, in order of first appearance.
    pub fn usage_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for entry in &self.entries {
            match counts.iter_mut().find(|(m, _)| *m == entry.module) {
                Some((_, c)) => *c += 1,
                None => counts.push((entry.module.clone(), 1)),
            }
        }
        counts
    }

    /// Most-used module. Ties go to the module seen first.
    pub fn primary_module(&self) -> Option<(String, usize)> {
        self.usage_counts()
            .into_iter()
            .fold(None, |best, (module, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((module, count)),
            })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
