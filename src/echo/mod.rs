// src/echo/mod.rs — Interaction learning: log, patterns, insights, suggestions

pub mod engine;
pub mod event_log;
pub mod insights;
pub mod patterns;
pub mod prompts;
pub mod publisher;
pub mod scheduler;
pub mod suggestions;
pub mod types;

pub use engine::{AnalysisOutcome, AnalysisReport, EchoEngine, EchoEngineBuilder, Recorded, SuggestionBatch};
pub use event_log::EventLog;
pub use publisher::{StatePublisher, Subscription};
pub use types::{
    EchoInsight, EchoState, HealthStatus, Impact, InsightType, Interaction, JsonMap,
    NewInteraction, Outcome, Suggestion, SuggestionAction, SuggestionSource, WorkflowPattern,
};
