// src/persona/mod.rs — Style preferences learned from edit-level feedback

pub mod learner;
pub mod types;

pub use learner::{PersonaLearner, Tracked};
pub use types::{PersonaFeedback, PersonaState, PersonalizedSuggestions, StyleCategory, StyleInsight};
