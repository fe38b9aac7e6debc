// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::infra::errors::EchoError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub echo: EchoConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Tuning for the interaction-learning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Run an analysis pass every N recorded interactions.
    pub analyze_every: usize,
    /// Periodic re-analysis interval.
    pub analysis_interval_secs: u64,
    /// How many recent interactions the pattern extractor looks at.
    pub pattern_window: usize,
    pub max_patterns: usize,
    pub max_insights: usize,
    pub max_suggestions: usize,
    /// Interactions kept in the persisted blob.
    pub persist_limit: usize,
    /// Delay between progress steps during a pass (UI feedback only).
    pub progress_step_ms: u64,
    pub external_timeout_secs: u64,
    /// Simulated run time of an orchestrated workflow.
    pub workflow_duration_ms: u64,
    pub storage_key: String,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            analyze_every: 10,
            analysis_interval_secs: 30,
            pattern_window: 100,
            max_patterns: 10,
            max_insights: 50,
            max_suggestions: 5,
            persist_limit: 1000,
            progress_step_ms: 100,
            external_timeout_secs: 30,
            workflow_duration_ms: 3000,
            storage_key: "echo_ai_state".into(),
        }
    }
}

impl EchoConfig {
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs)
    }

    pub fn progress_step(&self) -> Duration {
        Duration::from_millis(self.progress_step_ms)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn workflow_duration(&self) -> Duration {
        Duration::from_millis(self.workflow_duration_ms)
    }
}

/// Content-generation (Gemini) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub enabled: bool,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override for the `generateContent` endpoint root.
    pub base_url: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.0-flash".into(),
            temperature: 0.7,
            max_output_tokens: 1024,
            api_key_env: "GEMINI_API_KEY".into(),
            base_url: None,
        }
    }
}

impl GeminiConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub analyze_every: usize,
    pub max_feedback: usize,
    pub analysis_delay_ms: u64,
    /// Minimum feedback events on one (component, action) pair before it
    /// can produce a style insight.
    pub min_group_size: usize,
    pub storage_key: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            analyze_every: 10,
            max_feedback: 1000,
            analysis_delay_ms: 1500,
            min_group_size: 3,
            storage_key: "persona_learning".into(),
        }
    }
}

impl PersonaConfig {
    pub fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database path override (defaults to the data dir).
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine divide by zero or never
    /// keep anything.
    pub fn validate(&self) -> Result<(), EchoError> {
        let checks = [
            ("echo.analyze_every", self.echo.analyze_every),
            ("echo.pattern_window", self.echo.pattern_window),
            ("echo.max_insights", self.echo.max_insights),
            ("echo.persist_limit", self.echo.persist_limit),
            ("persona.analyze_every", self.persona.analyze_every),
            ("persona.max_feedback", self.persona.max_feedback),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(EchoError::Config(format!("{name} must be at least 1")));
            }
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(EchoError::Config(format!(
                "gemini.temperature must be within 0.0-2.0, got {}",
                self.gemini.temperature
            )));
        }
        Ok(())
    }
}
