// src/cli/mod.rs — CLI definition (clap derive)

pub mod events;
pub mod persona;
pub mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::echo::types::JsonMap;

#[derive(Parser)]
#[command(
    name = "nexus-echo",
    about = "Learns workflow patterns and insights from dashboard interactions",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    /// Run without external generation even if an API key is configured
    #[arg(long)]
    pub local: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record one interaction
    Record {
        /// Module the interaction happened in (e.g. studio, library)
        module: String,
        /// Action name (use "navigate" when entering a module)
        action: String,
        /// Context entries as key=value (repeatable)
        #[arg(short, long = "ctx", value_parser = parse_key_value)]
        context: Vec<(String, String)>,
        /// User id
        #[arg(long)]
        user: Option<String>,
        /// Outcome: success, failure or abandoned
        #[arg(long)]
        outcome: Option<String>,
    },
    /// Record every interaction in a JSON Lines file
    Replay {
        file: PathBuf,
    },
    /// Read interactions as JSON Lines from stdin, re-analyzing periodically,
    /// until EOF or Ctrl-C
    Listen,
    /// Run one analysis pass now
    Analyze,
    /// Show ranked suggestions for a module
    Suggest {
        module: String,
        /// Context entries as key=value (repeatable)
        #[arg(short, long = "ctx", value_parser = parse_key_value)]
        context: Vec<(String, String)>,
        /// Wait for the external refresh and show the updated list
        #[arg(long)]
        wait: bool,
    },
    /// Show engine state
    Status {
        /// Print the full state as JSON
        #[arg(long)]
        json: bool,
    },
    /// List insights, newest first
    Insights {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Record one persona feedback event
    Feedback {
        /// UI component (e.g. voiceover, grade_panel)
        component: String,
        /// Adjustment made (e.g. pause_length)
        action: String,
        /// New value; parsed as JSON when possible, otherwise kept as text
        value: String,
    },
    /// Show learned style preferences
    Persona {
        /// Run a persona analysis pass first
        #[arg(long)]
        analyze: bool,
        /// Mark a style insight as applied
        #[arg(long)]
        apply: Option<String>,
        /// Narrow suggestions to one component
        #[arg(long)]
        component: Option<String>,
    },
    /// Forget everything learned
    Reset {
        /// Also clear persona feedback and style insights
        #[arg(long)]
        persona: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Turn `key=value` pairs into a context map. Values that parse as JSON
/// (numbers, booleans, arrays) keep their type.
pub fn context_map(pairs: &[(String, String)]) -> JsonMap {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), parse_value(v)))
        .collect()
}

pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("clip=intro").unwrap(),
            ("clip".to_string(), "intro".to_string())
        );
        assert_eq!(parse_key_value("expr=a=b").unwrap().1, "a=b");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_context_map_keeps_types() {
        let ctx = context_map(&[
            ("n".into(), "3".into()),
            ("flag".into(), "true".into()),
            ("name".into(), "intro".into()),
        ]);
        assert_eq!(ctx["n"], json!(3));
        assert_eq!(ctx["flag"], json!(true));
        assert_eq!(ctx["name"], json!("intro"));
    }

    #[test]
    fn test_cli_parses_record() {
        let cli = Cli::parse_from([
            "nexus-echo",
            "--local",
            "record",
            "studio",
            "edit",
            "--ctx",
            "clip=3",
        ]);
        assert!(cli.local);
        match cli.command {
            Commands::Record {
                module, context, ..
            } => {
                assert_eq!(module, "studio");
                assert_eq!(context, vec![("clip".to_string(), "3".to_string())]);
            }
            _ => panic!("expected record"),
        }
    }
}
