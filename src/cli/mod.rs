use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::settings::{DetailLevel, NarrativeStyle, StoryKind, MAX_CHAPTERS, MIN_CHAPTERS};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(alias = "open-ai", alias = "openai")]
    OpenAI,
    #[value(alias = "ollama")]
    Ollama,
}

/// Flags that are not passed fall through to the config file and, for the
/// generation settings, to the last saved values.
#[derive(Parser, Debug)]
#[command(name = "storyloom", version, about = "Story outline generator for SillyTavern-compatible chat hosts")]
pub struct Args {
    /// Base URL of the chat host companion endpoint.
    #[arg(long)]
    pub host_url: Option<String>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, value_enum)]
    pub kind: Option<StoryKind>,

    #[arg(long, value_enum)]
    pub style: Option<NarrativeStyle>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(MIN_CHAPTERS as i64..=MAX_CHAPTERS as i64))]
    pub chapters: Option<u8>,

    #[arg(long, value_enum)]
    pub detail: Option<DetailLevel>,

    /// Free-text story theme.
    #[arg(long)]
    pub theme: Option<String>,

    /// Free-text special requirements.
    #[arg(long)]
    pub requirements: Option<String>,

    /// Include a short story summary section (true/false).
    #[arg(long)]
    pub include_summary: Option<bool>,

    /// Include a character-arcs section (true/false).
    #[arg(long)]
    pub include_character_arcs: Option<bool>,

    /// Include a thematic-analysis section (true/false).
    #[arg(long)]
    pub include_thematic_analysis: Option<bool>,

    /// Custom prompt template file; omitting it keeps the built-in default
    /// and the structured role-tagged prompt.
    #[arg(long)]
    pub template_file: Option<String>,

    /// How many trailing chat messages to include; 0 skips chat history.
    #[arg(long)]
    pub history_limit: Option<usize>,

    /// Write the generated outline here as well as to stdout.
    #[arg(long)]
    pub out: Option<String>,

    /// Assemble and print the prompt without calling the backend.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(long, default_value_t = false)]
    pub yes: bool,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub save_request: bool,

    #[arg(long, default_value_t = false)]
    pub save_response: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Optional TOML config file overriding the built-in defaults.
    #[arg(long)]
    pub config: Option<String>,
}
