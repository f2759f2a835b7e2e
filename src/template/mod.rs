use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::resolve::ContextBundle;
use crate::settings::GenerationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged slice of the prompt. The ordered list of these is what
/// the backend receives as chat messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSegment {
    pub role: Role,
    pub content: String,
}

impl PromptSegment {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// The built-in outline template. Selecting it keeps the prompt in structured
/// mode; any other template flattens everything into a single user segment.
pub const DEFAULT_TEMPLATE: &str = "\
You are an experienced story planner for an ongoing roleplay.

{system_prompt}

World and lore:
{world_info_before}

Main character:
{character_description}

Personality: {character_personality}
Scenario: {character_scenario}

Story so far:
{memory_summary}

Recent conversation:
{chat_history}

Author's note: {authors_note}
{jailbreak}

Plan a {detail_level} {story_kind} story outline in a {narrative_style} style \
with exactly {chapter_count} chapters.
Theme: {story_theme}
Special requirements: {special_requirements}
Also include: {output_sections}

Additional lore to weigh for the ending:
{world_info_after}
";

/// Fallback shown in place of a category that resolved to nothing. Every
/// name gets a non-empty fallback, so an empty category never leaves a
/// dangling label in the rendered prompt.
fn fallback_for(name: &str) -> &'static str {
    match name {
        "world_info_before" | "world_info_after" => "No world info available",
        "character_description" => "No character description available",
        "character_personality" | "character_scenario" => "None",
        "chat_history" => "No conversation yet",
        "memory_summary" => "No summary available",
        "system_prompt" | "authors_note" | "jailbreak" | "special_requirements" => "None",
        "story_theme" => "open",
        _ => "none",
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern"))
}

/// Replace every `{name}` occurrence with its bound value. Replacement is
/// literal and single-pass: a substituted value containing `{other}` text is
/// never re-expanded. Empty and unbound names both resolve to a fallback
/// string, so no placeholder token survives into the final prompt.
pub fn render(template: &str, bindings: &HashMap<&str, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match bindings.get(name) {
                Some(v) if !v.trim().is_empty() => v.clone(),
                _ => fallback_for(name).to_string(),
            }
        })
        .into_owned()
}

/// Every placeholder value for one request: context categories plus the user
/// settings.
pub fn bindings(settings: &GenerationSettings, bundle: &ContextBundle) -> HashMap<&'static str, String> {
    let mut map = HashMap::new();
    map.insert("world_info_before", bundle.world_info_before.clone());
    map.insert("world_info_after", bundle.world_info_after.clone());
    map.insert("character_description", bundle.character_description.clone());
    map.insert("character_personality", bundle.character_personality.clone());
    map.insert("character_scenario", bundle.character_scenario.clone());
    map.insert("chat_history", bundle.chat_history.clone());
    map.insert("system_prompt", bundle.system_prompt.clone());
    map.insert("memory_summary", bundle.memory_summary.clone());
    map.insert("authors_note", bundle.authors_note.clone());
    map.insert("jailbreak", bundle.jailbreak.clone());
    map.insert("story_kind", settings.story_kind.as_str().to_string());
    map.insert("narrative_style", settings.narrative_style.as_str().to_string());
    map.insert("detail_level", settings.detail_level.as_str().to_string());
    map.insert("chapter_count", settings.chapter_count.to_string());
    map.insert("story_theme", settings.story_theme.clone());
    map.insert("special_requirements", settings.special_requirements.clone());
    map.insert("output_sections", settings.output_sections());
    map
}

const BACKGROUND_TEMPLATE: &str = "\
You are an experienced story planner for an ongoing roleplay.
{system_prompt}

World and lore:
{world_info_before}

Main character:
{character_description}

Personality: {character_personality}
Scenario: {character_scenario}

Story so far:
{memory_summary}

Author's note: {authors_note}
{jailbreak}";

const HISTORY_TEMPLATE: &str = "\
Recent conversation:
{chat_history}";

const TASK_TEMPLATE: &str = "\
Plan a {detail_level} {story_kind} story outline in a {narrative_style} style \
with exactly {chapter_count} chapters.
Theme: {story_theme}
Special requirements: {special_requirements}
Also include: {output_sections}

Additional lore to weigh for the ending:
{world_info_after}";

/// Assemble the ordered segment list for one request.
///
/// Structured mode (the template is the built-in default): background lore
/// and the chat excerpt travel as system segments so a role-aware backend can
/// weight them separately from the task itself. Custom mode: the user's
/// template is rendered into one flattened user segment.
pub fn build_segments(
    template: &str,
    settings: &GenerationSettings,
    bundle: &ContextBundle,
) -> Vec<PromptSegment> {
    let map = bindings(settings, bundle);
    if template == DEFAULT_TEMPLATE {
        vec![
            PromptSegment::system(render(BACKGROUND_TEMPLATE, &map)),
            PromptSegment::system(render(HISTORY_TEMPLATE, &map)),
            PromptSegment::user(render(TASK_TEMPLATE, &map)),
        ]
    } else {
        vec![PromptSegment::user(render(template, &map))]
    }
}
