use std::time::Duration;

use crate::host::{Capability, ChatMessage, HostApi, WorldInfoEntry};

/// Resolved context text, one field per category. Built fresh for each
/// generation request and never mutated afterwards; a field left empty means
/// every strategy for that category came up dry, which is a valid outcome.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub world_info_before: String,
    pub world_info_after: String,
    pub character_description: String,
    pub character_personality: String,
    pub character_scenario: String,
    pub chat_history: String,
    pub system_prompt: String,
    pub memory_summary: String,
    pub authors_note: String,
    pub jailbreak: String,
}

/// How many trailing messages feed the keyword-activation text for the
/// activated-entries strategy.
const ACTIVATION_WINDOW: usize = 10;

/// Gather every category from the host. World info, character and prompt
/// extras are independent (disjoint bundle fields), so they run concurrently;
/// chat history goes first because activation needs the recent chat text.
pub async fn build_bundle(
    host: &dyn HostApi,
    history_limit: usize,
    world_info_timeout: Duration,
) -> ContextBundle {
    let transcript = fetch_transcript(host).await;
    let chat_history = format_chat_history(&transcript, history_limit);
    let chat_text = recent_chat_text(&transcript, ACTIVATION_WINDOW);

    let (world_info, character, extras) = futures::join!(
        resolve_world_info(host, &chat_text, world_info_timeout),
        resolve_character(host),
        resolve_prompt_extras(host),
    );
    let (world_info_before, world_info_after) = world_info;
    let (character_description, character_personality, character_scenario) = character;
    let (system_prompt, memory_summary, authors_note, jailbreak) = extras;

    ContextBundle {
        world_info_before,
        world_info_after,
        character_description,
        character_personality,
        character_scenario,
        chat_history,
        system_prompt,
        memory_summary,
        authors_note,
        jailbreak,
    }
}

async fn fetch_transcript(host: &dyn HostApi) -> Vec<ChatMessage> {
    if !host.supports(Capability::Chat) {
        return Vec::new();
    }
    host.chat_transcript().await.unwrap_or_default()
}

/// ========================================
/// World info
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorldInfoStrategy {
    Activated,
    FullList,
    Snapshot,
    LazyLoad,
}

/// Fixed priority order; the first strategy that exists and yields usable
/// entries wins.
const WORLD_INFO_STRATEGIES: [WorldInfoStrategy; 4] = [
    WorldInfoStrategy::Activated,
    WorldInfoStrategy::FullList,
    WorldInfoStrategy::Snapshot,
    WorldInfoStrategy::LazyLoad,
];

/// Resolve lore entries and split them into the text that precedes the task
/// instructions and the text that follows them. Never fails: a host with no
/// working strategy yields two empty strings.
pub async fn resolve_world_info(
    host: &dyn HostApi,
    chat_text: &str,
    timeout: Duration,
) -> (String, String) {
    for strategy in WORLD_INFO_STRATEGIES {
        let Some(entries) = try_strategy(host, strategy, chat_text, timeout).await else {
            continue;
        };
        let usable: Vec<WorldInfoEntry> = entries
            .into_iter()
            .filter(|e| !e.disabled && !e.content.trim().is_empty())
            .collect();
        if usable.is_empty() {
            continue;
        }
        let (before, after) = split_entries(&usable);
        return (format_entries(&before), format_entries(&after));
    }
    (String::new(), String::new())
}

/// One strategy attempt. A missing capability, an error or a timeout all
/// collapse to `None` so the caller moves on to the next strategy.
async fn try_strategy(
    host: &dyn HostApi,
    strategy: WorldInfoStrategy,
    chat_text: &str,
    timeout: Duration,
) -> Option<Vec<WorldInfoEntry>> {
    let cap = match strategy {
        WorldInfoStrategy::Activated => Capability::ActivatedWorldInfo,
        WorldInfoStrategy::FullList => Capability::WorldInfoList,
        WorldInfoStrategy::Snapshot => Capability::StateSnapshot,
        WorldInfoStrategy::LazyLoad => Capability::LazyWorldInfo,
    };
    if !host.supports(cap) {
        return None;
    }

    let attempt = async {
        match strategy {
            WorldInfoStrategy::Activated => host.activated_world_info(chat_text).await,
            WorldInfoStrategy::FullList => host.world_info_list().await,
            WorldInfoStrategy::Snapshot => host.state_snapshot().await.map(|s| s.world_info),
            WorldInfoStrategy::LazyLoad => host.lazy_world_info(chat_text).await,
        }
    };
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(entries)) => Some(entries),
        _ => None,
    }
}

/// Position marker `1` / `"after"` goes after the task instructions;
/// everything else, including missing markers, stays before. Relative order
/// within each group is preserved.
pub fn split_entries(entries: &[WorldInfoEntry]) -> (Vec<WorldInfoEntry>, Vec<WorldInfoEntry>) {
    let mut before = Vec::new();
    let mut after = Vec::new();
    for e in entries {
        if e.is_after() {
            after.push(e.clone());
        } else {
            before.push(e.clone());
        }
    }
    (before, after)
}

/// Render entries as `[Title]` headings over their bodies, blank-line
/// separated.
pub fn format_entries(entries: &[WorldInfoEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("[{}]\n{}", e.title(), e.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// ========================================
/// Character card
/// ========================================

async fn resolve_character(host: &dyn HostApi) -> (String, String, String) {
    if !host.supports(Capability::Character) {
        return Default::default();
    }
    match host.character().await {
        Ok(Some(card)) => (
            card.description.trim().to_string(),
            card.personality.trim().to_string(),
            card.scenario.trim().to_string(),
        ),
        _ => Default::default(),
    }
}

/// ========================================
/// Chat history
/// ========================================

/// Last `limit` messages in original order, `Name: body` tagged, empty
/// bodies dropped, blank-line joined. A limit of 0 skips the category.
pub fn format_chat_history(messages: &[ChatMessage], limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    let start = messages.len().saturating_sub(limit);
    messages[start..]
        .iter()
        .filter(|m| !m.body.trim().is_empty())
        .map(|m| {
            let name = if m.name.trim().is_empty() {
                if m.is_user { "User" } else { "Assistant" }
            } else {
                m.name.trim()
            };
            format!("{}: {}", name, m.body.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Raw trailing chat text used as the keyword-activation input.
fn recent_chat_text(messages: &[ChatMessage], window: usize) -> String {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .map(|m| m.body.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// ========================================
/// Prompt extras from the state snapshot
/// ========================================

async fn resolve_prompt_extras(host: &dyn HostApi) -> (String, String, String, String) {
    if !host.supports(Capability::StateSnapshot) {
        return Default::default();
    }
    match host.state_snapshot().await {
        Ok(s) => (
            s.system_prompt.trim().to_string(),
            s.memory_summary.trim().to_string(),
            s.authors_note.trim().to_string(),
            s.jailbreak.trim().to_string(),
        ),
        Err(_) => Default::default(),
    }
}
