use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod http;

/// ========================================
/// Host-side data as SillyTavern serializes it
/// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub is_user: bool,
    #[serde(default)]
    pub name: String,
    /// Message body. The host calls this field `mes`.
    #[serde(rename = "mes", default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterCard {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(rename = "first_mes", default)]
    pub first_message: String,
    #[serde(rename = "mes_example", default)]
    pub example_dialogue: String,
}

/// A lorebook entry. `key` may arrive as a single string or an array and
/// `position` as a number or a string, so both stay loosely typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldInfoEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "disable", default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl WorldInfoEntry {
    /// Entries marked `1` or `"after"` go after the task instructions;
    /// every other marker, including a missing one, stays before them.
    pub fn is_after(&self) -> bool {
        match &self.position {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => s.eq_ignore_ascii_case("after"),
            _ => false,
        }
    }

    /// Display title: the comment if present, else the first activation key.
    pub fn title(&self) -> String {
        if let Some(c) = &self.comment {
            let c = c.trim();
            if !c.is_empty() {
                return c.to_string();
            }
        }
        match &self.key {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Array(arr)) => arr
                .iter()
                .find_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Lore".to_string()),
            _ => "Lore".to_string(),
        }
    }
}

/// Raw dump of the host's prompt-shaping state. Every field is optional on
/// the wire; missing ones default to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSnapshot {
    #[serde(default)]
    pub world_info: Vec<WorldInfoEntry>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub memory_summary: String,
    #[serde(rename = "authors_note", default)]
    pub authors_note: String,
    #[serde(default)]
    pub jailbreak: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ActivatedWorldInfo,
    WorldInfoList,
    StateSnapshot,
    LazyWorldInfo,
    Character,
    Chat,
}

/// Accessors into the running chat host. Any capability may be absent on a
/// given host build, so callers probe with `supports` before calling and
/// treat errors from individual accessors as "no data", never as fatal.
#[async_trait]
pub trait HostApi: Send + Sync {
    fn supports(&self, cap: Capability) -> bool;

    /// Entries the host activated against the given recent chat text.
    async fn activated_world_info(&self, chat_text: &str) -> Result<Vec<WorldInfoEntry>>;

    /// The full lorebook, unfiltered. Older hosts only expose this.
    async fn world_info_list(&self) -> Result<Vec<WorldInfoEntry>>;

    async fn state_snapshot(&self) -> Result<HostSnapshot>;

    /// Ask the host to lazily (re)load world info, then wait for entries to
    /// appear. May never resolve on hosts that ignore the trigger; callers
    /// bound it with a timeout.
    async fn lazy_world_info(&self, chat_text: &str) -> Result<Vec<WorldInfoEntry>>;

    async fn character(&self) -> Result<Option<CharacterCard>>;

    async fn chat_transcript(&self) -> Result<Vec<ChatMessage>>;
}
