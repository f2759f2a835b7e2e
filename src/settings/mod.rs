use anyhow::{Context, Result};
use clap::ValueEnum;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MIN_CHAPTERS: u8 = 3;
pub const MAX_CHAPTERS: u8 = 20;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryKind {
    Fantasy,
    Scifi,
    Mystery,
    Romance,
    Horror,
    Adventure,
    SliceOfLife,
}

impl StoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fantasy => "fantasy",
            Self::Scifi => "science fiction",
            Self::Mystery => "mystery",
            Self::Romance => "romance",
            Self::Horror => "horror",
            Self::Adventure => "adventure",
            Self::SliceOfLife => "slice of life",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeStyle {
    Cinematic,
    Literary,
    Pulpy,
    Minimalist,
    Epistolary,
}

impl NarrativeStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cinematic => "cinematic",
            Self::Literary => "literary",
            Self::Pulpy => "pulpy",
            Self::Minimalist => "minimalist",
            Self::Epistolary => "epistolary",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Brief,
    Detailed,
    Comprehensive,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Detailed => "detailed",
            Self::Comprehensive => "comprehensive",
        }
    }
}

/// Everything the user chose for one outline. Flat record: read once per
/// generation request, last edited value wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub story_kind: StoryKind,
    pub narrative_style: NarrativeStyle,
    pub chapter_count: u8,
    pub detail_level: DetailLevel,
    #[serde(default)]
    pub story_theme: String,
    #[serde(default)]
    pub special_requirements: String,
    #[serde(default)]
    pub include_summary: bool,
    #[serde(default)]
    pub include_character_arcs: bool,
    #[serde(default)]
    pub include_thematic_analysis: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            story_kind: StoryKind::Fantasy,
            narrative_style: NarrativeStyle::Cinematic,
            chapter_count: 5,
            detail_level: DetailLevel::Detailed,
            story_theme: String::new(),
            special_requirements: String::new(),
            include_summary: true,
            include_character_arcs: false,
            include_thematic_analysis: false,
        }
    }
}

impl GenerationSettings {
    /// Chapter count is host-bounded; anything persisted or passed outside
    /// the range is pulled back in.
    pub fn normalized(mut self) -> Self {
        self.chapter_count = self.chapter_count.clamp(MIN_CHAPTERS, MAX_CHAPTERS);
        self
    }

    /// Human-readable list of requested output sections for the prompt.
    pub fn output_sections(&self) -> String {
        let mut sections = Vec::new();
        if self.include_summary {
            sections.push("a short story summary");
        }
        if self.include_character_arcs {
            sections.push("character arcs");
        }
        if self.include_thematic_analysis {
            sections.push("a thematic analysis");
        }
        if sections.is_empty() {
            "no extra sections".to_string()
        } else {
            sections.join(", ")
        }
    }
}

/// Opaque persistence for the last-used settings. Injected where needed so
/// the pipeline itself never touches the filesystem.
pub trait SettingsStore {
    fn load(&self) -> Option<GenerationSettings>;
    fn save(&self, settings: &GenerationSettings) -> Result<()>;
}

pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Option<GenerationSettings> {
        let raw = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str::<GenerationSettings>(&raw)
            .ok()
            .map(GenerationSettings::normalized)
    }

    fn save(&self, settings: &GenerationSettings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let raw = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("writing settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_count_is_clamped_to_host_bounds() {
        let s = GenerationSettings {
            chapter_count: 1,
            ..Default::default()
        };
        assert_eq!(s.normalized().chapter_count, MIN_CHAPTERS);

        let s = GenerationSettings {
            chapter_count: 99,
            ..Default::default()
        };
        assert_eq!(s.normalized().chapter_count, MAX_CHAPTERS);

        let s = GenerationSettings {
            chapter_count: 7,
            ..Default::default()
        };
        assert_eq!(s.normalized().chapter_count, 7);
    }

    #[test]
    fn output_sections_reflect_flags() {
        let mut s = GenerationSettings::default();
        s.include_summary = true;
        s.include_character_arcs = true;
        s.include_thematic_analysis = false;
        assert_eq!(s.output_sections(), "a short story summary, character arcs");

        s.include_summary = false;
        s.include_character_arcs = false;
        assert_eq!(s.output_sections(), "no extra sections");
    }

    #[test]
    fn store_round_trips_last_edit() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        assert!(store.load().is_none());

        let mut s = GenerationSettings::default();
        s.story_theme = "lost kingdom".into();
        store.save(&s).unwrap();

        s.story_theme = "found kingdom".into();
        store.save(&s).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.story_theme, "found kingdom");
    }
}
