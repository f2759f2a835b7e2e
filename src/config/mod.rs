use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::cli::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host_url: String,
    pub out_dir: String,
    pub provider: ProviderKind,
    pub model: String,
    pub timeout_secs: u64,
    pub history_limit: usize,
    pub world_info_timeout_ms: u64,
    pub ollama_url: Option<String>,
    pub settings_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_url: "http://localhost:8000".into(),
            out_dir: ".storyloom".into(),
            provider: ProviderKind::OpenAI,
            model: "gpt-4.1-mini".into(),
            timeout_secs: 240,
            history_limit: 20,
            world_info_timeout_ms: 3000,
            ollama_url: Some("http://localhost:11434".into()),
            settings_path: ".storyloom/settings.json".into(),
        }
    }
}

impl Config {
    /// Built-in defaults, overridden by the TOML file when one is given.
    /// Missing keys in the file keep their defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let raw = fs::read_to_string(p).with_context(|| format!("reading config {p}"))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {p}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storyloom.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "model = \"llama3\"\nhistory_limit = 5").unwrap();

        let cfg = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.model, "llama3");
        assert_eq!(cfg.history_limit, 5);
        assert_eq!(cfg.world_info_timeout_ms, 3000);
        assert_eq!(cfg.host_url, "http://localhost:8000");
    }

    #[test]
    fn missing_file_is_an_error_but_no_file_is_defaults() {
        assert!(Config::load(Some("/definitely/not/here.toml")).is_err());
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.out_dir, ".storyloom");
    }
}
