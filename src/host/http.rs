use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

use super::{Capability, CharacterCard, ChatMessage, HostApi, HostSnapshot, WorldInfoEntry};

/// HTTP adapter for a SillyTavern-compatible companion endpoint. The set of
/// routes a given host build exposes is discovered once at connect time; the
/// resolvers skip whatever is missing.
pub struct HttpHost {
    base_url: String,
    client: Client,
    capabilities: HashSet<&'static str>,
}

#[derive(Deserialize)]
struct ProbeResponse {
    #[serde(default)]
    capabilities: Vec<String>,
}

fn cap_key(cap: Capability) -> &'static str {
    match cap {
        Capability::ActivatedWorldInfo => "worldinfo.activated",
        Capability::WorldInfoList => "worldinfo.list",
        Capability::StateSnapshot => "state",
        Capability::LazyWorldInfo => "worldinfo.lazy",
        Capability::Character => "character",
        Capability::Chat => "chat",
    }
}

impl HttpHost {
    /// Connect and probe. An unreachable host is not an error: it yields a
    /// client with no advertised capabilities, so every resolver falls
    /// through to its empty-result path.
    pub async fn connect(base_url: &str, timeout_secs: u64, debug: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building host http client")?;

        let url = format!("{}/api/probe", base_url.trim_end_matches('/'));
        let capabilities = match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<ProbeResponse>().await {
                Ok(p) => p
                    .capabilities
                    .into_iter()
                    .filter_map(|c| KNOWN_CAPS.iter().find(|k| **k == c).copied())
                    .collect(),
                Err(_) => HashSet::new(),
            },
            _ => {
                if debug {
                    eprintln!("debug/host: probe failed at {url}; continuing without host data");
                }
                HashSet::new()
            }
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            capabilities,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("host GET {path} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("host GET {path} returned {status}");
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("host GET {path}: bad body"))
    }
}

const KNOWN_CAPS: [&str; 6] = [
    "worldinfo.activated",
    "worldinfo.list",
    "worldinfo.lazy",
    "state",
    "character",
    "chat",
];

#[async_trait]
impl HostApi for HttpHost {
    fn supports(&self, cap: Capability) -> bool {
        self.capabilities.contains(cap_key(cap))
    }

    async fn activated_world_info(&self, chat_text: &str) -> Result<Vec<WorldInfoEntry>> {
        let resp = self
            .client
            .post(self.url("/api/worldinfo/activated"))
            .json(&json!({ "chat_text": chat_text }))
            .send()
            .await
            .context("host activated-worldinfo request failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("host activated-worldinfo returned {status}");
        }
        resp.json::<Vec<WorldInfoEntry>>()
            .await
            .context("host activated-worldinfo: bad body")
    }

    async fn world_info_list(&self) -> Result<Vec<WorldInfoEntry>> {
        self.get_json("/api/worldinfo/entries").await
    }

    async fn state_snapshot(&self) -> Result<HostSnapshot> {
        self.get_json("/api/state").await
    }

    async fn lazy_world_info(&self, chat_text: &str) -> Result<Vec<WorldInfoEntry>> {
        // Kick the host's own lazy loader, then poll until entries show up.
        // The caller races this loop against its timeout.
        let resp = self
            .client
            .post(self.url("/api/worldinfo/refresh"))
            .json(&json!({ "chat_text": chat_text }))
            .send()
            .await
            .context("host worldinfo-refresh trigger failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("host worldinfo-refresh returned {status}");
        }

        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let entries: Vec<WorldInfoEntry> = self.get_json("/api/worldinfo/entries").await?;
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
    }

    async fn character(&self) -> Result<Option<CharacterCard>> {
        self.get_json("/api/character").await
    }

    async fn chat_transcript(&self) -> Result<Vec<ChatMessage>> {
        self.get_json("/api/chat").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    /// Single-purpose local server answering every request with one status.
    fn serve_status(status_line: &'static str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(
                    format!(
                        "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn failing_refresh_trigger_aborts_lazy_load() {
        let base = serve_status("500 Internal Server Error");
        let host = HttpHost::connect(&base, 5, false).await.unwrap();

        // The error must surface immediately instead of entering the poll
        // loop and waiting out the caller's timeout.
        let err = host.lazy_world_info("dragons").await.unwrap_err();
        assert!(err.to_string().contains("worldinfo-refresh"));
    }

    #[tokio::test]
    async fn failed_probe_leaves_capabilities_empty() {
        let base = serve_status("404 Not Found");
        let host = HttpHost::connect(&base, 5, false).await.unwrap();
        for cap in [
            Capability::ActivatedWorldInfo,
            Capability::WorldInfoList,
            Capability::StateSnapshot,
            Capability::LazyWorldInfo,
            Capability::Character,
            Capability::Chat,
        ] {
            assert!(!host.supports(cap));
        }
    }
}
