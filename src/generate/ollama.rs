use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::template::{PromptSegment, Role};

pub struct OllamaBackend {
    model: String,
    url: String,
    client: Client,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: String,
}

fn to_messages(segments: &[PromptSegment]) -> Vec<Msg> {
    segments
        .iter()
        .map(|s| Msg {
            role: match s.role {
                Role::System => "system".into(),
                Role::User => "user".into(),
            },
            content: s.content.clone(),
        })
        .collect()
}

impl OllamaBackend {
    pub fn new(model: String, url: String, timeout_secs: u64) -> Self {
        Self {
            model,
            url,
            client: Client::new(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl super::Backend for OllamaBackend {
    async fn probe(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("ollama probe request failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("ollama probe returned {}", resp.status()));
        }
        Ok(())
    }

    async fn complete(&self, segments: &[PromptSegment], debug: bool) -> Result<String> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: to_messages(segments),
            stream: false,
            options: OllamaOptions { temperature: 0.8 },
        };

        if debug {
            eprintln!("debug/ollama: POST {url}");
        }

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?;

        let text = resp.text().await.context("ollama read body failed")?;

        if debug {
            eprintln!("debug/ollama: raw body:\n{text}\n");
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("failed to parse ollama response: {e}\nRaw: {text}"))?;

        Ok(parsed.message.content)
    }
}
