use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::template::{PromptSegment, Role};

/// OpenAI-compatible chat completions backend. Segments map one-to-one onto
/// chat messages, so the structured prompt keeps its role split.
pub struct OpenAiBackend {
    model: String,
    client: Client,
    timeout_secs: u64,
    api_base: String,
}

impl OpenAiBackend {
    pub fn new(model: String, timeout_secs: u64) -> Self {
        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Self {
            model,
            client: Client::new(),
            timeout_secs,
            api_base,
        }
    }

    fn api_key(&self) -> Result<String> {
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY env var is not set"))
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[async_trait]
impl super::Backend for OpenAiBackend {
    async fn probe(&self) -> Result<()> {
        let key = self.api_key()?;
        let url = format!("{}/models", self.api_base.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("openai probe request failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("openai probe returned {}", resp.status()));
        }
        Ok(())
    }

    async fn complete(&self, segments: &[PromptSegment], debug: bool) -> Result<String> {
        let key = self.api_key()?;

        let messages: Vec<_> = segments
            .iter()
            .map(|s| json!({ "role": Self::role_str(s.role), "content": s.content }))
            .collect();

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.8,
            "stream": false
        });

        if debug {
            eprintln!(
                "debug/openai: POST /chat/completions body:\n{}",
                serde_json::to_string_pretty(&body)?
            );
        }

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if debug {
            eprintln!("debug/openai: raw status: {status}");
            eprintln!("debug/openai: raw response:\n{text}");
        }

        if !status.is_success() {
            return Err(anyhow!("openai API error ({status}): {text}"));
        }

        #[derive(Deserialize)]
        struct ChatMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessage,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("failed to parse openai response: {e}\nRaw: {text}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai: response carried no choices"))
    }
}
