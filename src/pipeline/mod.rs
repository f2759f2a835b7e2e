use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::StoryError;
use crate::generate::{self, Backend, GenerationOutcome};
use crate::host::HostApi;
use crate::resolve::{self, ContextBundle};
use crate::settings::GenerationSettings;
use crate::template::{self, PromptSegment};

/// One generation request, owning everything it resolves. Nothing here is
/// shared between requests; a fresh bundle and segment list are built each
/// time.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub settings: GenerationSettings,
    pub template: String,
}

impl GenerationRequest {
    pub fn new(settings: GenerationSettings, template: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            settings: settings.normalized(),
            template,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub bundle: ContextBundle,
    pub segments: Vec<PromptSegment>,
}

/// The one blocking precondition: a backend that is missing outright fails
/// the request before any resolver work happens.
pub async fn ensure_backend(backend: &dyn Backend) -> Result<(), StoryError> {
    backend
        .probe()
        .await
        .map_err(|e| StoryError::BackendUnavailable(e.to_string()))
}

/// Resolve context from the host and render it into prompt segments.
pub async fn assemble(
    host: &dyn HostApi,
    request: &GenerationRequest,
    cfg: &Config,
) -> AssembledPrompt {
    let bundle = resolve::build_bundle(
        host,
        cfg.history_limit,
        Duration::from_millis(cfg.world_info_timeout_ms),
    )
    .await;
    let segments = template::build_segments(&request.template, &request.settings, &bundle);
    AssembledPrompt { bundle, segments }
}

/// Full pipeline: precondition check, context resolution, prompt assembly,
/// retried generation.
pub async fn run(
    host: &dyn HostApi,
    backend: &dyn Backend,
    request: &GenerationRequest,
    cfg: &Config,
    cancel: &CancellationToken,
    debug: bool,
) -> Result<(AssembledPrompt, GenerationOutcome), StoryError> {
    ensure_backend(backend).await?;
    let prompt = assemble(host, request, cfg).await;
    let outcome = generate::generate(backend, &prompt.segments, cancel, debug).await?;
    Ok((prompt, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Capability, CharacterCard, ChatMessage, HostSnapshot, WorldInfoEntry};
    use crate::settings::StoryKind;
    use crate::template::{Role, DEFAULT_TEMPLATE};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// A host with nothing to offer: every capability is absent.
    struct BareHost;

    #[async_trait]
    impl HostApi for BareHost {
        fn supports(&self, _cap: Capability) -> bool {
            false
        }
        async fn activated_world_info(&self, _chat_text: &str) -> Result<Vec<WorldInfoEntry>> {
            Err(anyhow!("absent"))
        }
        async fn world_info_list(&self) -> Result<Vec<WorldInfoEntry>> {
            Err(anyhow!("absent"))
        }
        async fn state_snapshot(&self) -> Result<HostSnapshot> {
            Err(anyhow!("absent"))
        }
        async fn lazy_world_info(&self, _chat_text: &str) -> Result<Vec<WorldInfoEntry>> {
            Err(anyhow!("absent"))
        }
        async fn character(&self) -> Result<Option<CharacterCard>> {
            Err(anyhow!("absent"))
        }
        async fn chat_transcript(&self) -> Result<Vec<ChatMessage>> {
            Err(anyhow!("absent"))
        }
    }

    struct FixedBackend {
        reachable: bool,
        reply: &'static str,
    }

    #[async_trait]
    impl Backend for FixedBackend {
        async fn probe(&self) -> Result<()> {
            if self.reachable {
                Ok(())
            } else {
                Err(anyhow!("connection refused"))
            }
        }
        async fn complete(&self, _segments: &[PromptSegment], _debug: bool) -> Result<String> {
            Ok(self.reply.to_string())
        }
    }

    fn request() -> GenerationRequest {
        let settings = GenerationSettings {
            chapter_count: 5,
            story_theme: "lost kingdom".into(),
            story_kind: StoryKind::Fantasy,
            ..Default::default()
        };
        GenerationRequest::new(settings, DEFAULT_TEMPLATE.to_string())
    }

    #[tokio::test]
    async fn unreachable_backend_fails_before_resolution() {
        let backend = FixedBackend { reachable: false, reply: "" };
        let err = run(&BareHost, &backend, &request(), &Config::default(), &CancellationToken::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoryError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn default_prompt_with_no_host_data_is_complete() {
        // End to end against a dataless host: the user segment still carries
        // the literal settings and no `{placeholder}` survives anywhere.
        let prompt = assemble(&BareHost, &request(), &Config::default()).await;

        let user: Vec<_> = prompt
            .segments
            .iter()
            .filter(|s| s.role == Role::User)
            .collect();
        assert_eq!(user.len(), 1);
        assert!(user[0].content.contains('5'));
        assert!(user[0].content.contains("lost kingdom"));

        let re = regex::Regex::new(r"\{[A-Za-z0-9_]+\}").unwrap();
        for s in &prompt.segments {
            assert!(!re.is_match(&s.content), "unresolved token in: {}", s.content);
        }
    }

    #[tokio::test]
    async fn full_run_returns_outcome_and_prompt() {
        let backend = FixedBackend {
            reachable: true,
            reply: "Chapter 1: the fall of the lost kingdom",
        };
        let (prompt, outcome) = run(
            &BareHost,
            &backend,
            &request(),
            &Config::default(),
            &CancellationToken::new(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.text.contains("lost kingdom"));
        assert_eq!(prompt.segments.len(), 3);
    }
}
