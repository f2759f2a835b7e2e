use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::ProviderKind;
use crate::errors::StoryError;
use crate::template::PromptSegment;

pub mod ollama;
pub mod openai;

/// A text-generation backend. Exactly one is configured per run.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Cheap reachability check; failure here is the blocking precondition.
    async fn probe(&self) -> Result<()>;

    /// Submit the ordered segments and return raw generated text.
    async fn complete(&self, segments: &[PromptSegment], debug: bool) -> Result<String>;
}

pub type DynBackend = Box<dyn Backend + Send + Sync>;

pub fn make_backend(
    kind: ProviderKind,
    model: String,
    timeout_secs: u64,
    ollama_url: Option<String>,
) -> DynBackend {
    match kind {
        ProviderKind::OpenAI => Box::new(openai::OpenAiBackend::new(model, timeout_secs)),
        ProviderKind::Ollama => Box::new(ollama::OllamaBackend::new(
            model,
            ollama_url.unwrap_or_else(|| "http://localhost:11434".into()),
            timeout_secs,
        )),
    }
}

/// Total attempts, counting the first one.
pub const MAX_ATTEMPTS: u32 = 3;

/// Responses this short are treated as failures even when the call itself
/// succeeded.
pub const MIN_RESPONSE_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub attempts: u32,
}

/// Call the backend with bounded retries. Delay before attempt n is
/// (n - 1) seconds, so the wait grows linearly. Validation failures retry
/// exactly like transport errors; exhaustion surfaces the last error message
/// together with the attempt count.
pub async fn generate(
    backend: &dyn Backend,
    segments: &[PromptSegment],
    cancel: &CancellationToken,
    debug: bool,
) -> Result<GenerationOutcome, StoryError> {
    let mut last_error = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            let delay = Duration::from_secs(u64::from(attempt - 1));
            tokio::select! {
                _ = cancel.cancelled() => return Err(StoryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(StoryError::Cancelled),
            r = backend.complete(segments, debug) => r,
        };

        match result {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.len() > MIN_RESPONSE_CHARS {
                    return Ok(GenerationOutcome {
                        text: trimmed.to_string(),
                        attempts: attempt,
                    });
                }
                last_error = format!("response too short ({} chars)", trimmed.len());
                if debug {
                    eprintln!("debug/generate: attempt {attempt}: {last_error}");
                }
            }
            Err(e) => {
                last_error = e.to_string();
                if debug {
                    eprintln!("debug/generate: attempt {attempt} failed: {last_error}");
                }
            }
        }
    }

    Err(StoryError::Generation {
        message: last_error,
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted backend: `failures` errors first, then `response` forever.
    struct ScriptedBackend {
        failures: u32,
        response: String,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(failures: u32, response: &str) -> Self {
            Self {
                failures,
                response: response.to_string(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn probe(&self) -> Result<()> {
            Ok(())
        }

        async fn complete(&self, _segments: &[PromptSegment], _debug: bool) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(anyhow!("transient backend failure"))
            } else {
                Ok(self.response.clone())
            }
        }
    }

    fn segs() -> Vec<PromptSegment> {
        vec![PromptSegment::user("write an outline please")]
    }

    #[tokio::test(start_paused = true)]
    async fn fails_twice_then_succeeds_on_third_attempt() {
        let backend = ScriptedBackend::new(2, "Chapter 1: the road out of town");
        let out = generate(&backend, &segs(), &CancellationToken::new(), false)
            .await
            .unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(out.text, "Chapter 1: the road out of town");
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_backend_stops_after_three_attempts() {
        let backend = ScriptedBackend::new(u32::MAX, "never reached");
        let err = generate(&backend, &segs(), &CancellationToken::new(), false)
            .await
            .unwrap_err();
        match err {
            StoryError::Generation { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("transient backend failure"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn near_empty_success_is_rejected() {
        let backend = ScriptedBackend::new(0, "ok!");
        let err = generate(&backend, &segs(), &CancellationToken::new(), false)
            .await
            .unwrap_err();
        match err {
            StoryError::Generation { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("too short"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn eleven_chars_pass_the_length_gate() {
        let backend = ScriptedBackend::new(0, "  12345678901  ");
        let out = generate(&backend, &segs(), &CancellationToken::new(), false)
            .await
            .unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(out.text, "12345678901");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_backoff() {
        let backend = ScriptedBackend::new(u32::MAX, "never");
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Whatever the first attempt does, the retry backoff never survives
        // a cancelled token.
        let err = generate(&backend, &segs(), &cancel, false).await.unwrap_err();
        assert!(matches!(err, StoryError::Cancelled));
    }
}
