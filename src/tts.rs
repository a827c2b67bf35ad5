use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::chunk::{split_text, InvalidChunkSize};
use crate::script::Utterance;

/// Provider voice for one speaker, with the synthesis parameters sent on
/// every request.
#[derive(Debug, Clone)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

/// Static speaker -> voice mapping, loaded once at startup.
#[derive(Debug, Clone)]
pub struct VoiceMap {
    vincent: VoiceProfile,
    marina: VoiceProfile,
}

impl VoiceMap {
    pub fn new(vincent: VoiceProfile, marina: VoiceProfile) -> Self {
        Self { vincent, marina }
    }

    pub fn profile(&self, speaker: crate::script::Speaker) -> &VoiceProfile {
        match speaker {
            crate::script::Speaker::Vincent => &self.vincent,
            crate::script::Speaker::Marina => &self.marina,
        }
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Provider { status: StatusCode, message: String },

    #[error("synthesis unavailable after {attempts} attempts")]
    Unavailable {
        attempts: u32,
        #[source]
        last: Box<SynthesisError>,
    },

    #[error(transparent)]
    Chunk(#[from] InvalidChunkSize),

    #[error("failed to write segment: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Connection problems, timeouts, rate limiting and server errors are
    /// worth another attempt; any other client error is fatal as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::Transport(_) => true,
            SynthesisError::Provider { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Delay before retry number `attempt` (0-based). Pure so the schedule is
/// testable without waiting.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.base_delay.saturating_mul(2u32.saturating_pow(attempt))
}

/// Run `op` until it succeeds, a fatal error occurs, or the retry budget is
/// exhausted. Exhaustion wraps the last failure in `Unavailable`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, SynthesisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SynthesisError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = backoff_delay(policy, attempt);
                warn!(
                    "Request failed ({}), retrying in {:?} ({}/{})",
                    e,
                    delay,
                    attempt + 1,
                    policy.max_retries
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                return Err(SynthesisError::Unavailable {
                    attempts: attempt + 1,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize, Clone, Copy)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// Pull the human-readable message out of a provider error body. The API
/// answers JSON with a `detail` field on failure; anything else is passed
/// through as-is.
fn provider_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("detail")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(detail) => detail
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| detail.to_string()),
        None => body.trim().to_string(),
    }
}

/// Something that can turn one utterance into one segment file. The
/// assembler only ever talks to this trait, so it can be exercised against
/// a mock provider.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        utterance: &Utterance,
        voice: &VoiceProfile,
        out_path: &Path,
    ) -> Result<(), SynthesisError>;
}

pub struct TtsConfig {
    pub api_base: String,
    pub api_key: String,
    pub model_id: String,
    pub max_chunk_chars: usize,
    pub retry: RetryPolicy,
    pub pacing: Duration,
    pub request_timeout: Duration,
}

/// ElevenLabs text-to-speech client.
pub struct TtsClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model_id: String,
    max_chunk_chars: usize,
    retry: RetryPolicy,
    pacing: Duration,
}

impl TtsClient {
    pub fn new(cfg: TtsConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key,
            model_id: cfg.model_id,
            max_chunk_chars: cfg.max_chunk_chars,
            retry: cfg.retry,
            pacing: cfg.pacing,
        })
    }

    async fn request_chunk(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>, SynthesisError> {
        let url = format!("{}/v1/text-to-speech/{}", self.api_base, voice.voice_id);
        let body = SynthesisRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: voice.stability,
                similarity_boost: voice.similarity_boost,
            },
        };
        let res = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SynthesisError::Provider {
                status,
                message: provider_message(&body),
            });
        }
        Ok(res.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TtsClient {
    /// Chunk the utterance text, synthesize the chunks in order, and write
    /// the raw-concatenated audio as one segment file. Chunks of one
    /// utterance share a container instance per response, so their buffers
    /// concatenate directly without tag stripping.
    async fn synthesize(
        &self,
        utterance: &Utterance,
        voice: &VoiceProfile,
        out_path: &Path,
    ) -> Result<(), SynthesisError> {
        let chunks = split_text(&utterance.text, self.max_chunk_chars)?;
        let mut audio = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(
                "Synthesizing chunk {}/{} for {} ({} chars)",
                i + 1,
                chunks.len(),
                utterance.speaker,
                chunk.chars().count()
            );
            let bytes = retry_with_backoff(&self.retry, || self.request_chunk(chunk, voice)).await?;
            audio.extend_from_slice(&bytes);
            // Pace successive requests of this session to stay under the
            // provider's rate limit.
            if i + 1 < chunks.len() {
                sleep(self.pacing).await;
            }
        }
        tokio::fs::write(out_path, &audio).await?;
        info!(
            "Segment written to {} ({} bytes, {} chunks)",
            out_path.display(),
            audio.len(),
            chunks.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider_err(status: StatusCode) -> SynthesisError {
        SynthesisError::Provider {
            status,
            message: "test".into(),
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
        };
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(250));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(1000));
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        assert!(provider_err(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(provider_err(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(provider_err(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(!provider_err(StatusCode::UNAUTHORIZED).is_retryable());
        assert!(!provider_err(StatusCode::BAD_REQUEST).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
        };
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(provider_err(StatusCode::SERVICE_UNAVAILABLE))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_client_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(provider_err(StatusCode::UNAUTHORIZED)) }
        })
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        match result.unwrap_err() {
            SynthesisError::Provider { status, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_unavailable() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
        };
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(provider_err(StatusCode::INTERNAL_SERVER_ERROR)) }
        })
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            SynthesisError::Unavailable { attempts: n, last } => {
                assert_eq!(n, 4);
                assert!(matches!(*last, SynthesisError::Provider { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn provider_message_prefers_structured_detail() {
        let body = r#"{"detail":{"status":"invalid_api_key","message":"Invalid API key"}}"#;
        assert_eq!(provider_message(body), "Invalid API key");
        assert_eq!(provider_message(r#"{"detail":"quota exceeded"}"#), "quota exceeded");
        assert_eq!(provider_message("plain text error\n"), "plain text error");
    }
}
