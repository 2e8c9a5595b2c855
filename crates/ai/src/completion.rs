//! Completion-service boundary.
//!
//! Pipeline stages only ever see [`CompletionService`]; the concrete
//! [`AnthropicCompletion`] adapter and the [`testing`] doubles plug in behind it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shopcast_core::{CompletionSettings, ServiceError};

use crate::parser::truncate_for_log;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Text-in, text-out language model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ServiceError>;
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessageResponse {
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
    }
}

/// Messages-API client.
pub struct AnthropicCompletion {
    client: Client,
    api_key: String,
    endpoint: String,
    settings: CompletionSettings,
}

impl AnthropicCompletion {
    /// Fails with [`ServiceError::Permanent`] when no usable API key is configured.
    pub fn new(settings: CompletionSettings) -> Result<Self, ServiceError> {
        let api_key = settings
            .credential()
            .ok_or_else(|| ServiceError::permanent("no completion-service API key configured"))?
            .to_string();

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ServiceError::permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: MESSAGES_URL.to_string(),
            settings,
        })
    }

    /// Point the client at a different Messages-API compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// A stage's token budget, capped by the configured ceiling.
    fn token_budget(&self, max_tokens: u32) -> u32 {
        max_tokens.min(self.settings.max_tokens).max(1)
    }

    async fn send_once(&self, prompt: &str, max_tokens: u32) -> Result<String, ServiceError> {
        let request = MessageRequest {
            model: &self.settings.model,
            max_tokens: self.token_budget(max_tokens),
            temperature: self.settings.temperature,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: MessageResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::malformed(e.to_string()))?;
            return body
                .into_text()
                .ok_or_else(|| ServiceError::malformed("response had no text content block"));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, truncate_for_log(&body, 200)))
    }
}

#[async_trait]
impl CompletionService for AnthropicCompletion {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ServiceError> {
        let max_attempts = self.settings.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_once(prompt, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let wait = backoff(RETRY_BASE, attempt);
                    tracing::warn!(
                        service = self.name(),
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "completion call failed; retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_status(status: StatusCode, body: String) -> ServiceError {
    let msg = format!("HTTP {}: {body}", status.as_u16());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ServiceError::Transient(msg)
    } else {
        ServiceError::Permanent(msg)
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at 10s.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}

/// In-process completion services for tests and local experiments.
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use shopcast_core::ServiceError;

    use super::CompletionService;

    /// Replays a queue of canned results, recording every prompt it receives.
    ///
    /// Once the queue is drained every call fails with a transient error.
    #[derive(Debug, Default)]
    pub struct ScriptedCompletion {
        replies: Mutex<VecDeque<Result<String, ServiceError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn from_results(replies: impl IntoIterator<Item = Result<String, ServiceError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn remaining(&self) -> usize {
            self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, ServiceError> {
            self.prompts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(prompt.to_string());
            self.replies
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::transient("script exhausted")))
        }
    }

    /// Fails every call with the same error.
    #[derive(Debug, Clone)]
    pub struct FailingCompletion {
        error: ServiceError,
    }

    impl FailingCompletion {
        pub fn new(error: ServiceError) -> Self {
            Self { error }
        }
    }

    impl Default for FailingCompletion {
        fn default() -> Self {
            Self::new(ServiceError::transient("connection refused"))
        }
    }

    #[async_trait]
    impl CompletionService for FailingCompletion {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ServiceError> {
            Err(self.error.clone())
        }
    }

    /// Panics on every call.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct PanickingCompletion;

    #[async_trait]
    impl CompletionService for PanickingCompletion {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ServiceError> {
            panic!("completion service blew up")
        }
    }

    /// Sleeps before answering with a fixed reply.
    #[derive(Debug, Clone)]
    pub struct SlowCompletion {
        delay: Duration,
        reply: String,
    }

    impl SlowCompletion {
        pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
            Self {
                delay,
                reply: reply.into(),
            }
        }
    }

    #[async_trait]
    impl CompletionService for SlowCompletion {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ServiceError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 1), Duration::from_millis(500));
        assert_eq!(backoff(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff(base, 30), Duration::from_millis(10_000));
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, String::new()).is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn response_text_comes_from_the_first_text_block() {
        let body: MessageResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"hello"}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_text().as_deref(), Some("hello"));

        let empty: MessageResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert_eq!(empty.into_text(), None);
    }

    #[test]
    fn adapter_requires_a_real_key() {
        let mut settings = CompletionSettings::default();
        assert!(AnthropicCompletion::new(settings.clone()).is_err());

        settings.api_key = Some(shopcast_core::config::API_KEY_PLACEHOLDER.to_string());
        assert!(AnthropicCompletion::new(settings.clone()).is_err());

        settings.api_key = Some("sk-ant-test".to_string());
        assert!(AnthropicCompletion::new(settings).is_ok());
    }

    #[test]
    fn stage_budgets_are_capped_by_the_configured_ceiling() {
        let settings = CompletionSettings {
            api_key: Some("sk-ant-test".to_string()),
            max_tokens: 1000,
            ..CompletionSettings::default()
        };
        let client = AnthropicCompletion::new(settings).unwrap();
        assert_eq!(client.token_budget(2000), 1000);
        assert_eq!(client.token_budget(500), 500);
        assert_eq!(client.token_budget(0), 1);
    }

    #[tokio::test]
    async fn scripted_completion_replays_then_runs_dry() {
        let service = ScriptedCompletion::new(["first", "second"]);
        assert_eq!(service.complete("a", 10).await.unwrap(), "first");
        assert_eq!(service.complete("b", 10).await.unwrap(), "second");
        assert!(service.complete("c", 10).await.unwrap_err().is_transient());
        assert_eq!(service.prompts(), vec!["a", "b", "c"]);
        assert_eq!(service.remaining(), 0);
    }

    #[tokio::test]
    async fn failing_completion_returns_its_error() {
        let service = FailingCompletion::new(ServiceError::permanent("bad key"));
        assert_eq!(
            service.complete("x", 1).await,
            Err(ServiceError::permanent("bad key"))
        );
    }
}
