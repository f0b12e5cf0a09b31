use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One text-generation call: what the assistant is, what was said so far,
/// the situation it must address, and the latest user message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: String,
    pub context: String,
    pub user_message: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("text generation is not configured")]
    NotConfigured,
    #[error("text generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("text generation request failed: {0}")]
    Request(String),
    #[error("text generation returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Optional client plus the per-call deadline. Timeouts and blank answers
/// are reported as failures.
#[derive(Clone)]
pub struct TextGenerator {
    client: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
}

impl TextGenerator {
    pub fn new(client: Option<Arc<dyn LlmClient>>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn disabled() -> Self {
        Self { client: None, timeout: Duration::from_secs(1) }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<Arc<dyn LlmClient>> {
        self.client.clone()
    }

    pub async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let Some(client) = &self.client else {
            return Err(LlmError::NotConfigured);
        };

        let text = tokio::time::timeout(self.timeout, client.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(trimmed.to_owned())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{CompletionRequest, LlmClient, LlmError};

    /// Replays canned answers in order; an exhausted script fails every call.
    #[derive(Default)]
    pub struct ScriptedLlm {
        answers: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedLlm {
        pub fn new(answers: Vec<Result<String, LlmError>>) -> Self {
            Self { answers: Mutex::new(answers.into()), ..Self::default() }
        }

        pub fn stalled(delay: Duration) -> Self {
            Self { delay: Some(delay), ..Self::default() }
        }

        pub async fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().await.push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answers
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_owned())))
        }
    }
}
