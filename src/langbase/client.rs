use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::types::{Message, PipeRequest, PipeResponse};
use super::CompletionService;
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};
use crate::retry::{retry_with_backoff, RetryError};

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    completion_pipe: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client that answers completions through `completion_pipe`
    pub fn new(
        config: &LangbaseConfig,
        request_config: RequestConfig,
        completion_pipe: impl Into<String>,
    ) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            completion_pipe: completion_pipe.into(),
            request_config,
        })
    }

    /// Call a Langbase pipe with the given request
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let endpoint = format!("{}/v1/pipes/run", self.base_url);
        let url = endpoint.as_str();
        let request = &request;
        let pipe = request.name.as_str();

        let outcome = retry_with_backoff(
            &self.request_config,
            "langbase pipe call",
            move || async move {
                let start = Instant::now();
                let result = self.execute_request(url, request).await;
                match &result {
                    Ok(_) => info!(
                        pipe = %pipe,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call succeeded"
                    ),
                    Err(e) => error!(
                        pipe = %pipe,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call failed"
                    ),
                }
                result
            },
            // Client errors other than rate limiting will not improve on retry
            |e| {
                matches!(e, LangbaseError::Api { status, .. }
                    if (400..500).contains(status) && *status != 429)
            },
        )
        .await;

        outcome.map_err(|e| match e {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted {
                last_error,
                retries,
            } => LangbaseError::Unavailable {
                message: last_error,
                retries,
            },
        })
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let pipe_response: PipeResponse =
            response
                .json()
                .await
                .map_err(|e| LangbaseError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if !pipe_response.success {
            return Err(LangbaseError::InvalidResponse {
                message: "Pipe reported success=false".to_string(),
            });
        }

        Ok(pipe_response)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pipe used for [`CompletionService::complete`]
    pub fn completion_pipe(&self) -> &str {
        &self.completion_pipe
    }
}

#[async_trait]
impl CompletionService for LangbaseClient {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> LangbaseResult<String> {
        let request = PipeRequest::new(
            &self.completion_pipe,
            vec![Message::system(system_prompt), Message::user(user_content)],
        );
        let response = self.call_pipe(request).await?;
        Ok(response.completion)
    }
}
