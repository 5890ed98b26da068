use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::sse::fragment_stream;
use super::types::{CompletionBody, CompletionRequest, CompletionResponse};
use super::{CompletionPort, FragmentStream};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{CompletionError, CompletionResult};

/// Client for an OpenAI-style `/v1/completions` endpoint (llama.cpp server)
#[derive(Clone)]
pub struct LlamaCppClient {
    client: Client,
    base_url: String,
    llm: LlmConfig,
    request_config: RequestConfig,
}

impl LlamaCppClient {
    /// Create a new completion client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> CompletionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(|e| CompletionError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            llm: config.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.base_url)
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, body: &CompletionBody) -> CompletionResult<String> {
        debug!(
            prompt_chars = body.prompt.len(),
            max_tokens = body.max_tokens,
            "Calling completion server"
        );

        let response = self.send(body).await?;

        let completion: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| CompletionError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        completion.into_text()
    }

    /// POST the body and reject non-2xx statuses
    async fn send(&self, body: &CompletionBody) -> CompletionResult<reqwest::Response> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            CompletionError::Connection {
                message: format!("{} ({})", e, self.base_url),
            }
        }
    }
}

/// Only transport-level and server-side failures are worth another attempt.
fn is_retryable(err: &CompletionError) -> bool {
    match err {
        CompletionError::Connection { .. } | CompletionError::Timeout { .. } => true,
        CompletionError::Api { status, .. } => *status >= 500 || *status == 429,
        CompletionError::InvalidResponse { .. } => false,
    }
}

#[async_trait]
impl CompletionPort for LlamaCppClient {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String> {
        let body = CompletionBody::from_request(&request, &self.llm, false);

        let mut retries = 0;

        loop {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&body).await {
                Ok(text) => {
                    info!(
                        latency_ms = start.elapsed().as_millis(),
                        chars = text.len(),
                        "Completion call succeeded"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Completion call failed"
                    );
                    if retries >= self.request_config.max_retries || !is_retryable(&e) {
                        return Err(e);
                    }
                    retries += 1;
                }
            }
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> CompletionResult<FragmentStream> {
        let body = CompletionBody::from_request(&request, &self.llm, true);
        let response = self.send(&body).await?;

        info!("Completion stream opened");

        Ok(fragment_stream(response, self.request_config.timeout_ms))
    }
}
