use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use routewatch_core::config::LlmConfig;

use crate::llm::{LlmClient, LlmRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_JITTER_MS: u64 = 250;

/// Live client for the Anthropic Messages API. Retries 429/5xx/transport
/// failures with exponential backoff and jitter; other 4xx are terminal.
#[derive(Debug)]
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_tokens_ceiling: u32,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key =
            config.api_key.clone().ok_or_else(|| anyhow!("llm.api_key is not configured"))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("building LLM http client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens_ceiling: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: effective_max_tokens(request.max_tokens, self.max_tokens_ceiling),
            messages: vec![Message { role: "user", content: &request.prompt }],
        };

        let mut attempt = 0;
        loop {
            let outcome = self
                .http
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await;

            let retryable: String = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: MessagesResponse =
                            response.json().await.context("decoding LLM response body")?;
                        let text = parsed
                            .content
                            .into_iter()
                            .next()
                            .map(|block| block.text)
                            .unwrap_or_default();
                        if text.trim().is_empty() {
                            return Err(anyhow!(
                                "LLM returned an empty completion for `{}`",
                                request.operation
                            ));
                        }
                        debug!(operation = request.operation, "llm completion succeeded");
                        return Ok(text);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        format!("status {status}: {}", snippet(&body_text))
                    } else {
                        return Err(anyhow!(
                            "LLM request `{}` rejected with status {status}: {}",
                            request.operation,
                            snippet(&body_text)
                        ));
                    }
                }
                Err(error) => format!("transport error: {error}"),
            };

            if attempt >= self.max_retries {
                return Err(anyhow!(
                    "LLM request `{}` failed after {} attempt(s): {retryable}",
                    request.operation,
                    attempt + 1
                ));
            }

            let delay = backoff_delay(attempt);
            warn!(
                operation = request.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %retryable,
                "llm call failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn effective_max_tokens(requested: u32, ceiling: u32) -> u32 {
    requested.min(ceiling).max(1)
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BACKOFF_BASE_MS.saturating_mul(1_u64 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    Duration::from_millis(exponential.saturating_add(jitter))
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}
