//! OpenAI-compatible chat-completions backend.
//!
//! Covers OpenAI itself plus anything speaking the same wire format:
//! Ollama, vLLM, LM Studio, and custom gateways, selected via `base_url`.

use crate::backend::{GenerationRequest, GenerationResponse, TextBackend};
use crate::config::BackendConfig;
use crate::error::{BackendError, ConfigError};
use crate::providers::{drain_complete_lines, map_transport_error};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434/v1";

/// Backend for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    provider: String,
    timeout_secs: u64,
}

impl OpenAiCompatBackend {
    /// Create a backend from configuration, reading the API key from the
    /// environment variable named in `config.api_key_env`.
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| ConfigError::EnvVarMissing {
            var: config.api_key_env.clone(),
        })?;
        Ok(Self::build(config, api_key, config.provider.clone()))
    }

    /// Create a backend for a local Ollama instance. No API key required.
    pub fn new_local(config: &BackendConfig) -> Self {
        let mut backend = Self::build(config, "ollama".to_string(), "ollama".to_string());
        if config.base_url.is_none() {
            backend.base_url = DEFAULT_OLLAMA_URL.to_string();
        }
        backend
    }

    fn build(config: &BackendConfig, api_key: String, provider: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            provider,
            timeout_secs: config.request_timeout_secs,
        }
    }

    fn build_body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
    }

    fn parse_response(body: &Value) -> Result<String, BackendError> {
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BackendError::ResponseParse {
                message: "response missing choices[0].message.content".to_string(),
            })?;
        if text.is_empty() {
            return Err(BackendError::ResponseParse {
                message: "response contained empty content".to_string(),
            });
        }
        Ok(text.to_string())
    }

    fn map_http_error(
        provider: &str,
        status: reqwest::StatusCode,
        retry_after: Option<u64>,
        body: &str,
    ) -> BackendError {
        match status.as_u16() {
            401 | 403 => BackendError::AuthFailed {
                provider: provider.to_string(),
            },
            429 => BackendError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(30),
            },
            500..=599 => BackendError::Connection {
                message: format!("HTTP {status} from {provider} API: {body}"),
            },
            _ => BackendError::ApiRequest {
                message: format!("HTTP {status} from {provider} API: {body}"),
            },
        }
    }

    /// Extract the content delta from a streamed chunk, if any.
    fn extract_stream_text(data: &Value) -> Option<&str> {
        data["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
    }

    fn retry_after_header(response: &reqwest::Response) -> Option<u64> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

#[async_trait]
impl TextBackend for OpenAiCompatBackend {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        let body = self.build_body(&request, false);
        debug!(
            model = self.model.as_str(),
            provider = self.provider.as_str(),
            "Sending chat-completions request"
        );

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::retry_after_header(&response);
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(
                &self.provider,
                status,
                retry_after,
                &body_text,
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| BackendError::ResponseParse {
                message: format!("invalid JSON in response: {e}"),
            })?;

        Ok(GenerationResponse {
            text: Self::parse_response(&json)?,
            model: self.model.clone(),
        })
    }

    async fn generate_streaming(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResponse, BackendError> {
        let body = self.build_body(&request, true);

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::retry_after_header(&response);
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(
                &self.provider,
                status,
                retry_after,
                &body_text,
            ));
        }

        let mut stream = response.bytes_stream();
        let mut line_buffer = String::new();
        let mut accumulated = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BackendError::Connection {
                message: format!("stream interrupted: {e}"),
            })?;
            let chunk_str = String::from_utf8_lossy(&chunk);

            for line in drain_complete_lines(&mut line_buffer, &chunk_str) {
                let Some(data_str) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data_str == "[DONE]" {
                    break 'outer;
                }
                let Ok(data) = serde_json::from_str::<Value>(data_str) else {
                    continue;
                };
                if let Some(text) = Self::extract_stream_text(&data) {
                    accumulated.push_str(text);
                    let _ = tx.send(text.to_string()).await;
                }
            }
        }

        if accumulated.is_empty() {
            return Err(BackendError::ResponseParse {
                message: "stream ended without any content deltas".to_string(),
            });
        }

        Ok(GenerationResponse {
            text: accumulated,
            model: self.model.clone(),
        })
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
