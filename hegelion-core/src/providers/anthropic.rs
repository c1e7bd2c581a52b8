//! Anthropic Messages API backend.

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

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Backend for Claude models via the Anthropic Messages API.
pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl AnthropicBackend {
    /// Create a backend from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`.
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| ConfigError::EnvVarMissing {
            var: config.api_key_env.clone(),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.request_timeout_secs,
        })
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
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    /// Concatenate the text content blocks of a Messages API response.
    fn parse_response(body: &Value) -> Result<String, BackendError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| BackendError::ResponseParse {
                message: "response missing content array".to_string(),
            })?;

        let text: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();

        if text.is_empty() {
            return Err(BackendError::ResponseParse {
                message: "response contained no text blocks".to_string(),
            });
        }
        Ok(text)
    }

    /// Map an HTTP error status to the backend taxonomy.
    fn map_http_error(status: reqwest::StatusCode, retry_after: Option<u64>, body: &str) -> BackendError {
        match status.as_u16() {
            401 | 403 => BackendError::AuthFailed {
                provider: "anthropic".to_string(),
            },
            429 => BackendError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(30),
            },
            500..=599 => BackendError::Connection {
                message: format!("HTTP {status} from Anthropic API: {body}"),
            },
            _ => BackendError::ApiRequest {
                message: format!("HTTP {status} from Anthropic API: {body}"),
            },
        }
    }

    /// Extract the text delta from a streamed SSE data payload, if any.
    fn extract_stream_text(data: &Value) -> Option<&str> {
        if data["type"] == "content_block_delta" && data["delta"]["type"] == "text_delta" {
            data["delta"]["text"].as_str()
        } else {
            None
        }
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
impl TextBackend for AnthropicBackend {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        let body = self.build_body(&request, false);
        debug!(model = self.model.as_str(), "Sending Anthropic request");

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::retry_after_header(&response);
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, retry_after, &body_text));
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| BackendError::ResponseParse {
                message: format!("failed to read response body: {e}"),
            })?;
        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| BackendError::ResponseParse {
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
        debug!(model = self.model.as_str(), "Sending Anthropic streaming request");

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::retry_after_header(&response);
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, retry_after, &body_text));
        }

        let mut stream = response.bytes_stream();
        let mut line_buffer = String::new();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BackendError::Connection {
                message: format!("stream interrupted: {e}"),
            })?;
            let chunk_str = String::from_utf8_lossy(&chunk);

            for line in drain_complete_lines(&mut line_buffer, &chunk_str) {
                let Some(data_str) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(data) = serde_json::from_str::<Value>(data_str) else {
                    continue;
                };
                if data["type"] == "error" {
                    return Err(BackendError::ApiRequest {
                        message: format!("streaming error event: {}", data["error"]["message"]),
                    });
                }
                if let Some(text) = Self::extract_stream_text(&data) {
                    accumulated.push_str(text);
                    let _ = tx.send(text.to_string()).await;
                }
            }
        }

        if accumulated.is_empty() {
            return Err(BackendError::ResponseParse {
                message: "stream ended without any text deltas".to_string(),
            });
        }

        Ok(GenerationResponse {
            text: accumulated,
            model: self.model.clone(),
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(api_key_env: &str) -> BackendConfig {
        BackendConfig {
            provider: "anthropic".to_string(),
            model: "claude-test".to_string(),
            api_key_env: api_key_env.to_string(),
            base_url: None,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_new_reads_env() {
        std::env::set_var("HEGELION_TEST_ANTHROPIC_KEY", "sk-test");
        let backend = AnthropicBackend::new(&test_config("HEGELION_TEST_ANTHROPIC_KEY")).unwrap();
        assert_eq!(backend.model_name(), "claude-test");
        assert_eq!(backend.provider_name(), "anthropic");
        std::env::remove_var("HEGELION_TEST_ANTHROPIC_KEY");
    }

    #[test]
    fn test_new_missing_env_fails() {
        let result = AnthropicBackend::new(&test_config("HEGELION_TEST_UNSET_KEY"));
        assert!(matches!(result, Err(ConfigError::EnvVarMissing { .. })));
    }

    #[test]
    fn test_build_body() {
        std::env::set_var("HEGELION_TEST_ANTHROPIC_KEY2", "sk-test");
        let backend = AnthropicBackend::new(&test_config("HEGELION_TEST_ANTHROPIC_KEY2")).unwrap();
        std::env::remove_var("HEGELION_TEST_ANTHROPIC_KEY2");

        let body = backend.build_body(
            &GenerationRequest {
                prompt: "hello".to_string(),
                max_tokens: 512,
            },
            false,
        );
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert!(body.get("stream").is_none());

        let streaming = backend.build_body(
            &GenerationRequest {
                prompt: "hello".to_string(),
                max_tokens: 512,
            },
            true,
        );
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn test_parse_response_concatenates_text_blocks() {
        let body = json!({
            "content": [
                { "type": "text", "text": "part one, " },
                { "type": "tool_use", "name": "ignored" },
                { "type": "text", "text": "part two" }
            ]
        });
        assert_eq!(
            AnthropicBackend::parse_response(&body).unwrap(),
            "part one, part two"
        );
    }

    #[test]
    fn test_parse_response_missing_content() {
        let err = AnthropicBackend::parse_response(&json!({"id": "msg_1"})).unwrap_err();
        assert!(matches!(err, BackendError::ResponseParse { .. }));
    }

    #[test]
    fn test_http_error_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            AnthropicBackend::map_http_error(StatusCode::UNAUTHORIZED, None, ""),
            BackendError::AuthFailed { .. }
        ));
        assert!(matches!(
            AnthropicBackend::map_http_error(StatusCode::TOO_MANY_REQUESTS, Some(12), ""),
            BackendError::RateLimited {
                retry_after_secs: 12
            }
        ));
        assert!(matches!(
            AnthropicBackend::map_http_error(StatusCode::SERVICE_UNAVAILABLE, None, "overloaded"),
            BackendError::Connection { .. }
        ));
        assert!(matches!(
            AnthropicBackend::map_http_error(StatusCode::BAD_REQUEST, None, "bad prompt"),
            BackendError::ApiRequest { .. }
        ));
    }

    #[test]
    fn test_extract_stream_text() {
        let delta = json!({
            "type": "content_block_delta",
            "delta": { "type": "text_delta", "text": "chunk" }
        });
        assert_eq!(AnthropicBackend::extract_stream_text(&delta), Some("chunk"));

        let other = json!({ "type": "message_start" });
        assert_eq!(AnthropicBackend::extract_stream_text(&other), None);
    }
}
