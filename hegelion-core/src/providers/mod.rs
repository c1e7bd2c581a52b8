//! Concrete backend implementations.
//!
//! Provides implementations of the [`TextBackend`](crate::backend::TextBackend)
//! trait for:
//! - Anthropic Messages API (Claude models)
//! - OpenAI-compatible chat-completions APIs (OpenAI, Ollama, vLLM, custom
//!   endpoints via `base_url`)
//!
//! Use [`create_backend`] to instantiate the right provider from config.
//! The shared [`with_retry`] helper implements the bounded-backoff policy
//! for transient errors; the engine applies it around every phase call.

pub mod anthropic;
pub mod openai_compat;

pub use anthropic::AnthropicBackend;
pub use openai_compat::OpenAiCompatBackend;

use crate::backend::TextBackend;
use crate::config::{BackendConfig, RetryConfig};
use crate::error::{BackendError, ConfigError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Instantiate a backend from configuration.
///
/// Dispatches on `config.provider`: "anthropic", "openai", "custom" (any
/// OpenAI-compatible endpoint, `base_url` required), or "ollama" (local,
/// no API key).
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn TextBackend>, ConfigError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicBackend::new(config)?)),
        "openai" | "custom" => Ok(Arc::new(OpenAiCompatBackend::new(config)?)),
        "ollama" => Ok(Arc::new(OpenAiCompatBackend::new_local(config))),
        other => Err(ConfigError::UnknownProvider {
            provider: other.to_string(),
        }),
    }
}

/// Execute an async operation with exponential backoff retry on transient
/// errors.
///
/// Retries `BackendError::RateLimited` (respecting `retry_after_secs`),
/// `Timeout`, and `Connection`. Permanent errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, BackendError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_transient() || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| BackendError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &BackendError) -> u64 {
    if let BackendError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs * 1000;
        let computed = compute_exponential_backoff(config, attempt);
        return server_ms.max(computed);
    }
    compute_exponential_backoff(config, attempt)
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Add up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Simple deterministic pseudo-random for jitter (avoids pulling in rand crate).
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Append a chunk of streamed bytes to `buffer` and drain every complete
/// line. SSE payloads arrive in arbitrary chunk boundaries; the trailing
/// partial line stays in the buffer until its newline arrives.
pub(crate) fn drain_complete_lines(buffer: &mut String, chunk: &str) -> Vec<String> {
    buffer.push_str(chunk);
    let mut lines = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        lines.push(line.trim_end_matches(['\n', '\r']).to_string());
    }
    lines
}

/// Map a reqwest transport error to the backend taxonomy.
pub(crate) fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout { timeout_secs }
    } else {
        BackendError::Connection {
            message: err.to_string(),
        }
    }
}
