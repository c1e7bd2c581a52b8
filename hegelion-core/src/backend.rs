//! Backend capability abstraction.
//!
//! Defines the [`TextBackend`] trait the engine depends on, plus a scriptable
//! [`MockBackend`] used throughout the test suites. The engine never talks to
//! a network itself; concrete HTTP providers live in [`crate::providers`].

use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The full prompt text.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
}

/// The completed output of a generation call.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// The full generated text.
    pub text: String,
    /// The model that produced it.
    pub model: String,
}

/// Capability trait for pluggable text-generation backends.
///
/// Implementations must be cheap to share (`Arc<dyn TextBackend>`) and safe
/// to call concurrently: the council fan-out issues three calls at once.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Generate text for the given request.
    async fn generate(&self, request: GenerationRequest)
        -> Result<GenerationResponse, BackendError>;

    /// Generate text, delivering chunks in-order on `tx` as they arrive.
    ///
    /// The returned response carries the full accumulated text and is
    /// identical to what [`TextBackend::generate`] would have produced;
    /// streaming is purely additive. Send failures (a dropped or full
    /// receiver) are ignored. The default implementation delivers the
    /// complete text as a single chunk.
    async fn generate_streaming(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResponse, BackendError> {
        let response = self.generate(request).await?;
        let _ = tx.send(response.text.clone()).await;
        Ok(response)
    }

    /// Provider identifier, e.g. "anthropic".
    fn provider_name(&self) -> &str;

    /// Model identifier, e.g. "claude-sonnet-4-20250514".
    fn model_name(&self) -> &str;
}

/// One scripted call for [`MockBackend`].
struct ScriptedCall {
    result: Result<String, BackendError>,
    delay: Duration,
}

/// A scriptable backend for tests.
///
/// Responses are consumed in FIFO order; when the script runs dry, the
/// fallback text (if any) is served. Every prompt received is recorded, and
/// a call whose future is dropped before completing (a cancelled in-flight
/// call) increments the cancellation counter, which lets tests observe that
/// cancellation actually reached the backend.
pub struct MockBackend {
    script: Mutex<VecDeque<ScriptedCall>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    calls_started: AtomicUsize,
    calls_cancelled: AtomicUsize,
}

impl MockBackend {
    /// A mock with no script and no fallback: any call fails.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls_started: AtomicUsize::new(0),
            calls_cancelled: AtomicUsize::new(0),
        }
    }

    /// A mock that answers every call with the same text.
    pub fn with_fallback(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Queue a successful response.
    pub fn push_text(&self, text: &str) {
        self.push_scripted(Ok(text.to_string()), Duration::ZERO);
    }

    /// Queue a successful response that resolves after `delay`.
    pub fn push_text_with_delay(&self, text: &str, delay: Duration) {
        self.push_scripted(Ok(text.to_string()), delay);
    }

    /// Queue a failing response.
    pub fn push_error(&self, error: BackendError) {
        self.push_scripted(Err(error), Duration::ZERO);
    }

    /// Queue a failing response that resolves after `delay`.
    pub fn push_error_with_delay(&self, error: BackendError, delay: Duration) {
        self.push_scripted(Err(error), delay);
    }

    fn push_scripted(&self, result: Result<String, BackendError>, delay: Duration) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(ScriptedCall { result, delay });
    }

    /// All prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("mock prompts lock").clone()
    }

    /// Number of calls that started (including cancelled ones).
    pub fn calls_started(&self) -> usize {
        self.calls_started.load(Ordering::SeqCst)
    }

    /// Number of in-flight calls whose futures were dropped before completing.
    pub fn calls_cancelled(&self) -> usize {
        self.calls_cancelled.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Increments the cancellation counter unless disarmed before drop.
struct CancelGuard<'a> {
    counter: &'a AtomicUsize,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl TextBackend for MockBackend {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        self.calls_started.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("mock prompts lock")
            .push(request.prompt.clone());

        let mut guard = CancelGuard {
            counter: &self.calls_cancelled,
            armed: true,
        };

        let scripted = self.script.lock().expect("mock script lock").pop_front();
        let (result, delay) = match scripted {
            Some(call) => (call.result, call.delay),
            None => match &self.fallback {
                Some(text) => (Ok(text.clone()), Duration::ZERO),
                None => (
                    Err(BackendError::ApiRequest {
                        message: "mock backend script exhausted".to_string(),
                    }),
                    Duration::ZERO,
                ),
            },
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        guard.armed = false;
        result.map(|text| GenerationResponse {
            text,
            model: self.model_name().to_string(),
        })
    }

    async fn generate_streaming(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResponse, BackendError> {
        let response = self.generate(request).await?;
        for word in response.text.split_inclusive(' ') {
            let _ = tx.send(word.to_string()).await;
        }
        Ok(response)
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_mock_scripted_order() {
        let mock = MockBackend::new();
        mock.push_text("first");
        mock.push_text("second");

        assert_eq!(mock.generate(request("a")).await.unwrap().text, "first");
        assert_eq!(mock.generate(request("b")).await.unwrap().text, "second");
        assert_eq!(mock.prompts(), vec!["a", "b"]);
        assert_eq!(mock.calls_started(), 2);
    }

    #[tokio::test]
    async fn test_mock_fallback() {
        let mock = MockBackend::with_fallback("always this");
        for _ in 0..3 {
            assert_eq!(
                mock.generate(request("x")).await.unwrap().text,
                "always this"
            );
        }
    }

    #[tokio::test]
    async fn test_mock_exhausted_script_errors() {
        let mock = MockBackend::new();
        let err = mock.generate(request("x")).await.unwrap_err();
        assert!(matches!(err, BackendError::ApiRequest { .. }));
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let mock = MockBackend::new();
        mock.push_error(BackendError::Connection {
            message: "refused".to_string(),
        });
        let err = mock.generate(request("x")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_mock_records_cancellation() {
        let mock = std::sync::Arc::new(MockBackend::new());
        mock.push_text_with_delay("slow", Duration::from_secs(30));

        let task = {
            let mock = std::sync::Arc::clone(&mock);
            tokio::spawn(async move { mock.generate(request("x")).await })
        };
        // Give the call time to start, then drop it mid-flight.
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.abort();
        let _ = task.await;

        assert_eq!(mock.calls_cancelled(), 1);
        assert_eq!(mock.calls_started(), 1);
    }

    #[tokio::test]
    async fn test_mock_completed_call_not_counted_cancelled() {
        let mock = MockBackend::new();
        mock.push_text("fast");
        mock.generate(request("x")).await.unwrap();
        assert_eq!(mock.calls_cancelled(), 0);
    }

    #[tokio::test]
    async fn test_streaming_accumulates_identical_text() {
        let mock = MockBackend::new();
        mock.push_text("alpha beta gamma");
        let (tx, mut rx) = mpsc::channel(16);

        let response = mock.generate_streaming(request("x"), tx).await.unwrap();
        assert_eq!(response.text, "alpha beta gamma");

        let mut streamed = String::new();
        while let Some(chunk) = rx.recv().await {
            streamed.push_str(&chunk);
        }
        assert_eq!(streamed, response.text);
    }
}
