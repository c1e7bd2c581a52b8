//! The dialectical orchestration engine.
//!
//! Sequences phase execution over an injected [`TextBackend`]: thesis, then
//! antithesis (a single critic or a three-persona council fan-out), then
//! synthesis, then an optional judge-gated retry loop. Consults the result
//! cache before running anything and writes freshly computed results back.
//!
//! Phase order is a total order except inside the council fan-out, which is
//! unordered in flight but merged in fixed persona order so the unified
//! antithesis text never depends on backend latency. The whole run races a
//! [`CancellationToken`]; cancelling mid-fan-out drops every outstanding
//! critic call.

use crate::backend::{GenerationRequest, TextBackend};
use crate::cache::{cache_key, ResultCache};
use crate::config::{EngineSettings, HegelionConfig};
use crate::error::{BackendError, HegelionError, Result};
use crate::parser;
use crate::prompts;
use crate::providers::with_retry;
use crate::types::{
    CriticPersona, DialecticMode, HegelionResult, JudgeEvaluation, Phase, PhaseOutput,
    PhaseTiming, Query, RunMetadata, StreamEvent,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The orchestration engine. Cheap to share; all state is per-run.
pub struct DialecticEngine {
    backend: Arc<dyn TextBackend>,
    settings: EngineSettings,
    cache: Arc<ResultCache>,
    cache_ttl: Duration,
}

impl DialecticEngine {
    /// Create an engine with its own cache.
    pub fn new(backend: Arc<dyn TextBackend>, config: &HegelionConfig) -> Self {
        let cache = Arc::new(ResultCache::new(&config.cache));
        Self::with_shared_cache(backend, config, cache)
    }

    /// Create an engine sharing an existing cache with other engines.
    pub fn with_shared_cache(
        backend: Arc<dyn TextBackend>,
        config: &HegelionConfig,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            backend,
            settings: config.engine.clone(),
            cache,
            cache_ttl: config.cache.ttl(),
        }
    }

    /// Run the full pipeline for a query.
    ///
    /// Consults the cache first; a hit short-circuits with zero backend
    /// calls. A fresh result is written back before returning.
    pub async fn run(&self, query: Query) -> Result<HegelionResult> {
        self.run_with(query, None, CancellationToken::new()).await
    }

    /// Run with optional progressive token delivery and caller-controlled
    /// cancellation.
    pub async fn run_with(
        &self,
        query: Query,
        stream: Option<mpsc::Sender<StreamEvent>>,
        cancel: CancellationToken,
    ) -> Result<HegelionResult> {
        query.options.validate()?;

        let key = cache_key(&query.text, &query.options);
        if let Some(mut hit) = self.cache.get(&key) {
            info!(key = key.as_str(), "Cache hit, short-circuiting");
            hit.metadata.cache_hit = true;
            return Ok(hit);
        }

        let result = self
            .execute_pipeline(&query, stream.as_ref(), &cancel)
            .await?;
        self.cache.put(key, result.clone(), self.cache_ttl);
        Ok(result)
    }

    /// Run `options.iterations` independent pipeline executions.
    ///
    /// Only the first iteration consults the cache; later iterations always
    /// recompute so the caller has genuinely independent results to
    /// aggregate over.
    pub async fn run_iterations(&self, query: Query) -> Result<Vec<HegelionResult>> {
        query.options.validate()?;
        let mut results = Vec::with_capacity(query.options.iterations);
        results.push(self.run(query.clone()).await?);
        for _ in 1..query.options.iterations {
            let cancel = CancellationToken::new();
            results.push(self.execute_pipeline(&query, None, &cancel).await?);
        }
        Ok(results)
    }

    /// The phase state machine:
    /// thesis -> antithesis -> synthesis -> (judge -> [retry -> judge]*)?
    async fn execute_pipeline(
        &self,
        query: &Query,
        stream: Option<&mpsc::Sender<StreamEvent>>,
        cancel: &CancellationToken,
    ) -> Result<HegelionResult> {
        let run_started = Instant::now();
        let run_id = Uuid::new_v4();
        let mode = DialecticMode::from_options(&query.options);
        let mut timings: Vec<PhaseTiming> = Vec::new();
        info!(run_id = %run_id, mode = %mode, query = query.text.as_str(), "Dialectic run starting");

        let thesis = self
            .run_phase(Phase::Thesis, prompts::thesis(query), query, stream, cancel)
            .await?;
        timings.push(timing(&thesis));

        let antithesis_text = if query.options.use_council {
            self.run_council(query, &thesis.text, stream, cancel, &mut timings)
                .await?
        } else {
            let out = self
                .run_phase(
                    Phase::Antithesis,
                    prompts::antithesis(query, &thesis.text),
                    query,
                    stream,
                    cancel,
                )
                .await?;
            timings.push(timing(&out));
            out.text
        };

        let mut synthesis = self
            .run_phase(
                Phase::Synthesis,
                prompts::synthesis(query, &thesis.text, &antithesis_text, None),
                query,
                stream,
                cancel,
            )
            .await?;
        timings.push(timing(&synthesis));

        let mut judge_eval: Option<JudgeEvaluation> = None;
        let mut judge_text: Option<String> = None;
        let mut retry_count: u32 = 0;

        if query.options.use_judge {
            // Bounded retry loop with an externally visible counter; never
            // recursion, so termination is directly checkable.
            loop {
                let judge_out = self
                    .run_phase(
                        Phase::Judge,
                        prompts::judge(query, &synthesis.text),
                        query,
                        stream,
                        cancel,
                    )
                    .await?;
                timings.push(timing(&judge_out));

                let Some(eval) = parser::parse_judge(&judge_out.text) else {
                    warn!("Judge output had no parseable score; accepting synthesis as-is");
                    judge_text = Some(judge_out.text);
                    break;
                };
                judge_text = Some(judge_out.text);
                let score = eval.score;
                let feedback = eval.feedback.clone();
                judge_eval = Some(eval);

                if score >= self.settings.judge_threshold {
                    debug!(score, "Synthesis accepted by judge");
                    break;
                }
                if retry_count >= self.settings.max_judge_retries {
                    info!(
                        retry_count,
                        score, "Judge retry ceiling reached, returning last synthesis"
                    );
                    break;
                }

                retry_count += 1;
                info!(score, retry_count, "Synthesis below threshold, retrying with feedback");
                synthesis = self
                    .run_phase(
                        Phase::Synthesis,
                        prompts::synthesis(
                            query,
                            &thesis.text,
                            &antithesis_text,
                            Some(&feedback),
                        ),
                        query,
                        stream,
                        cancel,
                    )
                    .await?;
                timings.push(timing(&synthesis));
            }
        }

        // Contradictions come from the antithesis and, when present, the
        // judge's own critique; proposals come from the final synthesis.
        let mut contradictions = parser::parse_contradictions(&antithesis_text);
        if let Some(ref text) = judge_text {
            contradictions.extend(parser::parse_contradictions(text));
        }
        let research_proposals = parser::parse_research_proposals(&synthesis.text);

        let metadata = RunMetadata {
            run_id,
            phase_timings: timings,
            total_duration_ms: run_started.elapsed().as_millis() as u64,
            provider: self.backend.provider_name().to_string(),
            model: self.backend.model_name().to_string(),
            retry_count,
            cache_hit: false,
        };
        info!(
            total_ms = metadata.total_duration_ms,
            retries = retry_count,
            contradictions = contradictions.len(),
            proposals = research_proposals.len(),
            "Dialectic run complete"
        );

        Ok(HegelionResult {
            query: query.text.clone(),
            options: query.options.clone(),
            mode,
            thesis: thesis.text,
            antithesis: antithesis_text,
            synthesis: synthesis.text,
            contradictions,
            research_proposals,
            judge: judge_eval,
            metadata,
        })
    }

    /// Run the three-critic council fan-out.
    ///
    /// All critics run concurrently with join semantics: the engine waits
    /// for the full set before proceeding, and any critic's terminal
    /// failure fails the whole antithesis phase (no partial merge). Merge
    /// order is fixed by [`CriticPersona::ALL`], independent of completion
    /// order. Cancellation drops every in-flight critic call.
    async fn run_council(
        &self,
        query: &Query,
        thesis: &str,
        stream: Option<&mpsc::Sender<StreamEvent>>,
        cancel: &CancellationToken,
        timings: &mut Vec<PhaseTiming>,
    ) -> Result<String> {
        info!(critics = CriticPersona::ALL.len(), "Council fan-out starting");

        let critic_futures: Vec<_> = CriticPersona::ALL
            .iter()
            .map(|&persona| {
                let phase = Phase::Critic(persona);
                let prompt = prompts::critic(persona, query, thesis);
                async move { (persona, self.run_phase_inner(phase, prompt, query, stream).await) }
            })
            .collect();

        let results = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Run cancelled during council fan-out");
                return Err(HegelionError::Cancelled);
            }
            results = futures::future::join_all(critic_futures) => results,
        };

        // join_all preserves input order, so this merge is already in
        // canonical persona order no matter which call finished first.
        let mut merged = String::new();
        for (persona, result) in results {
            let out = result?;
            timings.push(timing(&out));
            merged.push_str(&format!("## Critique ({persona})\n\n{}\n\n", out.text));
        }
        Ok(merged.trim_end().to_string())
    }

    /// Run one phase, racing the cancellation token.
    async fn run_phase(
        &self,
        phase: Phase,
        prompt: String,
        query: &Query,
        stream: Option<&mpsc::Sender<StreamEvent>>,
        cancel: &CancellationToken,
    ) -> Result<PhaseOutput> {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(phase = %phase, "Run cancelled");
                Err(HegelionError::Cancelled)
            }
            result = self.run_phase_inner(phase, prompt, query, stream) => result,
        }
    }

    /// Execute one phase's backend call with timeout and transient-error
    /// retry, forwarding stream tokens when a sink is attached.
    async fn run_phase_inner(
        &self,
        phase: Phase,
        prompt: String,
        query: &Query,
        stream: Option<&mpsc::Sender<StreamEvent>>,
    ) -> Result<PhaseOutput> {
        let started = Instant::now();
        let max_tokens = query.options.max_tokens_per_phase;
        let timeout = self.settings.phase_timeout(max_tokens);
        debug!(phase = %phase, timeout_secs = timeout.as_secs(), "Phase starting");

        if let Some(tx) = stream {
            let _ = tx.send(StreamEvent::PhaseStarted { phase }).await;
        }

        let op = || {
            let request = GenerationRequest {
                prompt: prompt.clone(),
                max_tokens,
            };
            async move {
                let call = async {
                    match stream {
                        Some(tx) => {
                            let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(64);
                            let generate = self.backend.generate_streaming(request, chunk_tx);
                            let forward = async {
                                while let Some(text) = chunk_rx.recv().await {
                                    let _ = tx.send(StreamEvent::Token { phase, text }).await;
                                }
                            };
                            let (response, ()) = tokio::join!(generate, forward);
                            response
                        }
                        None => self.backend.generate(request).await,
                    }
                };
                match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout {
                        timeout_secs: timeout.as_secs(),
                    }),
                }
            }
        };

        let response = with_retry(&self.settings.retry, op)
            .await
            .map_err(|source| HegelionError::Phase { phase, source })?;

        if response.text.trim().is_empty() {
            // An empty phase would poison every downstream prompt.
            return Err(HegelionError::Phase {
                phase,
                source: BackendError::ResponseParse {
                    message: "backend returned empty text".to_string(),
                },
            });
        }

        if let Some(tx) = stream {
            let _ = tx.send(StreamEvent::PhaseCompleted { phase }).await;
        }

        let duration = started.elapsed();
        debug!(phase = %phase, elapsed_ms = duration.as_millis() as u64, "Phase complete");

        Ok(PhaseOutput {
            phase,
            text: response.text,
            duration,
            provider: self.backend.provider_name().to_string(),
            model: self.backend.model_name().to_string(),
        })
    }
}

fn timing(out: &PhaseOutput) -> PhaseTiming {
    PhaseTiming {
        phase: out.phase.label(),
        duration_ms: out.duration.as_millis() as u64,
    }
}
