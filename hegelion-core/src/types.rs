//! Fundamental types for the dialectical pipeline.
//!
//! Defines the immutable [`Query`] input, the phase and persona enums that
//! drive orchestration, the structured records extracted from phase output,
//! and the terminal [`HegelionResult`] artifact.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the final result should be shaped by the prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    /// Full thesis/antithesis/synthesis sections (default).
    #[default]
    Sections,
    /// Ask the model to answer in strict JSON.
    Json,
    /// Only the synthesis is surfaced to the reader.
    SynthesisOnly,
    /// Flowing conversational prose.
    Conversational,
    /// Terse bullet-point output.
    BulletPoints,
}

impl std::fmt::Display for ResponseStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResponseStyle::Sections => "sections",
            ResponseStyle::Json => "json",
            ResponseStyle::SynthesisOnly => "synthesis_only",
            ResponseStyle::Conversational => "conversational",
            ResponseStyle::BulletPoints => "bullet_points",
        };
        write!(f, "{s}")
    }
}

/// Per-invocation options controlling pipeline behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Run the antithesis phase as three concurrent critic personas.
    #[serde(default)]
    pub use_council: bool,
    /// Score the synthesis with a judge phase and retry below threshold.
    #[serde(default)]
    pub use_judge: bool,
    /// Inject a directive to ground claims in retrieved evidence.
    /// Retrieval itself is an external capability; this only shapes prompts.
    #[serde(default)]
    pub use_search: bool,
    /// Output shaping for the prompts.
    #[serde(default)]
    pub response_style: ResponseStyle,
    /// Token budget per phase (must be > 0).
    #[serde(default = "default_max_tokens_per_phase")]
    pub max_tokens_per_phase: usize,
    /// Number of independent full-pipeline runs (must be >= 1).
    #[serde(default = "default_iterations")]
    pub iterations: usize,
}

fn default_max_tokens_per_phase() -> usize {
    1200
}
fn default_iterations() -> usize {
    1
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_council: false,
            use_judge: false,
            use_search: false,
            response_style: ResponseStyle::Sections,
            max_tokens_per_phase: default_max_tokens_per_phase(),
            iterations: default_iterations(),
        }
    }
}

impl QueryOptions {
    /// Validate option invariants: positive token budget, at least one iteration.
    pub fn validate(&self) -> Result<(), crate::error::HegelionError> {
        if self.max_tokens_per_phase == 0 {
            return Err(crate::error::HegelionError::InvalidQuery {
                message: "max_tokens_per_phase must be greater than zero".to_string(),
            });
        }
        if self.iterations == 0 {
            return Err(crate::error::HegelionError::InvalidQuery {
                message: "iterations must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// An immutable dialectical query: the question plus its option set.
///
/// Created once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// The free-text question to reason about.
    pub text: String,
    /// Pipeline options for this invocation.
    pub options: QueryOptions,
}

impl Query {
    /// Create a query with the given options.
    pub fn new(text: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }

    /// Create a query with default options.
    pub fn simple(text: impl Into<String>) -> Self {
        Self::new(text, QueryOptions::default())
    }
}

/// One of the three council critic personas.
///
/// Each persona attacks a different facet of the thesis. The declaration
/// order here is also the canonical merge order for council output, so the
/// unified antithesis text is deterministic regardless of which backend
/// call finishes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticPersona {
    /// Attacks logical structure: hidden premises, non sequiturs, circularity.
    Logician,
    /// Attacks empirical grounding: missing evidence, untestable claims.
    Empiricist,
    /// Attacks value assumptions: whose interests, what is taken as good.
    Ethicist,
}

impl CriticPersona {
    /// All personas in canonical merge order.
    pub const ALL: [CriticPersona; 3] = [
        CriticPersona::Logician,
        CriticPersona::Empiricist,
        CriticPersona::Ethicist,
    ];

    /// Lowercase identifier used in labels and trace fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            CriticPersona::Logician => "logician",
            CriticPersona::Empiricist => "empiricist",
            CriticPersona::Ethicist => "ethicist",
        }
    }
}

impl std::fmt::Display for CriticPersona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discrete backend-call step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Thesis,
    Antithesis,
    /// A single critic within the council fan-out.
    Critic(CriticPersona),
    Synthesis,
    Judge,
}

impl Phase {
    /// Stable label used in error messages, metadata, and trace fields.
    pub fn label(&self) -> String {
        match self {
            Phase::Thesis => "thesis".to_string(),
            Phase::Antithesis => "antithesis".to_string(),
            Phase::Critic(p) => format!("critic:{p}"),
            Phase::Synthesis => "synthesis".to_string(),
            Phase::Judge => "judge".to_string(),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The raw output of one executed phase.
///
/// Owned by the engine run that produced it and discarded after its content
/// has been merged into the final result.
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    /// Which phase produced this output.
    pub phase: Phase,
    /// The full generated text.
    pub text: String,
    /// Wall-clock duration of the backend call(s) for this phase.
    pub duration: Duration,
    /// Backend provider identifier (e.g. "anthropic").
    pub provider: String,
    /// Backend model identifier.
    pub model: String,
}

/// A contradiction surfaced by the antithesis (or judge) phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// What the contradiction is.
    pub description: String,
    /// The evidence or reasoning backing it.
    pub evidence: String,
}

/// A research proposal surfaced by the synthesis phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchProposal {
    /// The proposed line of inquiry.
    pub description: String,
    /// A concrete prediction that would confirm or refute it.
    pub testable_prediction: String,
}

/// The judge's scoring of a synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeEvaluation {
    /// Quality score in [0, 1].
    pub score: f64,
    /// Actionable feedback on what to improve.
    pub feedback: String,
}

/// Which pipeline variant produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialecticMode {
    /// Single-critic antithesis, no judge.
    Basic,
    /// Three-persona council antithesis.
    Council,
    /// Judge-gated synthesis (council may also have run).
    Judge,
}

impl DialecticMode {
    /// Derive the mode label from an option set. Judge wins over council.
    pub fn from_options(options: &QueryOptions) -> Self {
        if options.use_judge {
            DialecticMode::Judge
        } else if options.use_council {
            DialecticMode::Council
        } else {
            DialecticMode::Basic
        }
    }
}

impl std::fmt::Display for DialecticMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DialecticMode::Basic => "basic",
            DialecticMode::Council => "council",
            DialecticMode::Judge => "judge",
        };
        write!(f, "{s}")
    }
}

/// Wall-clock timing for one phase, recorded in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    /// Phase label (see [`Phase::label`]).
    pub phase: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Run-level metadata attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique identifier for the pipeline run that produced this result.
    pub run_id: uuid::Uuid,
    /// Per-phase durations in execution order.
    pub phase_timings: Vec<PhaseTiming>,
    /// Total pipeline duration in milliseconds.
    pub total_duration_ms: u64,
    /// Backend provider that served the run.
    pub provider: String,
    /// Backend model that served the run.
    pub model: String,
    /// Number of judge-triggered synthesis retries that occurred.
    pub retry_count: u32,
    /// Whether this result was served from the cache.
    #[serde(default)]
    pub cache_hit: bool,
}

/// The terminal artifact of a dialectical run.
///
/// Constructed once, immutable, and either returned to the caller or stored
/// as a cache value. After a successful run the thesis, antithesis, and
/// synthesis texts are always non-empty; the extracted record lists may be
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HegelionResult {
    /// The original query text.
    pub query: String,
    /// The option set the run was executed with.
    pub options: QueryOptions,
    /// Which pipeline variant ran.
    pub mode: DialecticMode,
    /// Thesis phase output.
    pub thesis: String,
    /// Antithesis phase output (merged critic outputs in council mode).
    pub antithesis: String,
    /// Synthesis phase output (the last one, if the judge forced retries).
    pub synthesis: String,
    /// Contradictions extracted from the antithesis, in order of appearance.
    pub contradictions: Vec<Contradiction>,
    /// Research proposals extracted from the synthesis, in order of appearance.
    pub research_proposals: Vec<ResearchProposal>,
    /// The last judge evaluation, when judge mode was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeEvaluation>,
    /// Timing and provenance metadata.
    pub metadata: RunMetadata,
}

/// Progressive delivery events emitted while a run is in flight.
///
/// Best-effort: a full channel or dropped receiver never affects the
/// assembled result, and the accumulated phase text is identical whether or
/// not anyone is listening.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A phase has started executing.
    PhaseStarted { phase: Phase },
    /// A chunk of generated text arrived for the given phase.
    Token { phase: Phase, text: String },
    /// A phase finished (its full text is now final).
    PhaseCompleted { phase: Phase },
}
