//! # Hegelion Core
//!
//! A dialectical reasoning engine over pluggable text-generation backends.
//! Runs a thesis -> antithesis -> synthesis pipeline, optionally widening the
//! antithesis into a concurrent three-persona critic council and gating the
//! synthesis behind a scoring judge with bounded retries. Structured records
//! (contradictions, research proposals, judge scores) are extracted from the
//! free-text phase output, and completed results are cached with a TTL.

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod types;

// Re-export commonly used types at the crate root.
pub use backend::{GenerationRequest, GenerationResponse, MockBackend, TextBackend};
pub use cache::{cache_key, CacheSettings, ResultCache};
pub use config::{BackendConfig, EngineSettings, HegelionConfig, RetryConfig};
pub use engine::DialecticEngine;
pub use error::{BackendError, ConfigError, HegelionError, Result};
pub use providers::create_backend;
pub use types::{
    Contradiction, CriticPersona, DialecticMode, HegelionResult, JudgeEvaluation, Phase,
    PhaseOutput, Query, QueryOptions, ResearchProposal, ResponseStyle, RunMetadata, StreamEvent,
};
