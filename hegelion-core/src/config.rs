//! Configuration for the Hegelion engine.
//!
//! Uses `figment` for layered configuration: built-in defaults -> optional
//! `hegelion.toml` -> `HEGELION_`-prefixed environment variables (nested
//! fields separated by `__`, e.g. `HEGELION_ENGINE__JUDGE_THRESHOLD=0.8`).

use crate::cache::CacheSettings;
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HegelionConfig {
    /// Which backend to generate with.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Engine policy knobs.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

impl HegelionConfig {
    /// Load configuration from defaults, an optional TOML file, and the
    /// environment. When `path` is `None`, `hegelion.toml` in the working
    /// directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(HegelionConfig::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file("hegelion.toml")),
        };
        let config: HegelionConfig = figment
            .merge(Env::prefixed("HEGELION_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Parse(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.engine.judge_threshold) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "engine.judge_threshold must be in [0, 1], got {}",
                    self.engine.judge_threshold
                ),
            });
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "backend.request_timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for the text-generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Provider name: "anthropic", "openai", "ollama", or "custom".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Optional base URL override ("ollama" and "custom" require one or use
    /// their own defaults).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Engine policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Judge score at or above which a synthesis is accepted (default: 0.7).
    #[serde(default = "default_judge_threshold")]
    pub judge_threshold: f64,
    /// Maximum judge-triggered synthesis retries (default: 1).
    #[serde(default = "default_max_judge_retries")]
    pub max_judge_retries: u32,
    /// Minimum per-phase timeout in seconds; the token budget adds to it
    /// (default: 30).
    #[serde(default = "default_phase_timeout_floor_secs")]
    pub phase_timeout_floor_secs: u64,
    /// Retry policy for transient backend errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_judge_threshold() -> f64 {
    0.7
}
fn default_max_judge_retries() -> u32 {
    1
}
fn default_phase_timeout_floor_secs() -> u64 {
    30
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            judge_threshold: default_judge_threshold(),
            max_judge_retries: default_max_judge_retries(),
            phase_timeout_floor_secs: default_phase_timeout_floor_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Deadline for one phase: the floor plus one second per 64 tokens of
    /// the phase budget.
    pub fn phase_timeout(&self, max_tokens_per_phase: usize) -> Duration {
        let token_allowance = (max_tokens_per_phase as u64).div_ceil(64);
        Duration::from_secs(self.phase_timeout_floor_secs + token_allowance)
    }
}

/// Exponential backoff policy for transient backend errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries per phase after the initial attempt (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds (default: 500).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Multiplier applied per attempt (default: 2.0).
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Backoff ceiling in milliseconds (default: 8000).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Add up to 25% jitter to each delay (default: true).
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HegelionConfig::default();
        assert_eq!(config.backend.provider, "anthropic");
        assert_eq!(config.engine.judge_threshold, 0.7);
        assert_eq!(config.engine.max_judge_retries, 1);
        assert_eq!(config.engine.retry.max_retries, 2);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_deserialize_empty_toml() {
        let config: HegelionConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend.model, default_model());
        assert_eq!(config.engine.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn test_toml_overrides() {
        let config: HegelionConfig = toml::from_str(
            r#"
            [backend]
            provider = "ollama"
            model = "llama3.2"
            base_url = "http://127.0.0.1:11434/v1"

            [engine]
            judge_threshold = 0.9
            max_judge_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.provider, "ollama");
        assert_eq!(
            config.backend.base_url.as_deref(),
            Some("http://127.0.0.1:11434/v1")
        );
        assert_eq!(config.engine.judge_threshold, 0.9);
        assert_eq!(config.engine.max_judge_retries, 3);
        // Untouched sections keep their defaults.
        assert_eq!(config.cache.capacity, 128);
    }

    #[test]
    fn test_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HEGELION_ENGINE__JUDGE_THRESHOLD", "0.85");
            jail.set_env("HEGELION_BACKEND__MODEL", "test-model");
            let config = HegelionConfig::load(None).expect("load");
            assert_eq!(config.engine.judge_threshold, 0.85);
            assert_eq!(config.backend.model, "test-model");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HEGELION_ENGINE__JUDGE_THRESHOLD", "1.5");
            assert!(HegelionConfig::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_phase_timeout_scales_with_budget() {
        let settings = EngineSettings::default();
        let small = settings.phase_timeout(64);
        let large = settings.phase_timeout(6400);
        assert_eq!(small, Duration::from_secs(31));
        assert_eq!(large, Duration::from_secs(130));
    }
}
