// src/config.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

fn default_judge_min_score() -> f64 {
    0.5
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_results() -> usize {
    15
}
fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_query() -> String {
    "Bitcoin cryptocurrency news and developments".to_string()
}
fn default_search_timeout_ms() -> u64 {
    20_000
}
fn default_model_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    Tavily,
    Exa,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CohortScope {
    /// One cohort per calendar date (the default).
    Date,
    /// The whole requested range ranks as a single cohort.
    Range,
}

/// Retry knobs shared by search and model calls. Delays are milliseconds so
/// tests can shrink them to near-zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Base delay when the failure was a quota limit.
    pub quota_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            quota_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub search_provider: ProviderChoice,
    #[serde(default = "default_judge_min_score")]
    pub judge_min_score: f64,
    #[serde(default)]
    pub rank_cohort_scope: CohortScope,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_base_query")]
    pub base_query: String,
    /// Widen the sourcing `date:` hint to month granularity.
    #[serde(default)]
    pub full_month: bool,
    /// Per-call request timeouts for provider and model HTTP calls.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// "ENV" means: read from TAVILY_API_KEY / EXA_API_KEY / OPENAI_API_KEY.
    #[serde(default)]
    pub tavily_api_key: String,
    #[serde(default)]
    pub exa_api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
}

impl Default for CohortScope {
    fn default() -> Self {
        CohortScope::Date
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_provider: ProviderChoice::Both,
            judge_min_score: default_judge_min_score(),
            rank_cohort_scope: CohortScope::default(),
            max_concurrency: default_max_concurrency(),
            model_name: default_model_name(),
            max_results: default_max_results(),
            base_query: default_base_query(),
            full_month: false,
            search_timeout_ms: default_search_timeout_ms(),
            model_timeout_ms: default_model_timeout_ms(),
            retry: RetryConfig::default(),
            tavily_api_key: String::new(),
            exa_api_key: String::new(),
            openai_api_key: String::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: PipelineConfig = serde_json::from_str(&data)?;
        cfg.resolve_env_keys();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Config built purely from environment variables (no file on disk).
    pub fn from_env() -> Self {
        let mut cfg = PipelineConfig::default();
        cfg.resolve_env_keys();
        if let Ok(model) = env::var("MINER_MODEL") {
            if !model.trim().is_empty() {
                cfg.model_name = model;
            }
        }
        cfg.sanitize();
        cfg
    }

    fn resolve_env_keys(&mut self) {
        for (field, var) in [
            (&mut self.tavily_api_key, "TAVILY_API_KEY"),
            (&mut self.exa_api_key, "EXA_API_KEY"),
            (&mut self.openai_api_key, "OPENAI_API_KEY"),
        ] {
            if field.is_empty() || field.trim().eq_ignore_ascii_case("env") {
                *field = env::var(var).unwrap_or_default();
            }
        }
    }

    fn sanitize(&mut self) {
        if !(0.0..=1.0).contains(&self.judge_min_score) {
            self.judge_min_score = default_judge_min_score();
        }
        if self.max_concurrency == 0 {
            self.max_concurrency = 1;
        }
        if self.max_results == 0 {
            self.max_results = default_max_results();
        }
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
        if self.search_timeout_ms == 0 {
            self.search_timeout_ms = default_search_timeout_ms();
        }
        if self.model_timeout_ms == 0 {
            self.model_timeout_ms = default_model_timeout_ms();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.search_provider, ProviderChoice::Both);
        assert!(cfg.judge_min_score > 0.0 && cfg.judge_min_score < 1.0);
        assert!(cfg.max_concurrency >= 1);
    }

    #[test]
    fn parses_minimal_json() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"search_provider":"tavily","judge_min_score":0.7}"#).unwrap();
        assert_eq!(cfg.search_provider, ProviderChoice::Tavily);
        assert_eq!(cfg.judge_min_score, 0.7);
        assert_eq!(cfg.rank_cohort_scope, CohortScope::Date);
        assert_eq!(cfg.model_name, "gpt-4o-mini");
    }

    #[test]
    fn timeouts_default_and_clamp() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"search_provider":"exa"}"#).unwrap();
        assert_eq!(cfg.search_timeout_ms, 20_000);
        assert_eq!(cfg.model_timeout_ms, 60_000);
        assert!(!cfg.full_month);

        let mut cfg = PipelineConfig {
            search_timeout_ms: 0,
            model_timeout_ms: 0,
            ..PipelineConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.search_timeout_ms, default_search_timeout_ms());
        assert_eq!(cfg.model_timeout_ms, default_model_timeout_ms());
    }

    #[test]
    fn sanitize_clamps_bad_values() {
        let mut cfg = PipelineConfig {
            judge_min_score: 3.0,
            max_concurrency: 0,
            ..PipelineConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.judge_min_score, default_judge_min_score());
        assert_eq!(cfg.max_concurrency, 1);
    }
}
