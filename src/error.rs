// src/error.rs
//! Error taxonomy for the mining/ranking pipelines.
//!
//! Retry policy lives with the variant: transient provider trouble and
//! malformed structured output are retried with backoff; processing and
//! storage failures are not.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinerError {
    /// Transient network/HTTP failure from a search or model provider.
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// Provider signalled a rate/quota limit. Retried with longer backoff.
    #[error("provider quota exceeded ({provider}): {message}")]
    QuotaExceeded { provider: String, message: String },

    /// Model returned output that does not match the requested schema.
    #[error("schema validation failed for `{schema}`: {message}")]
    SchemaValidation { schema: String, message: String },

    /// Content too ambiguous to normalize into an event. Skip, never retry.
    #[error("processing failed: {0}")]
    Processing(String),

    /// Cohort-level ranking failure. Prior persisted ranks stay untouched.
    #[error("ranking failed: {0}")]
    Ranking(String),

    /// Storage failures propagate immediately; no local recovery.
    #[error("storage error: {0}")]
    Storage(String),
}

impl MinerError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn quota(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn schema(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// Whether a bounded retry with backoff may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. }
                | Self::QuotaExceeded { .. }
                | Self::SchemaValidation { .. }
                | Self::Ranking(_)
        )
    }

    /// Quota limits get a longer backoff than plain transient failures.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

pub type MinerResult<T> = Result<T, MinerError>;
