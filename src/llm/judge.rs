// src/llm/judge.rs
//! Relevance judge: one structured model call per candidate deciding whether
//! a search hit describes a Bitcoin/crypto event on the target date.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{MinerError, MinerResult};
use crate::llm::{call_structured, ChatModel, SchemaSpec};
use crate::models::SearchResult;

/// Extra attempts granted when the model returns malformed structure.
const SCHEMA_RETRIES: u32 = 2;

static JUDGMENT_SCHEMA: Lazy<SchemaSpec> = Lazy::new(|| SchemaSpec {
    name: "relevance_judgment",
    schema: json!({
        "type": "object",
        "properties": {
            "relevant": { "type": "boolean" },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "reason": { "type": "string" }
        },
        "required": ["relevant", "confidence", "reason"],
        "additionalProperties": false
    }),
});

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Judgment {
    pub relevant: bool,
    pub confidence: f64,
    pub reason: String,
}

pub struct RelevanceJudge<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> RelevanceJudge<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    pub async fn judge(
        &self,
        candidate: &SearchResult,
        target_date: NaiveDate,
    ) -> MinerResult<Judgment> {
        let formatted_date = target_date.format("%B %-d, %Y").to_string();
        let system_prompt = format!(
            "You are an expert judge evaluating whether a search result describes a \
             Bitcoin or cryptocurrency event that occurred specifically on {formatted_date}.\n\
             Criteria:\n\
             1. The content must be about Bitcoin or cryptocurrency.\n\
             2. The event must have occurred on {formatted_date} specifically.\n\
             3. The information should be factual, not speculation or opinion."
        );
        let user_prompt = format!(
            "Please evaluate this search result:\nTitle: {}\nURL: {}\nContent: {}",
            candidate.title, candidate.url, candidate.snippet
        );

        let judgment: Judgment = call_structured(
            self.model,
            &system_prompt,
            &user_prompt,
            &JUDGMENT_SCHEMA,
            SCHEMA_RETRIES,
        )
        .await?;

        if !(0.0..=1.0).contains(&judgment.confidence) {
            return Err(MinerError::schema(
                JUDGMENT_SCHEMA.name,
                format!("confidence {} out of range", judgment.confidence),
            ));
        }

        debug!(
            url = %candidate.url,
            relevant = judgment.relevant,
            confidence = judgment.confidence,
            "judged candidate"
        );
        Ok(judgment)
    }
}

/// Threshold gate: a candidate counts as relevant only when the judge said
/// so AND its confidence clears `min_score`.
pub fn passes_threshold(judgment: &Judgment, min_score: f64) -> bool {
    judgment.relevant && judgment.confidence >= min_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_drops_low_confidence_even_when_relevant() {
        let j = Judgment {
            relevant: true,
            confidence: 0.3,
            reason: "weak".into(),
        };
        assert!(!passes_threshold(&j, 0.5));
        assert!(passes_threshold(&j, 0.2));
    }

    #[test]
    fn threshold_drops_irrelevant_regardless_of_confidence() {
        let j = Judgment {
            relevant: false,
            confidence: 0.99,
            reason: "off-topic".into(),
        };
        assert!(!passes_threshold(&j, 0.5));
    }
}
