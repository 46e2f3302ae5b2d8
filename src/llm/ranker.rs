// src/llm/ranker.rs
//! Event ranker: one structured model call over the whole cohort, so events
//! are scored against each other rather than independently. Rank assignment
//! itself is deterministic: dense 1..N with a fixed tie-break.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{MinerError, MinerResult};
use crate::llm::{call_structured, ChatModel, SchemaSpec};
use crate::models::Event;

const SCHEMA_RETRIES: u32 = 2;

static RANKING_SCHEMA: Lazy<SchemaSpec> = Lazy::new(|| SchemaSpec {
    name: "event_ranking",
    schema: json!({
        "type": "object",
        "properties": {
            "reasoning": { "type": "string" },
            "scores": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer" },
                        "score": { "type": "number" }
                    },
                    "required": ["index", "score"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["reasoning", "scores"],
        "additionalProperties": false
    }),
});

#[derive(Debug, Clone, Copy)]
pub enum RankScope {
    Date(NaiveDate),
    Range(NaiveDate, NaiveDate),
}

impl std::fmt::Display for RankScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankScope::Date(d) => write!(f, "{d}"),
            RankScope::Range(s, e) => write!(f, "{s}..{e}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoredIndex {
    index: usize,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    reasoning: String,
    scores: Vec<ScoredIndex>,
}

/// Dense 1..N ranks aligned with the input cohort, plus the model's reasoning.
#[derive(Debug, Clone)]
pub struct RankedCohort {
    pub ranks: Vec<u32>,
    pub reasoning: String,
}

pub struct EventRanker<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> EventRanker<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    /// Rank the whole cohort in one joint model call. Empty cohorts are a
    /// no-op; singletons skip the model call entirely.
    pub async fn rank(&self, events: &[Event], scope: RankScope) -> MinerResult<RankedCohort> {
        if events.is_empty() {
            return Ok(RankedCohort {
                ranks: Vec::new(),
                reasoning: "no events to rank".to_string(),
            });
        }
        if events.len() == 1 {
            return Ok(RankedCohort {
                ranks: vec![1],
                reasoning: "only one event to rank".to_string(),
            });
        }

        let system_prompt = format!(
            "Rank the following cryptocurrency events from {scope} by their historical \
             significance and impact on the cryptocurrency world.\n\
             Consider:\n\
             - Long-term impact on Bitcoin/cryptocurrency\n\
             - Market impact or price movements\n\
             - Technical innovation or milestone\n\
             - Regulatory significance\n\
             - Mainstream adoption implications\n\
             Score every event from 0.0 (insignificant) to 10.0 (epochal). If two \
             events describe the same underlying story, score only the first and \
             omit the duplicate."
        );

        let event_list: Vec<String> = events
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "Event {i}:\nTitle: {}\nCategory: {}\nDate: {}\nSummary: {}",
                    e.title,
                    e.category.as_str(),
                    e.date,
                    e.summary
                )
            })
            .collect();
        let user_prompt = format!(
            "Here are the {} events to rank:\n\n{}\n\nScore each event by index.",
            events.len(),
            event_list.join("\n--------------\n")
        );

        let response: RankingResponse = call_structured(
            self.model,
            &system_prompt,
            &user_prompt,
            &RANKING_SCHEMA,
            SCHEMA_RETRIES,
        )
        .await
        .map_err(|e| match e {
            // Exhausted schema retries are a cohort-level ranking failure.
            MinerError::SchemaValidation { message, .. } => MinerError::Ranking(message),
            other => other,
        })?;

        let scores = validate_scores(&response.scores, events.len())?;
        let ranks = assign_dense_ranks(events, &scores);

        info!(%scope, n = events.len(), "ranked cohort");
        debug!(reasoning = %response.reasoning, "ranking reasoning");
        Ok(RankedCohort {
            ranks,
            reasoning: response.reasoning,
        })
    }
}

/// Expand the model's sparse `(index, score)` pairs into a per-event score
/// vector. Duplicate or out-of-range indices are malformed output; omitted
/// events (duplicates per the prompt) sink below every scored event.
fn validate_scores(scored: &[ScoredIndex], n: usize) -> MinerResult<Vec<f64>> {
    let mut seen = HashSet::new();
    let mut scores = vec![f64::NEG_INFINITY; n];
    for s in scored {
        if s.index >= n {
            return Err(MinerError::Ranking(format!(
                "score index {} out of range for cohort of {n}",
                s.index
            )));
        }
        if !seen.insert(s.index) {
            return Err(MinerError::Ranking(format!(
                "duplicate score index {}",
                s.index
            )));
        }
        scores[s.index] = s.score;
    }
    Ok(scores)
}

/// Dense 1..N ordering: score descending, ties broken by category priority,
/// then chronological date, then original insertion order.
pub fn assign_dense_ranks(events: &[Event], scores: &[f64]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .total_cmp(&scores[a])
            .then_with(|| events[a].category.priority().cmp(&events[b].category.priority()))
            .then_with(|| events[a].date.cmp(&events[b].date))
            .then_with(|| a.cmp(&b))
    });
    let mut ranks = vec![0u32; events.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = rank as u32 + 1;
    }
    ranks
}
