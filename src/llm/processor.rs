// src/llm/processor.rs
//! Event processor: turns a judged-relevant search result into a normalized
//! `Event` (clean capped title/summary, the event's actual date, a category
//! from the closed taxonomy).

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{MinerError, MinerResult};
use crate::llm::{call_structured, ChatModel, SchemaSpec};
use crate::models::{
    normalize_text, truncate_chars, Category, Event, SearchResult, MAX_SUMMARY_CHARS,
    MAX_TITLE_CHARS,
};

const SCHEMA_RETRIES: u32 = 2;

static PROCESSED_SCHEMA: Lazy<SchemaSpec> = Lazy::new(|| SchemaSpec {
    name: "processed_event",
    schema: json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "summary": { "type": "string" },
            "date": { "type": "string", "description": "Date of occurrence, YYYY-MM-DD" },
            "category": {
                "type": "string",
                "enum": Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>()
            }
        },
        "required": ["title", "summary", "date", "category"],
        "additionalProperties": false
    }),
});

#[derive(Debug, Deserialize)]
struct ProcessedContent {
    title: String,
    summary: String,
    date: String,
    category: String,
}

pub struct EventProcessor<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> EventProcessor<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    /// Best-effort normalization: malformed model structure is retried a
    /// bounded number of times, but incoherent content (empty title, bad
    /// date, unknown category) is a `Processing` failure the caller drops.
    pub async fn process(&self, judged: &SearchResult) -> MinerResult<Event> {
        let formatted_date = judged.date.format("%B %-d, %Y").to_string();
        let system_prompt = format!(
            "You are an expert editor formatting Bitcoin and cryptocurrency event \
             information for a historical database.\n\
             Guidelines:\n\
             - Focus only on the crypto event that happened on or around {formatted_date}\n\
             - Remove speculation, opinion, and irrelevant information\n\
             - Create a clear, factual headline (max {MAX_TITLE_CHARS} characters)\n\
             - Write a concise factual summary (max {MAX_SUMMARY_CHARS} characters)\n\
             - Report the event's actual date of occurrence as YYYY-MM-DD; it may \
               differ from the search date\n\
             - Pick exactly one category from the provided list"
        );
        let user_prompt = format!(
            "Here is a search result about an event near {formatted_date}:\n\
             Title: {}\nURL: {}\nContent: {}\n\n\
             Format this into a clean entry for the database.",
            judged.title, judged.url, judged.snippet
        );

        let content: ProcessedContent = call_structured(
            self.model,
            &system_prompt,
            &user_prompt,
            &PROCESSED_SCHEMA,
            SCHEMA_RETRIES,
        )
        .await?;

        let title = truncate_chars(&normalize_text(&content.title), MAX_TITLE_CHARS);
        if title.is_empty() {
            return Err(MinerError::Processing(format!(
                "no coherent title for {}",
                judged.url
            )));
        }
        let summary = truncate_chars(&normalize_text(&content.summary), MAX_SUMMARY_CHARS);

        let date = NaiveDate::parse_from_str(content.date.trim(), "%Y-%m-%d")
            .map_err(|e| MinerError::Processing(format!("bad event date `{}`: {e}", content.date)))?;

        let category = Category::parse(&content.category).ok_or_else(|| {
            MinerError::Processing(format!("unknown category `{}`", content.category))
        })?;

        debug!(url = %judged.url, %date, category = category.as_str(), "processed event");

        let now = Utc::now();
        Ok(Event {
            id: Event::doc_id(date, &title),
            date,
            title,
            summary,
            category,
            importance_rank: None,
            source_result_id: judged.id.clone(),
            created_at: now,
            updated_at: now,
        })
    }
}
