// src/models.rs
//! Core documents: raw search results and normalized events, plus the text
//! normalization helpers that define their dedup keys.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hard caps for cleaned event text.
pub const MAX_TITLE_CHARS: usize = 80;
pub const MAX_SUMMARY_CHARS: usize = 300;

/// Seven-tier taxonomy for crypto events. Order doubles as the tie-break
/// priority when the ranker scores two events equally (foundational first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "foundational events")]
    Foundational,
    #[serde(rename = "price/market events")]
    Market,
    #[serde(rename = "regulatory actions")]
    Regulatory,
    #[serde(rename = "exchange/security incidents")]
    Security,
    #[serde(rename = "corporate/institutional moves")]
    Corporate,
    #[serde(rename = "community/cultural milestones")]
    Community,
    #[serde(rename = "technological breakthroughs")]
    Technology,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Foundational,
        Category::Market,
        Category::Regulatory,
        Category::Security,
        Category::Corporate,
        Category::Community,
        Category::Technology,
    ];

    /// Lower is more significant; used only to break score ties.
    pub fn priority(self) -> u8 {
        match self {
            Category::Foundational => 0,
            Category::Market => 1,
            Category::Regulatory => 2,
            Category::Security => 3,
            Category::Corporate => 4,
            Category::Community => 5,
            Category::Technology => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Foundational => "foundational events",
            Category::Market => "price/market events",
            Category::Regulatory => "regulatory actions",
            Category::Security => "exchange/security incidents",
            Category::Corporate => "corporate/institutional moves",
            Category::Community => "community/cultural milestones",
            Category::Technology => "technological breakthroughs",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        let s = s.trim().to_lowercase();
        Category::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// One judged-or-unjudged hit from a search provider. Unique per `(url, date)`;
/// retained as provenance even when irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub query: String,
    pub date: NaiveDate,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source_provider: String,
    pub source_score: Option<f64>,
    pub fetched_at: DateTime<Utc>,
    /// Set by the relevance judge; `None` until judged.
    pub relevant: Option<bool>,
    pub judge_confidence: Option<f64>,
}

impl SearchResult {
    /// Deterministic document id from the `(url, date)` dedup key, so
    /// retried fetches upsert instead of duplicating.
    pub fn doc_id(url: &str, date: NaiveDate) -> String {
        hash_key(&format!("{date}|{url}"))
    }
}

/// A cleaned, categorized event derived from exactly one relevant result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub date: NaiveDate,
    pub title: String,
    pub summary: String,
    pub category: Category,
    /// Dense 1..N within the last-ranked cohort; `None` until ranked.
    pub importance_rank: Option<u32>,
    pub source_result_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Deterministic document id from the `(date, normalized_title)` dedup
    /// key. Re-sourcing the same story upserts the same document.
    pub fn doc_id(date: NaiveDate, title: &str) -> String {
        hash_key(&format!("{date}|{}", normalized_title(title)))
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    // 16 hex chars is plenty for a document key.
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Case/punctuation-insensitive title key: lowercase, strip everything that
/// is not alphanumeric, collapse runs of whitespace to single spaces.
pub fn normalized_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_space = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_space = false;
        } else if !prev_space && !out.is_empty() {
            out.push(' ');
            prev_space = true;
        } else {
            prev_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Normalize provider text: decode HTML entities, strip tags, normalize
/// curly quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Truncate to at most `max` characters (not bytes), trimming a trailing
/// partial word when something was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > max / 2 => cut[..idx].trim_end().to_string(),
        _ => cut.trim_end().to_string(),
    }
}
