// src/search/mod.rs
pub mod exa;
pub mod tavily;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;

use crate::error::MinerResult;
use crate::models::normalize_text;

/// One raw hit as returned by a provider, before judging.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RawHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub published_date: Option<String>,
    pub score: Option<f64>,
}

/// Options recognized by every provider.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    pub date_hint: NaiveDate,
    /// Widen the `date:` hint to month granularity.
    pub full_month: bool,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Finite, non-restartable fetch; a fresh call re-fetches.
    async fn search(&self, query: &str, opts: &SearchOptions) -> MinerResult<Vec<RawHit>>;
    fn name(&self) -> &'static str;
}

/// Append a `date:` hint to the base query, day- or month-granular.
pub fn format_crypto_query(base_query: &str, date: NaiveDate, full_month: bool) -> String {
    let formatted = if full_month {
        date.format("%Y-%m").to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    };
    format!("{base_query} date:{formatted}")
}

/// Merge provider-tagged hit batches, keeping the first occurrence of each
/// URL and dropping hits with no usable title or url. Snippets are normalized
/// here so every downstream consumer sees clean text.
pub fn merge_dedup_by_url(batches: Vec<(&str, Vec<RawHit>)>) -> Vec<(String, RawHit)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for (provider, batch) in batches {
        for mut hit in batch {
            hit.title = normalize_text(&hit.title);
            hit.snippet = normalize_text(&hit.snippet);
            if hit.title.is_empty() || hit.url.is_empty() {
                continue;
            }
            if seen.insert(hit.url.clone()) {
                merged.push((provider.to_string(), hit));
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, title: &str) -> RawHit {
        RawHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: "some snippet".to_string(),
            published_date: None,
            score: Some(0.5),
        }
    }

    #[test]
    fn query_formatting_day_and_month() {
        let d = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
        assert_eq!(
            format_crypto_query("Bitcoin news", d, false),
            "Bitcoin news date:2021-11-10"
        );
        assert_eq!(
            format_crypto_query("Bitcoin news", d, true),
            "Bitcoin news date:2021-11"
        );
    }

    #[test]
    fn merge_keeps_first_url_occurrence() {
        let a = vec![hit("https://a.test/1", "First"), hit("https://a.test/2", "Second")];
        let b = vec![hit("https://a.test/1", "Duplicate"), hit("https://b.test/3", "Third")];
        let merged = merge_dedup_by_url(vec![("tavily", a), ("exa", b)]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].0, "tavily");
        assert_eq!(merged[0].1.title, "First");
        assert_eq!(merged[2].0, "exa");
    }

    #[test]
    fn merge_drops_untitled_hits() {
        let merged = merge_dedup_by_url(vec![("tavily", vec![hit("https://a.test/1", "  <p></p> ")])]);
        assert!(merged.is_empty());
    }
}
