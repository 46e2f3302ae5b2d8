// tests/ranking_pipeline.rs
//! Cohort ranking: dense permutations, idempotent re-ranking, fail-safe
//! behavior on malformed model output, and cohort filters.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crypto_event_miner::error::{MinerError, MinerResult};
use crypto_event_miner::llm::{ChatModel, SchemaSpec};
use crypto_event_miner::storage::EventStore;
use crypto_event_miner::{
    Category, CohortFilter, DateLocks, Event, MemoryStore, PipelineConfig, RankingPipeline,
    RetryConfig, SearchResult,
};

/// Scores events by a keyword lookup on the prompt ordering: the ATH story
/// gets the top score, everything else stays low.
struct KeywordScorer;

#[async_trait]
impl ChatModel for KeywordScorer {
    async fn generate_structured(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _schema: &SchemaSpec,
    ) -> MinerResult<Value> {
        let mut scores = Vec::new();
        for (i, block) in user_prompt.split("--------------").enumerate() {
            let score = if block.contains("all-time high") { 9.5 } else { 1.0 + i as f64 * 0.1 };
            scores.push(json!({ "index": i, "score": score }));
        }
        Ok(json!({ "reasoning": "record price dominates the day", "scores": scores }))
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Emits a duplicate index (malformed output) for any cohort mentioning the
/// poisoned title; scores every other cohort normally.
struct PoisonedCohortRanker;

#[async_trait]
impl ChatModel for PoisonedCohortRanker {
    async fn generate_structured(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _schema: &SchemaSpec,
    ) -> MinerResult<Value> {
        if user_prompt.contains("confusing day") {
            return Ok(json!({
                "reasoning": "confused",
                "scores": [
                    { "index": 0, "score": 5.0 },
                    { "index": 0, "score": 4.0 }
                ]
            }));
        }
        let scores: Vec<Value> = user_prompt
            .split("--------------")
            .enumerate()
            .map(|(i, _)| json!({ "index": i, "score": 5.0 - i as f64 * 0.5 }))
            .collect();
        Ok(json!({ "reasoning": "routine day", "scores": scores }))
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Always returns a duplicate index, which is malformed ranking output.
struct BrokenRanker {
    calls: AtomicU32,
}

#[async_trait]
impl ChatModel for BrokenRanker {
    async fn generate_structured(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _schema: &SchemaSpec,
    ) -> MinerResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "reasoning": "confused",
            "scores": [
                { "index": 0, "score": 5.0 },
                { "index": 0, "score": 4.0 }
            ]
        }))
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            quota_delay_ms: 0,
        },
        ..PipelineConfig::default()
    }
}

fn event(date: NaiveDate, title: &str, category: Category, source_result_id: &str) -> Event {
    let now = Utc::now();
    Event {
        id: Event::doc_id(date, title),
        date,
        title: title.to_string(),
        summary: format!("{title}."),
        category,
        importance_rank: None,
        source_result_id: source_result_id.to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn search_result(id: &str, date: NaiveDate, query: &str, confidence: f64) -> SearchResult {
    SearchResult {
        id: id.to_string(),
        query: query.to_string(),
        date,
        title: "hit".to_string(),
        url: format!("https://news.test/{id}"),
        snippet: "snippet".to_string(),
        source_provider: "tavily".to_string(),
        source_score: Some(0.5),
        fetched_at: Utc::now(),
        relevant: Some(true),
        judge_confidence: Some(confidence),
    }
}

async fn seed_ath_cohort(store: &MemoryStore, date: NaiveDate) {
    for e in [
        event(date, "Bitcoin hits new all-time high above $68,000", Category::Market, "sr-1"),
        event(date, "Podcast episode discusses wallet hygiene", Category::Community, "sr-2"),
        event(date, "Minor meetup held in Lisbon", Category::Community, "sr-3"),
    ] {
        store.upsert_event(&e).await.unwrap();
    }
}

fn pipeline(model: Arc<dyn ChatModel>, store: Arc<MemoryStore>) -> RankingPipeline {
    RankingPipeline::new(model, store, fast_config(), DateLocks::new())
}

#[tokio::test]
async fn ath_event_ranks_first_and_ranks_are_dense() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_ath_cohort(&store, date).await;

    let p = pipeline(Arc::new(KeywordScorer), store.clone());
    let ranked = p.rank_for_date(date, &CohortFilter::default()).await.unwrap();

    assert_eq!(ranked.len(), 3);
    assert!(ranked[0].title.contains("all-time high"));
    assert_eq!(ranked[0].importance_rank, Some(1));
    let mut ranks: Vec<u32> = ranked.iter().filter_map(|e| e.importance_rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3]);

    // Persisted, not just returned.
    let stored = store.get_events_by_date(date).await.unwrap();
    assert!(stored.iter().all(|e| e.importance_rank.is_some()));
}

#[tokio::test]
async fn reranking_an_unchanged_cohort_is_idempotent() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_ath_cohort(&store, date).await;

    let p = pipeline(Arc::new(KeywordScorer), store.clone());
    let first = p.rank_for_date(date, &CohortFilter::default()).await.unwrap();
    let second = p.rank_for_date(date, &CohortFilter::default()).await.unwrap();

    let ranks = |events: &[Event]| -> Vec<(String, Option<u32>)> {
        events
            .iter()
            .map(|e| (e.id.clone(), e.importance_rank))
            .collect()
    };
    assert_eq!(ranks(&first), ranks(&second));
}

#[tokio::test]
async fn empty_cohort_is_a_noop() {
    let date = NaiveDate::from_ymd_opt(2019, 6, 1).unwrap();
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(Arc::new(KeywordScorer), store);
    let ranked = p.rank_for_date(date, &CohortFilter::default()).await.unwrap();
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn malformed_ranking_output_leaves_prior_ranks_untouched() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let store = Arc::new(MemoryStore::new());

    let mut a = event(date, "Bitcoin hits new all-time high", Category::Market, "sr-1");
    a.importance_rank = Some(1);
    let mut b = event(date, "Meetup held in Lisbon", Category::Community, "sr-2");
    b.importance_rank = Some(2);
    store.upsert_event(&a).await.unwrap();
    store.upsert_event(&b).await.unwrap();

    let broken = Arc::new(BrokenRanker {
        calls: AtomicU32::new(0),
    });
    let p = pipeline(broken.clone(), store.clone());
    let out = p.rank_for_date(date, &CohortFilter::default()).await;

    assert!(matches!(out, Err(MinerError::Ranking(_))));
    // Bounded retries happened, then the cohort aborted.
    assert_eq!(broken.calls.load(Ordering::SeqCst), 3);
    let stored = store.get_events_by_date(date).await.unwrap();
    let mut ranks: Vec<Option<u32>> = stored.iter().map(|e| e.importance_rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![Some(1), Some(2)]);
}

#[tokio::test]
async fn failed_cohort_does_not_abort_remaining_dates() {
    let d1 = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let d2 = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
    let store = Arc::new(MemoryStore::new());
    for e in [
        event(d1, "A confusing day for the markets", Category::Market, "sr-1"),
        event(d1, "Meetup held in Lisbon", Category::Community, "sr-2"),
        event(d2, "SEC approves a futures ETF", Category::Regulatory, "sr-3"),
        event(d2, "Exchange lists new trading pairs", Category::Corporate, "sr-4"),
    ] {
        store.upsert_event(&e).await.unwrap();
    }

    let p = pipeline(Arc::new(PoisonedCohortRanker), store.clone());
    let summary = p
        .rank_for_range(d1, d2, &CohortFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.cohorts_failed, 1);
    assert_eq!(summary.cohorts_ranked, 1);
    assert_eq!(summary.events.len(), 2);

    // The healthy date still got dense ranks.
    let healthy = store.get_events_by_date(d2).await.unwrap();
    let mut ranks: Vec<u32> = healthy.iter().filter_map(|e| e.importance_rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2]);

    // The failed cohort's events stay untouched.
    let failed = store.get_events_by_date(d1).await.unwrap();
    assert!(failed.iter().all(|e| e.importance_rank.is_none()));
}

#[tokio::test]
async fn min_score_filter_excludes_low_confidence_sources() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_search_result(&search_result("sr-1", date, "Bitcoin news date:2021-11-10", 0.9))
        .await
        .unwrap();
    store
        .upsert_search_result(&search_result("sr-2", date, "Bitcoin news date:2021-11-10", 0.4))
        .await
        .unwrap();
    store
        .upsert_event(&event(date, "Bitcoin hits new all-time high", Category::Market, "sr-1"))
        .await
        .unwrap();
    store
        .upsert_event(&event(date, "Meetup held in Lisbon", Category::Community, "sr-2"))
        .await
        .unwrap();

    let p = pipeline(Arc::new(KeywordScorer), store.clone());
    let filter = CohortFilter {
        query: None,
        min_score: Some(0.5),
    };
    let ranked = p.rank_for_date(date, &filter).await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].importance_rank, Some(1));
    assert!(ranked[0].title.contains("all-time high"));
}

#[tokio::test]
async fn query_filter_narrows_the_cohort() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_search_result(&search_result("sr-1", date, "Bitcoin ETF news date:2021-11-10", 0.9))
        .await
        .unwrap();
    store
        .upsert_search_result(&search_result("sr-2", date, "Ethereum upgrades date:2021-11-10", 0.9))
        .await
        .unwrap();
    store
        .upsert_event(&event(date, "Bitcoin ETF sees record volume", Category::Market, "sr-1"))
        .await
        .unwrap();
    store
        .upsert_event(&event(date, "Ethereum client release", Category::Technology, "sr-2"))
        .await
        .unwrap();

    let p = pipeline(Arc::new(KeywordScorer), store);
    let filter = CohortFilter {
        query: Some("Bitcoin ETF".to_string()),
        min_score: None,
    };
    let ranked = p.rank_for_date(date, &filter).await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert!(ranked[0].title.contains("ETF"));
}
