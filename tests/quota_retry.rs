// tests/quota_retry.rs
//! A provider that hits its quota a few times must not fail the date, and
//! retried attempts must not duplicate persisted records.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crypto_event_miner::error::{MinerError, MinerResult};
use crypto_event_miner::llm::{ChatModel, SchemaSpec};
use crypto_event_miner::search::{RawHit, SearchOptions, SearchProvider};
use crypto_event_miner::storage::EventStore;
use crypto_event_miner::{DateLocks, MemoryStore, PipelineConfig, RetryConfig, SourcingPipeline};

/// Fails with `QuotaExceeded` for the first `failures` calls, then succeeds.
struct QuotaThenOk {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl SearchProvider for QuotaThenOk {
    async fn search(&self, _query: &str, _opts: &SearchOptions) -> MinerResult<Vec<RawHit>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(MinerError::quota("tavily", "http 429"));
        }
        Ok(vec![RawHit {
            title: "Bitcoin breaks all-time high".to_string(),
            url: "https://news.test/ath".to_string(),
            snippet: "Bitcoin reached a new record price.".to_string(),
            published_date: None,
            score: Some(0.8),
        }])
    }
    fn name(&self) -> &'static str {
        "tavily"
    }
}

struct AthModel;

#[async_trait]
impl ChatModel for AthModel {
    async fn generate_structured(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        schema: &SchemaSpec,
    ) -> MinerResult<Value> {
        Ok(match schema.name {
            "relevance_judgment" => json!({
                "relevant": true,
                "confidence": 0.9,
                "reason": "price record on the target date"
            }),
            "processed_event" => json!({
                "title": "Bitcoin breaks all-time high",
                "summary": "Bitcoin reached a new record price.",
                "date": "2021-11-10",
                "category": "price/market events"
            }),
            other => panic!("unexpected schema {other}"),
        })
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test]
async fn quota_failures_back_off_then_persist_without_duplicates() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let provider = Arc::new(QuotaThenOk {
        failures: 3,
        calls: AtomicU32::new(0),
    });
    let store = Arc::new(MemoryStore::new());
    let config = PipelineConfig {
        retry: RetryConfig {
            max_attempts: 5,
            base_delay_ms: 0,
            quota_delay_ms: 0,
        },
        ..PipelineConfig::default()
    };
    let pipeline = SourcingPipeline::new(
        vec![provider.clone()],
        Arc::new(AthModel),
        store.clone(),
        config,
        DateLocks::new(),
    );

    let run = pipeline.process_date(date, None).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    assert_eq!(run.events.len(), 1);

    let events = store.get_events_by_date(date).await.unwrap();
    assert_eq!(events.len(), 1);
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats["search_results"], 1);
}

#[tokio::test]
async fn quota_exhaustion_fails_the_date() {
    let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
    let provider = Arc::new(QuotaThenOk {
        failures: 10,
        calls: AtomicU32::new(0),
    });
    let store = Arc::new(MemoryStore::new());
    let config = PipelineConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            quota_delay_ms: 0,
        },
        ..PipelineConfig::default()
    };
    let pipeline = SourcingPipeline::new(
        vec![provider],
        Arc::new(AthModel),
        store.clone(),
        config,
        DateLocks::new(),
    );

    let out = pipeline.process_date(date, None).await;
    assert!(matches!(out, Err(MinerError::QuotaExceeded { .. })));
    assert!(store.get_events_by_date(date).await.unwrap().is_empty());
}
