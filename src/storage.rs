// src/storage.rs
//! Document store seam. The pipelines never own the storage lifecycle; they
//! receive an `EventStore` handle by injection. `MemoryStore` backs tests and
//! local runs; a real deployment plugs a document database behind the trait.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::MinerResult;
use crate::models::{Event, SearchResult};

pub const SEARCH_RESULTS_COLLECTION: &str = "search_results";
pub const EVENTS_COLLECTION: &str = "events";

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert-or-update keyed by the document id; returns the id.
    async fn upsert_search_result(&self, doc: &SearchResult) -> MinerResult<String>;

    /// Insert-or-update keyed by the `(date, normalized_title)` id. An update
    /// preserves `created_at` and any previously assigned rank.
    async fn upsert_event(&self, doc: &Event) -> MinerResult<String>;

    async fn get_search_result(&self, id: &str) -> MinerResult<Option<SearchResult>>;

    async fn get_events_by_date(&self, date: NaiveDate) -> MinerResult<Vec<Event>>;

    async fn get_events_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MinerResult<Vec<Event>>;

    /// Per-collection document counts.
    async fn get_stats(&self) -> MinerResult<HashMap<String, u64>>;
}

pub type SharedStore = Arc<dyn EventStore>;

/// In-memory document store with upsert-by-key semantics.
#[derive(Default)]
pub struct MemoryStore {
    search_results: RwLock<HashMap<String, SearchResult>>,
    events: RwLock<HashMap<String, Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn upsert_search_result(&self, doc: &SearchResult) -> MinerResult<String> {
        let mut map = self.search_results.write().await;
        map.insert(doc.id.clone(), doc.clone());
        Ok(doc.id.clone())
    }

    async fn upsert_event(&self, doc: &Event) -> MinerResult<String> {
        let mut map = self.events.write().await;
        let mut incoming = doc.clone();
        if let Some(existing) = map.get(&doc.id) {
            incoming.created_at = existing.created_at;
            // Re-sourcing must not silently clear a rank the ranking
            // pipeline assigned; ranks change only via ranking.
            if incoming.importance_rank.is_none() {
                incoming.importance_rank = existing.importance_rank;
            }
            incoming.updated_at = Utc::now();
        }
        map.insert(doc.id.clone(), incoming);
        Ok(doc.id.clone())
    }

    async fn get_search_result(&self, id: &str) -> MinerResult<Option<SearchResult>> {
        Ok(self.search_results.read().await.get(id).cloned())
    }

    async fn get_events_by_date(&self, date: NaiveDate) -> MinerResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.date == date)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn get_events_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MinerResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.date >= start && e.date <= end)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(events)
    }

    async fn get_stats(&self) -> MinerResult<HashMap<String, u64>> {
        let mut stats = HashMap::new();
        stats.insert(
            SEARCH_RESULTS_COLLECTION.to_string(),
            self.search_results.read().await.len() as u64,
        );
        stats.insert(
            EVENTS_COLLECTION.to_string(),
            self.events.read().await.len() as u64,
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn sample_event(date: NaiveDate, title: &str) -> Event {
        let now = Utc::now();
        Event {
            id: Event::doc_id(date, title),
            date,
            title: title.to_string(),
            summary: "something happened".to_string(),
            category: Category::Market,
            importance_rank: None,
            source_result_id: "sr-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn event_upsert_is_idempotent_by_dedup_key() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
        let a = sample_event(date, "Bitcoin hits all-time high");
        let b = sample_event(date, "bitcoin hits all-time high!");
        store.upsert_event(&a).await.unwrap();
        store.upsert_event(&b).await.unwrap();
        assert_eq!(store.get_events_by_date(date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn event_upsert_preserves_existing_rank() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
        let mut a = sample_event(date, "Bitcoin hits all-time high");
        a.importance_rank = Some(1);
        store.upsert_event(&a).await.unwrap();

        let unranked = sample_event(date, "Bitcoin hits all-time high");
        store.upsert_event(&unranked).await.unwrap();
        let stored = &store.get_events_by_date(date).await.unwrap()[0];
        assert_eq!(stored.importance_rank, Some(1));
    }

    #[tokio::test]
    async fn range_query_spans_dates_in_order() {
        let store = MemoryStore::new();
        let d1 = NaiveDate::from_ymd_opt(2021, 11, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
        store.upsert_event(&sample_event(d2, "later")).await.unwrap();
        store.upsert_event(&sample_event(d1, "earlier")).await.unwrap();
        let events = store.get_events_by_range(d1, d2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].date, d1);
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats[EVENTS_COLLECTION], 2);
    }
}
