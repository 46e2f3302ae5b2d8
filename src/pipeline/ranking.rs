// src/pipeline/ranking.rs
//! Ranking pipeline: LOADING -> RANKING -> PERSISTING per cohort. A cohort is
//! all events sharing a date (or the whole range when configured so),
//! optionally narrowed by the originating search query and a judge-confidence
//! floor. Ranks are replaced wholesale; a failed cohort leaves prior ranks
//! untouched.

use chrono::{NaiveDate, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{CohortScope, PipelineConfig};
use crate::error::{MinerError, MinerResult};
use crate::llm::ranker::{EventRanker, RankScope};
use crate::llm::ChatModel;
use crate::models::Event;
use crate::pipeline::{date_range, ensure_metrics_described, DateLocks};
use crate::retry::with_backoff;
use crate::storage::SharedStore;

pub struct RankingPipeline {
    model: Arc<dyn ChatModel>,
    store: SharedStore,
    config: PipelineConfig,
    locks: DateLocks,
}

/// Narrowing applied while loading a cohort, before ranking.
#[derive(Debug, Clone, Default)]
pub struct CohortFilter {
    /// Keep only events whose originating search used this query text.
    pub query: Option<String>,
    /// Keep only events whose judge confidence cleared this floor.
    pub min_score: Option<f64>,
}

/// Aggregate outcome of a range ranking run. One cohort's failure never
/// aborts the remaining cohorts; it is counted here instead.
#[derive(Debug, Clone, Default)]
pub struct RankingSummary {
    /// Every event ranked across the run, in rank order per cohort.
    pub events: Vec<Event>,
    pub cohorts_ranked: usize,
    pub cohorts_failed: usize,
}

impl RankingPipeline {
    pub fn new(
        model: Arc<dyn ChatModel>,
        store: SharedStore,
        config: PipelineConfig,
        locks: DateLocks,
    ) -> Self {
        Self {
            model,
            store,
            config,
            locks,
        }
    }

    /// Rank all events for one date as a single cohort.
    pub async fn rank_for_date(
        &self,
        date: NaiveDate,
        filter: &CohortFilter,
    ) -> MinerResult<Vec<Event>> {
        ensure_metrics_described();
        let lock = self.locks.lock_for(date);
        let _guard = lock.lock().await;

        let events = self.store.get_events_by_date(date).await?;
        let cohort = self.apply_filter(events, filter).await?;
        self.rank_cohort(cohort, RankScope::Date(date)).await
    }

    /// Rank events for a range. With `CohortScope::Date` (the default) each
    /// date ranks independently; with `CohortScope::Range` the whole span is
    /// one cohort. A cohort's ranking failure is counted and the run moves
    /// on to the next cohort; storage failures abort the whole range.
    pub async fn rank_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &CohortFilter,
    ) -> MinerResult<RankingSummary> {
        let mut summary = RankingSummary::default();
        match self.config.rank_cohort_scope {
            CohortScope::Date => {
                for date in date_range(start, end) {
                    match self.rank_for_date(date, filter).await {
                        Ok(mut ranked) => {
                            summary.cohorts_ranked += 1;
                            summary.events.append(&mut ranked);
                        }
                        Err(e @ MinerError::Storage(_)) => return Err(e),
                        Err(e) => {
                            warn!(%date, error = %e, "cohort failed; continuing range");
                            summary.cohorts_failed += 1;
                        }
                    }
                }
            }
            CohortScope::Range => {
                // Hold every date lock in the span so no sourcing run writes
                // into the cohort while we read it. Locks acquire in date
                // order to avoid deadlock with another range run.
                let locks: Vec<_> = date_range(start, end)
                    .into_iter()
                    .map(|d| self.locks.lock_for(d))
                    .collect();
                let mut guards = Vec::with_capacity(locks.len());
                for lock in &locks {
                    guards.push(lock.lock().await);
                }
                let events = self.store.get_events_by_range(start, end).await?;
                let cohort = self.apply_filter(events, filter).await?;
                match self.rank_cohort(cohort, RankScope::Range(start, end)).await {
                    Ok(ranked) => {
                        summary.cohorts_ranked = 1;
                        summary.events = ranked;
                    }
                    Err(e @ MinerError::Storage(_)) => return Err(e),
                    Err(e) => {
                        warn!(%start, %end, error = %e, "range cohort failed");
                        summary.cohorts_failed = 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Narrow a loaded cohort by originating query and judge confidence.
    /// Both checks resolve through the event's source result, keeping the
    /// provenance chain authoritative.
    async fn apply_filter(
        &self,
        events: Vec<Event>,
        filter: &CohortFilter,
    ) -> MinerResult<Vec<Event>> {
        if filter.query.is_none() && filter.min_score.is_none() {
            return Ok(events);
        }

        let mut kept = Vec::with_capacity(events.len());
        for event in events {
            let source = self.store.get_search_result(&event.source_result_id).await?;
            let Some(source) = source else {
                warn!(event_id = %event.id, "event has no source result; excluded from cohort");
                continue;
            };
            if let Some(query) = &filter.query {
                if !source.query.contains(query.as_str()) {
                    continue;
                }
            }
            if let Some(min_score) = filter.min_score {
                if !source.judge_confidence.is_some_and(|c| c >= min_score) {
                    continue;
                }
            }
            kept.push(event);
        }
        Ok(kept)
    }

    async fn rank_cohort(&self, cohort: Vec<Event>, scope: RankScope) -> MinerResult<Vec<Event>> {
        if cohort.is_empty() {
            info!(%scope, "empty cohort, nothing to rank");
            return Ok(Vec::new());
        }

        info!(%scope, n = cohort.len(), "ranking cohort");
        let ranker = EventRanker::new(self.model.as_ref());
        let ranked = with_backoff(&self.config.retry, "rank", || {
            ranker.rank(&cohort, scope)
        })
        .await
        .map_err(|e| {
            warn!(%scope, error = %e, "cohort ranking failed; prior ranks untouched");
            e
        })?;

        // PERSISTING: wholesale replacement of the cohort's ranks.
        let mut events = cohort;
        let now = Utc::now();
        for (event, rank) in events.iter_mut().zip(ranked.ranks) {
            event.importance_rank = Some(rank);
            event.updated_at = now;
            self.store.upsert_event(event).await?;
        }
        events.sort_by_key(|e| e.importance_rank.unwrap_or(u32::MAX));

        counter!("ranking_cohorts_total").increment(1);
        info!(%scope, reasoning = %ranked.reasoning, "cohort persisted");
        Ok(events)
    }
}
