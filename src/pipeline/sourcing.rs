// src/pipeline/sourcing.rs
//! Sourcing pipeline: date -> queries -> judged candidates -> normalized
//! events -> storage. Per date the run walks QUERYING -> JUDGING ->
//! PROCESSING -> PERSISTING -> DONE; a candidate's failure is recorded and
//! skipped, never fatal to the date.

use chrono::{NaiveDate, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;
use strsim::normalized_levenshtein;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{PipelineConfig, RetryConfig};
use crate::error::{MinerError, MinerResult};
use crate::llm::judge::{passes_threshold, RelevanceJudge};
use crate::llm::processor::EventProcessor;
use crate::llm::ChatModel;
use crate::models::{normalized_title, Event, SearchResult};
use crate::pipeline::{
    date_range, ensure_metrics_described, CancelFlag, DateLocks, RangeSummary,
};
use crate::retry::with_backoff;
use crate::search::{format_crypto_query, merge_dedup_by_url, SearchOptions, SearchProvider};
use crate::storage::SharedStore;

/// Normalized titles at least this similar are the same story.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateState {
    Querying,
    Judging,
    Processing,
    Persisting,
    Done,
    Failed,
}

/// Outcome of one per-date run.
#[derive(Debug, Clone)]
pub struct DateRun {
    pub date: NaiveDate,
    pub state: DateState,
    pub search_results: Vec<SearchResult>,
    pub events: Vec<Event>,
    /// Candidates dropped: irrelevant, below threshold, unprocessable, or
    /// duplicate stories.
    pub skipped: usize,
    /// Candidates that failed after exhausting retries.
    pub failed: usize,
}

pub struct SourcingPipeline {
    providers: Vec<Arc<dyn SearchProvider>>,
    model: Arc<dyn ChatModel>,
    store: SharedStore,
    config: PipelineConfig,
    locks: DateLocks,
}

struct CandidateOutcome {
    judged: SearchResult,
    event: Option<Event>,
    failure: Option<String>,
}

impl SourcingPipeline {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        model: Arc<dyn ChatModel>,
        store: SharedStore,
        config: PipelineConfig,
        locks: DateLocks,
    ) -> Self {
        Self {
            providers,
            model,
            store,
            config,
            locks,
        }
    }

    /// Source, judge, process, and persist events for one date. Holds the
    /// date lock for the whole run so ranking never reads a half-written
    /// snapshot.
    pub async fn process_date(
        &self,
        date: NaiveDate,
        base_query: Option<&str>,
    ) -> MinerResult<DateRun> {
        ensure_metrics_described();
        let lock = self.locks.lock_for(date);
        let _guard = lock.lock().await;

        let base = base_query.unwrap_or(&self.config.base_query);
        info!(%date, query = base, state = ?DateState::Querying, "sourcing date");

        // QUERYING: every configured provider, each with its own backoff.
        let query = format_crypto_query(base, date, self.config.full_month);
        let opts = SearchOptions {
            max_results: self.config.max_results,
            date_hint: date,
            full_month: self.config.full_month,
        };
        let mut batches = Vec::new();
        let mut last_err = None;
        for provider in &self.providers {
            let outcome = with_backoff(&self.config.retry, provider.name(), || {
                provider.search(&query, &opts)
            })
            .await;
            match outcome {
                Ok(hits) => batches.push((provider.name(), hits)),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "provider failed for date");
                    last_err = Some(e);
                }
            }
        }
        if batches.is_empty() {
            let err = last_err
                .unwrap_or_else(|| MinerError::provider("none", "no search providers configured"));
            warn!(%date, state = ?DateState::Failed, error = %err, "all providers failed");
            return Err(err);
        }

        // Candidates become SearchResult documents up front; provenance is
        // persisted even for hits later judged irrelevant.
        let hits = merge_dedup_by_url(batches);
        counter!("sourcing_candidates_total").increment(hits.len() as u64);
        let mut candidates = Vec::with_capacity(hits.len());
        for (provider_name, hit) in hits {
            let doc = SearchResult {
                id: SearchResult::doc_id(&hit.url, date),
                query: query.clone(),
                date,
                title: hit.title,
                url: hit.url,
                snippet: hit.snippet,
                source_provider: provider_name,
                source_score: hit.score,
                fetched_at: Utc::now(),
                relevant: None,
                judge_confidence: None,
            };
            self.store.upsert_search_result(&doc).await?;
            candidates.push(doc);
        }

        // JUDGING + PROCESSING: bounded concurrency per candidate.
        info!(%date, candidates = candidates.len(), state = ?DateState::Judging, "judging candidates");
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks: JoinSet<MinerResult<CandidateOutcome>> = JoinSet::new();
        for candidate in candidates {
            let permit_source = Arc::clone(&semaphore);
            let model = Arc::clone(&self.model);
            let store = Arc::clone(&self.store);
            let retry = self.config.retry;
            let min_score = self.config.judge_min_score;
            tasks.spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("semaphore closed");
                judge_and_process(model.as_ref(), store, candidate, retry, min_score).await
            });
        }

        let mut judged_results = Vec::new();
        let mut events = Vec::new();
        let mut skipped = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| MinerError::Processing(format!("candidate task panicked: {e}")))??;
            if let Some(reason) = outcome.failure {
                warn!(url = %outcome.judged.url, reason, "candidate failed");
                failed += 1;
            } else if let Some(event) = outcome.event {
                events.push(event);
            } else {
                skipped += 1;
            }
            judged_results.push(outcome.judged);
        }

        // Same story reported by several outlets collapses to one event.
        info!(%date, events = events.len(), state = ?DateState::Processing, "collapsing duplicates");
        let before = events.len();
        let events = collapse_duplicate_stories(events);
        skipped += before - events.len();

        // PERSISTING: the date is not DONE until every event is stored.
        info!(%date, events = events.len(), state = ?DateState::Persisting, "persisting events");
        for event in &events {
            self.store.upsert_event(event).await?;
        }

        counter!("sourcing_events_total").increment(events.len() as u64);
        counter!("sourcing_skipped_total").increment(skipped as u64);
        counter!("sourcing_failures_total").increment(failed as u64);
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

        info!(
            %date,
            events = events.len(),
            skipped,
            failed,
            state = ?DateState::Done,
            "date complete"
        );
        Ok(DateRun {
            date,
            state: DateState::Done,
            search_results: judged_results,
            events,
            skipped,
            failed,
        })
    }

    /// Sequence of independent per-date runs. A date's failure is counted,
    /// not propagated; storage failures abort the whole range. Cancellation
    /// is honored between dates only.
    pub async fn process_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        base_query: Option<&str>,
        cancel: &CancelFlag,
    ) -> MinerResult<RangeSummary> {
        let dates = date_range(start, end);
        let mut summary = RangeSummary::default();
        for (i, date) in dates.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.dates_cancelled = dates.len() - i;
                info!(remaining = summary.dates_cancelled, "range run cancelled");
                break;
            }
            match self.process_date(*date, base_query).await {
                Ok(run) => {
                    summary.total_events += run.events.len();
                    if run.failed > 0 {
                        summary.dates_partial += 1;
                    } else {
                        summary.dates_succeeded += 1;
                    }
                }
                Err(e @ MinerError::Storage(_)) => return Err(e),
                Err(e) => {
                    warn!(%date, error = %e, "date failed");
                    summary.dates_failed += 1;
                }
            }
        }
        info!(
            succeeded = summary.dates_succeeded,
            partial = summary.dates_partial,
            failed = summary.dates_failed,
            events = summary.total_events,
            "range complete"
        );
        Ok(summary)
    }
}

/// One candidate end to end: judge with backoff, persist the judgment onto
/// the search result, then normalize relevant candidates into events.
async fn judge_and_process(
    model: &dyn ChatModel,
    store: SharedStore,
    mut candidate: SearchResult,
    retry: RetryConfig,
    min_score: f64,
) -> MinerResult<CandidateOutcome> {
    let judge = RelevanceJudge::new(model);
    let judgment = match with_backoff(&retry, "judge", || judge.judge(&candidate, candidate.date))
        .await
    {
        Ok(j) => j,
        Err(MinerError::Storage(msg)) => return Err(MinerError::Storage(msg)),
        Err(e) => {
            return Ok(CandidateOutcome {
                judged: candidate,
                event: None,
                failure: Some(e.to_string()),
            })
        }
    };

    candidate.relevant = Some(judgment.relevant);
    candidate.judge_confidence = Some(judgment.confidence);
    store.upsert_search_result(&candidate).await?;

    if !passes_threshold(&judgment, min_score) {
        return Ok(CandidateOutcome {
            judged: candidate,
            event: None,
            failure: None,
        });
    }

    let processor = EventProcessor::new(model);
    match with_backoff(&retry, "process", || processor.process(&candidate)).await {
        Ok(event) => Ok(CandidateOutcome {
            judged: candidate,
            event: Some(event),
            failure: None,
        }),
        // Ambiguous content is dropped, not failed: best-effort cleanup.
        Err(MinerError::Processing(msg)) => {
            warn!(url = %candidate.url, reason = msg, "unprocessable candidate dropped");
            Ok(CandidateOutcome {
                judged: candidate,
                event: None,
                failure: None,
            })
        }
        Err(MinerError::Storage(msg)) => Err(MinerError::Storage(msg)),
        Err(e) => Ok(CandidateOutcome {
            judged: candidate,
            event: None,
            failure: Some(e.to_string()),
        }),
    }
}

/// Collapse near-duplicate titles within one date's batch, keeping the
/// occurrence with the longer summary (more substance to persist).
fn collapse_duplicate_stories(events: Vec<Event>) -> Vec<Event> {
    let mut kept: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        let key = normalized_title(&event.title);
        let dup = kept.iter_mut().find(|k| {
            k.date == event.date
                && normalized_levenshtein(&normalized_title(&k.title), &key)
                    >= TITLE_SIMILARITY_THRESHOLD
        });
        match dup {
            Some(existing) => {
                if event.summary.len() > existing.summary.len() {
                    *existing = event;
                }
            }
            None => kept.push(event),
        }
    }
    kept
}
