// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod storage;

// ---- Re-exports for stable public API ----
pub use crate::config::{CohortScope, PipelineConfig, ProviderChoice, RetryConfig};
pub use crate::error::{MinerError, MinerResult};
pub use crate::models::{Category, Event, SearchResult};
pub use crate::pipeline::ranking::{CohortFilter, RankingPipeline, RankingSummary};
pub use crate::pipeline::sourcing::{DateRun, DateState, SourcingPipeline};
pub use crate::pipeline::{CancelFlag, DateLocks, RangeSummary};
pub use crate::storage::{EventStore, MemoryStore, SharedStore};
