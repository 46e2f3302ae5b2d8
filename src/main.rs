//! Thin demo runner for the mining/ranking pipelines.
//!
//! Usage:
//!   crypto-event-miner source <YYYY-MM-DD> [YYYY-MM-DD]
//!   crypto-event-miner rank   <YYYY-MM-DD> [YYYY-MM-DD]
//!
//! API keys come from the environment (TAVILY_API_KEY, EXA_API_KEY,
//! OPENAI_API_KEY); `.env` is honored in local runs. Results land in an
//! in-memory store and are summarized to the log, so this binary is a smoke
//! runner, not a service.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_event_miner::bootstrap::MinerRuntime;
use crypto_event_miner::pipeline::parse_date_string;
use crypto_event_miner::{CancelFlag, CohortFilter, MemoryStore, PipelineConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crypto_event_miner=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (mode, date_arg, end_arg) = match args.as_slice() {
        [mode, date] => (mode.as_str(), date.as_str(), None),
        [mode, date, end] => (mode.as_str(), date.as_str(), Some(end.as_str())),
        _ => bail!("usage: crypto-event-miner <source|rank> <YYYY-MM-DD> [YYYY-MM-DD]"),
    };

    let date = parse_date_string(date_arg).context("invalid start date")?;
    let end = match end_arg {
        Some(s) => Some(parse_date_string(s).context("invalid end date")?),
        None => None,
    };

    let config = PipelineConfig::from_env();
    let store = MemoryStore::shared();
    let runtime = MinerRuntime::from_config(config, store.clone())?;

    match mode {
        "source" => match end {
            Some(end) => {
                let cancel = CancelFlag::new();
                let summary = runtime
                    .sourcing
                    .process_range(date, end, None, &cancel)
                    .await?;
                info!(?summary, "range sourcing finished");
            }
            None => {
                let run = runtime.sourcing.process_date(date, None).await?;
                info!(
                    events = run.events.len(),
                    skipped = run.skipped,
                    failed = run.failed,
                    "date sourcing finished"
                );
                for event in &run.events {
                    info!(title = %event.title, category = event.category.as_str(), "event");
                }
            }
        },
        "rank" => {
            let filter = CohortFilter::default();
            let ranked = match end {
                Some(end) => {
                    let summary = runtime.ranking.rank_for_range(date, end, &filter).await?;
                    info!(
                        cohorts_ranked = summary.cohorts_ranked,
                        cohorts_failed = summary.cohorts_failed,
                        "range ranking finished"
                    );
                    summary.events
                }
                None => runtime.ranking.rank_for_date(date, &filter).await?,
            };
            for event in ranked.iter().take(5) {
                info!(
                    rank = event.importance_rank,
                    title = %event.title,
                    "ranked event"
                );
            }
        }
        other => bail!("unknown mode `{other}`"),
    }

    let stats = store.get_stats().await?;
    info!(?stats, "collection counts");
    Ok(())
}
