// src/bootstrap.rs
//! Wires providers, model, and storage into ready-to-run pipelines. The
//! storage handle is injected; the runtime never starts or stops a database.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{PipelineConfig, ProviderChoice};
use crate::llm::{ChatModel, OpenAiModel};
use crate::pipeline::ranking::RankingPipeline;
use crate::pipeline::sourcing::SourcingPipeline;
use crate::pipeline::DateLocks;
use crate::search::exa::ExaProvider;
use crate::search::tavily::TavilyProvider;
use crate::search::SearchProvider;
use crate::storage::SharedStore;

pub struct MinerRuntime {
    pub sourcing: SourcingPipeline,
    pub ranking: RankingPipeline,
}

impl MinerRuntime {
    /// Build both pipelines from config. They share the store and the
    /// per-date lock registry, so sourcing and cohort loading for the same
    /// date exclude each other.
    pub fn from_config(config: PipelineConfig, store: SharedStore) -> anyhow::Result<Self> {
        let providers = build_providers(&config)?;
        let model = build_model(&config)?;
        let locks = DateLocks::new();
        info!(
            providers = providers.len(),
            model = %model.model_name(),
            "miner runtime ready"
        );
        Ok(Self {
            sourcing: SourcingPipeline::new(
                providers,
                Arc::clone(&model),
                Arc::clone(&store),
                config.clone(),
                locks.clone(),
            ),
            ranking: RankingPipeline::new(model, store, config, locks),
        })
    }
}

pub fn build_providers(config: &PipelineConfig) -> anyhow::Result<Vec<Arc<dyn SearchProvider>>> {
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
    let want_tavily = matches!(
        config.search_provider,
        ProviderChoice::Tavily | ProviderChoice::Both
    );
    let want_exa = matches!(
        config.search_provider,
        ProviderChoice::Exa | ProviderChoice::Both
    );

    let timeout = Duration::from_millis(config.search_timeout_ms);
    if want_tavily {
        if config.tavily_api_key.is_empty() {
            anyhow::bail!("tavily selected but TAVILY_API_KEY is missing");
        }
        providers.push(Arc::new(TavilyProvider::new(
            config.tavily_api_key.clone(),
            timeout,
        )));
    }
    if want_exa {
        if config.exa_api_key.is_empty() {
            anyhow::bail!("exa selected but EXA_API_KEY is missing");
        }
        providers.push(Arc::new(ExaProvider::new(
            config.exa_api_key.clone(),
            timeout,
        )));
    }
    Ok(providers)
}

pub fn build_model(config: &PipelineConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    if config.openai_api_key.is_empty() {
        anyhow::bail!("OPENAI_API_KEY is missing");
    }
    Ok(Arc::new(OpenAiModel::new(
        config.openai_api_key.clone(),
        config.model_name.clone(),
        Duration::from_millis(config.model_timeout_ms),
    )))
}
