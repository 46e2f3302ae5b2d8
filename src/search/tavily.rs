// src/search/tavily.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{MinerError, MinerResult};
use crate::search::{RawHit, SearchOptions, SearchProvider};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

pub struct TavilyProvider {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyItem>,
}

#[derive(Deserialize)]
struct TavilyItem {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
    score: Option<f64>,
    published_date: Option<String>,
}

impl TavilyProvider {
    pub fn new(api_key: String, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("crypto-event-miner/0.1 (+github.com/lumlich/crypto-event-miner)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(request_timeout)
            .build()
            .expect("reqwest client");
        Self { http, api_key }
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(&self, query: &str, opts: &SearchOptions) -> MinerResult<Vec<RawHit>> {
        info!(provider = "tavily", query, "executing search");
        let req = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: opts.max_results,
            include_raw_content: false,
        };

        let resp = self
            .http
            .post(TAVILY_ENDPOINT)
            .json(&req)
            .send()
            .await
            .map_err(|e| MinerError::provider("tavily", e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.as_u16() == 432 {
            return Err(MinerError::quota("tavily", format!("http {status}")));
        }
        if !status.is_success() {
            return Err(MinerError::provider("tavily", format!("http {status}")));
        }

        let body: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| MinerError::provider("tavily", format!("bad response body: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .map(|item| RawHit {
                title: item.title.unwrap_or_default(),
                url: item.url.unwrap_or_default(),
                snippet: item.content.unwrap_or_default(),
                published_date: item.published_date,
                score: item.score,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "tavily"
    }
}
