// src/search/exa.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{MinerError, MinerResult};
use crate::search::{RawHit, SearchOptions, SearchProvider};

const EXA_ENDPOINT: &str = "https://api.exa.ai/search";
const SNIPPET_MAX_CHARS: usize = 1000;

pub struct ExaProvider {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    contents: ExaContents,
}

#[derive(Serialize)]
struct ExaContents {
    text: ExaText,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaText {
    max_characters: usize,
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaItem {
    title: Option<String>,
    url: Option<String>,
    text: Option<String>,
    score: Option<f64>,
    published_date: Option<String>,
}

impl ExaProvider {
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
impl SearchProvider for ExaProvider {
    async fn search(&self, query: &str, opts: &SearchOptions) -> MinerResult<Vec<RawHit>> {
        info!(provider = "exa", query, "executing search");
        let req = ExaRequest {
            query,
            num_results: opts.max_results,
            contents: ExaContents {
                text: ExaText {
                    max_characters: SNIPPET_MAX_CHARS,
                },
            },
        };

        let resp = self
            .http
            .post(EXA_ENDPOINT)
            .header("x-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| MinerError::provider("exa", e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(MinerError::quota("exa", format!("http {status}")));
        }
        if !status.is_success() {
            return Err(MinerError::provider("exa", format!("http {status}")));
        }

        let body: ExaResponse = resp
            .json()
            .await
            .map_err(|e| MinerError::provider("exa", format!("bad response body: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .map(|item| RawHit {
                title: item.title.unwrap_or_default(),
                url: item.url.unwrap_or_default(),
                snippet: item.text.unwrap_or_default(),
                published_date: item.published_date,
                score: item.score,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "exa"
    }
}
