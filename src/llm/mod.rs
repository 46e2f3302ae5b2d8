// src/llm/mod.rs
//! Structured-output model capability: callers depend on `ChatModel`, never
//! on a concrete provider. `OpenAiModel` is the production implementation;
//! tests plug in scripted mocks.

pub mod judge;
pub mod processor;
pub mod ranker;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::error::{MinerError, MinerResult};

/// A named JSON schema the model reply must conform to.
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    pub name: &'static str,
    pub schema: Value,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One structured-output invocation. The returned value is already
    /// parsed JSON but not yet validated against the caller's types.
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &SchemaSpec,
    ) -> MinerResult<Value>;

    fn model_name(&self) -> &str;
}

/// Invoke the model and deserialize into `T`, retrying malformed output up
/// to `schema_retries` extra attempts with the same input. Provider/quota
/// failures surface to the caller's own backoff.
pub async fn call_structured<T: DeserializeOwned>(
    model: &dyn ChatModel,
    system_prompt: &str,
    user_prompt: &str,
    schema: &SchemaSpec,
    schema_retries: u32,
) -> MinerResult<T> {
    let mut attempt = 0u32;
    loop {
        let result = model
            .generate_structured(system_prompt, user_prompt, schema)
            .await
            .and_then(|value| {
                serde_json::from_value::<T>(value)
                    .map_err(|e| MinerError::schema(schema.name, e.to_string()))
            });
        match result {
            Ok(v) => return Ok(v),
            Err(e @ MinerError::SchemaValidation { .. }) if attempt < schema_retries => {
                warn!(schema = schema.name, attempt, error = %e, "malformed model output, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// OpenAI chat-completions client with strict `json_schema` output.
pub struct OpenAiModel {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: String, model: impl Into<String>, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("crypto-event-miner/0.1 (+github.com/lumlich/crypto-event-miner)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(request_timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    json_schema: JsonSchemaSpec<'a>,
}

#[derive(Serialize)]
struct JsonSchemaSpec<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiModel {
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &SchemaSpec,
    ) -> MinerResult<Value> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system_prompt,
                },
                Msg {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaSpec {
                    name: schema.name,
                    strict: true,
                    schema: &schema.schema,
                },
            },
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| MinerError::provider("openai", e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(MinerError::quota("openai", format!("http {status}")));
        }
        if !status.is_success() {
            return Err(MinerError::provider("openai", format!("http {status}")));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| MinerError::provider("openai", format!("bad response body: {e}")))?;

        let content = body
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("");

        serde_json::from_str(content)
            .map_err(|e| MinerError::schema(schema.name, format!("not valid JSON: {e}")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
