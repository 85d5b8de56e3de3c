use std::env;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SessionError;
use crate::items::Item;

/// One full-history exchange with the model. Fallible by contract: a response
/// without an `output` field is a protocol error, surfaced with the raw body.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send(&self, input: &[Item], tools: &[Value]) -> Result<Vec<Item>, SessionError>;
}

#[derive(Clone)]
pub struct ModelConfig {
    pub api_base: String,          // e.g. "https://api.openai.com/v1"
    pub api_key: String,           // env OPENAI_API_KEY
    pub model: String,             // e.g. "computer-use-preview"
    pub reasoning_summary: String, // "concise"
    pub truncation: String,        // "auto"
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: env::var("BACKSEAT_MODEL").unwrap_or_else(|_| "computer-use-preview".into()),
            reasoning_summary: "concise".into(),
            truncation: "auto".into(),
        }
    }
}

/// Responses-API client.
#[derive(Clone)]
pub struct ResponsesClient {
    http: Client,
    cfg: ModelConfig,
}

impl ResponsesClient {
    pub fn new(cfg: ModelConfig) -> Result<Self> {
        if cfg.api_key.is_empty() {
            bail!("OPENAI_API_KEY missing");
        }
        Ok(Self {
            http: Client::new(),
            cfg,
        })
    }

    fn decode_output(body: &str) -> Result<Vec<Item>, SessionError> {
        let v: Value = serde_json::from_str(body)
            .map_err(|e| SessionError::ModelProtocol(format!("unparseable response ({e}): {body}")))?;
        let output = v
            .get("output")
            .ok_or_else(|| SessionError::ModelProtocol(format!("response has no output: {body}")))?;
        serde_json::from_value(output.clone())
            .map_err(|e| SessionError::ModelProtocol(format!("bad output item ({e}): {output}")))
    }
}

#[async_trait]
impl ModelClient for ResponsesClient {
    async fn send(&self, input: &[Item], tools: &[Value]) -> Result<Vec<Item>, SessionError> {
        let body = json!({
            "model": self.cfg.model,
            "input": input,
            "tools": tools,
            "reasoning": { "generate_summary": self.cfg.reasoning_summary },
            "truncation": self.cfg.truncation,
        });

        let resp = self
            .http
            .post(format!("{}/responses", self.cfg.api_base))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SessionError::Transport(format!("{status}: {text}")));
        }

        let items = Self::decode_output(&text)?;
        debug!(items = items.len(), "model response decoded");
        Ok(items)
    }
}
