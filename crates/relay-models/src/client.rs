use std::collections::HashMap;

use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;

/// Thin wrapper over the Ollama-compatible HTTP API's non-streaming endpoints.
///
/// Streaming generation (`/api/chat`, `/api/generate`) lives in `relay-stream`,
/// which consumes the same base URL to drive the response pipeline.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ListResponse {
    pub models: Vec<ModelSummary>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSummary {
    pub model: Option<String>,
    pub size: Option<u64>,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelDetails {
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShowResponse {
    #[serde(default, rename = "model_info")]
    pub model_info: HashMap<String, serde_json::Value>,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<ListResponse> {
        let resp = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    pub async fn show(&self, name: &str) -> Result<ShowResponse> {
        let resp = self
            .http
            .post(format!("{}/api/show", self.base_url))
            .json(&serde_json::json!({ "model": name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

/// Extract the context length from a `model_info` map: the first key whose
/// name ends in `"context_length"`.
pub fn find_context_length(info: &HashMap<String, serde_json::Value>) -> Option<i64> {
    info.iter()
        .find(|(key, _)| key.ends_with("context_length"))
        .and_then(|(_, value)| value.as_i64())
}

/// Render a byte count the way Ollama's CLI does (e.g. `4.7 GB`).
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
