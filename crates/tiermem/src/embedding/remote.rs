//! Remote embedding provider for OpenAI-compatible APIs
//!
//! Calls `POST {api_url}/embeddings` with a bearer key read from the
//! environment variable named in config.

use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, check_dimension};
use crate::error::{Result, TierMemError};

#[derive(Debug)]
pub struct RemoteEmbeddingProvider {
    client: Client,
    url: String,
    model: String,
    dimension: usize,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    /// Create a provider, reading the API key from `config.api_key_env`
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            TierMemError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TierMemError::Config(format!("Failed to build HTTP client: {e}")))?;

        let url = format!("{}/embeddings", config.api_url.trim_end_matches('/'));
        info!(
            "RemoteEmbeddingProvider initialized with model: {}, url: {}",
            config.model, url
        );

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            dimension: config.dimension,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Requesting embedding from: {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| TierMemError::EmbeddingUnavailable(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TierMemError::EmbeddingUnavailable(format!(
                "API returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            TierMemError::EmbeddingUnavailable(format!("Malformed embedding response: {e}"))
        })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| TierMemError::EmbeddingUnavailable("Empty response".to_string()))?;

        check_dimension(embedding, self.dimension)
    }
}
