//! Ollama embedding provider.
//!
//! Calls a local Ollama server's `/api/embeddings` endpoint once per text, a
//! few requests at a time, and assembles the results into an ordered batch.
//! Any failed text fails the whole batch.

use crate::embeddings::provider::{check_batch, EmbeddingProvider};
use async_trait::async_trait;
use futures::future::try_join_all;
use kbqa_core::config::EmbeddingSettings;
use kbqa_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Maximum attempts per text
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Requests in flight per batch
const CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Build the HTTP client. The server is not contacted until first use.
    ///
    /// The base URL comes from `endpoint`, then `OLLAMA_URL`, then the local
    /// default.
    pub fn new(settings: &EmbeddingSettings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        let base_url = settings
            .endpoint
            .clone()
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }

    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed_with_retries(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(e);
                    }
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                    warn!(
                        "Embedding failed (attempt {}/{}), retrying in {}ms: {}",
                        attempt, MAX_RETRIES, backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(AppError::UpstreamUnavailable(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "Cannot embed empty text at index {}",
                i
            )));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(CONCURRENCY) {
            let part = try_join_all(chunk.iter().map(|text| self.embed_with_retries(text))).await?;
            embeddings.extend(part);
        }

        check_batch("ollama", texts.len(), self.dimensions, &embeddings)?;
        debug!("Generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_send<T: Send>(_: &T) {}

    fn settings() -> EmbeddingSettings {
        EmbeddingSettings {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: Some("http://127.0.0.1:9/".to_string()),
            timeout_secs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_construction_is_offline() {
        let provider = OllamaProvider::new(&settings()).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn test_shared_as_trait_object() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(OllamaProvider::new(&settings()).unwrap());
        assert_eq!(provider.provider_name(), "ollama");

        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = provider.embed_batch(&texts);
        assert_send(&batch);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_any_request() {
        let provider = OllamaProvider::new(&settings()).unwrap();
        let texts = vec!["fine".to_string(), "  ".to_string()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_error() {
        let provider = OllamaProvider::new(&settings()).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(err.is_upstream());
    }
}
