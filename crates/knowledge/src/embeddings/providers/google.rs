//! Google Generative Language embedding provider.
//!
//! Uses the `batchEmbedContents` REST method so a whole batch is one request.

use crate::embeddings::provider::{check_batch, EmbeddingProvider};
use async_trait::async_trait;
use kbqa_core::config::EmbeddingSettings;
use kbqa_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "text-embedding-004";

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

impl GoogleProvider {
    pub fn new(settings: &EmbeddingSettings, api_key: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client for Google: {}", e)))?;

        let model = if settings.model.is_empty() || settings.model == "trigram-v1" {
            DEFAULT_MODEL.to_string()
        } else {
            settings.model.trim_start_matches("models/").to_string()
        };

        Ok(Self {
            client,
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            dimensions: settings.dimensions,
            api_key,
        })
    }

    fn build_request<'a>(&self, texts: &'a [String]) -> BatchRequest<'a> {
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    output_dimensionality: Some(self.dimensions),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "google", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.endpoint, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(texts))
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Google embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Google embedding API error ({}): {}",
                status, body
            )));
        }

        let body: BatchResponse = response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse Google embedding response: {}", e))
        })?;

        let embeddings: Vec<Vec<f32>> = body.embeddings.into_iter().map(|e| e.values).collect();
        check_batch("google", texts.len(), self.dimensions, &embeddings)?;

        debug!("Generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        let settings = EmbeddingSettings {
            provider: "google".to_string(),
            model: "models/text-embedding-004".to_string(),
            dimensions: 768,
            endpoint: Some("http://127.0.0.1:9/v1beta/".to_string()),
            timeout_secs: 1,
            ..Default::default()
        };
        GoogleProvider::new(&settings, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let provider = provider();
        let texts = vec!["first".to_string(), "second".to_string()];
        let body = serde_json::to_value(provider.build_request(&texts)).unwrap();

        assert_eq!(body["requests"].as_array().unwrap().len(), 2);
        assert_eq!(body["requests"][0]["model"], "models/text-embedding-004");
        assert_eq!(body["requests"][1]["content"]["parts"][0]["text"], "second");
        assert_eq!(body["requests"][0]["outputDimensionality"], 768);
    }

    #[test]
    fn test_response_parsing() {
        let body: BatchResponse =
            serde_json::from_str(r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#)
                .unwrap();
        assert_eq!(body.embeddings.len(), 2);
        assert_eq!(body.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_error() {
        let err = provider().embed("hello").await.unwrap_err();
        assert!(err.is_upstream());
    }
}
