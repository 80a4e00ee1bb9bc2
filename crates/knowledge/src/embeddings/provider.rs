//! Embedding provider trait and factory.

use super::providers::{google::GoogleProvider, mock::MockProvider, ollama::OllamaProvider};
use kbqa_core::config::{AppConfig, EmbeddingSettings};
use kbqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama", "google")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::UpstreamUnavailable("No embedding returned".to_string()))
    }
}

/// Verify a provider response has one vector of the right width per input.
pub fn check_batch(
    provider: &str,
    expected: usize,
    dimensions: usize,
    vectors: &[Vec<f32>],
) -> AppResult<()> {
    if vectors.len() != expected {
        return Err(AppError::UpstreamUnavailable(format!(
            "{} returned {} embeddings for {} inputs",
            provider,
            vectors.len(),
            expected
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(AppError::UpstreamUnavailable(format!(
            "{} returned {} dimensions, expected {}",
            provider,
            bad.len(),
            dimensions
        )));
    }
    Ok(())
}

/// Create an embedding provider from settings.
///
/// No network traffic happens here; remote providers connect lazily.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(settings.dimensions))),

        "ollama" => Ok(Arc::new(OllamaProvider::new(settings)?)),

        "google" => {
            let api_key = AppConfig::resolve_api_key(settings.api_key_env.as_deref())?
                .ok_or_else(|| {
                    AppError::Config("embedding.api_key_env is required for google".to_string())
                })?;
            Ok(Arc::new(GoogleProvider::new(settings, api_key)?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, ollama, google",
            settings.provider
        ))),
    }
}
