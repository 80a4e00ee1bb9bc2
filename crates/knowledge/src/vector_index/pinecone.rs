//! Pinecone data-plane client.

use super::{VectorIndex, VectorMatch, VectorRecord};
use async_trait::async_trait;
use kbqa_core::config::VectorIndexSettings;
use kbqa_core::{AppError, AppResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: [&'a VectorRecord; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeIndex {
    pub fn new(settings: &VectorIndexSettings, api_key: String) -> AppResult<Self> {
        let host = settings
            .host
            .as_deref()
            .ok_or_else(|| AppError::Config("vector_index.host is required for pinecone".to_string()))?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client for Pinecone: {}", e)))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace: settings.namespace.clone().filter(|ns| !ns.is_empty()),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Pinecone request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Pinecone {} failed ({}): {}",
                path, status, text
            )));
        }
        Ok(response)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AppResult<T> {
        self.post(path, body).await?.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse Pinecone {} response: {}", path, e))
        })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn backend_name(&self) -> &str {
        "pinecone"
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn upsert(&self, record: VectorRecord) -> AppResult<()> {
        let body = UpsertRequest {
            vectors: [&record],
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/upsert", &body).await?;
        debug!("Upserted vector");
        Ok(())
    }

    #[instrument(skip(self, vector))]
    async fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<VectorMatch>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self.post_json("/query", &body).await?;
        debug!(matches = response.matches.len(), "Queried index");
        Ok(response.matches)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> AppResult<()> {
        let body = DeleteRequest {
            ids: [id],
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/delete", &body).await?;
        debug!("Deleted vector");
        Ok(())
    }
}
