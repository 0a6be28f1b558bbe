use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use semroute_core::metrics::EMBEDDING_REQUESTS;
use semroute_core::AzureConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::provider::EmbeddingProvider;
use crate::token::TokenSource;
use crate::types::{BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo, Usage};

/// Text used to discover the output dimension when it is not configured.
const DIMENSION_PROBE: &str = "dimension probe";

/// Azure OpenAI embedding deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    pub api_version: String,
    pub deployment: String,
    /// Requested output dimensions (text-embedding-3 deployments)
    pub dimensions: Option<usize>,
    /// Upper bound on one embedding or token request, connect included
    pub request_timeout: Duration,
}

impl DeploymentTarget {
    pub fn from_config(azure: &AzureConfig) -> EmbeddingResult<Self> {
        let endpoint = azure
            .openai_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                EmbeddingError::InvalidInput("AZURE_OPENAI_ENDPOINT is required".to_string())
            })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: azure.api_version.clone(),
            deployment: azure.embedding_deployment.clone(),
            dimensions: azure.embedding_dimensions,
            request_timeout: azure.request_timeout(),
        })
    }

    /// `POST` URL of the embeddings operation (without query string).
    pub fn embeddings_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: usize,
}

/// Embedding client bound to one Azure OpenAI deployment and credential.
pub struct AzureOpenAiProvider {
    client: Client,
    target: DeploymentTarget,
    credential: Arc<dyn TokenSource>,
    dimension: OnceCell<usize>,
}

impl AzureOpenAiProvider {
    pub fn new(client: Client, target: DeploymentTarget, credential: Arc<dyn TokenSource>) -> Self {
        let dimension = match target.dimensions {
            Some(dim) => OnceCell::new_with(Some(dim)),
            None => OnceCell::new(),
        };
        Self {
            client,
            target,
            credential,
            dimension,
        }
    }

    pub fn target(&self) -> &DeploymentTarget {
        &self.target
    }

    async fn request_embeddings(&self, inputs: &[String]) -> EmbeddingResult<BatchEmbeddingResponse> {
        if inputs.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty input batch".to_string()));
        }

        let start = Instant::now();
        let header = self.credential.auth_header().await?;
        let request = self
            .client
            .post(self.target.embeddings_url())
            .query(&[("api-version", self.target.api_version.as_str())])
            .json(&EmbeddingRequest {
                input: inputs,
                dimensions: self.target.dimensions,
            });

        let response = header.apply(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    EmbeddingError::Authentication(format!("{status}: {message}"))
                }
                _ => EmbeddingError::Status {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let body: EmbeddingResponse = response.json().await?;
        let embeddings = order_embeddings(body.data, inputs.len())?;

        let dimension = embeddings[0].len();
        if dimension == 0 || embeddings.iter().any(|e| e.len() != dimension) {
            return Err(EmbeddingError::MalformedResponse(
                "embeddings have inconsistent dimensions".to_string(),
            ));
        }
        if let Some(expected) = self.target.dimensions {
            if expected != dimension {
                return Err(EmbeddingError::MalformedResponse(format!(
                    "expected {expected}-dimensional embeddings, got {dimension}"
                )));
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            deployment = %self.target.deployment,
            inputs = inputs.len(),
            dimension,
            duration_ms,
            "Embedding batch completed"
        );

        Ok(BatchEmbeddingResponse {
            model: self.target.deployment.clone(),
            embeddings,
            usage: Usage {
                total_tokens: body.usage.map(|u| u.total_tokens).unwrap_or_default(),
                duration_ms,
            },
        })
    }
}

/// Re-order response items by their `index` and check one item per input.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(EmbeddingError::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    if data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(EmbeddingError::MalformedResponse(
            "embedding indices do not cover the input batch".to_string(),
        ));
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiProvider {
    async fn embed_batch(&self, inputs: &[String]) -> EmbeddingResult<BatchEmbeddingResponse> {
        let result = self.request_embeddings(inputs).await;
        match &result {
            Ok(_) => EMBEDDING_REQUESTS.with_label_values(&["ok"]).inc(),
            Err(e) => {
                warn!(deployment = %self.target.deployment, error = %e, "Embedding request failed");
                EMBEDDING_REQUESTS.with_label_values(&["error"]).inc();
            }
        }
        result
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        let dimension = *self
            .dimension
            .get_or_try_init(|| async {
                let response = self.embed_batch(&[DIMENSION_PROBE.to_string()]).await?;
                Ok::<usize, EmbeddingError>(response.embeddings[0].len())
            })
            .await?;

        Ok(ModelInfo {
            model: self.target.deployment.clone(),
            dimension,
        })
    }
}
