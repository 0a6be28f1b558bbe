//! Authentication headers for the embedding endpoint.
//!
//! Static credentials hand out the same header forever. Managed identity
//! fetches a token from the platform identity endpoint and caches it until
//! shortly before it expires.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::{EmbeddingError, EmbeddingResult};

/// Resource identifier for Azure Cognitive Services tokens.
pub const COGNITIVE_SERVICES_RESOURCE: &str = "https://cognitiveservices.azure.com";

/// Instance metadata service token endpoint.
pub const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Tokens are refreshed this many seconds before `expires_on`.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Header attached to every embedding request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `api-key: <key>`
    ApiKey(String),
}

impl AuthHeader {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token),
            Self::ApiKey(key) => request.header("api-key", key),
        }
    }
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Source of the authentication header for embedding calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn auth_header(&self) -> EmbeddingResult<AuthHeader>;
}

/// Static bearer token or API key, valid for the process lifetime.
pub struct StaticCredential {
    header: AuthHeader,
}

impl StaticCredential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            header: AuthHeader::Bearer(token.into()),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            header: AuthHeader::ApiKey(key.into()),
        }
    }
}

#[async_trait]
impl TokenSource for StaticCredential {
    async fn auth_header(&self) -> EmbeddingResult<AuthHeader> {
        Ok(self.header.clone())
    }
}

#[derive(Debug, Clone)]
enum IdentityEndpoint {
    /// App Service / Container Apps (`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`)
    AppService { url: String, secret: String },
    /// Azure instance metadata service
    Imds { url: String },
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_on: i64,
}

impl AccessToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_on - REFRESH_MARGIN_SECS > now
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochValue {
    Number(i64),
    Text(String),
}

impl EpochValue {
    fn seconds(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_on: Option<EpochValue>,
    expires_in: Option<EpochValue>,
}

/// Platform-issued identity token, refreshed automatically.
pub struct ManagedIdentityCredential {
    client: Client,
    endpoint: IdentityEndpoint,
    client_id: Option<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl ManagedIdentityCredential {
    /// Token from the App Service / Container Apps identity endpoint.
    pub fn app_service(
        client: Client,
        url: impl Into<String>,
        secret: impl Into<String>,
        client_id: Option<String>,
    ) -> Self {
        Self::with_endpoint(
            client,
            IdentityEndpoint::AppService {
                url: url.into(),
                secret: secret.into(),
            },
            client_id,
        )
    }

    /// Token from the instance metadata service at `url`.
    pub fn imds(client: Client, url: impl Into<String>, client_id: Option<String>) -> Self {
        Self::with_endpoint(client, IdentityEndpoint::Imds { url: url.into() }, client_id)
    }

    fn with_endpoint(client: Client, endpoint: IdentityEndpoint, client_id: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            client_id,
            cached: Mutex::new(None),
        }
    }

    async fn fetch_token(&self) -> EmbeddingResult<AccessToken> {
        let mut params = vec![("resource", COGNITIVE_SERVICES_RESOURCE.to_string())];
        if let Some(client_id) = &self.client_id {
            params.push(("client_id", client_id.clone()));
        }

        let request = match &self.endpoint {
            IdentityEndpoint::AppService { url, secret } => {
                params.push(("api-version", "2019-08-01".to_string()));
                self.client
                    .get(url)
                    .query(&params)
                    .header("X-IDENTITY-HEADER", secret)
            }
            IdentityEndpoint::Imds { url } => {
                params.push(("api-version", "2018-02-01".to_string()));
                self.client.get(url).query(&params).header("Metadata", "true")
            }
        };

        let response = request.send().await.map_err(|e| {
            EmbeddingError::Authentication(format!("managed identity endpoint unreachable: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Authentication(format!(
                "managed identity endpoint returned {status}: {body}"
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            EmbeddingError::Authentication(format!("unreadable managed identity token: {e}"))
        })?;

        let now = Utc::now().timestamp();
        let expires_on = body
            .expires_on
            .as_ref()
            .and_then(EpochValue::seconds)
            .or_else(|| {
                body.expires_in
                    .as_ref()
                    .and_then(EpochValue::seconds)
                    .map(|secs| now + secs)
            })
            .ok_or_else(|| {
                EmbeddingError::Authentication("managed identity token has no expiry".to_string())
            })?;

        debug!(expires_in_secs = expires_on - now, "Acquired managed identity token");
        Ok(AccessToken {
            token: body.access_token,
            expires_on,
        })
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityCredential {
    async fn auth_header(&self) -> EmbeddingResult<AuthHeader> {
        // Held across the fetch so concurrent callers share one refresh.
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(AuthHeader::Bearer(token.token.clone()));
        }

        if cached.is_some() {
            info!("Refreshing managed identity token");
        }
        let token = self.fetch_token().await?;
        let header = AuthHeader::Bearer(token.token.clone());
        *cached = Some(token);
        Ok(header)
    }
}
