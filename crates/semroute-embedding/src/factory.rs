use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use semroute_core::CredentialContext;
use tracing::info;

use crate::azure::{AzureOpenAiProvider, DeploymentTarget};
use crate::token::{ManagedIdentityCredential, StaticCredential, TokenSource, IMDS_TOKEN_URL};
use crate::types::{EmbeddingError, EmbeddingResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header source matching the resolved credential.
pub fn token_source_for(credential: &CredentialContext, client: Client) -> Arc<dyn TokenSource> {
    match credential {
        CredentialContext::ManagedIdentity {
            client_id,
            identity_endpoint: Some((url, secret)),
        } => {
            info!("Using managed identity (App Service identity endpoint) for auth");
            Arc::new(ManagedIdentityCredential::app_service(
                client,
                url.clone(),
                secret.clone(),
                client_id.clone(),
            ))
        }
        CredentialContext::ManagedIdentity {
            client_id,
            identity_endpoint: None,
        } => {
            info!("Using managed identity (instance metadata service) for auth");
            Arc::new(ManagedIdentityCredential::imds(
                client,
                IMDS_TOKEN_URL,
                client_id.clone(),
            ))
        }
        CredentialContext::StaticToken { token } => {
            info!("Using static Entra ID token for auth");
            Arc::new(StaticCredential::bearer(token.clone()))
        }
        CredentialContext::ApiKey { key } => {
            info!("Using API key for auth");
            Arc::new(StaticCredential::api_key(key.clone()))
        }
    }
}

/// Build the long-lived embedding client for `target` authenticated with
/// `credential`.
///
/// No network call is made here; the first request acquires a token when
/// managed identity is in use.
pub fn build_provider(
    credential: &CredentialContext,
    target: DeploymentTarget,
) -> EmbeddingResult<AzureOpenAiProvider> {
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(target.request_timeout))
        .timeout(target.request_timeout)
        .build()
        .map_err(|e| EmbeddingError::Transport(format!("failed to build HTTP client: {e}")))?;

    info!(
        endpoint = %target.endpoint,
        deployment = %target.deployment,
        api_version = %target.api_version,
        timeout_secs = target.request_timeout.as_secs(),
        auth_mode = %credential.mode(),
        "Building Azure OpenAI embedding client"
    );

    let source = token_source_for(credential, client.clone());
    Ok(AzureOpenAiProvider::new(client, target, source))
}
