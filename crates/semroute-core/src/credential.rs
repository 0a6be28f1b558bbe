//! Embedding provider credential selection.
//!
//! Exactly one authentication mode is chosen at startup by walking
//! [`STRATEGIES`] in order. No network calls happen here; token acquisition
//! for managed identity is done lazily by the embedding client.

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::config::AzureConfig;
use crate::error::{RouterError, RouterResult};

/// Authentication mode used against the embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Platform-issued identity token, refreshed automatically.
    ManagedIdentity,
    /// Bearer token supplied once; valid for the process lifetime.
    StaticToken,
    /// Static `api-key` header.
    ApiKey,
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ManagedIdentity => "managed_identity",
            Self::StaticToken => "static_token",
            Self::ApiKey => "api_key",
        };
        f.write_str(name)
    }
}

/// Resolved credential; immutable for the lifetime of the process.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialContext {
    ManagedIdentity {
        /// User-assigned identity; system-assigned when `None`.
        client_id: Option<String>,
        /// App Service / Container Apps identity endpoint and its secret header.
        identity_endpoint: Option<(String, String)>,
    },
    StaticToken {
        token: String,
    },
    ApiKey {
        key: String,
    },
}

impl CredentialContext {
    #[must_use]
    pub fn mode(&self) -> CredentialMode {
        match self {
            Self::ManagedIdentity { .. } => CredentialMode::ManagedIdentity,
            Self::StaticToken { .. } => CredentialMode::StaticToken,
            Self::ApiKey { .. } => CredentialMode::ApiKey,
        }
    }
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManagedIdentity {
                client_id,
                identity_endpoint,
            } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .field(
                    "identity_endpoint",
                    &identity_endpoint.as_ref().map(|(url, _)| url),
                )
                .finish(),
            Self::StaticToken { .. } => f
                .debug_struct("StaticToken")
                .field("token", &"<redacted>")
                .finish(),
            Self::ApiKey { .. } => f.debug_struct("ApiKey").field("key", &"<redacted>").finish(),
        }
    }
}

/// One entry of the precedence list: a mode and the selector that builds it
/// when its inputs are present.
struct CredentialStrategy {
    mode: CredentialMode,
    select: fn(&AzureConfig) -> Option<CredentialContext>,
}

/// Precedence order: managed identity, then static token, then API key.
const STRATEGIES: [CredentialStrategy; 3] = [
    CredentialStrategy {
        mode: CredentialMode::ManagedIdentity,
        select: select_managed_identity,
    },
    CredentialStrategy {
        mode: CredentialMode::StaticToken,
        select: select_static_token,
    },
    CredentialStrategy {
        mode: CredentialMode::ApiKey,
        select: select_api_key,
    },
];

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn select_managed_identity(azure: &AzureConfig) -> Option<CredentialContext> {
    if !azure.managed_identity_requested() {
        return None;
    }
    let identity_endpoint = non_blank(&azure.identity_endpoint).zip(non_blank(&azure.identity_header));
    Some(CredentialContext::ManagedIdentity {
        client_id: non_blank(&azure.client_id),
        identity_endpoint,
    })
}

fn select_static_token(azure: &AzureConfig) -> Option<CredentialContext> {
    non_blank(&azure.ad_token).map(|token| CredentialContext::StaticToken { token })
}

fn select_api_key(azure: &AzureConfig) -> Option<CredentialContext> {
    non_blank(&azure.openai_api_key).map(|key| CredentialContext::ApiKey { key })
}

/// Select the embedding provider credential.
///
/// # Errors
///
/// Returns [`RouterError::Configuration`] when none of the three inputs is present.
pub fn resolve_credential(azure: &AzureConfig) -> RouterResult<CredentialContext> {
    let (mode, context) = STRATEGIES
        .iter()
        .find_map(|strategy| (strategy.select)(azure).map(|ctx| (strategy.mode, ctx)))
        .ok_or_else(|| {
            RouterError::configuration(
                "no Azure OpenAI auth configured; set one of AZURE_USE_MANAGED_IDENTITY=true, \
                 AZURE_AD_TOKEN, or AZURE_OPENAI_API_KEY",
            )
        })?;

    info!(auth_mode = %mode, "Resolved embedding provider credential");
    Ok(context)
}
