//! Configuration management for semroute
//!
//! Settings are layered with the following precedence (highest first):
//! 1. Environment variables listed in [`ENV_BINDINGS`]
//! 2. Config file named by `SEMROUTE_CONFIG`
//! 3. `./config/semroute.{yaml,toml,json}`
//! 4. Built-in defaults
//!
//! The score threshold and the Azure OpenAI endpoint have no default and must
//! be supplied by the operator.

use config::{builder::DefaultState, Config, ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{RouterError, RouterResult};

/// Embedding request timeout when none is configured.
pub const DEFAULT_AZURE_TIMEOUT_SECS: u64 = 30;

/// Environment variable → configuration key.
pub const ENV_BINDINGS: &[(&str, &str)] = &[
    // Embedding provider
    ("AZURE_OPENAI_ENDPOINT", "azure.openai_endpoint"),
    ("AZURE_OPENAI_API_VERSION", "azure.api_version"),
    ("AZURE_EMBEDDING_DEPLOYMENT", "azure.embedding_deployment"),
    ("AZURE_EMBEDDING_DIMENSIONS", "azure.embedding_dimensions"),
    ("AZURE_USE_MANAGED_IDENTITY", "azure.use_managed_identity"),
    ("AZURE_AD_TOKEN", "azure.ad_token"),
    ("AZURE_OPENAI_API_KEY", "azure.openai_api_key"),
    ("AZURE_CLIENT_ID", "azure.client_id"),
    ("IDENTITY_ENDPOINT", "azure.identity_endpoint"),
    ("IDENTITY_HEADER", "azure.identity_header"),
    ("AZURE_OPENAI_TIMEOUT_SECS", "azure.request_timeout_secs"),
    // Vector index
    ("TYPESENSE_HOST", "typesense.host"),
    ("TYPESENSE_PORT", "typesense.port"),
    ("TYPESENSE_PROTOCOL", "typesense.protocol"),
    ("TYPESENSE_API_KEY", "typesense.api_key"),
    ("TYPESENSE_COLLECTION", "typesense.collection"),
    (
        "TYPESENSE_CONNECTION_TIMEOUT_SECS",
        "typesense.connection_timeout_secs",
    ),
    // Router
    ("SEMROUTE_SCORE_THRESHOLD", "router.score_threshold"),
    ("SEMROUTE_ROUTES_FILE", "router.routes_file"),
    ("SEMROUTE_EMBED_BATCH_SIZE", "router.embed_batch_size"),
    ("SEMROUTE_READINESS_RECHECK_SECS", "router.readiness_recheck_secs"),
    ("SEMROUTE_USE_MEMORY_INDEX", "router.use_memory_index"),
    // Server
    ("SEMROUTE_BIND_ADDRESS", "server.bind_address"),
];

/// Root configuration structure for the service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub azure: AzureConfig,
    pub typesense: TypesenseConfig,
    pub router: RouterConfig,
    pub server: ServerConfig,
}

impl ServiceConfig {
    /// Load configuration from the process environment and config files.
    pub fn load() -> RouterResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment.
    ///
    /// Empty values are treated as unset.
    pub fn load_with<F>(lookup: F) -> RouterResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Some(path) = lookup("SEMROUTE_CONFIG").filter(|p| !p.is_empty()) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }
        builder = builder.add_source(File::with_name("./config/semroute").required(false));

        for (var, key) in ENV_BINDINGS {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config: ServiceConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> RouterResult<ConfigBuilder<DefaultState>> {
        Ok(builder
            .set_default("azure.api_version", "2024-02-01")?
            .set_default("azure.embedding_deployment", "text-embedding-ada-002")?
            .set_default("azure.request_timeout_secs", 30)?
            .set_default("typesense.host", "localhost")?
            .set_default("typesense.port", 8108)?
            .set_default("typesense.protocol", "http")?
            .set_default("typesense.api_key", "")?
            .set_default("typesense.collection", "semantic_routes")?
            .set_default("typesense.connection_timeout_secs", 10)?
            .set_default("router.embed_batch_size", 64)?
            .set_default("router.readiness_recheck_secs", 5)?
            .set_default("router.use_memory_index", false)?
            .set_default("server.bind_address", "0.0.0.0:8080")?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> RouterResult<()> {
        match self.azure.openai_endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => {}
            _ => {
                return Err(RouterError::configuration(
                    "AZURE_OPENAI_ENDPOINT is required",
                ))
            }
        }

        if self.azure.embedding_dimensions == Some(0) {
            return Err(RouterError::configuration(
                "azure.embedding_dimensions must be > 0",
            ));
        }

        match self.router.score_threshold {
            None => {
                return Err(RouterError::configuration(
                    "SEMROUTE_SCORE_THRESHOLD is required",
                ))
            }
            Some(t) if !(0.0..=1.0).contains(&t) => {
                return Err(RouterError::configuration(format!(
                    "router.score_threshold must be within 0.0..=1.0, got {t}"
                )))
            }
            Some(_) => {}
        }

        if self.azure.request_timeout_secs == Some(0) {
            return Err(RouterError::configuration(
                "azure.request_timeout_secs must be > 0",
            ));
        }

        if self.router.embed_batch_size == 0 {
            return Err(RouterError::configuration(
                "router.embed_batch_size must be > 0",
            ));
        }

        if !matches!(self.typesense.protocol.as_str(), "http" | "https") {
            return Err(RouterError::configuration(format!(
                "typesense.protocol must be http or https, got '{}'",
                self.typesense.protocol
            )));
        }

        if self.typesense.collection.trim().is_empty() {
            return Err(RouterError::configuration(
                "typesense.collection must not be empty",
            ));
        }

        Ok(())
    }
}

/// Azure OpenAI embedding deployment and credential inputs
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct AzureConfig {
    pub openai_endpoint: Option<String>,
    pub api_version: String,
    pub embedding_deployment: String,
    /// Requested output dimensions (text-embedding-3 deployments only)
    pub embedding_dimensions: Option<usize>,
    pub use_managed_identity: Option<String>,
    pub ad_token: Option<String>,
    pub openai_api_key: Option<String>,
    /// User-assigned managed identity
    pub client_id: Option<String>,
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
    /// Whole-request timeout for embedding and token calls
    pub request_timeout_secs: Option<u64>,
}

impl AzureConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_AZURE_TIMEOUT_SECS),
        )
    }

    /// `AZURE_USE_MANAGED_IDENTITY` is set to `true` (any case) or `1`.
    pub fn managed_identity_requested(&self) -> bool {
        self.use_managed_identity
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("openai_endpoint", &self.openai_endpoint)
            .field("api_version", &self.api_version)
            .field("embedding_deployment", &self.embedding_deployment)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("use_managed_identity", &self.use_managed_identity)
            .field("ad_token", &redact(&self.ad_token))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("client_id", &self.client_id)
            .field("identity_endpoint", &self.identity_endpoint)
            .field("identity_header", &redact(&self.identity_header))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Typesense connection settings
#[derive(Clone, Deserialize, Serialize)]
pub struct TypesenseConfig {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub api_key: String,
    pub collection: String,
    pub connection_timeout_secs: u64,
}

impl TypesenseConfig {
    /// Base URL of the Typesense node, e.g. `http://localhost:8108`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

impl Default for TypesenseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8108,
            protocol: "http".to_string(),
            api_key: String::new(),
            collection: "semantic_routes".to_string(),
            connection_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for TypesenseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypesenseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("api_key", &"<redacted>")
            .field("collection", &self.collection)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

/// Route matching and synchronization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Minimum similarity for a query to be classified into a route
    pub score_threshold: Option<f32>,

    /// Route declaration file; the built-in route list is used when unset
    pub routes_file: Option<String>,

    /// Maximum utterances sent per embedding request during synchronization
    pub embed_batch_size: usize,

    /// How long a readiness connectivity check stays valid (0 = every probe)
    pub readiness_recheck_secs: u64,

    /// Use the in-process index instead of Typesense
    pub use_memory_index: bool,
}

impl RouterConfig {
    pub fn readiness_recheck_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_recheck_secs)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            score_threshold: None,
            routes_file: None,
            embed_batch_size: 64,
            readiness_recheck_secs: 5,
            use_memory_index: false,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}
