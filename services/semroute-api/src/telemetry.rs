//! Logging and optional OpenTelemetry trace export
//!
//! Console logging is always on (`RUST_LOG`, default `info`). When
//! `SEMROUTE_TELEMETRY_ENABLED` is set, spans are also exported over OTLP/gRPC.

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self as sdktrace, RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenTelemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for traces
    pub service_name: String,

    /// OTLP collector endpoint (e.g., "http://localhost:4317")
    pub otlp_endpoint: String,

    /// Export spans in addition to console logging
    pub enabled: bool,

    /// Sampling ratio (0.0 to 1.0)
    pub sampling_ratio: f64,

    /// Export timeout in seconds
    pub export_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "semroute-api".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            enabled: false,
            sampling_ratio: 1.0,
            export_timeout_secs: 10,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            service_name: lookup("SEMROUTE_SERVICE_NAME").unwrap_or(defaults.service_name),
            otlp_endpoint: lookup("SEMROUTE_OTLP_ENDPOINT").unwrap_or(defaults.otlp_endpoint),
            enabled: lookup("SEMROUTE_TELEMETRY_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.enabled),
            sampling_ratio: lookup("SEMROUTE_SAMPLING_RATIO")
                .and_then(|v| v.parse().ok())
                .map(|ratio: f64| ratio.clamp(0.0, 1.0))
                .unwrap_or(defaults.sampling_ratio),
            export_timeout_secs: lookup("SEMROUTE_EXPORT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.export_timeout_secs),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging and, when enabled, the OTLP span exporter.
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes pending spans.
pub fn init_telemetry(
    config: TelemetryConfig,
) -> Result<TelemetryGuard, Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        init_logging_only()?;
        return Ok(TelemetryGuard { exporting: false });
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .with_timeout(Duration::from_secs(config.export_timeout_secs));

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            sdktrace::config()
                .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", config.service_name.clone()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        endpoint = %config.otlp_endpoint,
        sampling_ratio = config.sampling_ratio,
        "OpenTelemetry initialized"
    );

    Ok(TelemetryGuard { exporting: true })
}

fn init_logging_only() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()?;

    tracing::info!("Logging initialized (OpenTelemetry disabled)");
    Ok(())
}

/// Flushes and shuts down span export when dropped.
pub struct TelemetryGuard {
    exporting: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exporting {
            tracing::info!("Shutting down OpenTelemetry");
            global::shutdown_tracer_provider();
        }
    }
}
