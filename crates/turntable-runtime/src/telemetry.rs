//! Tracing initialisation for Turntable.
//!
//! [`init_tracing`] installs one `tracing` subscriber for the whole process:
//! an [`EnvFilter`], a console layer in the format chosen by
//! `TURNTABLE_LOG_FORMAT`, and an OpenTelemetry layer when a collector is
//! configured.  The runtime emits spans for model loads, step captures and
//! recall scoring, each carrying the session id or model name, so an
//! exported trace follows a participant through the study.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). Enables span export. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `TURNTABLE_LOG_FORMAT` | `compact` (default), `pretty` or `json`. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = turntable_runtime::telemetry::init_tracing("turntable");
//! ```

use std::fmt;
use std::str::FromStr;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::session::timestamped_id;

const LOG_FORMAT_VAR: &str = "TURNTABLE_LOG_FORMAT";
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected compact, pretty or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        };
        f.write_str(name)
    }
}

/// Everything [`init_tracing`] reads from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.  An unknown log format falls
    /// back to [`LogFormat::Compact`] with a note on stderr.
    pub fn from_lookup(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup(LOG_FORMAT_VAR) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                eprintln!("[turntable] {e}; using compact logs");
                LogFormat::Compact
            }),
            None => LogFormat::Compact,
        };
        Self {
            service_name: service_name.to_string(),
            filter: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            format,
            otlp_endpoint: lookup(OTLP_ENDPOINT_VAR).filter(|e| !e.trim().is_empty()),
        }
    }

    /// OTel resource describing this process: service name and version plus
    /// an instance id unique to this run.
    pub fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                KeyValue::new("service.instance.id", timestamped_id(&mut rand::thread_rng())),
            ])
            .build()
    }
}

type Filtered = Layered<EnvFilter, Registry>;

fn console_layer(format: LogFormat) -> Box<dyn Layer<Filtered> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer().with_target(false);
    match format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Initialise the global `tracing` subscriber from the environment.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_with(TelemetryConfig::from_env(service_name))
}

/// [`init_tracing`] with an explicit configuration.
pub fn init_with(config: TelemetryConfig) -> TracerProviderGuard {
    let provider = build_provider(&config);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("turntable")));

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.filter))
        .with(console_layer(config.format))
        .with(otel_layer)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are exported to a collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[turntable] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// `None` without an endpoint, or when the exporter cannot be built (the
/// error goes to stderr and console logging carries on alone).
fn build_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let endpoint = config.otlp_endpoint.clone()?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[turntable] OTLP exporter init failed: {e}"))
        .ok()?;

    Some(
        SdkTracerProvider::builder()
            .with_resource(config.resource())
            // Built before the Tokio runtime exists; the simple exporter
            // spawns nothing.
            .with_simple_exporter(exporter)
            .build(),
    )
}
