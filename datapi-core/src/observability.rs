//! Logging, tracing and metrics setup
//!
//! The library itself only emits `tracing` events and OpenTelemetry
//! measurements through the global providers. Applications that want to see
//! them call [`init_observability`] once at startup:
//!
//! - a `tracing-subscriber` registry filtered by `RUST_LOG` (or the configured
//!   level) printing JSON or human readable lines
//! - optionally a `tracing-opentelemetry` layer exporting spans over OTLP/gRPC
//! - optionally a periodic OTLP metrics reader behind the global meter
//!   provider, which is what `RunnerMetrics` in the client crate records into
//!
//! ```rust,no_run
//! use datapi_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("ingest-worker")
//!         .with_endpoint("http://localhost:4317")
//!         .with_metrics(false);
//!     datapi_core::init_observability(config).expect("observability");
//!
//!     // ... run commands ...
//!
//!     datapi_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint
//! - `RUST_LOG`: filter directives, e.g. `datapi_client=debug`

use once_cell::sync::Lazy;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider, Tracer};
use opentelemetry_sdk::Resource;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Providers installed by [`init_observability`], kept for shutdown
#[derive(Default)]
struct Installed {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
}

static INSTALLED: Lazy<Mutex<Installed>> = Lazy::new(|| Mutex::new(Installed::default()));

/// What to set up and where to export it
#[derive(Debug, Clone, PartialEq)]
pub struct ObservabilityConfig {
    /// `service.name` resource attribute
    pub service_name: String,
    /// `service.version` resource attribute
    pub service_version: String,
    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,
    /// Export spans
    pub enable_traces: bool,
    /// Export metrics
    pub enable_metrics: bool,
    /// Interval between metric exports
    pub metrics_interval: Duration,
    /// Filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Print logs as JSON objects instead of plain text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    /// Service `datapi`, local collector, traces and metrics on, JSON logs
    ///
    /// The endpoint and level honour `OTEL_EXPORTER_OTLP_ENDPOINT` and
    /// `RUST_LOG`.
    fn default() -> Self {
        Self {
            service_name: "datapi".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            metrics_interval: Duration::from_secs(30),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json_logs: true,
        }
    }
}

impl ObservabilityConfig {
    /// Defaults with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the fallback log filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Enable or disable span export
    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    /// Enable or disable metric export
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Set the metric export interval
    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Choose JSON or plain text log lines
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Install the subscriber and the enabled OpenTelemetry providers
///
/// Call once, from inside a tokio runtime when traces or metrics are enabled
/// (the OTLP exporters run on it).
///
/// # Errors
///
/// Fails if an exporter cannot be built, if the log filter does not parse or
/// if a global subscriber is already installed.
pub fn init_observability(config: ObservabilityConfig) -> Result<(), BoxError> {
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    init_tracing_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        "Observability initialized"
    );
    Ok(())
}

fn init_tracer(config: &ObservabilityConfig) -> Result<Tracer, BoxError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    // The subscriber layer needs a tracer before the provider goes global.
    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider.clone());
    remember(|installed| installed.tracer = Some(provider));
    Ok(tracer)
}

fn init_metrics(config: &ObservabilityConfig) -> Result<(), BoxError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metrics_interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider.clone());
    remember(|installed| installed.meter = Some(provider));
    Ok(())
}

fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<Tracer>,
) -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    let json_layer = config.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });
    let text_layer = (!config.json_logs).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}

fn remember(update: impl FnOnce(&mut Installed)) {
    match INSTALLED.lock() {
        Ok(mut installed) => update(&mut installed),
        Err(poisoned) => update(&mut poisoned.into_inner()),
    }
}

/// Flush and stop the providers installed by [`init_observability`]
///
/// Safe to call when nothing was installed.
pub fn shutdown_observability() {
    let installed = match INSTALLED.lock() {
        Ok(mut installed) => std::mem::take(&mut *installed),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };

    if let Some(provider) = installed.tracer {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
    if let Some(provider) = installed.meter {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }
    tracing::info!("Observability shut down");
}
