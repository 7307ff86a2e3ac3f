//! Runner builder
//!
//! ```rust
//! use datapi_client::{CommandOptions, DataApiEndpoint, HttpClientOptions, RunnerBuilder};
//! use datapi_core::{Serializer, VectorEncoding};
//!
//! let runner = RunnerBuilder::new(DataApiEndpoint::new("http://localhost:8181"))
//!     .with_options(
//!         CommandOptions::new()
//!             .with_token("tok")
//!             .with_http_client_options(HttpClientOptions::default().with_max_attempts(5)),
//!     )
//!     .with_serializer(Serializer::default().with_vector_encoding(VectorEncoding::Array))
//!     .with_default_metrics()
//!     .build();
//!
//! assert_eq!(runner.options().token(), Some("tok"));
//! ```

use crate::endpoint::DataApiEndpoint;
use crate::http::{HttpTransport, ReqwestTransportFactory, TransportFactory};
use crate::metrics::RunnerMetrics;
use crate::options::CommandOptions;
use crate::retry::RetryHttpClient;
use crate::runner::CommandRunner;
use datapi_core::Serializer;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Builder for configuring and creating a [`CommandRunner`]
pub struct RunnerBuilder {
    endpoint: DataApiEndpoint,
    options: CommandOptions,
    serializer: Serializer,
    factory: Arc<dyn TransportFactory>,
    transport: Option<Arc<dyn HttpTransport>>,
    metrics: Option<Arc<RunnerMetrics>>,
}

impl RunnerBuilder {
    /// Start a runner for `endpoint`
    pub fn new(endpoint: DataApiEndpoint) -> Self {
        Self {
            endpoint,
            options: CommandOptions::default(),
            serializer: Serializer::default(),
            factory: Arc::new(ReqwestTransportFactory),
            transport: None,
            metrics: None,
        }
    }

    /// Set the base options
    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the default serializer
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Create transports with `factory` instead of `reqwest`
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `transport` as the shared transport
    ///
    /// It is wrapped in a retry client using the base HTTP options, or the
    /// defaults when none are set. Overrides with other HTTP options still go
    /// through the transport factory.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Record metrics with the given instruments
    pub fn with_metrics(mut self, metrics: Arc<RunnerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record metrics on the global `datapi` meter
    pub fn with_default_metrics(self) -> Self {
        self.with_metrics(Arc::new(RunnerMetrics::new()))
    }

    /// Build the runner
    ///
    /// No connection is made; the shared transport is created on first use.
    pub fn build(self) -> CommandRunner {
        let shared = match self.transport {
            Some(transport) => {
                let options = self
                    .options
                    .http_client_options()
                    .cloned()
                    .unwrap_or_default();
                OnceCell::with_value(Arc::new(RetryHttpClient::new(transport, options)))
            }
            None => OnceCell::new(),
        };

        CommandRunner {
            endpoint: self.endpoint,
            options: Arc::new(self.options),
            serializer: self.serializer,
            factory: self.factory,
            shared: Arc::new(shared),
            pending: Arc::new(Mutex::new(Vec::new())),
            metrics: self.metrics,
        }
    }
}
