//! Data API command runner over HTTP
//!
//! This crate executes Data API commands: it serializes a
//! [`Command`](datapi_core::Command), posts it with bounded retries,
//! interprets the `{status, data, errors}` response and notifies observers.
//!
//! # Core Features
//!
//! - **Command Runner**: one call per command, typed results with `run_as`
//! - **Layered Options**: runner level defaults with per-call overrides
//! - **Retry Transport**: fixed or exponential backoff over `reqwest`
//! - **Observers**: async, panic-isolated notification with every
//!   [`ExecutionInfo`](datapi_core::ExecutionInfo)
//! - **Embedding Auth**: provider credentials for `$vectorize` collections
//! - **Observability**: `tracing` spans and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use datapi_client::{CommandOptions, DataApiEndpoint, LoggingCommandObserver, RunnerBuilder};
//! use datapi_core::Command;
//! use serde::Deserialize;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Deserialize)]
//! struct Movie {
//!     title: String,
//!     year: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = CommandOptions::with_default_http()
//!         .with_token("AstraCS:...")
//!         .with_observer("log", Arc::new(LoggingCommandObserver));
//!     let runner = RunnerBuilder::new(
//!         DataApiEndpoint::new("http://localhost:8181")
//!             .with_keyspace("default_keyspace")
//!             .with_collection("movies"),
//!     )
//!     .with_options(options)
//!     .build();
//!
//!     let find = Command::new("findOne").with("filter", json!({"title": "Alien"}));
//!     let movie: Movie = runner.run_as(&find, None).await?;
//!     println!("{} ({})", movie.title, movie.year);
//!
//!     runner.drain().await;
//!     Ok(())
//! }
//! ```
//!
//! # With Overrides
//!
//! ```rust,no_run
//! use datapi_client::{CommandOptions, CommandRunner, HttpClientOptions};
//! use datapi_core::Command;
//!
//! # async fn example(runner: CommandRunner) -> datapi_core::Result<()> {
//! let slow = CommandOptions::new().with_http_client_options(
//!     HttpClientOptions::default().with_response_timeout(std::time::Duration::from_secs(120)),
//! );
//! runner.run(&Command::new("createCollection").with("name", "movies"), Some(&slow)).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod embedding;
mod endpoint;
mod http;
mod metrics;
mod observer;
mod options;
mod retry;
mod runner;
mod runner_builder;

pub use config::ClientConfig;
pub use embedding::{
    AwsEmbeddingHeaders, EmbeddingApiKey, EmbeddingHeadersProvider, EMBEDDING_ACCESS_ID_HEADER,
    EMBEDDING_API_KEY_HEADER, EMBEDDING_SECRET_ID_HEADER,
};
pub use endpoint::{DataApiEndpoint, DEFAULT_API_VERSION};
pub use http::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ReqwestTransportFactory,
    TransportFactory,
};
pub use metrics::RunnerMetrics;
pub use observer::{CommandObserver, LoggingCommandObserver, ObserverRegistry};
pub use options::{Backoff, Caller, CommandOptions, HttpClientOptions, CLIENT_NAME, FEATURE_FLAG_PREFIX};
pub use retry::{is_retryable_status, ExponentialBackoff, FixedDelay, HttpOutcome, RetryHttpClient, RetryPolicy};
pub use runner::{headers, CommandRunner};
pub use runner_builder::RunnerBuilder;
