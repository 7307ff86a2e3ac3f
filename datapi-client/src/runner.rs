//! Command runner
//!
//! [`CommandRunner`] executes one [`Command`] against a Data API endpoint:
//!
//! 1. **Transport**: reuse the shared [`RetryHttpClient`], built on first
//!    use, or build a one-off client when the call overrides the HTTP
//!    options with different ones
//! 2. **Options**: merge the runner's base [`CommandOptions`] with the
//!    per-call overrides (observers, token, serializer, headers)
//! 3. **Request**: serialize the command and assemble URL and headers
//! 4. **Exchange**: POST through the retry client
//! 5. **Response**: parse the `{status, data, errors}` envelope; reported
//!    errors win over returned data
//! 6. **Notification**: hand the finalized [`ExecutionInfo`] to every
//!    observer without waiting for them
//!
//! Once a transport is available every execution is recorded and observed,
//! including the ones failing on a malformed URL or unserializable payload.
//! A missing transport configuration fails before anything is recorded.
//!
//! # Examples
//!
//! ```rust,no_run
//! use datapi_client::{CommandOptions, DataApiEndpoint, RunnerBuilder};
//! use datapi_core::Command;
//! use serde_json::json;
//!
//! # async fn example() -> datapi_core::Result<()> {
//! let endpoint = DataApiEndpoint::new("http://localhost:8181")
//!     .with_keyspace("default_keyspace")
//!     .with_collection("movies");
//! let runner = RunnerBuilder::new(endpoint)
//!     .with_options(CommandOptions::with_default_http().with_token("tok"))
//!     .build();
//!
//! let command = Command::new("insertOne").with("document", json!({"_id": "1", "title": "Alien"}));
//! let response = runner.run(&command, None).await?;
//! println!("{:?}", response.status_key("insertedIds"));
//!
//! // Wait for observers before shutting down
//! runner.drain().await;
//! # Ok(())
//! # }
//! ```

use crate::endpoint::DataApiEndpoint;
use crate::http::{HttpRequest, TransportFactory};
use crate::metrics::RunnerMetrics;
use crate::observer::ObserverRegistry;
use crate::options::CommandOptions;
use crate::retry::RetryHttpClient;
use datapi_core::{
    Command, DataApiResponse, Error, ExecutionInfo, ExecutionInfoBuilder, Result, Serializer,
};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const APPLICATION_JSON: &str = "application/json";

/// Header names set on every request
pub mod headers {
    /// Body media type
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Accepted media type
    pub const ACCEPT: &str = "Accept";
    /// Fresh UUID per command
    pub const REQUEST_ID: &str = "X-Request-ID";
    /// Client user agent
    pub const USER_AGENT: &str = "User-Agent";
    /// Client user agent, repeated for proxies that strip `User-Agent`
    pub const REQUESTED_WITH: &str = "X-Requested-With";
    /// `Bearer <token>`
    pub const AUTHORIZATION: &str = "Authorization";
    /// Raw token, accepted by older servers
    pub const TOKEN: &str = "Token";
}

/// Stops the pipeline with `Err`, handing the builder back with it
macro_rules! attempt {
    ($builder:ident, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => return ($builder, Err(e)),
        }
    };
}

/// Executes commands against one endpoint
///
/// Cheap to clone; clones share the transport and the pending notifications.
#[derive(Clone)]
pub struct CommandRunner {
    pub(crate) endpoint: DataApiEndpoint,
    pub(crate) options: Arc<CommandOptions>,
    pub(crate) serializer: Serializer,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) shared: Arc<OnceCell<Arc<RetryHttpClient>>>,
    pub(crate) pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    pub(crate) metrics: Option<Arc<RunnerMetrics>>,
}

impl CommandRunner {
    /// Endpoint commands are posted to
    pub fn endpoint(&self) -> &DataApiEndpoint {
        &self.endpoint
    }

    /// Base options
    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// Serializer used when no option overrides it
    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Runner for another endpoint sharing this runner's transport and options
    pub fn with_endpoint(&self, endpoint: DataApiEndpoint) -> Self {
        Self {
            endpoint,
            ..self.clone()
        }
    }

    /// Run `command` and return the parsed response
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when no HTTP options are configured
    /// - [`Error::InvalidUrl`] when the endpoint is malformed
    /// - [`Error::Transport`] / [`Error::RetriesExhausted`] when no usable
    ///   response was obtained
    /// - [`Error::DataApi`] when the response reports errors
    /// - [`Error::Http`] for other non-2xx responses
    /// - [`Error::Serialization`] when the command or response cannot be
    ///   converted
    #[tracing::instrument(skip_all, fields(command = %command.name()))]
    pub async fn run<P>(
        &self,
        command: &Command<P>,
        overrides: Option<&CommandOptions>,
    ) -> Result<DataApiResponse>
    where
        P: Serialize + Sync,
    {
        let client = self.resolve_client(overrides)?;
        let observers = self.resolve_observers(overrides);
        let serializer = self.resolve_serializer(overrides);

        let builder =
            ExecutionInfo::builder(command.name(), Value::Null).serializer(serializer.config());
        let (builder, result) = self
            .execute(&client, command, overrides, serializer, builder)
            .await;

        let info = match &result {
            Ok(_) => builder.build(),
            Err(e) => builder.error(e.clone()).build(),
        };

        if let Some(metrics) = &self.metrics {
            let outcome = if info.is_success() { "success" } else { "error" };
            metrics.record_command(
                command.name(),
                outcome,
                info.execution_time().as_secs_f64(),
                info.attempts(),
            );
            if let Some(error) = info.error() {
                metrics.record_error(command.name(), error.kind().as_str());
            }
        }

        if let Some(handle) = observers.notify(Arc::new(info)) {
            let mut pending = self.pending.lock().await;
            pending.retain(|handle| !handle.is_finished());
            pending.push(handle);
        }

        result
    }

    /// Run `command` and map the returned payload to `T`
    ///
    /// The payload is `data.document`, else `data.documents` as an array,
    /// else, when the response has no `data`, the `status` object.
    ///
    /// # Errors
    ///
    /// Everything [`run`](Self::run) returns, plus [`Error::State`] when
    /// `data` holds neither a document nor a document list.
    pub async fn run_as<T, P>(&self, command: &Command<P>, overrides: Option<&CommandOptions>) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + Sync,
    {
        let serializer = self.resolve_serializer(overrides);
        let response = self.run(command, overrides).await?;

        let payload = match response.data {
            Some(data) => match (data.document, data.documents) {
                (Some(document), _) => document,
                (None, Some(documents)) => Value::Array(documents),
                (None, None) => {
                    return Err(Error::State(format!(
                        "response to '{}' has data but neither document nor documents",
                        command.name()
                    )));
                }
            },
            None => Value::Object(response.status.unwrap_or_default()),
        };

        serializer.unmarshall_value(payload)
    }

    /// Wait for every observer notification started so far
    pub async fn drain(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().await);
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Observer notification did not complete");
            }
        }
    }

    fn resolve_client(&self, overrides: Option<&CommandOptions>) -> Result<Arc<RetryHttpClient>> {
        let base = self
            .shared
            .get()
            .map(|client| client.options())
            .or_else(|| self.options.http_client_options());

        if let Some(requested) = overrides.and_then(CommandOptions::http_client_options) {
            if base != Some(requested) {
                tracing::debug!("Building one-off transport for overridden HTTP options");
                let transport = self.factory.create(requested)?;
                return Ok(Arc::new(RetryHttpClient::new(transport, requested.clone())));
            }
        }

        let options = base.cloned().ok_or_else(|| {
            Error::configuration("transport required: no HTTP client options configured")
        })?;
        self.shared
            .get_or_try_init(|| {
                tracing::debug!(max_attempts = options.max_attempts, "Building shared transport");
                let transport = self.factory.create(&options)?;
                Ok::<_, Error>(Arc::new(RetryHttpClient::new(transport, options.clone())))
            })
            .cloned()
    }

    fn resolve_observers(&self, overrides: Option<&CommandOptions>) -> ObserverRegistry {
        match overrides {
            Some(overrides) => self.options.observers().union(overrides.observers()),
            None => self.options.observers().clone(),
        }
    }

    fn resolve_serializer(&self, overrides: Option<&CommandOptions>) -> Serializer {
        overrides
            .and_then(CommandOptions::serializer)
            .or_else(|| self.options.serializer())
            .unwrap_or(self.serializer)
    }

    async fn execute<P: Serialize + Sync>(
        &self,
        client: &RetryHttpClient,
        command: &Command<P>,
        overrides: Option<&CommandOptions>,
        serializer: Serializer,
        mut builder: ExecutionInfoBuilder,
    ) -> (ExecutionInfoBuilder, Result<DataApiResponse>) {
        let document = attempt!(builder, serializer.marshall_value(command));
        builder = builder.command(document.clone());
        let body = attempt!(builder, serde_json::to_string(&document).map_err(Error::from));

        let url = attempt!(builder, self.endpoint.url());
        builder = builder.request_url(url.clone());

        let request = HttpRequest {
            url,
            headers: self.request_headers(client, overrides),
            body,
            timeout: client.options().response_timeout,
        };
        builder = builder.request_headers(request.headers.clone());
        attempt!(builder, request.header_map());

        tracing::debug!(url = %request.url, "Sending command");
        let outcome = client.execute(&request).await;
        builder = builder.attempts(outcome.attempts);
        let response = attempt!(builder, outcome.result);
        builder = builder.http_response(response.to_exchange());

        let parsed = match serializer.unmarshall::<DataApiResponse>(&response.body) {
            Ok(parsed) => parsed,
            Err(_) if !response.is_success() => {
                let error = Error::Http {
                    status: response.status,
                    body: response.body,
                };
                return (builder, Err(error));
            }
            Err(e) => return (builder, Err(e)),
        };

        if parsed.has_errors() {
            for descriptor in parsed.errors() {
                tracing::error!(command = command.name(), error = %descriptor, "Data API returned an error");
            }
            builder = builder.response(parsed);
            let info = Arc::new(builder.clone().build());
            return (builder, Err(Error::DataApi(info)));
        }

        if !response.is_success() {
            builder = builder.response(parsed);
            let error = Error::Http {
                status: response.status,
                body: response.body,
            };
            return (builder, Err(error));
        }

        for warning in parsed.warnings() {
            tracing::warn!(command = command.name(), warning = %warning, "Data API returned a warning");
            if let Some(metrics) = &self.metrics {
                metrics.record_warning(command.name());
            }
        }

        builder = builder.response(parsed.clone());
        (builder, Ok(parsed))
    }

    fn request_headers(
        &self,
        client: &RetryHttpClient,
        overrides: Option<&CommandOptions>,
    ) -> Vec<(String, String)> {
        let user_agent = client.options().user_agent();
        let mut sent = vec![
            (headers::CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string()),
            (headers::ACCEPT.to_string(), APPLICATION_JSON.to_string()),
            (headers::REQUEST_ID.to_string(), uuid::Uuid::new_v4().to_string()),
            (headers::USER_AGENT.to_string(), user_agent.clone()),
            (headers::REQUESTED_WITH.to_string(), user_agent),
        ];

        let token = overrides
            .and_then(CommandOptions::token)
            .or_else(|| self.options.token());
        if let Some(token) = token {
            sent.push((headers::AUTHORIZATION.to_string(), format!("Bearer {}", token)));
            sent.push((headers::TOKEN.to_string(), token.to_string()));
        }

        let layers = std::iter::once(self.options.as_ref()).chain(overrides);
        for layer in layers.clone() {
            if let Some(provider) = layer.embedding_auth() {
                sent.extend(provider.headers());
            }
        }

        let mut database = BTreeMap::new();
        let mut admin = BTreeMap::new();
        for layer in layers {
            database.extend(layer.database_headers().clone());
            admin.extend(layer.admin_headers().clone());
        }
        sent.extend(database);
        sent.extend(admin);
        sent
    }
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("serializer", &self.serializer)
            .field("transport_ready", &self.shared.get().is_some())
            .finish()
    }
}
