//! Command and transport options
//!
//! [`CommandOptions`] is the layered configuration bag consumed by the
//! [`CommandRunner`](crate::CommandRunner). The runner holds one set of base
//! options; each call may pass overrides, merged field by field:
//!
//! - a present override replaces the base value (HTTP options, token,
//!   serializer)
//! - database and admin headers merge, the override winning on collision
//! - embedding headers from both layers are sent
//! - observers are unioned by name, base first
//!
//! # Examples
//!
//! ```rust
//! use datapi_client::{Backoff, CommandOptions, HttpClientOptions};
//! use std::time::Duration;
//!
//! let options = CommandOptions::new()
//!     .with_token("AstraCS:...")
//!     .with_http_client_options(
//!         HttpClientOptions::default()
//!             .with_max_attempts(5)
//!             .with_backoff(Backoff::exponential(Duration::from_secs(2))),
//!     )
//!     .enable_feature_flag_tables();
//!
//! assert_eq!(options.token(), Some("AstraCS:..."));
//! assert_eq!(
//!     options.database_headers().get("Feature-Flag-tables").map(String::as_str),
//!     Some("true")
//! );
//! ```

use crate::embedding::{EmbeddingApiKey, EmbeddingHeadersProvider};
use crate::observer::{CommandObserver, ObserverRegistry};
use crate::retry::{ExponentialBackoff, FixedDelay, RetryPolicy};
use datapi_core::Serializer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Name reported in the user agent for this library
pub const CLIENT_NAME: &str = "datapi";

/// Prefix of feature flag headers
pub const FEATURE_FLAG_PREFIX: &str = "Feature-Flag-";

/// Delay growth between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Wait `retry_delay` between every attempt
    #[default]
    Fixed,
    /// Double the delay after each failure, up to `max_delay`
    Exponential {
        /// Upper bound of a single delay
        max_delay: Duration,
        /// Add up to 25% random jitter
        jitter: bool,
    },
}

impl Backoff {
    /// Exponential backoff with jitter
    pub fn exponential(max_delay: Duration) -> Self {
        Backoff::Exponential {
            max_delay,
            jitter: true,
        }
    }
}

/// Application component reported in the user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Component name
    pub name: String,
    /// Component version
    pub version: Option<String>,
}

impl Caller {
    /// Create a caller entry
    pub fn new(name: impl Into<String>, version: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            version: version.map(Into::into),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Settings of the HTTP transport
///
/// Two runs whose options compare equal share a transport; an override that
/// compares different gets its own for that call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientOptions {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub retry_delay: Duration,
    /// How the delay grows
    pub backoff: Backoff,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// Time allowed for one complete exchange
    pub response_timeout: Duration,
    /// Proxy URL applied to all schemes
    pub proxy: Option<String>,
    /// User agent components, most specific first
    pub callers: Vec<Caller>,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
            backoff: Backoff::Fixed,
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(30),
            proxy: None,
            callers: Vec::new(),
        }
    }
}

impl HttpClientOptions {
    /// Set the total number of attempts (at least one is always made)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the base retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the backoff
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Route requests through a proxy
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Add a user agent component
    pub fn with_caller(mut self, name: impl Into<String>, version: Option<&str>) -> Self {
        self.callers.push(Caller::new(name, version));
        self
    }

    /// User agent: callers followed by `datapi/<version>`
    pub fn user_agent(&self) -> String {
        self.callers
            .iter()
            .map(ToString::to_string)
            .chain(std::iter::once(format!(
                "{}/{}",
                CLIENT_NAME,
                env!("CARGO_PKG_VERSION")
            )))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Retry policy described by these options
    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        match self.backoff {
            Backoff::Fixed => Arc::new(FixedDelay::new(self.retry_delay, self.max_attempts)),
            Backoff::Exponential { max_delay, jitter } => Arc::new(
                ExponentialBackoff::new(self.retry_delay, max_delay, self.max_attempts)
                    .with_jitter(jitter),
            ),
        }
    }
}

/// Layered per-runner and per-call options
#[derive(Clone, Default)]
pub struct CommandOptions {
    http_client_options: Option<HttpClientOptions>,
    embedding_auth: Option<Arc<dyn EmbeddingHeadersProvider>>,
    database_headers: BTreeMap<String, String>,
    admin_headers: BTreeMap<String, String>,
    observers: ObserverRegistry,
    token: Option<String>,
    serializer: Option<Serializer>,
}

impl CommandOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with default HTTP settings
    pub fn with_default_http() -> Self {
        Self::default().with_http_client_options(HttpClientOptions::default())
    }

    /// Set the HTTP transport settings
    pub fn with_http_client_options(mut self, options: HttpClientOptions) -> Self {
        self.http_client_options = Some(options);
        self
    }

    /// Set the embedding credentials provider
    pub fn with_embedding_auth(mut self, provider: Arc<dyn EmbeddingHeadersProvider>) -> Self {
        self.embedding_auth = Some(provider);
        self
    }

    /// Shorthand for [`EmbeddingApiKey`] credentials
    pub fn with_embedding_api_key(self, api_key: impl Into<String>) -> Self {
        self.with_embedding_auth(Arc::new(EmbeddingApiKey::new(api_key)))
    }

    /// Add a database level header
    pub fn with_database_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.database_headers.insert(name.into(), value.into());
        self
    }

    /// Add an admin level header
    pub fn with_admin_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.admin_headers.insert(name.into(), value.into());
        self
    }

    /// Turn a server feature on or off with a `Feature-Flag-<name>` header
    pub fn feature_flag(self, name: &str, enabled: bool) -> Self {
        self.with_database_header(format!("{}{}", FEATURE_FLAG_PREFIX, name), enabled.to_string())
    }

    /// Enable the tables API on servers where it is still gated
    pub fn enable_feature_flag_tables(self) -> Self {
        self.feature_flag("tables", true)
    }

    /// Register an observer under `name`, replacing any previous one
    pub fn with_observer(mut self, name: impl Into<String>, observer: Arc<dyn CommandObserver>) -> Self {
        self.observers.register(name, observer);
        self
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use this serializer for commands run with these options
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// HTTP transport settings
    pub fn http_client_options(&self) -> Option<&HttpClientOptions> {
        self.http_client_options.as_ref()
    }

    /// Embedding credentials provider
    pub fn embedding_auth(&self) -> Option<&Arc<dyn EmbeddingHeadersProvider>> {
        self.embedding_auth.as_ref()
    }

    /// Database level headers
    pub fn database_headers(&self) -> &BTreeMap<String, String> {
        &self.database_headers
    }

    /// Admin level headers
    pub fn admin_headers(&self) -> &BTreeMap<String, String> {
        &self.admin_headers
    }

    /// Registered observers
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Bearer token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Serializer override
    pub fn serializer(&self) -> Option<Serializer> {
        self.serializer
    }
}

impl fmt::Debug for CommandOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandOptions")
            .field("http_client_options", &self.http_client_options)
            .field("embedding_auth", &self.embedding_auth)
            .field("database_headers", &self.database_headers)
            .field("admin_headers", &self.admin_headers)
            .field("observers", &self.observers)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("serializer", &self.serializer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datapi_core::ExecutionInfo;

    #[test]
    fn test_http_defaults() {
        let options = HttpClientOptions::default();
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.retry_delay, Duration::from_millis(100));
        assert_eq!(options.backoff, Backoff::Fixed);
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.response_timeout, Duration::from_secs(30));
        assert!(options.proxy.is_none());
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(HttpClientOptions::default().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_user_agent() {
        let plain = HttpClientOptions::default().user_agent();
        assert_eq!(plain, format!("datapi/{}", env!("CARGO_PKG_VERSION")));

        let agent = HttpClientOptions::default()
            .with_caller("langchain", Some("0.3.1"))
            .with_caller("my-app", None)
            .user_agent();
        assert!(agent.starts_with("langchain/0.3.1 my-app datapi/"));
    }

    #[test]
    fn test_options_equality_drives_sharing() {
        let base = HttpClientOptions::default();
        assert_eq!(base, HttpClientOptions::default());
        assert_ne!(base, HttpClientOptions::default().with_max_attempts(5));
        assert_ne!(
            base,
            HttpClientOptions::default().with_backoff(Backoff::exponential(Duration::from_secs(1)))
        );
    }

    #[test]
    fn test_retry_policy_follows_backoff() {
        let fixed = HttpClientOptions::default().retry_policy();
        assert_eq!(fixed.max_attempts(), 3);
        assert_eq!(fixed.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(fixed.next_delay(2), Some(Duration::from_millis(100)));
        assert_eq!(fixed.next_delay(3), None);

        let exponential = HttpClientOptions::default()
            .with_backoff(Backoff::Exponential {
                max_delay: Duration::from_millis(150),
                jitter: false,
            })
            .retry_policy();
        assert_eq!(exponential.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(exponential.next_delay(2), Some(Duration::from_millis(150)));
    }

    #[test]
    fn test_feature_flags() {
        let options = CommandOptions::new()
            .enable_feature_flag_tables()
            .feature_flag("lexical", false);
        assert_eq!(
            options.database_headers().get("Feature-Flag-tables").map(String::as_str),
            Some("true")
        );
        assert_eq!(
            options.database_headers().get("Feature-Flag-lexical").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn test_builder_accessors() {
        let options = CommandOptions::with_default_http()
            .with_token("tok")
            .with_embedding_api_key("sk")
            .with_admin_header("X-Admin", "1")
            .with_serializer(Serializer::default().with_omit_nulls(false))
            .with_observer("noop", Arc::new(|_: &ExecutionInfo| {}));

        assert!(options.http_client_options().is_some());
        assert_eq!(options.token(), Some("tok"));
        assert!(options.embedding_auth().is_some());
        assert_eq!(options.admin_headers().len(), 1);
        assert!(!options.serializer().map(|s| s.config().omit_nulls).unwrap_or(true));
        assert!(options.observers().contains("noop"));
    }

    #[test]
    fn test_debug_hides_token() {
        let debug = format!("{:?}", CommandOptions::new().with_token("secret-token"));
        assert!(!debug.contains("secret-token"));
    }
}
