//! Environment based configuration
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `DATA_API_ENDPOINT` | database base URL | required |
//! | `DATA_API_TOKEN` | bearer token | none |
//! | `DATA_API_KEYSPACE` | keyspace | none |
//! | `DATA_API_VERSION` | API version segment | `v1` |
//! | `DATA_API_MAX_ATTEMPTS` | attempts per request | 3 |
//! | `DATA_API_RETRY_DELAY_MS` | delay between attempts | 100 |
//! | `DATA_API_RESPONSE_TIMEOUT_MS` | response timeout | 30000 |

use crate::endpoint::{DataApiEndpoint, DEFAULT_API_VERSION};
use crate::options::{CommandOptions, HttpClientOptions};
use crate::runner::CommandRunner;
use crate::runner_builder::RunnerBuilder;
use datapi_core::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

/// Connection settings of a runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Database base URL
    pub endpoint: String,
    /// Bearer token
    pub token: Option<String>,
    /// Keyspace commands target
    pub keyspace: Option<String>,
    /// API version segment
    pub api_version: String,
    /// Transport settings
    pub http: HttpClientOptions,
}

impl ClientConfig {
    /// Settings for `endpoint` with default transport options
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            keyspace: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            http: HttpClientOptions::default(),
        }
    }

    /// Read the `DATA_API_*` variables
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when the endpoint is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let endpoint = lookup("DATA_API_ENDPOINT")
            .ok_or_else(|| Error::configuration("DATA_API_ENDPOINT is not set"))?;

        let mut config = Self::new(endpoint);
        config.token = lookup("DATA_API_TOKEN");
        config.keyspace = lookup("DATA_API_KEYSPACE");
        if let Some(version) = lookup("DATA_API_VERSION") {
            config.api_version = version;
        }
        if let Some(attempts) = parse::<u32>(&lookup, "DATA_API_MAX_ATTEMPTS")? {
            config.http = config.http.with_max_attempts(attempts);
        }
        if let Some(delay) = parse::<u64>(&lookup, "DATA_API_RETRY_DELAY_MS")? {
            config.http = config.http.with_retry_delay(Duration::from_millis(delay));
        }
        if let Some(timeout) = parse::<u64>(&lookup, "DATA_API_RESPONSE_TIMEOUT_MS")? {
            config.http = config.http.with_response_timeout(Duration::from_millis(timeout));
        }
        Ok(config)
    }

    /// Set the token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the keyspace
    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Endpoint described by these settings
    pub fn endpoint(&self) -> DataApiEndpoint {
        let endpoint = DataApiEndpoint::new(self.endpoint.clone()).with_api_version(self.api_version.clone());
        match &self.keyspace {
            Some(keyspace) => endpoint.with_keyspace(keyspace.clone()),
            None => endpoint,
        }
    }

    /// Base command options described by these settings
    pub fn command_options(&self) -> CommandOptions {
        let options = CommandOptions::new().with_http_client_options(self.http.clone());
        match &self.token {
            Some(token) => options.with_token(token.clone()),
            None => options,
        }
    }

    /// Runner using a `reqwest` transport
    pub fn runner(&self) -> CommandRunner {
        RunnerBuilder::new(self.endpoint())
            .with_options(self.command_options())
            .build()
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::configuration(format!("invalid {} '{}': {}", name, raw, e)))
        })
        .transpose()
}
