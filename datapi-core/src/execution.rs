//! Execution records
//!
//! Every run of a command produces one [`ExecutionInfo`]: what was sent,
//! where, with which headers and serializer settings, what came back, and how
//! long it took. The record is immutable once built and is shared through an
//! `Arc` between observers and, for application errors, the returned
//! [`Error::DataApi`].
//!
//! Records are assembled with [`ExecutionInfoBuilder`]. The builder captures
//! the start time when created, so `build()` measures the whole execution.

use crate::codec::SerdesConfig;
use crate::error::Error;
use crate::types::DataApiResponse;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Raw HTTP exchange as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExchange {
    /// Status code
    pub status: u16,
    /// Response headers, in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: String,
}

/// Immutable snapshot of one command execution
#[derive(Debug, Clone)]
pub struct ExecutionInfo {
    command_name: String,
    command: Value,
    serializer: SerdesConfig,
    request_url: Option<String>,
    request_headers: Vec<(String, String)>,
    http_response: Option<HttpExchange>,
    response: Option<DataApiResponse>,
    error: Option<Error>,
    attempts: u32,
    execution_date: DateTime<Utc>,
    execution_time: Duration,
}

impl ExecutionInfo {
    /// Start recording the execution of `command_name`
    ///
    /// `command` is the JSON document as sent on the wire.
    pub fn builder(command_name: impl Into<String>, command: Value) -> ExecutionInfoBuilder {
        ExecutionInfoBuilder {
            command_name: command_name.into(),
            command,
            serializer: SerdesConfig::default(),
            request_url: None,
            request_headers: Vec::new(),
            http_response: None,
            response: None,
            error: None,
            attempts: 0,
            execution_date: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Operation name, e.g. `findOne`
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    /// Command document as sent
    pub fn command(&self) -> &Value {
        &self.command
    }

    /// Serializer configuration used for this execution
    pub fn serializer(&self) -> SerdesConfig {
        self.serializer
    }

    /// Target URL, absent when the URL could not be built
    pub fn request_url(&self) -> Option<&str> {
        self.request_url.as_deref()
    }

    /// Outbound headers, in insertion order
    pub fn request_headers(&self) -> &[(String, String)] {
        &self.request_headers
    }

    /// First outbound header with this name, ignoring case
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every outbound value of this header, ignoring case
    pub fn request_header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.request_headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Raw HTTP exchange, absent when no response was received
    pub fn http_response(&self) -> Option<&HttpExchange> {
        self.http_response.as_ref()
    }

    /// Parsed response envelope
    pub fn response(&self) -> Option<&DataApiResponse> {
        self.response.as_ref()
    }

    /// Error the execution ended with
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the execution succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// HTTP attempts made by the transport
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wall clock time the execution started
    pub fn execution_date(&self) -> DateTime<Utc> {
        self.execution_date
    }

    /// Time from start of the execution to the moment the record was built
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }
}

/// Builder for [`ExecutionInfo`]
#[derive(Debug, Clone)]
pub struct ExecutionInfoBuilder {
    command_name: String,
    command: Value,
    serializer: SerdesConfig,
    request_url: Option<String>,
    request_headers: Vec<(String, String)>,
    http_response: Option<HttpExchange>,
    response: Option<DataApiResponse>,
    error: Option<Error>,
    attempts: u32,
    execution_date: DateTime<Utc>,
    started: Instant,
}

impl ExecutionInfoBuilder {
    /// Replace the recorded command document
    pub fn command(mut self, command: Value) -> Self {
        self.command = command;
        self
    }

    /// Serializer configuration used
    pub fn serializer(mut self, config: SerdesConfig) -> Self {
        self.serializer = config;
        self
    }

    /// Target URL
    pub fn request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }

    /// Replace the recorded outbound headers
    pub fn request_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.request_headers = headers;
        self
    }

    /// Append one outbound header
    pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    /// Raw HTTP exchange
    pub fn http_response(mut self, exchange: HttpExchange) -> Self {
        self.http_response = Some(exchange);
        self
    }

    /// Parsed response
    pub fn response(mut self, response: DataApiResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Terminal error
    pub fn error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// HTTP attempts made
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Freeze the record
    pub fn build(self) -> ExecutionInfo {
        ExecutionInfo {
            command_name: self.command_name,
            command: self.command,
            serializer: self.serializer,
            request_url: self.request_url,
            request_headers: self.request_headers,
            http_response: self.http_response,
            response: self.response,
            error: self.error,
            attempts: self.attempts,
            execution_date: self.execution_date,
            execution_time: self.started.elapsed(),
        }
    }
}
