//! Common test utilities for datapi-client integration tests
//!
//! This module provides a scripted transport and helpers for testing the
//! runner without a Data API server.

#![allow(dead_code)]

use async_trait::async_trait;
use datapi_client::{
    CommandObserver, CommandOptions, CommandRunner, DataApiEndpoint, HttpClientOptions,
    HttpRequest, HttpResponse, HttpTransport, RunnerBuilder, TransportFactory,
};
use datapi_core::{ExecutionInfo, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport replaying a script of responses
///
/// Every request is recorded. Once the script is exhausted it answers
/// `200 {"status":{}}`.
pub struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Transport with an empty script
    pub fn new() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    /// Transport answering with `script`, in order
    pub fn with_script(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Append one scripted outcome
    pub fn push(&self, outcome: Result<HttpResponse, TransportError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Most recent request
    pub fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request received")
    }

    /// Body of the most recent request as JSON
    pub fn last_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.last_request().body).expect("request body is JSON")
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ok(r#"{"status":{}}"#)))
    }
}

/// Factory handing out one shared [`MockTransport`] and counting calls
pub struct CountingFactory {
    pub transport: Arc<MockTransport>,
    created: AtomicUsize,
    seen: Mutex<Vec<HttpClientOptions>>,
}

impl CountingFactory {
    pub fn new(transport: Arc<MockTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            created: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Number of transports created
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Options passed to each creation
    pub fn seen(&self) -> Vec<HttpClientOptions> {
        self.seen.lock().unwrap().clone()
    }
}

impl TransportFactory for CountingFactory {
    fn create(&self, options: &HttpClientOptions) -> datapi_core::Result<Arc<dyn HttpTransport>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(options.clone());
        Ok(self.transport.clone())
    }
}

/// 200 response with `body`
pub fn ok(body: &str) -> HttpResponse {
    HttpResponse::new(200, body)
}

/// Response with an arbitrary status
pub fn status(code: u16, body: &str) -> HttpResponse {
    HttpResponse::new(code, body)
}

/// Collection endpoint used by the tests
pub fn endpoint() -> DataApiEndpoint {
    DataApiEndpoint::new("http://localhost:8181")
        .with_keyspace("default_keyspace")
        .with_collection("movies")
}

/// HTTP options retrying quickly
pub fn fast_http(max_attempts: u32) -> HttpClientOptions {
    HttpClientOptions::default()
        .with_max_attempts(max_attempts)
        .with_retry_delay(Duration::from_millis(1))
}

/// Runner whose shared transport is `transport`
pub fn runner(transport: &Arc<MockTransport>, options: CommandOptions) -> CommandRunner {
    RunnerBuilder::new(endpoint())
        .with_options(options)
        .with_transport(transport.clone())
        .build()
}

/// Observer keeping a copy of every record it receives
pub fn recorder() -> (Arc<Mutex<Vec<ExecutionInfo>>>, Arc<dyn CommandObserver>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: Arc<dyn CommandObserver> = Arc::new(move |info: &ExecutionInfo| {
        sink.lock().unwrap().push(info.clone());
    });
    (seen, observer)
}

/// Observer counting its invocations
pub fn counter() -> (Arc<AtomicUsize>, Arc<dyn CommandObserver>) {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&count);
    let observer: Arc<dyn CommandObserver> = Arc::new(move |_: &ExecutionInfo| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    (count, observer)
}
