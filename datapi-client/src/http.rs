//! HTTP transport seam
//!
//! The runner never talks to `reqwest` directly. It hands an [`HttpRequest`]
//! to an [`HttpTransport`], which performs exactly one exchange; retries are
//! layered on top by [`RetryHttpClient`](crate::RetryHttpClient).
//!
//! Transports are created from [`HttpClientOptions`] through a
//! [`TransportFactory`], so tests can substitute scripted transports while
//! production code uses [`ReqwestTransportFactory`].

use crate::options::HttpClientOptions;
use async_trait::async_trait;
use datapi_core::{Error, HttpExchange, Result, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// One outbound POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Target URL
    pub url: String,
    /// Headers in the order they are sent; names may repeat
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: String,
    /// Time allowed for the exchange
    pub timeout: Duration,
}

impl HttpRequest {
    /// First header with this name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Convert the headers for `reqwest`
    ///
    /// Fails with a configuration error on a name or value HTTP does not
    /// allow.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::configuration(format!("invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::configuration(format!("invalid value for header '{}': {}", name, e)))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }
}

/// Response of one exchange, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Body text
    pub body: String,
}

impl HttpResponse {
    /// Response with a status and body and no headers
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Copy into the record kept by [`ExecutionInfo`](datapi_core::ExecutionInfo)
    pub fn to_exchange(&self) -> HttpExchange {
        HttpExchange {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Performs a single HTTP exchange
///
/// Any response, including 4xx and 5xx, is `Ok`; `Err` means no response was
/// obtained.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and wait for the complete response
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Creates transports for a set of HTTP options
pub trait TransportFactory: Send + Sync {
    /// Build a transport honouring `options`
    fn create(&self, options: &HttpClientOptions) -> Result<Arc<dyn HttpTransport>>;
}

/// Transport backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with the connect timeout, user agent and proxy of `options`
    pub fn new(options: &HttpClientOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent());

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| Error::configuration(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let headers = request
            .header_map()
            .map_err(|e| TransportError::other(e.to_string()))?;

        let response = self
            .client
            .post(&request.url)
            .headers(headers)
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.map_err(classify)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        TransportError::connect(err.to_string())
    } else {
        TransportError::other(err.to_string())
    }
}

/// Factory producing [`ReqwestTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransportFactory;

impl TransportFactory for ReqwestTransportFactory {
    fn create(&self, options: &HttpClientOptions) -> Result<Arc<dyn HttpTransport>> {
        Ok(Arc::new(ReqwestTransport::new(options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: Vec<(&str, &str)>) -> HttpRequest {
        HttpRequest {
            url: "http://localhost:8181/api/json/v1".into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: "{}".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = request(vec![("Content-Type", "application/json")]);
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("Accept"), None);
    }

    #[test]
    fn test_header_map_keeps_repeated_names() {
        let req = request(vec![("x-embedding-api-key", "a"), ("x-embedding-api-key", "b")]);
        let map = req.header_map().unwrap();
        assert_eq!(map.get_all("x-embedding-api-key").iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let err = request(vec![("bad header", "x")]).header_map().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = request(vec![("X-Ok", "line\nbreak")]).header_map().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_response_helpers() {
        let ok = HttpResponse::new(200, r#"{"status":{}}"#);
        assert!(ok.is_success());
        assert_eq!(ok.to_exchange().body, r#"{"status":{}}"#);
        assert!(!HttpResponse::new(503, "").is_success());
    }

    #[test]
    fn test_factory_builds_transport() {
        assert!(ReqwestTransportFactory.create(&HttpClientOptions::default()).is_ok());
    }
}
