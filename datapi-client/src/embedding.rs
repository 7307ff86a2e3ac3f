//! Credentials for server side embedding providers
//!
//! Collections with a `$vectorize` service call an external embedding
//! provider on the caller's behalf. The provider credentials travel as extra
//! request headers supplied by an [`EmbeddingHeadersProvider`].

use std::fmt;

/// Header carrying an embedding provider API key
pub const EMBEDDING_API_KEY_HEADER: &str = "x-embedding-api-key";
/// Header carrying an AWS access key id
pub const EMBEDDING_ACCESS_ID_HEADER: &str = "x-embedding-access-id";
/// Header carrying an AWS secret access key
pub const EMBEDDING_SECRET_ID_HEADER: &str = "x-embedding-secret-id";

/// Source of embedding authentication headers
pub trait EmbeddingHeadersProvider: Send + Sync + fmt::Debug {
    /// Headers to add to every request
    fn headers(&self) -> Vec<(String, String)>;
}

/// Single API key, as used by most providers
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddingApiKey {
    api_key: String,
}

impl EmbeddingApiKey {
    /// Wrap an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for EmbeddingApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingApiKey")
            .field("api_key", &"***")
            .finish()
    }
}

impl EmbeddingHeadersProvider for EmbeddingApiKey {
    fn headers(&self) -> Vec<(String, String)> {
        vec![(EMBEDDING_API_KEY_HEADER.to_string(), self.api_key.clone())]
    }
}

/// Access key pair for AWS Bedrock
#[derive(Clone, PartialEq, Eq)]
pub struct AwsEmbeddingHeaders {
    access_id: String,
    secret_id: String,
}

impl AwsEmbeddingHeaders {
    /// Wrap an access key id and its secret
    pub fn new(access_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            secret_id: secret_id.into(),
        }
    }
}

impl fmt::Debug for AwsEmbeddingHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsEmbeddingHeaders")
            .field("access_id", &self.access_id)
            .field("secret_id", &"***")
            .finish()
    }
}

impl EmbeddingHeadersProvider for AwsEmbeddingHeaders {
    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (EMBEDDING_ACCESS_ID_HEADER.to_string(), self.access_id.clone()),
            (EMBEDDING_SECRET_ID_HEADER.to_string(), self.secret_id.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_headers() {
        let headers = EmbeddingApiKey::new("sk-123").headers();
        assert_eq!(headers, vec![("x-embedding-api-key".to_string(), "sk-123".to_string())]);
    }

    #[test]
    fn test_aws_headers() {
        let headers = AwsEmbeddingHeaders::new("AKIA", "secret").headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, EMBEDDING_ACCESS_ID_HEADER);
        assert_eq!(headers[1].1, "secret");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let debug = format!("{:?}", AwsEmbeddingHeaders::new("AKIA", "secret"));
        assert!(debug.contains("AKIA"));
        assert!(!debug.contains("secret\""));
        assert!(!format!("{:?}", EmbeddingApiKey::new("sk-123")).contains("sk-123"));
    }
}
