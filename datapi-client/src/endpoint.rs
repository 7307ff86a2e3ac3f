//! Data API endpoint URLs
//!
//! Commands are posted to `<base>/api/json/<version>` for database level
//! commands, with `/<keyspace>` appended for keyspace commands and
//! `/<keyspace>/<collection>` for collection and table commands.

use datapi_core::{Error, Result};

/// Default API version path segment
pub const DEFAULT_API_VERSION: &str = "v1";

/// Where commands are posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataApiEndpoint {
    base_url: String,
    api_version: String,
    keyspace: Option<String>,
    collection: Option<String>,
}

impl DataApiEndpoint {
    /// Endpoint of the database at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            keyspace: None,
            collection: None,
        }
    }

    /// Override the API version segment
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Target a keyspace
    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Target a collection or table of the keyspace
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Database base URL as configured
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Keyspace, if any
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// Collection or table, if any
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Full URL commands are posted to
    ///
    /// The collection segment is only used together with a keyspace.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] when the result is not an absolute http(s) URL.
    pub fn url(&self) -> Result<String> {
        let mut url = format!(
            "{}/api/json/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version
        );
        if let Some(keyspace) = &self.keyspace {
            url.push('/');
            url.push_str(keyspace);
            if let Some(collection) = &self.collection {
                url.push('/');
                url.push_str(collection);
            }
        }

        let parsed = reqwest::Url::parse(&url).map_err(|e| Error::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::InvalidUrl {
                url,
                reason: format!("unsupported scheme '{}'", scheme),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url() {
        let endpoint = DataApiEndpoint::new("http://localhost:8181/");
        assert_eq!(endpoint.url().unwrap(), "http://localhost:8181/api/json/v1");
    }

    #[test]
    fn test_collection_url() {
        let endpoint = DataApiEndpoint::new("https://db-id-region.apps.astra.datastax.com")
            .with_keyspace("default_keyspace")
            .with_collection("movies");
        assert_eq!(
            endpoint.url().unwrap(),
            "https://db-id-region.apps.astra.datastax.com/api/json/v1/default_keyspace/movies"
        );
    }

    #[test]
    fn test_collection_requires_keyspace() {
        let endpoint = DataApiEndpoint::new("http://localhost:8181")
            .with_api_version("v2")
            .with_collection("movies");
        assert_eq!(endpoint.url().unwrap(), "http://localhost:8181/api/json/v2");
    }

    #[test]
    fn test_invalid_urls() {
        let err = DataApiEndpoint::new("not a url").url().unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));

        let err = DataApiEndpoint::new("ftp://localhost").url().unwrap_err();
        match err {
            Error::InvalidUrl { reason, .. } => assert!(reason.contains("ftp")),
            other => panic!("Expected InvalidUrl, got {:?}", other),
        }
    }
}
