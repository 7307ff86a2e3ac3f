//! Core Data API types and serializer for datapi
//!
//! This crate holds everything about the Data API that does not need a
//! network connection:
//!
//! - **Types**: the command envelope and the `{status, data, errors}` response
//! - **Codec**: the [`Serializer`] and its [`SerdesConfig`]
//! - **Domain values**: vectors, durations, dates, blobs, identifiers and
//!   schema enumerations with their wire forms
//! - **Errors**: the [`Error`] taxonomy shared by every datapi crate
//! - **Execution records**: the [`ExecutionInfo`] snapshot of one command
//! - **Observability**: `tracing` and OpenTelemetry setup
//!
//! The `datapi-client` crate builds the command runner on top of it.
//!
//! # Example
//!
//! ```rust
//! use datapi_core::{Command, DataApiResponse, DataApiVector, Serializer};
//! use serde_json::json;
//!
//! let serializer = Serializer::default();
//!
//! let vector = serializer.marshall_value(&DataApiVector::from(vec![1.0f32])).unwrap();
//! let command = Command::new("insertOne")
//!     .with("document", json!({"_id": "1", "$vector": vector}));
//! let body = serializer.marshall(&command).unwrap();
//! assert!(body.starts_with(r#"{"insertOne":{"document":"#));
//! assert!(body.contains(r#""$vector":{"$binary":"P4AAAA=="}"#));
//!
//! let response: DataApiResponse = serializer
//!     .unmarshall(r#"{"status":{"insertedIds":["1"]}}"#)
//!     .unwrap();
//! assert!(!response.has_errors());
//! ```

pub mod binary;
pub mod codec;
pub mod column;
pub mod error;
pub mod execution;
pub mod ids;
mod lenient;
pub mod observability;
pub mod temporal;
pub mod types;
pub mod vector;

pub use binary::Blob;
pub use codec::{DurationEncoding, SerdesConfig, Serializer, VectorEncoding};
pub use column::{ColumnType, SimilarityMetric};
pub use error::{Error, ErrorKind, Result, TransportError, TransportErrorKind};
pub use execution::{ExecutionInfo, ExecutionInfoBuilder, HttpExchange};
pub use ids::{DataApiUuid, DocumentId, ObjectId};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use temporal::{DataApiDate, DataApiDuration};
pub use types::{status_keys, Command, DataApiResponse, ErrorDescriptor, ResponseData};
pub use vector::DataApiVector;
