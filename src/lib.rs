//! datapi - Data API command execution
//!
//! This is the main convenience crate that re-exports the datapi sub-crates.
//!
//! # Architecture
//!
//! - **datapi-core**: command and response types, serializer, domain values,
//!   errors, execution records, observability
//! - **datapi-client**: command runner, options, retry transport, observers
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use datapi::{ClientConfig, Command};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ClientConfig::from_env()?.runner();
//!
//!     let insert = Command::new("insertOne")
//!         .with("document", json!({"_id": "1", "title": "Alien", "year": 1979}));
//!     let response = runner.run(&insert, None).await?;
//!     println!("inserted: {:?}", response.status_key("insertedIds"));
//!
//!     runner.drain().await;
//!     Ok(())
//! }
//! ```

// Re-export the sub-crates under short names
pub use datapi_client as client;
pub use datapi_core as core;

// Convenience re-exports of the most commonly used types
pub use datapi_client::{ClientConfig, CommandOptions, CommandRunner, DataApiEndpoint, RunnerBuilder};
pub use datapi_core::{Command, DataApiResponse, Error, ExecutionInfo, Result, Serializer};
