//! Data API wire types
//!
//! A command travels as a single JSON object keyed by the command name:
//!
//! ```json
//! {"insertOne": {"document": {"_id": "1", "text": "hello"}}}
//! ```
//!
//! Every answer shares one envelope with three optional members:
//!
//! - `status`: free-form metadata (`insertedIds`, `deletedCount`, `warnings`, ...)
//! - `data`: a single `document`, a `documents` page and its `nextPageState`
//! - `errors`: structured error descriptors; any entry turns the whole call
//!   into a failure
//!
//! # Examples
//!
//! ```rust
//! use datapi_core::{Command, Serializer};
//! use serde_json::json;
//!
//! let command = Command::new("insertOne")
//!     .with("document", json!({"_id": "1", "text": "hello"}));
//! let text = Serializer::default().marshall(&command).unwrap();
//! assert_eq!(text, r#"{"insertOne":{"document":{"_id":"1","text":"hello"}}}"#);
//! ```

use crate::codec::Serializer;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer as SerdeSerializer};
use serde_json::{Map, Value};
use std::fmt;

/// Keys commonly found in the `status` block of a response
pub mod status_keys {
    /// Identifiers of inserted documents or rows
    pub const INSERTED_IDS: &str = "insertedIds";
    /// Number of deleted documents
    pub const DELETED_COUNT: &str = "deletedCount";
    /// Number of documents matched by an update
    pub const MATCHED_COUNT: &str = "matchedCount";
    /// Number of documents modified by an update
    pub const MODIFIED_COUNT: &str = "modifiedCount";
    /// Identifier of an upserted document
    pub const UPSERTED_ID: &str = "upsertedId";
    /// Set when more documents remain to be processed
    pub const MORE_DATA: &str = "moreData";
    /// Result of a count command
    pub const COUNT: &str = "count";
    /// Non fatal diagnostics
    pub const WARNINGS: &str = "warnings";
}

/// A named Data API operation and its payload
///
/// The payload defaults to a dynamic JSON map. Any `Serialize` type can be
/// used instead through [`Command::with_payload`]; typed payloads are encoded
/// by the runner's [`Serializer`] and therefore follow its configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Command<P = Map<String, Value>> {
    name: String,
    payload: P,
}

impl Command {
    /// Create a command with an empty payload
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    /// Set a payload entry from a JSON value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Set a payload entry from any serializable value
    ///
    /// The value is encoded with the default [`Serializer`] at once, so
    /// vectors and durations get the default wire form whatever serializer
    /// later runs the command. Use [`append_with`](Self::append_with) or
    /// [`Command::with_payload`] to follow another configuration.
    pub fn append<T: Serialize + ?Sized>(self, key: impl Into<String>, value: &T) -> Result<Self> {
        self.append_with(key, value, &Serializer::default())
    }

    /// Set a payload entry encoded by `serializer`
    pub fn append_with<T: Serialize + ?Sized>(
        self,
        key: impl Into<String>,
        value: &T,
        serializer: &Serializer,
    ) -> Result<Self> {
        let value = serializer.marshall_value(value)?;
        Ok(self.with(key, value))
    }

    /// Payload entry by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

impl<P> Command<P> {
    /// Create a command around a typed payload
    pub fn with_payload(name: impl Into<String>, payload: P) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Operation name, e.g. `insertOne`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command payload
    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: Serialize> Serialize for Command<P> {
    fn serialize<S: SerdeSerializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.payload)?;
        map.end()
    }
}

/// Structured error or warning reported by the Data API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorDescriptor {
    /// Server side identifier of this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Machine readable code, e.g. `DOCUMENT_ALREADY_EXISTS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Legacy server exception class name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_class: Option<String>,
    /// Error family (`REQUEST`, `SERVER`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Error scope (`DOCUMENT`, `SCHEMA`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Short title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl fmt::Display for ErrorDescriptor {
    /// Formats as "[CODE] message"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.as_deref().unwrap_or("no message");
        match &self.error_code {
            Some(code) => write!(f, "[{}] {}", code, message),
            None => write!(f, "{}", message),
        }
    }
}

/// `data` member of a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseData {
    /// Single document (`findOne`, `findOneAndUpdate`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    /// Page of documents (`find`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,
    /// Continuation token for the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_state: Option<String>,
}

/// Parsed Data API response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataApiResponse {
    /// Free-form status metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Map<String, Value>>,
    /// Returned documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    /// Reported errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDescriptor>>,
}

impl DataApiResponse {
    /// Whether the response reports at least one error
    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Reported errors, empty if none
    pub fn errors(&self) -> &[ErrorDescriptor] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Raw status entry
    pub fn status_key(&self, key: &str) -> Option<&Value> {
        self.status.as_ref().and_then(|status| status.get(key))
    }

    /// Status entry mapped to `T`, `None` when absent
    pub fn status_key_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.status_key(key)
            .map(|value| Serializer::default().unmarshall_value(value.clone()))
            .transpose()
    }

    /// Entries of `status.warnings`
    ///
    /// Warnings are descriptor objects on recent servers and plain strings on
    /// older ones; both are returned as-is.
    pub fn warnings(&self) -> &[Value] {
        match self.status_key(status_keys::WARNINGS) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// `data.document`
    pub fn document(&self) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.document.as_ref())
    }

    /// `data.documents`
    pub fn documents(&self) -> Option<&[Value]> {
        self.data.as_ref().and_then(|data| data.documents.as_deref())
    }

    /// `data.nextPageState`
    pub fn next_page_state(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.next_page_state.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::VectorEncoding;
    use crate::vector::DataApiVector;
    use serde_json::json;

    #[test]
    fn test_command_wire_shape() {
        let command = Command::new("findOne")
            .with("filter", json!({"_id": "1"}))
            .with("options", json!({"includeSimilarity": true}));
        let text = Serializer::default().marshall(&command).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["findOne"]["filter"]["_id"], "1");
        assert_eq!(value["findOne"]["options"]["includeSimilarity"], true);
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_command_typed_payload() {
        #[derive(Serialize)]
        struct CountDocuments {
            filter: Value,
        }

        let command = Command::with_payload("countDocuments", CountDocuments { filter: json!({}) });
        assert_eq!(command.name(), "countDocuments");
        let text = Serializer::default().marshall(&command).unwrap();
        assert_eq!(text, r#"{"countDocuments":{"filter":{}}}"#);
    }

    #[test]
    fn test_command_append_typed_value() {
        let command = Command::new("insertOne")
            .append("document", &json!({"_id": "1", "score": 0.1f32}))
            .unwrap();
        assert_eq!(command.get("document").unwrap()["_id"], "1");
    }

    #[test]
    fn test_command_append_with_serializer() {
        let vector = DataApiVector::new(vec![0.5, 1.0]);
        let arrays = Serializer::default().with_vector_encoding(VectorEncoding::Array);

        let command = Command::new("insertOne")
            .append("default", &vector)
            .unwrap()
            .append_with("array", &vector, &arrays)
            .unwrap();

        assert!(command.get("default").unwrap().get("$binary").is_some());
        assert_eq!(command.get("array").unwrap(), &json!([0.5, 1.0]));
    }

    #[test]
    fn test_response_with_status() {
        let response: DataApiResponse = Serializer::default()
            .unmarshall(r#"{"status":{"insertedIds":["1","2"]}}"#)
            .unwrap();

        assert!(!response.has_errors());
        let ids: Vec<String> = response
            .status_key_as(status_keys::INSERTED_IDS)
            .unwrap()
            .unwrap();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(response.status_key_as::<u64>(status_keys::COUNT).unwrap().is_none());
    }

    #[test]
    fn test_response_with_documents_page() {
        let response: DataApiResponse = Serializer::default()
            .unmarshall(r#"{"data":{"documents":[{"_id":"1"},{"_id":"2"}],"nextPageState":"abc"}}"#)
            .unwrap();

        assert_eq!(response.documents().unwrap().len(), 2);
        assert_eq!(response.next_page_state(), Some("abc"));
        assert!(response.document().is_none());
    }

    #[test]
    fn test_empty_errors_is_not_a_failure() {
        let response: DataApiResponse = Serializer::default()
            .unmarshall(r#"{"status":{"ok":1},"errors":[]}"#)
            .unwrap();
        assert!(!response.has_errors());
    }

    #[test]
    fn test_warnings_in_both_forms() {
        let response: DataApiResponse = Serializer::default()
            .unmarshall(
                r#"{"status":{"warnings":["legacy warning",{"errorCode":"DEPRECATED","message":"use tables"}]}}"#,
            )
            .unwrap();
        let warnings = response.warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0], "legacy warning");
        assert_eq!(warnings[1]["errorCode"], "DEPRECATED");
    }

    #[test]
    fn test_error_descriptor_display() {
        let descriptor = ErrorDescriptor {
            error_code: Some("INVALID_FILTER".into()),
            message: Some("bad filter".into()),
            ..Default::default()
        };
        assert_eq!(descriptor.to_string(), "[INVALID_FILTER] bad filter");

        let bare = ErrorDescriptor {
            message: Some("boom".into()),
            ..Default::default()
        };
        assert_eq!(bare.to_string(), "boom");
    }
}
