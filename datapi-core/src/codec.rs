//! Serializer for Data API payloads
//!
//! [`Serializer`] turns Rust values into the canonical JSON text sent to the
//! Data API and maps response bodies back into Rust types. It is a small
//! `Copy` value carrying a [`SerdesConfig`]; there is no global state.
//!
//! # Encoding rules
//!
//! - Object fields holding `null` are dropped (`omit_nulls`, on by default)
//! - `f32` values keep their shortest round-trip form; the document is never
//!   widened through `f64` on the way out
//! - Domain values pick their wire form from the active configuration:
//!   [`DurationEncoding`] for durations, [`VectorEncoding`] for vectors
//!
//! # Decoding rules
//!
//! - Unknown fields are ignored
//! - Field names match case-insensitively and are reported in canonical case
//! - `null` in a numeric or boolean slot decodes to zero or `false`
//!
//! # Configuration scope
//!
//! While a serializer runs, its configuration is published to the `Serialize`
//! implementations of the domain types through a thread-local scope, see
//! [`active_config`]. Each call installs its own scope and restores the
//! previous one on exit, so two serializers with different settings can run
//! side by side on separate threads or one inside the other.
//!
//! # Examples
//!
//! ```rust
//! use datapi_core::codec::{Serializer, VectorEncoding};
//! use datapi_core::DataApiVector;
//!
//! let vector = DataApiVector::from(vec![0.1f32, 0.2]);
//!
//! let binary = Serializer::default().marshall(&vector).unwrap();
//! assert!(binary.contains("$binary"));
//!
//! let plain = Serializer::default()
//!     .with_vector_encoding(VectorEncoding::Array)
//!     .marshall(&vector)
//!     .unwrap();
//! assert_eq!(plain, "[0.1,0.2]");
//! ```

use crate::error::{Error, Result};
use crate::lenient::Lenient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;

/// Wire form of [`DataApiDuration`](crate::DataApiDuration) values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationEncoding {
    /// ISO-8601 string such as `P1DT2H`
    #[default]
    Iso8601,
    /// `{"months": .., "days": .., "nanoseconds": ..}`
    Structured,
}

/// Wire form of [`DataApiVector`](crate::DataApiVector) values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorEncoding {
    /// `{"$binary": "<base64 of big-endian f32>"}`
    #[default]
    Binary,
    /// Plain JSON array of numbers
    Array,
}

/// Encoding choices of a [`Serializer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerdesConfig {
    /// How durations are written
    pub duration_encoding: DurationEncoding,
    /// How vectors are written
    pub vector_encoding: VectorEncoding,
    /// Drop object fields whose value is `null`
    pub omit_nulls: bool,
}

impl Default for SerdesConfig {
    fn default() -> Self {
        Self {
            duration_encoding: DurationEncoding::default(),
            vector_encoding: VectorEncoding::default(),
            omit_nulls: true,
        }
    }
}

thread_local! {
    static ACTIVE: Cell<Option<SerdesConfig>> = const { Cell::new(None) };
}

/// Restores the previously active configuration when dropped
struct ConfigScope {
    previous: Option<SerdesConfig>,
}

impl ConfigScope {
    fn enter(config: SerdesConfig) -> Self {
        let previous = ACTIVE.with(|active| active.replace(Some(config)));
        Self { previous }
    }
}

impl Drop for ConfigScope {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
    }
}

/// Configuration of the serializer currently running on this thread
///
/// Falls back to [`SerdesConfig::default`] outside of any serializer call,
/// e.g. when a domain value is passed straight to `serde_json`.
pub fn active_config() -> SerdesConfig {
    ACTIVE.with(|active| active.get()).unwrap_or_default()
}

/// Run `f` with `config` as the active configuration
pub fn with_config<R>(config: SerdesConfig, f: impl FnOnce() -> R) -> R {
    let _scope = ConfigScope::enter(config);
    f()
}

/// JSON codec for commands, responses and domain values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Serializer {
    config: SerdesConfig,
}

impl Serializer {
    /// Create a serializer with an explicit configuration
    pub fn new(config: SerdesConfig) -> Self {
        Self { config }
    }

    /// Encoding choices of this serializer
    pub fn config(&self) -> SerdesConfig {
        self.config
    }

    /// Set the duration encoding
    pub fn with_duration_encoding(mut self, encoding: DurationEncoding) -> Self {
        self.config.duration_encoding = encoding;
        self
    }

    /// Set the vector encoding
    pub fn with_vector_encoding(mut self, encoding: VectorEncoding) -> Self {
        self.config.vector_encoding = encoding;
        self
    }

    /// Keep or drop `null` object fields
    pub fn with_omit_nulls(mut self, omit_nulls: bool) -> Self {
        self.config.omit_nulls = omit_nulls;
        self
    }

    /// Encode a value to canonical JSON text
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the value cannot be represented as
    /// JSON (e.g. a map with non-string keys).
    pub fn marshall<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let text = with_config(self.config, || serde_json::to_string(value))?;
        if !self.config.omit_nulls {
            return Ok(text);
        }
        // Reparse the text rather than go through `to_value`, which widens
        // f32 to f64 and prints the widened digits.
        let mut tree: Value = serde_json::from_str(&text)?;
        strip_nulls(&mut tree);
        Ok(serde_json::to_string(&tree)?)
    }

    /// Encode a value to a JSON tree, applying the same rules as [`marshall`](Self::marshall)
    pub fn marshall_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value> {
        let text = with_config(self.config, || serde_json::to_string(value))?;
        let mut tree: Value = serde_json::from_str(&text)?;
        if self.config.omit_nulls {
            strip_nulls(&mut tree);
        }
        Ok(tree)
    }

    /// Decode JSON text into `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` for malformed JSON or when the document
    /// does not fit `T`. Extra fields never cause an error.
    pub fn unmarshall<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        let tree: Value = serde_json::from_str(text)?;
        self.unmarshall_value(tree)
    }

    /// Decode a JSON tree into `T`
    pub fn unmarshall_value<T: DeserializeOwned>(&self, value: Value) -> Result<T> {
        with_config(self.config, || T::deserialize(Lenient::new(value))).map_err(Error::from)
    }
}

/// Remove `null` fields from every object in the tree
///
/// `null` items inside arrays are positional and are kept.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, field| !field.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Field adapter encoding bytes as base64 text
///
/// ```rust
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Row {
///     #[serde(with = "datapi_core::codec::base64_bytes")]
///     payload: Vec<u8>,
/// }
/// ```
///
/// Decoding also accepts the `{"$binary": "..."}` wrapper.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::de::{self, IgnoredAny, MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    /// Reserved key of the binary wrapper object
    pub const BINARY_KEY: &str = "$binary";

    /// Encode bytes as a base64 string
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Decode bytes from a base64 string or a `$binary` wrapper
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_any(Base64Visitor)
    }

    pub(crate) struct Base64Visitor;

    impl<'de> Visitor<'de> for Base64Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a base64 string or a {\"$binary\": \"...\"} object")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            STANDARD.decode(v).map_err(E::custom)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut bytes = None;
            while let Some(key) = map.next_key::<String>()? {
                if key == BINARY_KEY {
                    let encoded: String = map.next_value()?;
                    bytes = Some(STANDARD.decode(encoded).map_err(de::Error::custom)?);
                } else {
                    map.next_value::<IgnoredAny>()?;
                }
            }
            bytes.ok_or_else(|| de::Error::missing_field(BINARY_KEY))
        }
    }
}
