//! Dense embedding vectors
//!
//! A [`DataApiVector`] is written in one of two forms depending on the
//! active [`VectorEncoding`]:
//!
//! ```json
//! {"$binary": "PczMzT5MzM0="}
//! [0.1, 0.2]
//! ```
//!
//! The binary form packs every component as a big-endian IEEE-754 `f32` and
//! base64-encodes the result. Decoding recognises either form, and also a
//! bare base64 string, whatever the configuration says.

use crate::codec::{active_config, base64_bytes::BINARY_KEY, VectorEncoding};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Embedding vector of 32-bit floats
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataApiVector(Vec<f32>);

impl DataApiVector {
    /// Wrap components
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of dimensions
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Borrow the components
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Take the components back
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Packed big-endian representation
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|value| value.to_be_bytes()).collect()
    }

    /// Unpack big-endian `f32` components
    ///
    /// Returns `None` if the length is not a multiple of four.
    pub fn from_be_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self(values))
    }

    fn from_base64<E: de::Error>(encoded: &str) -> Result<Self, E> {
        let bytes = STANDARD.decode(encoded).map_err(E::custom)?;
        Self::from_be_bytes(&bytes).ok_or_else(|| {
            E::invalid_length(bytes.len(), &"a byte length that is a multiple of 4")
        })
    }
}

impl From<Vec<f32>> for DataApiVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl From<&[f32]> for DataApiVector {
    fn from(values: &[f32]) -> Self {
        Self(values.to_vec())
    }
}

impl Serialize for DataApiVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match active_config().vector_encoding {
            VectorEncoding::Binary => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BINARY_KEY, &STANDARD.encode(self.to_be_bytes()))?;
                map.end()
            }
            VectorEncoding::Array => self.0.serialize(serializer),
        }
    }
}

struct VectorVisitor;

impl<'de> Visitor<'de> for VectorVisitor {
    type Value = DataApiVector;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of numbers, a base64 string or a {\"$binary\": \"...\"} object")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element::<f32>()? {
            values.push(value);
        }
        Ok(DataApiVector(values))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        DataApiVector::from_base64(v)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut vector = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == BINARY_KEY {
                let encoded: String = map.next_value()?;
                vector = Some(DataApiVector::from_base64(&encoded)?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        vector.ok_or_else(|| de::Error::missing_field(BINARY_KEY))
    }
}

impl<'de> Deserialize<'de> for DataApiVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VectorVisitor)
    }
}
