//! Document and row identifiers
//!
//! The Data API tags special identifiers with a reserved key so every driver
//! reads them the same way:
//!
//! ```json
//! {"_id": {"$objectId": "6553a1b2c3d4e5f6a7b8c9d0"}}
//! {"_id": {"$uuid": "0191e8a3-3b2c-7e4a-9c51-2e6f8b7d1a40"}}
//! ```
//!
//! Plain strings and integers are valid identifiers too, which is what
//! [`DocumentId`] models.

use crate::error::Error;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Reserved key of the object id wrapper
pub const OBJECT_ID_KEY: &str = "$objectId";
/// Reserved key of the uuid wrapper
pub const UUID_KEY: &str = "$uuid";

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| rand::thread_rng().gen());
static COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::thread_rng().gen()));

/// 12-byte identifier in the widely used object id layout
///
/// Bytes 0-3 hold the creation time in seconds (big-endian), bytes 4-8 a
/// per-process random value and bytes 9-11 an incrementing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        let seconds = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time encoded in the first four bytes
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default()
    }

    /// Lowercase 24 character hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::Serialization(format!("invalid object id '{}': {}", s, e)))?;
        let bytes: [u8; 12] = bytes.try_into().map_err(|_| {
            Error::Serialization(format!("invalid object id '{}': expected 12 bytes", s))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OBJECT_ID_KEY, &self.to_hex())?;
        map.end()
    }
}

/// Visitor for `{"<key>": "<text>"}` wrappers that also accepts the bare text
struct TaggedVisitor<T> {
    key: &'static str,
    expecting: &'static str,
    _marker: std::marker::PhantomData<T>,
}

impl<T> TaggedVisitor<T> {
    fn new(key: &'static str, expecting: &'static str) -> Self {
        Self {
            key,
            expecting,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'de, T> Visitor<'de> for TaggedVisitor<T>
where
    T: FromStr<Err = Error>,
{
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expecting)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut parsed = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == self.key {
                let text: String = map.next_value()?;
                parsed = Some(text.parse().map_err(de::Error::custom)?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        parsed.ok_or_else(|| de::Error::missing_field(self.key))
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TaggedVisitor::new(
            OBJECT_ID_KEY,
            "a {\"$objectId\": \"<hex>\"} object or a 24 character hex string",
        ))
    }
}

/// UUID carried in the `{"$uuid": "..."}` wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataApiUuid(uuid::Uuid);

impl DataApiUuid {
    /// Random (version 4) UUID
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Underlying value
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl From<uuid::Uuid> for DataApiUuid {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for DataApiUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DataApiUuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Serialization(format!("invalid uuid '{}': {}", s, e)))
    }
}

impl Serialize for DataApiUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(UUID_KEY, &self.0.to_string())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataApiUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TaggedVisitor::new(
            UUID_KEY,
            "a {\"$uuid\": \"...\"} object or a uuid string",
        ))
    }
}

/// Value of a document `_id`
///
/// Bare strings always decode to [`DocumentId::String`]; only the tagged
/// wrappers produce object ids or uuids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentId {
    /// `{"$objectId": ...}`
    ObjectId(ObjectId),
    /// `{"$uuid": ...}`
    Uuid(DataApiUuid),
    /// Plain string
    String(String),
    /// Plain integer
    Integer(i64),
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::ObjectId(id) => write!(f, "ObjectId({})", id),
            DocumentId::Uuid(id) => write!(f, "Uuid({})", id),
            DocumentId::String(s) => write!(f, "\"{}\"", s),
            DocumentId::Integer(n) => write!(f, "{}", n),
        }
    }
}

impl From<ObjectId> for DocumentId {
    fn from(id: ObjectId) -> Self {
        DocumentId::ObjectId(id)
    }
}

impl From<DataApiUuid> for DocumentId {
    fn from(id: DataApiUuid) -> Self {
        DocumentId::Uuid(id)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        DocumentId::String(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId::String(s.to_string())
    }
}

impl From<i64> for DocumentId {
    fn from(n: i64) -> Self {
        DocumentId::Integer(n)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DocumentId::ObjectId(id) => id.serialize(serializer),
            DocumentId::Uuid(id) => id.serialize(serializer),
            DocumentId::String(s) => serializer.serialize_str(s),
            DocumentId::Integer(n) => serializer.serialize_i64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(DocumentId::String(s)),
            Value::Number(n) => n
                .as_i64()
                .map(DocumentId::Integer)
                .ok_or_else(|| de::Error::custom(format!("identifier {} is not an integer", n))),
            Value::Object(map) => {
                if let Some(Value::String(hex)) = map.get(OBJECT_ID_KEY) {
                    hex.parse().map(DocumentId::ObjectId).map_err(de::Error::custom)
                } else if let Some(Value::String(uuid)) = map.get(UUID_KEY) {
                    uuid.parse().map(DocumentId::Uuid).map_err(de::Error::custom)
                } else {
                    Err(de::Error::custom("object identifier without $objectId or $uuid"))
                }
            }
            other => Err(de::Error::custom(format!("unsupported identifier {}", other))),
        }
    }
}
