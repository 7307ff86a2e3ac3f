//! Schema enumerations
//!
//! Column types and similarity metrics travel as their canonical lowercase
//! names (`bigint`, `dot_product`). Decoding ignores case, and an unknown
//! column type maps to [`ColumnType::Unsupported`] instead of failing, so a
//! newer server can describe columns this client does not know yet.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! wire_names {
    ($ty:ident { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order
            pub const ALL: &'static [$ty] = &[$($ty::$variant),*];

            /// Canonical wire name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),*
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(name))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

/// Type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Date,
    Decimal,
    Double,
    Duration,
    Float,
    Inet,
    Int,
    List,
    Map,
    Set,
    SmallInt,
    Text,
    Time,
    Timestamp,
    TimeUuid,
    TinyInt,
    UserDefined,
    Uuid,
    VarInt,
    Vector,
    /// Reported by the server for types the API cannot handle
    Unsupported,
}

wire_names!(ColumnType {
    Ascii => "ascii",
    BigInt => "bigint",
    Blob => "blob",
    Boolean => "boolean",
    Counter => "counter",
    Date => "date",
    Decimal => "decimal",
    Double => "double",
    Duration => "duration",
    Float => "float",
    Inet => "inet",
    Int => "int",
    List => "list",
    Map => "map",
    Set => "set",
    SmallInt => "smallint",
    Text => "text",
    Time => "time",
    Timestamp => "timestamp",
    TimeUuid => "timeuuid",
    TinyInt => "tinyint",
    UserDefined => "userdefined",
    Uuid => "uuid",
    VarInt => "varint",
    Vector => "vector",
    Unsupported => "unsupported",
});

impl ColumnType {
    /// Whether values of this type hold other values
    pub fn is_collection(&self) -> bool {
        matches!(self, ColumnType::List | ColumnType::Map | ColumnType::Set)
    }
}

impl FromStr for ColumnType {
    type Err = std::convert::Infallible;

    /// Never fails; unknown names give [`ColumnType::Unsupported`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s).unwrap_or(ColumnType::Unsupported))
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name).unwrap_or(ColumnType::Unsupported))
    }
}

/// Similarity function of a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

wire_names!(SimilarityMetric {
    Cosine => "cosine",
    Euclidean => "euclidean",
    DotProduct => "dot_product",
});

impl FromStr for SimilarityMetric {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| crate::Error::Serialization(format!("unknown similarity metric '{}'", s)))
    }
}

impl<'de> Deserialize<'de> for SimilarityMetric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Serializer as Codec;

    #[test]
    fn test_column_types_round_trip() {
        let codec = Codec::default();
        for column in ColumnType::ALL {
            let text = codec.marshall(column).unwrap();
            assert_eq!(text, format!("\"{}\"", column.as_str()));
            assert_eq!(codec.unmarshall::<ColumnType>(&text).unwrap(), *column);
        }
    }

    #[test]
    fn test_column_type_case_insensitive() {
        let codec = Codec::default();
        assert_eq!(codec.unmarshall::<ColumnType>(r#""BIGINT""#).unwrap(), ColumnType::BigInt);
        assert_eq!(codec.unmarshall::<ColumnType>(r#""Text""#).unwrap(), ColumnType::Text);
        assert_eq!(
            codec.unmarshall::<ColumnType>(r#""userdefined""#).unwrap(),
            ColumnType::UserDefined
        );
    }

    #[test]
    fn test_unknown_column_type_is_unsupported() {
        let column: ColumnType = Codec::default().unmarshall(r#""geometry""#).unwrap();
        assert_eq!(column, ColumnType::Unsupported);
        assert_eq!("geometry".parse::<ColumnType>(), Ok(ColumnType::Unsupported));
    }

    #[test]
    fn test_similarity_metric_names() {
        let codec = Codec::default();
        assert_eq!(codec.marshall(&SimilarityMetric::DotProduct).unwrap(), r#""dot_product""#);
        assert_eq!(
            codec.unmarshall::<SimilarityMetric>(r#""EUCLIDEAN""#).unwrap(),
            SimilarityMetric::Euclidean
        );
        assert!(codec.unmarshall::<SimilarityMetric>(r#""manhattan""#).is_err());
        assert_eq!(SimilarityMetric::default(), SimilarityMetric::Cosine);
    }

    #[test]
    fn test_collection_types() {
        assert!(ColumnType::Map.is_collection());
        assert!(!ColumnType::Vector.is_collection());
    }
}
