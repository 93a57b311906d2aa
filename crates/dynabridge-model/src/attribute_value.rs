//! The DynamoDB `AttributeValue` tagged union.
//!
//! On the JSON wire an attribute value is a single-key object such as
//! `{"S": "hello"}` or `{"NS": ["1", "2"]}`. Exactly one type tag is
//! present; numbers travel as strings to preserve precision; binary
//! payloads travel base64-encoded.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A DynamoDB attribute value.
///
/// Implemented as an explicit sum type rather than an untyped map so that
/// cross-type operations are caught at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, string-encoded.
    N(String),
    /// Binary blob.
    B(bytes::Bytes),
    /// Boolean.
    Bool(bool),
    /// Null marker.
    Null(bool),
    /// String set (unordered, de-duplicated).
    Ss(Vec<String>),
    /// Number set (string-encoded elements).
    Ns(Vec<String>),
    /// Binary set.
    Bs(Vec<bytes::Bytes>),
    /// Ordered, heterogeneous list.
    L(Vec<AttributeValue>),
    /// Nested map.
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// The one-or-two letter type code used in DDL maps and wire tags.
    #[must_use]
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Returns `true` for `{NULL: true}`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(true))
    }

    /// Returns the string payload of an `S` value.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number string of an `N` value.
    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the bytes of a `B` value.
    #[must_use]
    pub fn as_b(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::B(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the boolean of a `BOOL` value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the elements of an `L` value.
    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the entries of an `M` value.
    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    /// Returns `true` if this is one of the three set variants.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Ss(_) | Self::Ns(_) | Self::Bs(_))
    }
}

impl Eq for AttributeValue {}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{{S: {s}}}"),
            Self::N(n) => write!(f, "{{N: {n}}}"),
            Self::B(b) => write!(f, "{{B: {} bytes}}", b.len()),
            Self::Bool(b) => write!(f, "{{BOOL: {b}}}"),
            Self::Null(b) => write!(f, "{{NULL: {b}}}"),
            Self::Ss(v) => write!(f, "{{SS: {} elems}}", v.len()),
            Self::Ns(v) => write!(f, "{{NS: {} elems}}", v.len()),
            Self::Bs(v) => write!(f, "{{BS: {} elems}}", v.len()),
            Self::L(v) => write!(f, "{{L: {} items}}", v.len()),
            Self::M(m) => write!(f, "{{M: {} keys}}", m.len()),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::S(s) => map.serialize_entry("S", s)?,
            Self::N(n) => map.serialize_entry("N", n)?,
            Self::B(b) => map.serialize_entry("B", &BASE64.encode(b))?,
            Self::Bool(b) => map.serialize_entry("BOOL", b)?,
            Self::Null(b) => map.serialize_entry("NULL", b)?,
            Self::Ss(v) => map.serialize_entry("SS", v)?,
            Self::Ns(v) => map.serialize_entry("NS", v)?,
            Self::Bs(v) => {
                let encoded: Vec<String> = v.iter().map(|b| BASE64.encode(b)).collect();
                map.serialize_entry("BS", &encoded)?;
            }
            Self::L(items) => map.serialize_entry("L", items)?,
            Self::M(entries) => map.serialize_entry("M", entries)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl<'de> Visitor<'de> for TagVisitor {
            type Value = AttributeValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an AttributeValue object with exactly one type tag")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
                let Some(tag) = map.next_key::<String>()? else {
                    return Err(de::Error::custom("AttributeValue requires a type tag"));
                };

                let value = match tag.as_str() {
                    "S" => AttributeValue::S(map.next_value()?),
                    "N" => AttributeValue::N(map.next_value()?),
                    "B" => {
                        let encoded: String = map.next_value()?;
                        let raw = BASE64.decode(&encoded).map_err(de::Error::custom)?;
                        AttributeValue::B(bytes::Bytes::from(raw))
                    }
                    "BOOL" => AttributeValue::Bool(map.next_value()?),
                    "NULL" => AttributeValue::Null(map.next_value()?),
                    "SS" => AttributeValue::Ss(map.next_value()?),
                    "NS" => AttributeValue::Ns(map.next_value()?),
                    "BS" => {
                        let encoded: Vec<String> = map.next_value()?;
                        let decoded = encoded
                            .iter()
                            .map(|e| BASE64.decode(e).map(bytes::Bytes::from))
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(de::Error::custom)?;
                        AttributeValue::Bs(decoded)
                    }
                    "L" => AttributeValue::L(map.next_value()?),
                    "M" => AttributeValue::M(map.next_value()?),
                    other => {
                        return Err(de::Error::unknown_field(
                            other,
                            &["S", "N", "B", "BOOL", "NULL", "SS", "NS", "BS", "L", "M"],
                        ));
                    }
                };

                Ok(value)
            }
        }

        deserializer.deserialize_map(TagVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_scalar_tags() {
        let cases = [
            (AttributeValue::S("a".to_owned()), r#"{"S":"a"}"#),
            (AttributeValue::N("3.14".to_owned()), r#"{"N":"3.14"}"#),
            (AttributeValue::Bool(false), r#"{"BOOL":false}"#),
            (AttributeValue::Null(true), r#"{"NULL":true}"#),
        ];
        for (value, expected) in cases {
            assert_eq!(serde_json::to_string(&value).unwrap(), expected);
        }
    }

    #[test]
    fn test_should_base64_encode_binary() {
        let value = AttributeValue::B(bytes::Bytes::from_static(b"hi"));
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"B":"aGk="}"#);
    }

    #[test]
    fn test_should_roundtrip_binary_set() {
        let value = AttributeValue::Bs(vec![
            bytes::Bytes::from_static(b"one"),
            bytes::Bytes::from_static(b"two"),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_should_roundtrip_nested_structures() {
        let mut inner = HashMap::new();
        inner.insert("rating".to_owned(), AttributeValue::N("5".to_owned()));
        let value = AttributeValue::L(vec![
            AttributeValue::S("x".to_owned()),
            AttributeValue::M(inner),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_should_deserialize_sets() {
        let ss: AttributeValue = serde_json::from_str(r#"{"SS":["a","b"]}"#).unwrap();
        assert!(matches!(ss, AttributeValue::Ss(ref v) if v.len() == 2));
        let ns: AttributeValue = serde_json::from_str(r#"{"NS":["1","2","3"]}"#).unwrap();
        assert!(matches!(ns, AttributeValue::Ns(ref v) if v.len() == 3));
    }

    #[test]
    fn test_should_reject_unknown_tag() {
        let result = serde_json::from_str::<AttributeValue>(r#"{"X":"a"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_report_type_codes() {
        assert_eq!(AttributeValue::S(String::new()).type_code(), "S");
        assert_eq!(AttributeValue::Ns(Vec::new()).type_code(), "NS");
        assert_eq!(AttributeValue::M(HashMap::new()).type_code(), "M");
    }
}
