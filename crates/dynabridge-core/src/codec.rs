//! Type codec: the tagged attribute model ⇄ native backend row values.
//!
//! The backend stores typed columns: strings, 64-bit floats, booleans,
//! bytes, typed arrays for sets, and JSON payloads for lists and maps. The
//! per-table DDL map drives both directions; the declared type tag is
//! authoritative for how a column is serialized and decoded.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::Value as Json;

use dynabridge_model::{AttributeValue, Item};

use crate::schema::{DdlMap, TypeCode};

/// A typed backend column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL.
    Null,
    /// STRING column.
    String(String),
    /// FLOAT64 column.
    Double(f64),
    /// BOOL column.
    Bool(bool),
    /// BYTES column.
    Bytes(Bytes),
    /// ARRAY<STRING> column (string sets).
    StringArray(Vec<String>),
    /// ARRAY<FLOAT64> column (number sets).
    DoubleArray(Vec<f64>),
    /// ARRAY<BYTES> column (binary sets).
    BytesArray(Vec<Bytes>),
    /// JSON column (lists and maps).
    Json(Json),
}

/// A backend row: column name to typed value.
pub type Row = HashMap<String, ColumnValue>;

/// Raw JSON payloads of `M` columns, preserved for dotted-path merges.
pub type RawJsonMap = HashMap<String, Json>;

/// Codec failures. All surface as `ValidationException` on the wire except
/// [`CodecError::UnknownColumn`], which maps to resource-not-found.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The item names a column the DDL map does not declare.
    #[error("unknown column: {column}")]
    UnknownColumn {
        /// Offending attribute name.
        column: String,
    },
    /// The attribute's tag does not match the declared column type.
    #[error("type mismatch for column {column}: declared {declared}, got {actual}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Declared DDL type code.
        declared: &'static str,
        /// Actual wire tag.
        actual: &'static str,
    },
    /// A number string did not parse, or produced a non-finite float.
    #[error("invalid number: {text}")]
    InvalidNumber {
        /// Offending text.
        text: String,
    },
    /// A JSON column payload was malformed.
    #[error("invalid JSON payload for column {column}: {source}")]
    InvalidJson {
        /// Column name.
        column: String,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Parse a DynamoDB number string into a finite `f64`.
pub fn parse_number(text: &str) -> Result<f64, CodecError> {
    let value: f64 = text.parse().map_err(|_| CodecError::InvalidNumber {
        text: text.to_owned(),
    })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CodecError::InvalidNumber {
            text: text.to_owned(),
        })
    }
}

/// Render a float as a DynamoDB number string, preferring the integer form
/// when the value is integral.
#[must_use]
pub fn format_number(value: f64) -> String {
    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// AttributeValue ⇄ plain JSON (payload form for L and M columns)
// ---------------------------------------------------------------------------

/// Lower a tagged value into the plain JSON stored inside `L`/`M` columns.
/// Binary payloads become base64 text; sets become plain arrays.
pub fn attribute_to_json(value: &AttributeValue) -> Result<Json, CodecError> {
    Ok(match value {
        AttributeValue::S(s) => Json::String(s.clone()),
        AttributeValue::N(n) => {
            let parsed = parse_number(n)?;
            serde_json::Number::from_f64(parsed)
                .map(Json::Number)
                .ok_or_else(|| CodecError::InvalidNumber { text: n.clone() })?
        }
        AttributeValue::B(b) => Json::String(BASE64.encode(b)),
        AttributeValue::Bool(b) => Json::Bool(*b),
        AttributeValue::Null(_) => Json::Null,
        AttributeValue::Ss(v) => Json::Array(v.iter().cloned().map(Json::String).collect()),
        AttributeValue::Ns(v) => {
            let mut items = Vec::with_capacity(v.len());
            for n in v {
                let parsed = parse_number(n)?;
                items.push(
                    serde_json::Number::from_f64(parsed)
                        .map(Json::Number)
                        .ok_or_else(|| CodecError::InvalidNumber { text: n.clone() })?,
                );
            }
            Json::Array(items)
        }
        AttributeValue::Bs(v) => {
            Json::Array(v.iter().map(|b| Json::String(BASE64.encode(b))).collect())
        }
        AttributeValue::L(items) => {
            let lowered = items
                .iter()
                .map(attribute_to_json)
                .collect::<Result<Vec<_>, _>>()?;
            Json::Array(lowered)
        }
        AttributeValue::M(entries) => {
            let mut object = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                object.insert(k.clone(), attribute_to_json(v)?);
            }
            Json::Object(object)
        }
    })
}

/// Raise plain JSON back into the tagged model by shape: strings become
/// `S`, numbers `N`, arrays `L`, objects `M`.
#[must_use]
pub fn json_to_attribute(value: &Json) -> AttributeValue {
    match value {
        Json::Null => AttributeValue::Null(true),
        Json::Bool(b) => AttributeValue::Bool(*b),
        Json::Number(n) => {
            AttributeValue::N(n.as_f64().map_or_else(|| n.to_string(), format_number))
        }
        Json::String(s) => AttributeValue::S(s.clone()),
        Json::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Json::Object(entries) => AttributeValue::M(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// AttributeValue ⇄ ColumnValue
// ---------------------------------------------------------------------------

/// Convert one attribute into a column value per the declared type.
pub fn attribute_to_column(
    column: &str,
    value: &AttributeValue,
    declared: TypeCode,
) -> Result<ColumnValue, CodecError> {
    // NULL writes null into any column type.
    if value.is_null() {
        return Ok(ColumnValue::Null);
    }

    let mismatch = || CodecError::TypeMismatch {
        column: column.to_owned(),
        declared: declared.as_str(),
        actual: value.type_code(),
    };

    Ok(match (declared, value) {
        (TypeCode::S, AttributeValue::S(s)) => ColumnValue::String(s.clone()),
        (TypeCode::N, AttributeValue::N(n)) => ColumnValue::Double(parse_number(n)?),
        (TypeCode::B, AttributeValue::B(b)) => ColumnValue::Bytes(b.clone()),
        (TypeCode::Bool, AttributeValue::Bool(b)) => ColumnValue::Bool(*b),
        (TypeCode::Null, _) => ColumnValue::Null,
        (TypeCode::Ss, AttributeValue::Ss(v)) => ColumnValue::StringArray(v.clone()),
        (TypeCode::Ns, AttributeValue::Ns(v)) => {
            let parsed = v
                .iter()
                .map(|n| parse_number(n))
                .collect::<Result<Vec<_>, _>>()?;
            ColumnValue::DoubleArray(parsed)
        }
        (TypeCode::Bs, AttributeValue::Bs(v)) => ColumnValue::BytesArray(v.clone()),
        (TypeCode::L | TypeCode::M, _) => ColumnValue::Json(attribute_to_json(value)?),
        _ => return Err(mismatch()),
    })
}

/// Generic (DDL-free) column-to-attribute mapping, used where rows must be
/// materialized without schema access (e.g. the in-memory backend's filter
/// evaluation).
#[must_use]
pub fn column_to_attribute(value: &ColumnValue) -> AttributeValue {
    match value {
        ColumnValue::Null => AttributeValue::Null(true),
        ColumnValue::String(s) => AttributeValue::S(s.clone()),
        ColumnValue::Double(d) => AttributeValue::N(format_number(*d)),
        ColumnValue::Bool(b) => AttributeValue::Bool(*b),
        ColumnValue::Bytes(b) => AttributeValue::B(b.clone()),
        ColumnValue::StringArray(v) => AttributeValue::Ss(v.clone()),
        ColumnValue::DoubleArray(v) => {
            AttributeValue::Ns(v.iter().map(|d| format_number(*d)).collect())
        }
        ColumnValue::BytesArray(v) => AttributeValue::Bs(v.clone()),
        ColumnValue::Json(j) => json_to_attribute(j),
    }
}

// ---------------------------------------------------------------------------
// Items ⇄ rows
// ---------------------------------------------------------------------------

/// Encode a full item into a backend row.
///
/// Every attribute must name a declared column; anything else is a
/// validation failure before any backend I/O happens.
pub fn encode_item(item: &Item, ddl: &DdlMap) -> Result<Row, CodecError> {
    let mut row = Row::with_capacity(item.len());
    for (name, value) in item {
        let declared = ddl.get(name).ok_or_else(|| CodecError::UnknownColumn {
            column: name.clone(),
        })?;
        row.insert(name.clone(), attribute_to_column(name, value, *declared)?);
    }
    Ok(row)
}

/// Decode a backend row into an item, consulting the DDL map per column.
///
/// NULL columns are omitted from the item. The second return value keeps
/// the raw JSON of `M` columns so that a subsequent dotted-path write can
/// merge into the stored object without a round trip through the tag model.
pub fn decode_row(row: &Row, ddl: &DdlMap) -> Result<(Item, RawJsonMap), CodecError> {
    let mut item = Item::with_capacity(row.len());
    let mut raw = RawJsonMap::new();

    for (column, value) in row {
        if column == "commit_timestamp" {
            continue;
        }
        if matches!(value, ColumnValue::Null) {
            continue;
        }
        let declared = ddl.get(column).ok_or_else(|| CodecError::UnknownColumn {
            column: column.clone(),
        })?;

        let decoded = match (declared, value) {
            (TypeCode::S, ColumnValue::String(s)) => decode_string_column(s),
            (TypeCode::N, ColumnValue::Double(d)) => AttributeValue::N(format_number(*d)),
            (TypeCode::B, ColumnValue::Bytes(b)) => decode_bytes_column(b),
            (TypeCode::Bool, ColumnValue::Bool(b)) => AttributeValue::Bool(*b),
            (TypeCode::Null, _) => continue,
            (TypeCode::Ss, ColumnValue::StringArray(v)) => AttributeValue::Ss(v.clone()),
            (TypeCode::Ns, ColumnValue::DoubleArray(v)) => {
                AttributeValue::Ns(v.iter().map(|d| format_number(*d)).collect())
            }
            (TypeCode::Bs, ColumnValue::BytesArray(v)) => AttributeValue::Bs(v.clone()),
            (TypeCode::L | TypeCode::M, ColumnValue::Json(j)) => {
                if *declared == TypeCode::M {
                    raw.insert(column.clone(), j.clone());
                }
                json_to_attribute(j)
            }
            // JSON payloads persisted into STRING columns by earlier
            // versions: the type tag still dictates the decode.
            (TypeCode::L | TypeCode::M, ColumnValue::String(s)) => {
                let parsed: Json =
                    serde_json::from_str(s).map_err(|source| CodecError::InvalidJson {
                        column: column.clone(),
                        source,
                    })?;
                if *declared == TypeCode::M {
                    raw.insert(column.clone(), parsed.clone());
                }
                json_to_attribute(&parsed)
            }
            (declared, other) => {
                return Err(CodecError::TypeMismatch {
                    column: column.clone(),
                    declared: declared.as_str(),
                    actual: column_value_kind(other),
                });
            }
        };
        item.insert(column.clone(), decoded);
    }

    Ok((item, raw))
}

fn column_value_kind(value: &ColumnValue) -> &'static str {
    match value {
        ColumnValue::Null => "NULL",
        ColumnValue::String(_) => "STRING",
        ColumnValue::Double(_) => "FLOAT64",
        ColumnValue::Bool(_) => "BOOL",
        ColumnValue::Bytes(_) => "BYTES",
        ColumnValue::StringArray(_) => "ARRAY<STRING>",
        ColumnValue::DoubleArray(_) => "ARRAY<FLOAT64>",
        ColumnValue::BytesArray(_) => "ARRAY<BYTES>",
        ColumnValue::Json(_) => "JSON",
    }
}

/// `S` columns whose stored text ends in `=` and scans as base64 hold a
/// binary payload written before bytes columns existed; decode it back to
/// `B`. The encode path never performs the inverse.
fn decode_string_column(text: &str) -> AttributeValue {
    if text.ends_with('=') && is_base64_shaped(text) {
        if let Ok(raw) = BASE64.decode(text) {
            return AttributeValue::B(Bytes::from(raw));
        }
    }
    AttributeValue::S(text.to_owned())
}

/// `B` columns attempt a JSON decode of the payload (list/map payloads
/// stored in bytes columns by earlier versions) and fall back to the raw
/// content when that fails.
fn decode_bytes_column(payload: &Bytes) -> AttributeValue {
    if let Ok(parsed) = serde_json::from_slice::<Json>(payload) {
        if parsed.is_array() || parsed.is_object() {
            return json_to_attribute(&parsed);
        }
    }
    match std::str::from_utf8(payload) {
        Ok(text) => AttributeValue::S(text.to_owned()),
        Err(_) => AttributeValue::B(payload.clone()),
    }
}

/// Whether the text consists solely of base64 alphabet groups with valid
/// `=` padding.
fn is_base64_shaped(text: &str) -> bool {
    if text.is_empty() || text.len() % 4 != 0 {
        return false;
    }
    let padding = text.bytes().rev().take_while(|&b| b == b'=').count();
    if padding > 2 {
        return false;
    }
    text.bytes()
        .take(text.len() - padding)
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn sample_ddl() -> DdlMap {
        let mut registry = SchemaRegistry::seeded();
        registry.set_ddl(
            "employee",
            &[
                ("emp_id", TypeCode::N),
                ("name", TypeCode::S),
                ("active", TypeCode::Bool),
                ("avatar", TypeCode::B),
                ("tags", TypeCode::Ss),
                ("scores", TypeCode::Ns),
                ("list_type", TypeCode::L),
                ("profile", TypeCode::M),
            ],
        );
        registry.require_ddl("employee").unwrap().clone()
    }

    #[test]
    fn test_should_roundtrip_scalars_through_row() {
        let ddl = sample_ddl();
        let item = Item::from([
            ("emp_id".to_owned(), AttributeValue::N("3".to_owned())),
            ("name".to_owned(), AttributeValue::S("Alice".to_owned())),
            ("active".to_owned(), AttributeValue::Bool(true)),
        ]);
        let row = encode_item(&item, &ddl).unwrap();
        let (decoded, raw) = decode_row(&row, &ddl).unwrap();
        assert_eq!(decoded, item);
        assert!(raw.is_empty());
    }

    #[test]
    fn test_should_roundtrip_sets_and_lists() {
        let ddl = sample_ddl();
        let item = Item::from([
            (
                "tags".to_owned(),
                AttributeValue::Ss(vec!["a".to_owned(), "b".to_owned()]),
            ),
            (
                "scores".to_owned(),
                AttributeValue::Ns(vec!["1".to_owned(), "2.5".to_owned()]),
            ),
            (
                "list_type".to_owned(),
                AttributeValue::L(vec![
                    AttributeValue::S("test".to_owned()),
                    AttributeValue::N("7".to_owned()),
                ]),
            ),
        ]);
        let row = encode_item(&item, &ddl).unwrap();
        assert!(matches!(row.get("tags"), Some(ColumnValue::StringArray(_))));
        assert!(matches!(row.get("list_type"), Some(ColumnValue::Json(_))));

        let (decoded, _) = decode_row(&row, &ddl).unwrap();
        assert_eq!(decoded.get("tags"), item.get("tags"));
        assert_eq!(decoded.get("scores"), item.get("scores"));
        assert_eq!(decoded.get("list_type"), item.get("list_type"));
    }

    #[test]
    fn test_should_preserve_raw_json_for_map_columns() {
        let ddl = sample_ddl();
        let inner = Item::from([("city".to_owned(), AttributeValue::S("Pune".to_owned()))]);
        let item = Item::from([("profile".to_owned(), AttributeValue::M(inner))]);
        let row = encode_item(&item, &ddl).unwrap();
        let (_, raw) = decode_row(&row, &ddl).unwrap();
        assert_eq!(raw["profile"]["city"], Json::String("Pune".to_owned()));
    }

    #[test]
    fn test_should_reject_unknown_column() {
        let ddl = sample_ddl();
        let item = Item::from([("ghost".to_owned(), AttributeValue::S("x".to_owned()))]);
        let err = encode_item(&item, &ddl).unwrap_err();
        assert!(matches!(err, CodecError::UnknownColumn { .. }));
    }

    #[test]
    fn test_should_reject_type_mismatch() {
        let ddl = sample_ddl();
        let item = Item::from([("emp_id".to_owned(), AttributeValue::S("3".to_owned()))]);
        assert!(matches!(
            encode_item(&item, &ddl).unwrap_err(),
            CodecError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_should_reject_non_finite_numbers() {
        assert!(parse_number("inf").is_err());
        assert!(parse_number("NaN").is_err());
        assert!(parse_number("not-a-number").is_err());
        assert_eq!(parse_number("3.5").unwrap(), 3.5);
    }

    #[test]
    fn test_should_format_integral_floats_as_integers() {
        assert_eq!(format_number(11.0), "11");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(3.25), "3.25");
    }

    #[test]
    fn test_should_decode_base64_string_column_as_binary() {
        let value = decode_string_column("aGVsbG8=");
        assert_eq!(value, AttributeValue::B(Bytes::from_static(b"hello")));
        // No '=' suffix: stays a string even if alphabet-valid.
        assert_eq!(
            decode_string_column("abcd"),
            AttributeValue::S("abcd".to_owned())
        );
    }

    #[test]
    fn test_should_not_re_decode_base64_on_encode() {
        let ddl = sample_ddl();
        let item = Item::from([("name".to_owned(), AttributeValue::S("aGVsbG8=".to_owned()))]);
        let row = encode_item(&item, &ddl).unwrap();
        // The original tag dictates the wire/storage form.
        assert_eq!(
            row.get("name"),
            Some(&ColumnValue::String("aGVsbG8=".to_owned()))
        );
    }

    #[test]
    fn test_should_json_decode_bytes_column_payload() {
        let payload = Bytes::from_static(br#"["one", 2]"#);
        let decoded = decode_bytes_column(&payload);
        let AttributeValue::L(items) = decoded else {
            panic!("expected list, got {decoded:?}");
        };
        assert_eq!(items[0], AttributeValue::S("one".to_owned()));
        assert_eq!(items[1], AttributeValue::N("2".to_owned()));
    }

    #[test]
    fn test_should_fall_back_to_raw_text_for_bad_json_bytes() {
        let payload = Bytes::from_static(b"not json");
        assert_eq!(
            decode_bytes_column(&payload),
            AttributeValue::S("not json".to_owned())
        );
    }

    #[test]
    fn test_should_decode_json_text_stored_in_string_column() {
        let mut ddl = sample_ddl();
        ddl.insert("list_type".to_owned(), TypeCode::L);
        let row = Row::from([(
            "list_type".to_owned(),
            ColumnValue::String(r#"["a","b"]"#.to_owned()),
        )]);
        let (item, _) = decode_row(&row, &ddl).unwrap();
        assert!(matches!(item.get("list_type"), Some(AttributeValue::L(v)) if v.len() == 2));
    }

    #[test]
    fn test_should_omit_null_columns() {
        let ddl = sample_ddl();
        let row = Row::from([
            ("name".to_owned(), ColumnValue::Null),
            ("emp_id".to_owned(), ColumnValue::Double(1.0)),
        ]);
        let (item, _) = decode_row(&row, &ddl).unwrap();
        assert!(!item.contains_key("name"));
        assert_eq!(item.get("emp_id"), Some(&AttributeValue::N("1".to_owned())));
    }
}
