use std::collections::BTreeMap;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Error, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A document value converted into native Rust types.
///
/// The variant set matches the document value model one to one. No unit conversion happens at
/// this level: timestamps stay timestamps and geo points stay coordinate pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Bytes(Vec<u8>),
    /// Path of the referenced document.
    Reference(String),
    GeoPoint(GeoPoint),
    Array(Vec<ExtractedValue>),
    Map(BTreeMap<String, ExtractedValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl ExtractedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ExtractedValue::Null)
    }
}

/// JSON rendering used for the Pub/Sub hand-off.
///
/// Timestamps are RFC 3339 strings, bytes are standard base64, and geo points are
/// `{"latitude": .., "longitude": ..}` objects. NaN and infinite doubles have no JSON form and
/// fail serialization instead of degrading to `null`.
impl Serialize for ExtractedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ExtractedValue::Null => serializer.serialize_unit(),
            ExtractedValue::Bool(value) => serializer.serialize_bool(*value),
            ExtractedValue::Integer(value) => serializer.serialize_i64(*value),
            ExtractedValue::Double(value) => serializer.serialize_f64(finite::<S::Error>(*value)?),
            ExtractedValue::Timestamp(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            ExtractedValue::String(value) | ExtractedValue::Reference(value) => {
                serializer.serialize_str(value)
            }
            ExtractedValue::Bytes(value) => {
                serializer.serialize_str(&BASE64_STANDARD.encode(value))
            }
            ExtractedValue::GeoPoint(value) => {
                finite::<S::Error>(value.latitude)?;
                finite::<S::Error>(value.longitude)?;
                value.serialize(serializer)
            }
            ExtractedValue::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            ExtractedValue::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

fn finite<E: Error>(value: f64) -> Result<f64, E> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(E::custom(format!("double value {value} has no JSON representation")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rendering() {
        let value = ExtractedValue::Map(BTreeMap::from([
            (
                "at".to_owned(),
                ExtractedValue::Timestamp(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
            ),
            ("blob".to_owned(), ExtractedValue::Bytes(b"hi".to_vec())),
            (
                "where".to_owned(),
                ExtractedValue::GeoPoint(GeoPoint {
                    latitude: 1.5,
                    longitude: -2.0,
                }),
            ),
            (
                "list".to_owned(),
                ExtractedValue::Array(vec![ExtractedValue::Null, ExtractedValue::Integer(7)]),
            ),
        ]));

        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({
                "at": "2023-11-14T22:13:20Z",
                "blob": "aGk=",
                "where": {"latitude": 1.5, "longitude": -2.0},
                "list": [null, 7],
            })
        );
    }

    #[test]
    fn test_non_finite_doubles_fail_json_rendering() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = serde_json::to_vec(&ExtractedValue::Double(value)).unwrap_err();
            assert!(err.to_string().contains("has no JSON representation"));
        }

        let nested = ExtractedValue::Map(BTreeMap::from([(
            "readings".to_owned(),
            ExtractedValue::Array(vec![
                ExtractedValue::Double(1.0),
                ExtractedValue::Double(f64::NAN),
            ]),
        )]));
        assert!(serde_json::to_vec(&nested).is_err());

        let point = ExtractedValue::GeoPoint(GeoPoint {
            latitude: f64::INFINITY,
            longitude: 0.0,
        });
        assert!(serde_json::to_vec(&point).is_err());

        assert_eq!(
            serde_json::to_value(ExtractedValue::Double(-0.5)).unwrap(),
            json!(-0.5)
        );
    }
}
