//! Firestore change event payload.
//!
//! The messages mirror `google.events.cloud.firestore.v1.DocumentEventData` and its nested types
//! with identical field numbers, so the binary body of a Firestore CloudEvent decodes directly
//! into them. Fields these messages do not declare are skipped by the decoder.

use std::collections::BTreeMap;

use prost::Message;

use crate::error::ExportResult;

/// Body of a Firestore document change event.
#[derive(Clone, PartialEq, Message)]
pub struct DocumentEventData {
    /// Snapshot after the change. Absent for deletes.
    #[prost(message, optional, tag = "1")]
    pub value: Option<Document>,
    /// Snapshot before the change. Absent for creates.
    #[prost(message, optional, tag = "2")]
    pub old_value: Option<Document>,
    /// Changed field paths, only present for updates.
    #[prost(message, optional, tag = "3")]
    pub update_mask: Option<DocumentMask>,
}

impl DocumentEventData {
    /// Decodes a protobuf encoded event body.
    pub fn decode_event(body: &[u8]) -> ExportResult<Self> {
        Ok(Self::decode(body)?)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Document {
    /// `projects/{project}/databases/{database}/documents/{collection}/{id}`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(btree_map = "string, message", tag = "2")]
    pub fields: BTreeMap<String, Value>,
    #[prost(message, optional, tag = "3")]
    pub create_time: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub update_time: Option<prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DocumentMask {
    #[prost(string, repeated, tag = "1")]
    pub field_paths: Vec<String>,
}

/// A dynamically typed document value.
#[derive(Clone, PartialEq, Message)]
pub struct Value {
    #[prost(oneof = "value::Kind", tags = "11, 1, 2, 3, 10, 17, 18, 5, 8, 9, 6")]
    pub kind: Option<value::Kind>,
}

pub mod value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        /// `google.protobuf.NullValue`, always zero.
        #[prost(int32, tag = "11")]
        NullValue(i32),
        #[prost(bool, tag = "1")]
        BooleanValue(bool),
        #[prost(int64, tag = "2")]
        IntegerValue(i64),
        #[prost(double, tag = "3")]
        DoubleValue(f64),
        #[prost(message, tag = "10")]
        TimestampValue(prost_types::Timestamp),
        #[prost(string, tag = "17")]
        StringValue(String),
        #[prost(bytes = "vec", tag = "18")]
        BytesValue(Vec<u8>),
        #[prost(string, tag = "5")]
        ReferenceValue(String),
        #[prost(message, tag = "8")]
        GeoPointValue(super::LatLng),
        #[prost(message, tag = "9")]
        ArrayValue(super::ArrayValue),
        #[prost(message, tag = "6")]
        MapValue(super::MapValue),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ArrayValue {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<Value>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MapValue {
    #[prost(btree_map = "string, message", tag = "1")]
    pub fields: BTreeMap<String, Value>,
}

/// `google.type.LatLng`
#[derive(Clone, Copy, PartialEq, Message)]
pub struct LatLng {
    #[prost(double, tag = "1")]
    pub latitude: f64,
    #[prost(double, tag = "2")]
    pub longitude: f64,
}

impl Value {
    pub fn null() -> Self {
        Self::from_kind(value::Kind::NullValue(0))
    }

    pub fn timestamp(seconds: i64, nanos: i32) -> Self {
        Self::from_kind(value::Kind::TimestampValue(prost_types::Timestamp {
            seconds,
            nanos,
        }))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_kind(value::Kind::BytesValue(bytes.into()))
    }

    pub fn reference(path: impl Into<String>) -> Self {
        Self::from_kind(value::Kind::ReferenceValue(path.into()))
    }

    pub fn geo_point(latitude: f64, longitude: f64) -> Self {
        Self::from_kind(value::Kind::GeoPointValue(LatLng {
            latitude,
            longitude,
        }))
    }

    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Self::from_kind(value::Kind::ArrayValue(ArrayValue {
            values: values.into_iter().collect(),
        }))
    }

    pub fn map<K>(fields: impl IntoIterator<Item = (K, Value)>) -> Self
    where
        K: Into<String>,
    {
        Self::from_kind(value::Kind::MapValue(MapValue {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }))
    }

    fn from_kind(kind: value::Kind) -> Self {
        Self { kind: Some(kind) }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::from_kind(value::Kind::BooleanValue(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::from_kind(value::Kind::IntegerValue(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::from_kind(value::Kind::DoubleValue(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::from_kind(value::Kind::StringValue(value.to_owned()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::from_kind(value::Kind::StringValue(value))
    }
}

impl Document {
    pub fn new<K>(name: impl Into<String>, fields: impl IntoIterator<Item = (K, Value)>) -> Self
    where
        K: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            create_time: None,
            update_time: None,
        }
    }
}
