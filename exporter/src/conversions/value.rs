use std::collections::{BTreeMap, btree_map};
use std::slice;

use chrono::DateTime;

use crate::types::{ExtractedValue, GeoPoint, Value, value::Kind};

/// Converts a document value into an [`ExtractedValue`].
///
/// The conversion is total: unset values and timestamps outside the representable range become
/// [`ExtractedValue::Null`]. Arrays keep their order and maps keep every key. Nested containers
/// are walked with an explicit stack, so arbitrarily deep documents do not grow the call stack.
pub fn extract_value(value: &Value) -> ExtractedValue {
    let mut stack: Vec<Frame<'_>> = Vec::new();
    let mut next = Some(value);

    loop {
        let mut produced = next.take().and_then(|value| match step(value) {
            Step::Leaf(leaf) => Some(leaf),
            Step::Enter(frame) => {
                stack.push(frame);
                None
            }
        });

        loop {
            let Some(frame) = stack.last_mut() else {
                return produced.unwrap_or(ExtractedValue::Null);
            };

            if let Some(child) = produced.take() {
                frame.push(child);
            }

            if let Some(child) = frame.next_child() {
                next = Some(child);
                break;
            }

            produced = stack.pop().map(Frame::finish);
        }
    }
}

enum Step<'a> {
    Leaf(ExtractedValue),
    Enter(Frame<'a>),
}

/// A container whose children are still being converted.
enum Frame<'a> {
    Array {
        pending: slice::Iter<'a, Value>,
        done: Vec<ExtractedValue>,
    },
    Map {
        pending: btree_map::Iter<'a, String, Value>,
        key: Option<&'a String>,
        done: BTreeMap<String, ExtractedValue>,
    },
}

impl<'a> Frame<'a> {
    fn next_child(&mut self) -> Option<&'a Value> {
        match self {
            Frame::Array { pending, .. } => pending.next(),
            Frame::Map { pending, key, .. } => pending.next().map(|(name, value)| {
                *key = Some(name);
                value
            }),
        }
    }

    fn push(&mut self, value: ExtractedValue) {
        match self {
            Frame::Array { done, .. } => done.push(value),
            Frame::Map { key, done, .. } => {
                if let Some(key) = key.take() {
                    done.insert(key.clone(), value);
                }
            }
        }
    }

    fn finish(self) -> ExtractedValue {
        match self {
            Frame::Array { done, .. } => ExtractedValue::Array(done),
            Frame::Map { done, .. } => ExtractedValue::Map(done),
        }
    }
}

fn step(value: &Value) -> Step<'_> {
    let Some(kind) = &value.kind else {
        return Step::Leaf(ExtractedValue::Null);
    };

    let leaf = match kind {
        Kind::NullValue(_) => ExtractedValue::Null,
        Kind::BooleanValue(value) => ExtractedValue::Bool(*value),
        Kind::IntegerValue(value) => ExtractedValue::Integer(*value),
        Kind::DoubleValue(value) => ExtractedValue::Double(*value),
        Kind::TimestampValue(timestamp) => u32::try_from(timestamp.nanos)
            .ok()
            .and_then(|nanos| DateTime::from_timestamp(timestamp.seconds, nanos))
            .map(ExtractedValue::Timestamp)
            .unwrap_or(ExtractedValue::Null),
        Kind::StringValue(value) => ExtractedValue::String(value.clone()),
        Kind::BytesValue(value) => ExtractedValue::Bytes(value.clone()),
        Kind::ReferenceValue(value) => ExtractedValue::Reference(value.clone()),
        Kind::GeoPointValue(point) => ExtractedValue::GeoPoint(GeoPoint {
            latitude: point.latitude,
            longitude: point.longitude,
        }),
        Kind::ArrayValue(array) => {
            return Step::Enter(Frame::Array {
                pending: array.values.iter(),
                done: Vec::with_capacity(array.values.len()),
            });
        }
        Kind::MapValue(map) => {
            return Step::Enter(Frame::Map {
                pending: map.fields.iter(),
                key: None,
                done: BTreeMap::new(),
            });
        }
    };

    Step::Leaf(leaf)
}
