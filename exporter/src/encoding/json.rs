//! Schema guided decoding of a JSON row into a [`DynamicMessage`].
//!
//! The accepted forms follow the protobuf JSON mapping: 64 bit integers may be numbers or
//! decimal strings, doubles accept `"NaN"` and `"Infinity"`, and bytes are base64 text.

use base64::Engine;
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE};
use serde_json::{Map, Value};

use crate::bail;
use crate::encoding::message::{DynamicMessage, FieldValue};
use crate::error::{ErrorKind, ExportResult};
use crate::schema::{FieldDescriptor, FieldKind, FieldLabel, MessageDescriptor};

/// Decodes a JSON object into a message of type `descriptor`.
///
/// Keys without a matching field, values of the wrong shape, and required fields that are
/// missing or null all fail with [`ErrorKind::EncodingFailed`].
pub fn decode_message(descriptor: &MessageDescriptor, value: &Value) -> ExportResult<DynamicMessage> {
    let Value::Object(object) = value else {
        bail!(
            ErrorKind::EncodingFailed,
            "Row must be a JSON object",
            descriptor.name.clone()
        );
    };

    decode_object(descriptor, object, &descriptor.name)
}

fn decode_object(
    descriptor: &MessageDescriptor,
    object: &Map<String, Value>,
    path: &str,
) -> ExportResult<DynamicMessage> {
    if let Some(unknown) = object.keys().find(|key| descriptor.field(key).is_none()) {
        bail!(
            ErrorKind::EncodingFailed,
            "Row field is not a column of the destination table",
            format!("{path}.{unknown}")
        );
    }

    let mut message = DynamicMessage::default();
    for field in &descriptor.fields {
        let field_path = format!("{path}.{}", field.name);

        match object.get(&field.name) {
            None | Some(Value::Null) => {
                if field.label == FieldLabel::Required {
                    bail!(
                        ErrorKind::EncodingFailed,
                        "Required column has no value",
                        field_path
                    );
                }
            }
            Some(value) => {
                let decoded = decode_field(field, value, &field_path)?;
                message.push(field.number, decoded);
            }
        }
    }

    Ok(message)
}

fn decode_field(field: &FieldDescriptor, value: &Value, path: &str) -> ExportResult<FieldValue> {
    if field.label != FieldLabel::Repeated {
        return decode_single(&field.kind, value, path);
    }

    let Value::Array(elements) = value else {
        bail!(
            ErrorKind::EncodingFailed,
            "Repeated column expects an array",
            path
        );
    };

    let mut decoded = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        let element_path = format!("{path}[{index}]");
        if element.is_null() {
            bail!(
                ErrorKind::EncodingFailed,
                "Repeated column cannot hold null elements",
                element_path
            );
        }

        decoded.push(decode_single(&field.kind, element, &element_path)?);
    }

    Ok(FieldValue::Repeated(decoded))
}

fn decode_single(kind: &FieldKind, value: &Value, path: &str) -> ExportResult<FieldValue> {
    let decoded = match (kind, value) {
        (FieldKind::Bool, Value::Bool(b)) => FieldValue::Bool(*b),
        (FieldKind::Int64, Value::Number(_) | Value::String(_)) => {
            FieldValue::Int64(parse_int64(value, path)?)
        }
        (FieldKind::Double, Value::Number(_) | Value::String(_)) => {
            FieldValue::Double(parse_double(value, path)?)
        }
        (FieldKind::String, Value::String(s)) => FieldValue::String(s.clone()),
        (FieldKind::Decimal, Value::String(s)) => FieldValue::String(s.clone()),
        (FieldKind::Decimal, Value::Number(n)) => FieldValue::String(n.to_string()),
        (FieldKind::Json, value) => FieldValue::String(value.to_string()),
        (FieldKind::Bytes, Value::String(s)) => FieldValue::Bytes(parse_base64(s, path)?),
        (FieldKind::Message(nested), Value::Object(object)) => {
            FieldValue::Message(decode_object(nested, object, path)?)
        }
        (kind, value) => bail!(
            ErrorKind::EncodingFailed,
            "Value cannot be represented by the column type",
            format!("{path}: expected {}, found {}", kind_name(kind), json_type(value))
        ),
    };

    Ok(decoded)
}

fn parse_int64(value: &Value, path: &str) -> ExportResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match parsed {
        Some(parsed) => Ok(parsed),
        None => bail!(
            ErrorKind::EncodingFailed,
            "Value is not a 64 bit integer",
            format!("{path}: {value}")
        ),
    }
}

fn parse_double(value: &Value, path: &str) -> ExportResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.trim().parse::<f64>().ok(),
        },
        _ => None,
    };

    match parsed {
        Some(parsed) => Ok(parsed),
        None => bail!(
            ErrorKind::EncodingFailed,
            "Value is not a floating point number",
            format!("{path}: {value}")
        ),
    }
}

fn parse_base64(text: &str, path: &str) -> ExportResult<Vec<u8>> {
    match BASE64_STANDARD
        .decode(text)
        .or_else(|_| BASE64_URL_SAFE.decode(text))
    {
        Ok(bytes) => Ok(bytes),
        Err(err) => bail!(
            ErrorKind::EncodingFailed,
            "Value is not base64 encoded",
            path,
            source: err
        ),
    }
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool => "bool",
        FieldKind::Int64 => "int64",
        FieldKind::Double => "double",
        FieldKind::String => "string",
        FieldKind::Decimal => "decimal",
        FieldKind::Json => "json",
        FieldKind::Bytes => "bytes",
        FieldKind::Message(_) => "record",
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
