//! Encoding of tagged rows into the binary rows accepted by the Storage Write API.

mod json;
mod literal;
mod message;

use prost::Message;

pub use json::decode_message;
pub use literal::prepare_row;
pub use message::{DynamicMessage, FieldValue};

use crate::error::{ErrorKind, ExportResult};
use crate::export_error;
use crate::schema::MessageDescriptor;
use crate::types::Row;

/// Encodes `row` as a protobuf message of type `descriptor`.
///
/// Literal conversions run first, then the row is rendered as JSON and decoded against the
/// descriptor. Any failure aborts the row; no partial output is produced.
pub fn encode_row(row: &Row, descriptor: &MessageDescriptor) -> ExportResult<Vec<u8>> {
    let prepared = prepare_row(row);
    let rendered = serde_json::to_value(&prepared).map_err(|err| {
        export_error!(
            ErrorKind::EncodingFailed,
            "Row could not be rendered as JSON",
            err,
            source: err
        )
    })?;
    let message = decode_message(descriptor, &rendered)?;

    Ok(message.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::schema::{ColumnSchema, ColumnType, translate_columns};
    use crate::types::{ChangeMarker, ExtractedValue, GeoPoint};

    #[derive(Clone, PartialEq, Message)]
    struct OrderRow {
        #[prost(string, optional, tag = "1")]
        name: Option<String>,
        #[prost(double, optional, tag = "2")]
        amount: Option<f64>,
        #[prost(int64, optional, tag = "3")]
        placed_at: Option<i64>,
        #[prost(string, optional, tag = "4")]
        location: Option<String>,
        #[prost(string, optional, tag = "5")]
        change_type: Option<String>,
    }

    fn descriptor() -> MessageDescriptor {
        translate_columns(&[
            ColumnSchema::nullable("Name", ColumnType::String),
            ColumnSchema::nullable("Amount", ColumnType::Float64),
            ColumnSchema::nullable("PlacedAt", ColumnType::Timestamp),
            ColumnSchema::nullable("Location", ColumnType::Geography),
        ])
        .unwrap()
    }

    #[test]
    fn test_encode_row() {
        let mut row = Row::new(ChangeMarker::Upsert);
        row.insert("Name", ExtractedValue::String("Acme".to_owned()));
        row.insert("Amount", ExtractedValue::Double(42.5));
        row.insert(
            "PlacedAt",
            ExtractedValue::Timestamp(DateTime::from_timestamp(1_700_000_000, 5_000).unwrap()),
        );
        row.insert(
            "Location",
            ExtractedValue::GeoPoint(GeoPoint {
                latitude: 1.0,
                longitude: 2.0,
            }),
        );

        let bytes = encode_row(&row, &descriptor()).unwrap();
        let decoded = OrderRow::decode(bytes.as_slice()).unwrap();

        assert_eq!(
            decoded,
            OrderRow {
                name: Some("Acme".to_owned()),
                amount: Some(42.5),
                placed_at: Some(1_700_000_000_000_005),
                location: Some("POINT(2 1)".to_owned()),
                change_type: Some("UPSERT".to_owned()),
            }
        );
    }

    #[test]
    fn test_unknown_row_field_fails() {
        let mut row = Row::new(ChangeMarker::Delete);
        row.insert("Extra", ExtractedValue::Bool(true));

        let err = encode_row(&row, &descriptor()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingFailed);
    }
}
