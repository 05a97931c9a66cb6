use crate::types::{ExtractedValue, GeoPoint, Row};

/// Rewrites values the warehouse wire format has no native representation for.
///
/// Timestamps become integer microseconds since the epoch, geo points become WKT points, and
/// non finite doubles become the strings understood by the JSON decoder. Conversion is applied
/// inside arrays and maps as well.
pub fn prepare_row(row: &Row) -> Row {
    let mut prepared = Row::new(row.marker());
    for (name, value) in row.values() {
        prepared.insert(name, prepare_value(value));
    }

    prepared
}

fn prepare_value(value: &ExtractedValue) -> ExtractedValue {
    match value {
        ExtractedValue::Timestamp(timestamp) => ExtractedValue::Integer(timestamp.timestamp_micros()),
        ExtractedValue::GeoPoint(point) => ExtractedValue::String(well_known_text(point)),
        ExtractedValue::Double(value) if value.is_nan() => ExtractedValue::String("NaN".to_owned()),
        ExtractedValue::Double(value) if value.is_infinite() => {
            let literal = if value.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            ExtractedValue::String(literal.to_owned())
        }
        ExtractedValue::Array(values) => ExtractedValue::Array(values.iter().map(prepare_value).collect()),
        ExtractedValue::Map(fields) => ExtractedValue::Map(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), prepare_value(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn well_known_text(point: &GeoPoint) -> String {
    format!("POINT({} {})", point.longitude, point.latitude)
}
