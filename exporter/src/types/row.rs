use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::types::ExtractedValue;

/// Reserved column recording whether a row is an upsert or a delete.
///
/// BigQuery CDC reads this pseudo column on Storage Write appends.
pub const CHANGE_TYPE_COLUMN: &str = "_CHANGE_TYPE";

/// Kind of change a document event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    /// Creates and updates both become upserts because the destination merges by key.
    pub fn marker(&self) -> ChangeMarker {
        match self {
            ChangeType::Create | ChangeType::Update => ChangeMarker::Upsert,
            ChangeType::Delete => ChangeMarker::Delete,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Create => write!(f, "create"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// Value stored in [`CHANGE_TYPE_COLUMN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMarker {
    Upsert,
    Delete,
}

impl ChangeMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeMarker::Upsert => "UPSERT",
            ChangeMarker::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged row built from one change event.
///
/// Holds only the configured fields that were present on the snapshot; a missing field is not
/// the same as a field explicitly set to null. The marker is kept apart from the values and
/// is always rendered last under [`CHANGE_TYPE_COLUMN`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: BTreeMap<String, ExtractedValue>,
    marker: ChangeMarker,
}

impl Row {
    pub fn new(marker: ChangeMarker) -> Self {
        Self {
            values: BTreeMap::new(),
            marker,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ExtractedValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedValue> {
        self.values.get(name)
    }

    pub fn marker(&self) -> ChangeMarker {
        self.marker
    }

    /// Field values in name order, without the marker.
    pub fn values(&self) -> impl Iterator<Item = (&str, &ExtractedValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields, without the marker.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serializes the row as one flat JSON object for the durable hand-off.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(CHANGE_TYPE_COLUMN, self.marker.as_str())?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        assert_eq!(ChangeType::Create.marker(), ChangeMarker::Upsert);
        assert_eq!(ChangeType::Update.marker(), ChangeMarker::Upsert);
        assert_eq!(ChangeType::Delete.marker(), ChangeMarker::Delete);
        assert_eq!(ChangeMarker::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_marker_is_serialized_last() {
        let mut row = Row::new(ChangeMarker::Delete);
        row.insert("name", ExtractedValue::String("a".to_owned()));
        row.insert("age", ExtractedValue::Integer(3));

        let json = String::from_utf8(row.to_json_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"age":3,"name":"a","_CHANGE_TYPE":"DELETE"}"#);
    }
}
