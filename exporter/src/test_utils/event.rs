use crate::types::{Document, DocumentEventData, DocumentMask, Value};

/// Project every test document lives in.
pub const TEST_PROJECT_ID: &str = "test-project";

pub fn document_name(collection: &str, document_id: &str) -> String {
    format!("projects/{TEST_PROJECT_ID}/databases/(default)/documents/{collection}/{document_id}")
}

pub fn document<'a>(
    collection: &str,
    document_id: &str,
    fields: impl IntoIterator<Item = (&'a str, Value)>,
) -> Document {
    Document::new(document_name(collection, document_id), fields)
}

/// An event for a newly created document.
pub fn create_event<'a>(
    collection: &str,
    document_id: &str,
    fields: impl IntoIterator<Item = (&'a str, Value)>,
) -> DocumentEventData {
    DocumentEventData {
        value: Some(document(collection, document_id, fields)),
        old_value: None,
        update_mask: None,
    }
}

/// An event for an updated document. `changed` becomes the update mask when given.
pub fn update_event<'a>(
    collection: &str,
    document_id: &str,
    old_fields: impl IntoIterator<Item = (&'a str, Value)>,
    new_fields: impl IntoIterator<Item = (&'a str, Value)>,
    changed: Option<&[&str]>,
) -> DocumentEventData {
    DocumentEventData {
        value: Some(document(collection, document_id, new_fields)),
        old_value: Some(document(collection, document_id, old_fields)),
        update_mask: changed.map(|paths| DocumentMask {
            field_paths: paths.iter().map(|path| (*path).to_owned()).collect(),
        }),
    }
}

/// An event for a deleted document, carrying only the old snapshot.
pub fn delete_event<'a>(
    collection: &str,
    document_id: &str,
    fields: impl IntoIterator<Item = (&'a str, Value)>,
) -> DocumentEventData {
    DocumentEventData {
        value: None,
        old_value: Some(document(collection, document_id, fields)),
        update_mask: None,
    }
}
