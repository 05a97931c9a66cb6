use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::types::{DocumentName, TableName};

/// Number of `/` separated tokens in a top level document path.
const DOCUMENT_PATH_TOKENS: usize = 7;

/// Parses `projects/{project}/databases/{database}/documents/{collection}/{id}`.
///
/// Paths with more tokens point into a subcollection and fail with
/// [`ErrorKind::UnsupportedNestedCollection`]; anything else that does not match the layout,
/// including empty identifiers, fails with [`ErrorKind::MalformedPath`].
pub fn parse_document_name(path: &str) -> ExportResult<DocumentName> {
    let parts: Vec<&str> = path.split('/').collect();

    if parts.len() < DOCUMENT_PATH_TOKENS
        || parts[0] != "projects"
        || parts[2] != "databases"
        || parts[4] != "documents"
    {
        bail!(
            ErrorKind::MalformedPath,
            "Document name does not match projects/{p}/databases/{d}/documents/{collection}/{id}",
            path
        );
    }

    if parts.len() > DOCUMENT_PATH_TOKENS {
        bail!(
            ErrorKind::UnsupportedNestedCollection,
            "Documents in nested collections are not supported",
            path
        );
    }

    if [parts[1], parts[3], parts[5], parts[6]]
        .iter()
        .any(|part| part.is_empty())
    {
        bail!(
            ErrorKind::MalformedPath,
            "Document name has an empty identifier",
            path
        );
    }

    Ok(DocumentName {
        project_id: parts[1].to_owned(),
        database_id: parts[3].to_owned(),
        collection_name: parts[5].to_owned(),
        document_id: parts[6].to_owned(),
    })
}

/// Parses `dataset.table` or `project.dataset.table`.
///
/// Identifiers are not validated here; BigQuery reports invalid names when the table is used.
pub fn parse_table_name(reference: &str) -> ExportResult<TableName> {
    let parts: Vec<&str> = reference.split('.').collect();

    match parts.as_slice() {
        [dataset_id, table_name] => Ok(TableName {
            project_id: None,
            dataset_id: (*dataset_id).to_owned(),
            table_name: (*table_name).to_owned(),
        }),
        [project_id, dataset_id, table_name] => Ok(TableName {
            project_id: Some((*project_id).to_owned()),
            dataset_id: (*dataset_id).to_owned(),
            table_name: (*table_name).to_owned(),
        }),
        _ => bail!(
            ErrorKind::InvalidTableReference,
            "Table reference must have two or three dot separated parts",
            reference
        ),
    }
}
