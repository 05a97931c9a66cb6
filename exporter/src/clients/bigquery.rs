use std::fmt;

use futures::StreamExt;
use gcp_bigquery_client::Client;
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::google::cloud::bigquery::storage::v1::append_rows_request::{
    self, ProtoData,
};
use gcp_bigquery_client::google::cloud::bigquery::storage::v1::{
    ProtoRows, ProtoSchema, RowError, append_rows_response,
};
use gcp_bigquery_client::model::field_type::FieldType;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::storage::StreamName;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use tracing::{debug, info};

use crate::destination::{Warehouse, WriteStream, WriteStreamKind};
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::schema::{ColumnMode, ColumnSchema, ColumnType, SchemaDescriptor, TableSchemaSource};
use crate::types::ResolvedTableName;
use crate::{bail, export_error};

/// Trace identifier attached to Storage Write API requests.
const EXPORTER_TRACE_ID: &str = "firestore-bigquery-exporter";

/// Converts BigQuery errors to export errors of `kind`.
///
/// The description names the failing layer, the detail keeps the client's message.
fn bq_error_to_export_error(err: BQError, kind: ErrorKind) -> ExportError {
    let description = match &err {
        BQError::InvalidServiceAccountKey(_) => "Invalid BigQuery service account key",
        BQError::InvalidServiceAccountAuthenticator(_) => {
            "Invalid BigQuery service account authenticator"
        }
        BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => {
            "Invalid BigQuery application default credentials"
        }
        BQError::AuthError(_) | BQError::YupAuthError(_) => "BigQuery authentication error",
        BQError::NoToken => "BigQuery authentication token missing",
        BQError::RequestError(_) => "BigQuery request failed",
        BQError::TonicTransportError(_) => "BigQuery transport error",
        BQError::TonicStatusError(_) => "BigQuery rejected the request",
        BQError::ResponseError { error } if error.error.code == 404 => {
            "BigQuery table was not found"
        }
        BQError::ResponseError { .. } => "BigQuery response error",
        _ => "BigQuery client error",
    };

    export_error!(kind, description, err.to_string())
}

/// Builds the append payload, sending the writer schema along with every batch.
fn proto_rows(descriptor: &SchemaDescriptor, rows: Vec<Vec<u8>>) -> append_rows_request::Rows {
    append_rows_request::Rows::ProtoRows(ProtoData {
        writer_schema: Some(ProtoSchema {
            proto_descriptor: Some(descriptor.descriptor_proto.clone()),
        }),
        rows: Some(ProtoRows {
            serialized_rows: rows,
        }),
    })
}

/// Converts BigQuery row errors to a dispatch error.
fn row_errors_to_export_error(errors: Vec<RowError>) -> ExportError {
    export_error!(
        ErrorKind::DispatchFailed,
        "BigQuery rejected appended rows",
        format!("{errors:?}")
    )
}

/// Maps a table field to a column, descending into records.
fn field_to_column(field: &TableFieldSchema) -> ColumnSchema {
    #[allow(unreachable_patterns)]
    let typ = match &field.r#type {
        FieldType::String => ColumnType::String,
        FieldType::Bytes => ColumnType::Bytes,
        FieldType::Integer | FieldType::Int64 => ColumnType::Int64,
        FieldType::Float | FieldType::Float64 => ColumnType::Float64,
        FieldType::Numeric => ColumnType::Numeric,
        FieldType::Bignumeric => ColumnType::BigNumeric,
        FieldType::Boolean | FieldType::Bool => ColumnType::Bool,
        FieldType::Timestamp => ColumnType::Timestamp,
        FieldType::Date => ColumnType::Date,
        FieldType::Time => ColumnType::Time,
        FieldType::Datetime => ColumnType::DateTime,
        FieldType::Geography => ColumnType::Geography,
        FieldType::Json => ColumnType::Json,
        FieldType::Record | FieldType::Struct => ColumnType::Record(
            field
                .fields
                .iter()
                .flatten()
                .map(field_to_column)
                .collect(),
        ),
        other => ColumnType::Unsupported(format!("{other:?}").to_ascii_uppercase()),
    };

    ColumnSchema::new(
        field.name.clone(),
        typ,
        ColumnMode::parse(field.mode.as_deref()),
    )
}

/// Client for BigQuery table metadata and the Storage Write API.
///
/// Rows are appended to the default stream of the destination table, which makes them visible
/// as soon as the append is acknowledged.
#[derive(Clone)]
pub struct BigQueryClient {
    project_id: String,
    client: Client,
}

impl BigQueryClient {
    /// Creates a new [`BigQueryClient`] from a service account key JSON string.
    pub async fn new_with_key(project_id: String, sa_key: &str) -> ExportResult<BigQueryClient> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(|err| bq_error_to_export_error(err, ErrorKind::ConfigError))?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(|err| bq_error_to_export_error(err, ErrorKind::ConfigError))?;

        Ok(BigQueryClient { project_id, client })
    }

    /// Creates a new [`BigQueryClient`] using Application Default Credentials.
    pub async fn new_with_adc(project_id: String) -> ExportResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_application_default_credentials()
            .await
            .map_err(|err| bq_error_to_export_error(err, ErrorKind::ConfigError))?;

        Ok(BigQueryClient { project_id, client })
    }

    /// Project used for tables referenced without one.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl TableSchemaSource for BigQueryClient {
    async fn table_schema(&self, table: &ResolvedTableName) -> ExportResult<Vec<ColumnSchema>> {
        debug!(%table, "reading table metadata from bigquery");

        let metadata = self
            .client
            .table()
            .get(&table.project_id, &table.dataset_id, &table.table_name, None)
            .await
            .map_err(|err| bq_error_to_export_error(err, ErrorKind::SchemaFetchFailed))?;

        let columns: Vec<ColumnSchema> = metadata
            .schema
            .fields
            .iter()
            .flatten()
            .map(field_to_column)
            .collect();

        info!(%table, columns = columns.len(), "read table schema from bigquery");

        Ok(columns)
    }
}

impl Warehouse for BigQueryClient {
    fn name() -> &'static str {
        "bigquery"
    }

    async fn open_stream(&self, table: &ResolvedTableName) -> ExportResult<WriteStream> {
        Ok(WriteStream::default_for(table))
    }

    async fn append_rows(
        &self,
        stream: &WriteStream,
        descriptor: &SchemaDescriptor,
        rows: Vec<Vec<u8>>,
    ) -> ExportResult<()> {
        let stream_name = StreamName::new_default(
            stream.table.project_id.clone(),
            stream.table.dataset_id.clone(),
            stream.table.table_name.clone(),
        );
        let num_rows = rows.len();
        let proto_rows = proto_rows(descriptor, rows);

        // Appending needs a mutable storage handle; clones share the underlying channel.
        let mut client = self.client.clone();
        let mut response_stream = client
            .storage_mut()
            .append_rows(&stream_name, proto_rows, EXPORTER_TRACE_ID.to_owned())
            .await
            .map_err(|err| bq_error_to_export_error(err, ErrorKind::DispatchFailed))?;

        let Some(response) = response_stream.next().await else {
            bail!(
                ErrorKind::DispatchFailed,
                "BigQuery closed the append stream without a response",
                stream
            );
        };
        let response = response
            .map_err(BQError::from)
            .map_err(|err| bq_error_to_export_error(err, ErrorKind::DispatchFailed))?;

        if !response.row_errors.is_empty() {
            return Err(row_errors_to_export_error(response.row_errors));
        }
        if let Some(append_rows_response::Response::Error(status)) = &response.response {
            bail!(
                ErrorKind::DispatchFailed,
                "BigQuery rejected the append request",
                format!("code {}: {}", status.code, status.message)
            );
        }

        debug!(%stream, num_rows, "appended rows to bigquery");

        Ok(())
    }

    async fn finalize_stream(&self, stream: &WriteStream) -> ExportResult<()> {
        if stream.kind == WriteStreamKind::Default {
            debug!(%stream, "default stream needs no finalization");
            return Ok(());
        }

        bail!(
            ErrorKind::DispatchFailed,
            "Only default write streams are supported",
            stream
        );
    }

    async fn commit_streams(
        &self,
        table: &ResolvedTableName,
        streams: &[WriteStream],
    ) -> ExportResult<()> {
        if streams
            .iter()
            .all(|stream| stream.kind == WriteStreamKind::Default)
        {
            debug!(%table, "default stream appends are committed on acknowledgement");
            return Ok(());
        }

        bail!(
            ErrorKind::DispatchFailed,
            "Only default write streams are supported",
            table
        );
    }
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, typ: FieldType, mode: Option<&str>) -> TableFieldSchema {
        let mut field = TableFieldSchema::new(name, typ);
        field.mode = mode.map(str::to_owned);
        field
    }

    #[test]
    fn test_field_to_column() {
        let mut address = field("Address", FieldType::Record, None);
        address.fields = Some(vec![
            field("City", FieldType::String, Some("REQUIRED")),
            field("Zip", FieldType::Integer, None),
        ]);

        assert_eq!(
            field_to_column(&address),
            ColumnSchema::nullable(
                "Address",
                ColumnType::Record(vec![
                    ColumnSchema::required("City", ColumnType::String),
                    ColumnSchema::nullable("Zip", ColumnType::Int64),
                ])
            )
        );
        assert_eq!(
            field_to_column(&field("Tags", FieldType::String, Some("REPEATED"))),
            ColumnSchema::repeated("Tags", ColumnType::String)
        );
        assert_eq!(
            field_to_column(&field("At", FieldType::Timestamp, None)).typ,
            ColumnType::Timestamp
        );
    }

    #[test]
    fn test_proto_rows_carry_writer_schema() {
        let table = ResolvedTableName {
            project_id: "p".to_owned(),
            dataset_id: "ds".to_owned(),
            table_name: "orders_mirror".to_owned(),
        };
        let descriptor = SchemaDescriptor::derive(
            table,
            &[ColumnSchema::nullable("Name", ColumnType::String)],
        )
        .unwrap();

        let append_rows_request::Rows::ProtoRows(data) =
            proto_rows(&descriptor, vec![vec![1, 2], vec![3]]);

        assert_eq!(
            data.writer_schema.unwrap().proto_descriptor,
            Some(descriptor.descriptor_proto.clone())
        );
        assert_eq!(data.rows.unwrap().serialized_rows, vec![vec![1, 2], vec![3]]);
    }
}
