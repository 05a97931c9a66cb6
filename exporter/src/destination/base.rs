use std::fmt;
use std::future::Future;

use crate::error::ExportResult;
use crate::schema::{SchemaDescriptor, TableSchemaSource};
use crate::types::ResolvedTableName;

/// Durable hand-off for serialized rows.
///
/// The only contract is to publish exactly the given payload and return once the messaging
/// system has accepted it, or report why it did not.
pub trait Publisher {
    /// Returns the name of the publisher.
    fn name() -> &'static str;

    /// Publishes `payload` to `topic` and waits for the acknowledgement.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = ExportResult<()>> + Send;
}

/// Warehouse accepting encoded rows through write streams.
///
/// A direct write opens a stream for the destination table, appends the encoded rows with the
/// descriptor they were encoded against, finalizes the stream and commits it. Implementations
/// writing to a committed default stream may treat finalize and commit as no-ops.
pub trait Warehouse: TableSchemaSource {
    /// Returns the name of the warehouse.
    fn name() -> &'static str;

    fn open_stream(
        &self,
        table: &ResolvedTableName,
    ) -> impl Future<Output = ExportResult<WriteStream>> + Send;

    /// Appends protobuf encoded `rows` to `stream`.
    fn append_rows(
        &self,
        stream: &WriteStream,
        descriptor: &SchemaDescriptor,
        rows: Vec<Vec<u8>>,
    ) -> impl Future<Output = ExportResult<()>> + Send;

    fn finalize_stream(&self, stream: &WriteStream) -> impl Future<Output = ExportResult<()>> + Send;

    /// Makes the rows of finalized `streams` visible in `table`.
    fn commit_streams(
        &self,
        table: &ResolvedTableName,
        streams: &[WriteStream],
    ) -> impl Future<Output = ExportResult<()>> + Send;
}

/// Kind of write stream, following the Storage Write API stream types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStreamKind {
    /// The table's always open default stream. Appends are visible immediately.
    Default,
    /// An application created stream whose rows become visible on commit.
    Pending,
}

/// An open write stream of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStream {
    pub table: ResolvedTableName,
    pub name: String,
    pub kind: WriteStreamKind,
}

impl WriteStream {
    /// The default stream of `table`.
    pub fn default_for(table: &ResolvedTableName) -> Self {
        Self {
            name: format!(
                "projects/{}/datasets/{}/tables/{}/streams/_default",
                table.project_id, table.dataset_id, table.table_name
            ),
            table: table.clone(),
            kind: WriteStreamKind::Default,
        }
    }
}

impl fmt::Display for WriteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
