use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::destination::{Publisher, Warehouse, WriteStream};
use crate::error::{ErrorKind, ExportResult};
use crate::schema::{ColumnSchema, SchemaDescriptor, TableSchemaSource};
use crate::types::ResolvedTableName;

/// A payload accepted by [`MemoryDestination::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Encoded rows accepted by [`MemoryDestination::append_rows`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppendedRows {
    pub stream: WriteStream,
    pub rows: Vec<Vec<u8>>,
}

/// A write stream call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOperation {
    Open(String),
    Append(String, usize),
    Finalize(String),
    Commit(String),
}

#[derive(Debug, Default)]
struct Inner {
    published: Vec<PublishedMessage>,
    table_schemas: HashMap<ResolvedTableName, Vec<ColumnSchema>>,
    schema_fetches: usize,
    appended: Vec<AppendedRows>,
    stream_operations: Vec<StreamOperation>,
    fail_publishes: bool,
    network_delay: Option<Duration>,
}

/// In-memory publisher and warehouse for tests and local development.
///
/// Every call is recorded so tests can assert on what the router dispatched. Table schemas are
/// registered up front with [`MemoryDestination::register_table`]; fetching the schema of an
/// unregistered table fails with [`ErrorKind::SchemaFetchFailed`].
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Registers the columns returned for `table`.
    pub async fn register_table(&self, table: ResolvedTableName, columns: Vec<ColumnSchema>) {
        let mut inner = self.inner.lock().await;
        inner.table_schemas.insert(table, columns);
    }

    /// Makes every following publish fail with [`ErrorKind::DispatchFailed`].
    pub async fn fail_publishes(&self, fail: bool) {
        let mut inner = self.inner.lock().await;
        inner.fail_publishes = fail;
    }

    /// Delays every publish and stream append, simulating a slow network round trip.
    pub async fn set_network_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().await;
        inner.network_delay = Some(delay);
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        let inner = self.inner.lock().await;
        inner.published.clone()
    }

    pub async fn schema_fetches(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.schema_fetches
    }

    pub async fn appended_rows(&self) -> Vec<AppendedRows> {
        let inner = self.inner.lock().await;
        inner.appended.clone()
    }

    pub async fn stream_operations(&self) -> Vec<StreamOperation> {
        let inner = self.inner.lock().await;
        inner.stream_operations.clone()
    }

    /// Number of publishes and appends received so far.
    pub async fn dispatch_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.published.len() + inner.appended.len()
    }

    /// Clears all recorded calls, keeping registered tables and injected behavior.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.published.clear();
        inner.schema_fetches = 0;
        inner.appended.clear();
        inner.stream_operations.clear();
    }

    async fn network_delay(&self) {
        let delay = self.inner.lock().await.network_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ExportResult<()> {
        self.network_delay().await;

        let mut inner = self.inner.lock().await;
        if inner.fail_publishes {
            bail!(
                ErrorKind::DispatchFailed,
                "Publish was rejected",
                format!("topic `{topic}`")
            );
        }

        info!(topic, bytes = payload.len(), "publishing row");
        inner.published.push(PublishedMessage {
            topic: topic.to_owned(),
            payload,
        });

        Ok(())
    }
}

impl TableSchemaSource for MemoryDestination {
    async fn table_schema(&self, table: &ResolvedTableName) -> ExportResult<Vec<ColumnSchema>> {
        let mut inner = self.inner.lock().await;
        inner.schema_fetches += 1;

        info!(%table, "fetching table schema");

        match inner.table_schemas.get(table) {
            Some(columns) => Ok(columns.clone()),
            None => bail!(
                ErrorKind::SchemaFetchFailed,
                "Destination table was not found",
                table
            ),
        }
    }
}

impl Warehouse for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn open_stream(&self, table: &ResolvedTableName) -> ExportResult<WriteStream> {
        let stream = WriteStream::default_for(table);

        let mut inner = self.inner.lock().await;
        inner
            .stream_operations
            .push(StreamOperation::Open(stream.name.clone()));

        Ok(stream)
    }

    async fn append_rows(
        &self,
        stream: &WriteStream,
        descriptor: &SchemaDescriptor,
        rows: Vec<Vec<u8>>,
    ) -> ExportResult<()> {
        self.network_delay().await;

        let mut inner = self.inner.lock().await;

        info!(
            %stream,
            descriptor = ?descriptor.descriptor_proto.name,
            "appending {} rows",
            rows.len()
        );

        inner
            .stream_operations
            .push(StreamOperation::Append(stream.name.clone(), rows.len()));
        inner.appended.push(AppendedRows {
            stream: stream.clone(),
            rows,
        });

        Ok(())
    }

    async fn finalize_stream(&self, stream: &WriteStream) -> ExportResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .stream_operations
            .push(StreamOperation::Finalize(stream.name.clone()));

        Ok(())
    }

    async fn commit_streams(
        &self,
        table: &ResolvedTableName,
        streams: &[WriteStream],
    ) -> ExportResult<()> {
        let mut inner = self.inner.lock().await;

        info!(%table, "committing {} streams", streams.len());

        inner
            .stream_operations
            .push(StreamOperation::Commit(table.to_string()));

        Ok(())
    }
}
