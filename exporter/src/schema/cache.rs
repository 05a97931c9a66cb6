use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ExportError, ExportResult};
use crate::schema::{ColumnSchema, SchemaDescriptor};
use crate::types::ResolvedTableName;

/// Source of destination table schemas.
pub trait TableSchemaSource {
    /// Returns the columns of `table` in declaration order.
    fn table_schema(
        &self,
        table: &ResolvedTableName,
    ) -> impl Future<Output = ExportResult<Vec<ColumnSchema>>> + Send;
}

#[derive(Debug, Default)]
enum CacheState {
    #[default]
    Empty,
    Ready(Arc<SchemaDescriptor>),
    /// The table schema could not be translated. The failure is returned for every later
    /// event instead of fetching the schema again.
    Failed(ExportError),
}

#[derive(Debug, Default)]
struct Inner {
    state: CacheState,
}

/// Caches the row descriptor of a single destination table.
///
/// The descriptor is derived at most once per cache: concurrent callers wait on the same lock
/// while the first one fetches the schema. A failed fetch leaves the cache empty so the next
/// event retries, while a failed translation is remembered.
#[derive(Debug, Clone, Default)]
pub struct SchemaDescriptorCache {
    inner: Arc<Mutex<Inner>>,
}

impl SchemaDescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached descriptor for `table`, deriving it through `source` on first use.
    pub async fn ensure_descriptor<S>(
        &self,
        source: &S,
        table: &ResolvedTableName,
    ) -> ExportResult<Arc<SchemaDescriptor>>
    where
        S: TableSchemaSource + Sync,
    {
        let mut inner = self.inner.lock().await;

        match &inner.state {
            CacheState::Ready(descriptor) => return Ok(descriptor.clone()),
            CacheState::Failed(err) => return Err(err.clone()),
            CacheState::Empty => {}
        }

        debug!(%table, "fetching destination table schema");
        let columns = source.table_schema(table).await?;

        match SchemaDescriptor::derive(table.clone(), &columns) {
            Ok(descriptor) => {
                info!(%table, columns = columns.len(), "derived row descriptor");

                let descriptor = Arc::new(descriptor);
                inner.state = CacheState::Ready(descriptor.clone());

                Ok(descriptor)
            }
            Err(err) => {
                warn!(%table, error = %err, "destination table schema cannot be translated");
                inner.state = CacheState::Failed(err.clone());

                Err(err)
            }
        }
    }

    /// Returns the descriptor if it has already been derived.
    pub async fn cached(&self) -> Option<Arc<SchemaDescriptor>> {
        match &self.inner.lock().await.state {
            CacheState::Ready(descriptor) => Some(descriptor.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;
    use crate::export_error;
    use crate::schema::ColumnType;

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: bool,
        columns: Vec<ColumnSchema>,
    }

    impl CountingSource {
        fn new(columns: Vec<ColumnSchema>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: false,
                columns,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TableSchemaSource for CountingSource {
        async fn table_schema(&self, _table: &ResolvedTableName) -> ExportResult<Vec<ColumnSchema>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(export_error!(
                    ErrorKind::SchemaFetchFailed,
                    "Table metadata request failed"
                ));
            }

            Ok(self.columns.clone())
        }
    }

    fn table() -> ResolvedTableName {
        ResolvedTableName {
            project_id: "p".to_owned(),
            dataset_id: "ds".to_owned(),
            table_name: "orders".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_descriptor_is_derived_once() {
        let source = CountingSource::new(vec![ColumnSchema::nullable("Name", ColumnType::String)]);
        let cache = SchemaDescriptorCache::new();

        let first = cache.ensure_descriptor(&source, &table()).await.unwrap();
        let second = cache.ensure_descriptor(&source, &table()).await.unwrap();

        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.cached().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let source = Arc::new(CountingSource::new(vec![ColumnSchema::nullable(
            "Name",
            ColumnType::String,
        )]));
        let cache = SchemaDescriptorCache::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let source = source.clone();
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.ensure_descriptor(source.as_ref(), &table()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failures_are_retried() {
        let mut source = CountingSource::new(vec![ColumnSchema::nullable("Name", ColumnType::String)]);
        source.fail_first = true;
        let cache = SchemaDescriptorCache::new();

        let err = cache.ensure_descriptor(&source, &table()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaFetchFailed);
        assert!(cache.cached().await.is_none());

        cache.ensure_descriptor(&source, &table()).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_translation_failures_are_remembered() {
        let source = CountingSource::new(vec![ColumnSchema::nullable(
            "Span",
            ColumnType::Unsupported("RANGE".to_owned()),
        )]);
        let cache = SchemaDescriptorCache::new();

        for _ in 0..3 {
            let err = cache.ensure_descriptor(&source, &table()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SchemaTranslationFailed);
        }

        assert_eq!(source.calls(), 1);
    }
}
