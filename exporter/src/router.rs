//! Routing of document change events to their destinations.
//!
//! Each event moves through classification, rule lookup, the update filter, field extraction and
//! tagging before it is dispatched. Unknown collections and updates that touch none of the
//! configured fields are dropped without an error; every other failure is returned with the
//! event's collection, document and rule attached.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use config::shared::ExportConfig;
use tracing::{Instrument, debug, info, info_span};

use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx, run_until_shutdown};
use crate::conversions::name::{parse_document_name, parse_table_name};
use crate::conversions::value::extract_value;
use crate::destination::{Publisher, Warehouse};
use crate::encoding::encode_row;
use crate::error::{ErrorKind, EventContext, ExportError, ExportResult};
use crate::schema::SchemaDescriptorCache;
use crate::types::{
    CHANGE_TYPE_COLUMN, ChangeType, Document, DocumentEventData, DocumentName, ResolvedTableName,
    Row,
};
use crate::{bail, export_error};

/// Where the rows of a rule are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleDestination {
    /// Rows are serialized as JSON and published to the topic.
    Topic(String),
    /// Rows are encoded and appended to the table through the warehouse.
    Direct,
}

/// Export configuration of one source collection.
///
/// The rule owns the schema cache of its destination table. Two rules writing to the same table
/// derive their descriptors independently.
#[derive(Debug, Clone)]
pub struct ExportRule {
    collection: String,
    table: String,
    fields: Vec<String>,
    destination: RuleDestination,
    schema_cache: SchemaDescriptorCache,
}

impl ExportRule {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The table reference as configured. It is parsed when a row is written directly.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn destination(&self) -> &RuleDestination {
        &self.destination
    }

    pub fn schema_cache(&self) -> &SchemaDescriptorCache {
        &self.schema_cache
    }

    /// Returns true when a changed field path touches one of the configured fields.
    ///
    /// Only the top level segment of each path is compared, with backtick quoting removed.
    fn is_affected_by(&self, field_paths: &[String]) -> bool {
        field_paths.iter().any(|path| {
            let top_level = top_level_segment(path);
            self.fields.iter().any(|field| field.as_str() == top_level.as_ref())
        })
    }
}

/// Read-only set of export rules keyed by collection name.
#[derive(Debug, Clone, Default)]
pub struct ExportRules {
    rules: BTreeMap<String, ExportRule>,
}

impl ExportRules {
    /// Builds the rules of `config`.
    ///
    /// Fails with [`ErrorKind::ConfigError`] when a rule selects the reserved change type column.
    pub fn from_config(config: &ExportConfig) -> ExportResult<Self> {
        let mut rules = BTreeMap::new();

        for (collection, rule) in &config.rules {
            if rule.fields.iter().any(|field| field == CHANGE_TYPE_COLUMN) {
                bail!(
                    ErrorKind::ConfigError,
                    "Export rule selects the reserved change type column",
                    collection
                );
            }

            let destination = match rule.topic() {
                Some(topic) => RuleDestination::Topic(topic.to_owned()),
                None => RuleDestination::Direct,
            };

            rules.insert(
                collection.clone(),
                ExportRule {
                    collection: collection.clone(),
                    table: rule.table.clone(),
                    fields: rule.fields.clone(),
                    destination,
                    schema_cache: SchemaDescriptorCache::new(),
                },
            );
        }

        Ok(Self { rules })
    }

    pub fn get(&self, collection: &str) -> Option<&ExportRule> {
        self.rules.get(collection)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Why an event was dropped without dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No rule is configured for the event's collection.
    UnknownCollection,
    /// The update changed none of the rule's fields.
    IrrelevantUpdate,
}

/// A row ready for dispatch, together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRow {
    pub document: DocumentName,
    pub change_type: ChangeType,
    pub row: Row,
}

/// Result of building the row of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltRow {
    Dropped(DropReason),
    Tagged(TaggedRow),
}

/// Destination a row was delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    Topic(String),
    Table(ResolvedTableName),
}

/// Terminal state of a successfully processed event.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Dispatched {
        document: DocumentName,
        change_type: ChangeType,
        target: DispatchTarget,
    },
    Dropped(DropReason),
}

/// Returns the first segment of a field path.
///
/// A backtick quoted segment may contain dots and ends at its closing backtick. Escaped
/// backticks and backslashes inside the quotes are unescaped.
fn top_level_segment(path: &str) -> Cow<'_, str> {
    let Some(quoted) = path.strip_prefix('`') else {
        return Cow::Borrowed(path.split('.').next().unwrap_or_default());
    };

    let mut segment = String::new();
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '`' => break,
            '\\' => segment.extend(chars.next()),
            c => segment.push(c),
        }
    }

    Cow::Owned(segment)
}

/// Context of an event whose document name is not parsed yet.
fn snapshot_context(data: &DocumentEventData) -> EventContext {
    EventContext {
        document_path: data
            .value
            .as_ref()
            .or(data.old_value.as_ref())
            .map(|snapshot| snapshot.name.clone()),
        ..Default::default()
    }
}

/// Determines the change type from the snapshots present on the event.
pub fn classify(data: &DocumentEventData) -> ExportResult<ChangeType> {
    match (&data.old_value, &data.value) {
        (Some(_), None) => Ok(ChangeType::Delete),
        (Some(_), Some(_)) => Ok(ChangeType::Update),
        (None, Some(_)) => Ok(ChangeType::Create),
        (None, None) => bail!(
            ErrorKind::InvalidEventPayload,
            "Change event carries no document snapshot"
        ),
    }
}

/// Routes change events to the publisher or the warehouse according to the export rules.
///
/// The router is cheap to clone and can process events concurrently. The schema caches of the
/// rules are the only state shared between events.
#[derive(Debug, Clone)]
pub struct ChangeEventRouter<P, W> {
    rules: Arc<ExportRules>,
    publisher: P,
    warehouse: W,
    default_project: String,
}

impl<P, W> ChangeEventRouter<P, W>
where
    P: Publisher + Send + Sync,
    W: Warehouse + Send + Sync,
{
    /// Creates a router. Two part table references are resolved against `default_project`.
    pub fn new(rules: ExportRules, publisher: P, warehouse: W, default_project: String) -> Self {
        Self {
            rules: Arc::new(rules),
            publisher,
            warehouse,
            default_project,
        }
    }

    pub fn rules(&self) -> &ExportRules {
        &self.rules
    }

    /// Classifies, filters, extracts and tags the row of `data` without dispatching it.
    pub fn build_row(&self, data: &DocumentEventData) -> ExportResult<BuiltRow> {
        let tagged = self
            .tag(data)
            .map_err(|err| err.with_context(snapshot_context(data)))?;
        let built = match tagged {
            Ok((_, tagged)) => BuiltRow::Tagged(tagged),
            Err(reason) => BuiltRow::Dropped(reason),
        };

        Ok(built)
    }

    fn tag(
        &self,
        data: &DocumentEventData,
    ) -> ExportResult<Result<(&ExportRule, TaggedRow), DropReason>> {
        let change_type = classify(data)?;

        // Deletes only carry the old snapshot.
        let snapshot = match change_type {
            ChangeType::Delete => data.old_value.as_ref(),
            ChangeType::Create | ChangeType::Update => data.value.as_ref(),
        };
        let Some(snapshot) = snapshot else {
            bail!(
                ErrorKind::InvalidEventPayload,
                "Change event is missing the snapshot of its change type",
                change_type
            );
        };

        let document = parse_document_name(&snapshot.name)?;

        let Some(rule) = self.rules.get(&document.collection_name) else {
            debug!(collection = %document.collection_name, "no export rule for collection, dropping event");
            return Ok(Err(DropReason::UnknownCollection));
        };

        if let Some(mask) = &data.update_mask
            && !rule.is_affected_by(&mask.field_paths)
        {
            debug!(
                collection = %document.collection_name,
                changed = ?mask.field_paths,
                "update does not touch exported fields, dropping event"
            );
            return Ok(Err(DropReason::IrrelevantUpdate));
        }

        let row = extract_row(rule, snapshot, change_type);
        if row.is_empty() {
            debug!(
                collection = %document.collection_name,
                document = %document.document_id,
                "no exported field is present on the snapshot"
            );
        }

        Ok(Ok((
            rule,
            TaggedRow {
                document,
                change_type,
                row,
            },
        )))
    }

    /// Exports one change event.
    pub async fn export(&self, data: &DocumentEventData) -> ExportResult<ExportOutcome> {
        self.route(data, None).await
    }

    /// Exports one change event, aborting network calls when `shutdown_rx` fires.
    ///
    /// An aborted export fails with [`ErrorKind::Cancelled`].
    pub async fn export_with_shutdown(
        &self,
        data: &DocumentEventData,
        mut shutdown_rx: ShutdownRx,
    ) -> ExportResult<ExportOutcome> {
        self.route(data, Some(&mut shutdown_rx)).await
    }

    async fn route(
        &self,
        data: &DocumentEventData,
        shutdown_rx: Option<&mut ShutdownRx>,
    ) -> ExportResult<ExportOutcome> {
        let tagged = self
            .tag(data)
            .map_err(|err| err.with_context(snapshot_context(data)))?;
        let (rule, tagged) = match tagged {
            Ok(tagged) => tagged,
            Err(reason) => return Ok(ExportOutcome::Dropped(reason)),
        };

        let context = EventContext {
            collection: Some(tagged.document.collection_name.clone()),
            document_id: Some(tagged.document.document_id.clone()),
            rule: Some(rule.collection().to_owned()),
            document_path: Some(tagged.document.to_string()),
        };

        let span = info_span!(
            "export_event",
            collection = %tagged.document.collection_name,
            document = %tagged.document.document_id,
            change_type = %tagged.change_type,
        );

        let dispatch = self.dispatch(rule, tagged).instrument(span);
        let result = match shutdown_rx {
            Some(shutdown_rx) => match run_until_shutdown(dispatch, shutdown_rx).await {
                ShutdownResult::Ok(result) => result,
                ShutdownResult::Shutdown => {
                    info!(rule = rule.collection(), "shutdown signal received, export aborted");
                    Err(export_error!(
                        ErrorKind::Cancelled,
                        "Export was aborted by shutdown"
                    ))
                }
            },
            None => dispatch.await,
        };

        result.map_err(|err: ExportError| err.with_context(context))
    }

    async fn dispatch(&self, rule: &ExportRule, tagged: TaggedRow) -> ExportResult<ExportOutcome> {
        let target = match rule.destination() {
            RuleDestination::Topic(topic) => {
                let payload = tagged.row.to_json_bytes()?;
                self.publisher.publish(topic, payload).await?;

                info!(topic = %topic, publisher = P::name(), "published row");
                DispatchTarget::Topic(topic.clone())
            }
            RuleDestination::Direct => {
                let table = parse_table_name(rule.table())?.resolve(&self.default_project);
                self.write_direct(rule, &table, &tagged.row).await?;

                info!(%table, warehouse = W::name(), "wrote row");
                DispatchTarget::Table(table)
            }
        };

        Ok(ExportOutcome::Dispatched {
            document: tagged.document,
            change_type: tagged.change_type,
            target,
        })
    }

    async fn write_direct(
        &self,
        rule: &ExportRule,
        table: &ResolvedTableName,
        row: &Row,
    ) -> ExportResult<()> {
        let descriptor = rule
            .schema_cache()
            .ensure_descriptor(&self.warehouse, table)
            .await?;
        let encoded = encode_row(row, &descriptor.message)?;

        let stream = self.warehouse.open_stream(table).await?;
        self.warehouse
            .append_rows(&stream, &descriptor, vec![encoded])
            .await?;
        self.warehouse.finalize_stream(&stream).await?;
        self.warehouse
            .commit_streams(table, std::slice::from_ref(&stream))
            .await?;

        Ok(())
    }
}

/// Copies the configured fields present on `snapshot` and tags the row.
fn extract_row(rule: &ExportRule, snapshot: &Document, change_type: ChangeType) -> Row {
    let mut row = Row::new(change_type.marker());
    for field in rule.fields() {
        if let Some(value) = snapshot.fields.get(field) {
            row.insert(field.clone(), extract_value(value));
        }
    }

    row
}
