//! Error types and result definitions for export operations.
//!
//! Every failure of the change event pipeline is an [`ExportError`]. Errors are classified by
//! [`ErrorKind`], carry a static description, optional dynamic detail, an optional source, the
//! callsite location, and a backtrace. Once the router knows which event it is processing it
//! attaches an [`EventContext`] so the failure can be correlated with the source document.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for export operations using [`ExportError`] as the error type.
pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    context: Option<EventContext>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for export operations.
///
/// Cloning is cheap; the source and backtrace are reference counted. This allows a failed
/// schema derivation to be remembered by the cache and returned to every later event.
#[derive(Debug, Clone)]
pub struct ExportError {
    payload: Box<ErrorPayload>,
}

/// Categories of export failures.
///
/// Parsing kinds are terminal for the event, schema kinds are terminal for the rule, and
/// dispatch kinds are reported to the caller which owns redelivery.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Identifier errors
    MalformedPath,
    UnsupportedNestedCollection,
    InvalidTableReference,

    // Schema errors
    SchemaFetchFailed,
    SchemaTranslationFailed,

    // Row errors
    EncodingFailed,
    SerializationError,

    // Delivery errors
    DispatchFailed,
    Cancelled,

    // Input & setup errors
    InvalidEventPayload,
    ConfigError,
}

impl ErrorKind {
    /// Returns true when redelivering the same event may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::DispatchFailed | ErrorKind::SchemaFetchFailed | ErrorKind::Cancelled
        )
    }
}

/// Identifies the event and rule an error belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventContext {
    pub collection: Option<String>,
    pub document_id: Option<String>,
    pub rule: Option<String>,
    /// Resource name of the snapshot, kept as received so unparseable names can be reported.
    pub document_path: Option<String>,
}

impl fmt::Display for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = "<unknown>";
        write!(
            f,
            "collection={} document={} rule={}",
            self.collection.as_deref().unwrap_or(unknown),
            self.document_id.as_deref().unwrap_or(unknown),
            self.rule.as_deref().unwrap_or(unknown),
        )?;
        if let Some(path) = &self.document_path {
            write!(f, " path={path}")?;
        }

        Ok(())
    }
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    pub fn description(&self) -> &str {
        &self.payload.description
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    pub fn context(&self) -> Option<&EventContext> {
        self.payload.context.as_ref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Attaches the event context, keeping a context that was already set.
    pub fn with_context(mut self, context: EventContext) -> Self {
        if self.payload.context.is_none() {
            self.payload.context = Some(context);
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ExportError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                context: None,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for ExportError {
    fn eq(&self, other: &ExportError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(context) = &payload.context {
            write!(f, "\n  Event: {context}")?;
        }
        write_detail(payload.detail.as_deref(), f)?;
        write_backtrace(payload.backtrace.as_ref(), f)?;

        Ok(())
    }
}

impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered_backtrace = format!("{backtrace}");
    if rendered_backtrace.trim().is_empty() {
        return Ok(());
    }

    write!(f, "\n  Backtrace:")?;
    for line in rendered_backtrace.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    if detail.trim().is_empty() {
        return write!(f, "\n  Detail: <empty>");
    }

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

/// Creates an [`ExportError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ExportError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ExportError {
        ExportError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`ExportError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ExportError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ExportError {
        ExportError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`serde_json::Error`] to [`ExportError`] with [`ErrorKind::SerializationError`].
impl From<serde_json::Error> for ExportError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ExportError {
        let detail = err.to_string();
        ExportError::from_components(
            ErrorKind::SerializationError,
            Cow::Borrowed("JSON serialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`prost::DecodeError`] to [`ExportError`] with [`ErrorKind::InvalidEventPayload`].
impl From<prost::DecodeError> for ExportError {
    #[track_caller]
    fn from(err: prost::DecodeError) -> ExportError {
        let detail = err.to_string();
        ExportError::from_components(
            ErrorKind::InvalidEventPayload,
            Cow::Borrowed("Change event payload could not be decoded"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_context_and_detail() {
        let err = ExportError::from((
            ErrorKind::EncodingFailed,
            "Row could not be encoded",
            "unknown field `Extra`",
        ))
        .with_context(EventContext {
            collection: Some("orders".to_owned()),
            document_id: Some("o-1".to_owned()),
            rule: Some("orders".to_owned()),
            document_path: None,
        });

        let rendered = err.to_string();
        assert!(rendered.starts_with("[EncodingFailed] Row could not be encoded @ "));
        assert!(rendered.contains("Event: collection=orders document=o-1 rule=orders\n"));
        assert!(rendered.contains("Detail:\n    unknown field `Extra`"));
    }

    #[test]
    fn test_display_of_unparsed_event() {
        let err = ExportError::from((ErrorKind::MalformedPath, "Document name is malformed"))
            .with_context(EventContext {
                document_path: Some("orders/o-1".to_owned()),
                ..Default::default()
            });

        assert!(err.to_string().contains(
            "Event: collection=<unknown> document=<unknown> rule=<unknown> path=orders/o-1"
        ));
    }

    #[test]
    fn test_first_context_wins() {
        let first = EventContext {
            collection: Some("a".to_owned()),
            ..Default::default()
        };
        let err = ExportError::from((ErrorKind::DispatchFailed, "Publish failed"))
            .with_context(first.clone())
            .with_context(EventContext::default());

        assert_eq!(err.context(), Some(&first));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::DispatchFailed.is_retryable());
        assert!(ErrorKind::SchemaFetchFailed.is_retryable());
        assert!(ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::SchemaTranslationFailed.is_retryable());
        assert!(!ErrorKind::MalformedPath.is_retryable());
        assert!(!ErrorKind::EncodingFailed.is_retryable());
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::other("connection reset");
        let err = ExportError::from((ErrorKind::DispatchFailed, "Publish failed")).with_source(io);

        let source = error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "connection reset");
    }
}
