//! Tracing setup shared by the exporter binaries and tests.
//!
//! Production logs are written as one JSON object per line with the level stored under the
//! `severity` key, which Cloud Logging maps onto its own severity field.

use std::fmt;
use std::sync::Once;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Env variable enabling log output in tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Guard that flushes buffered log lines when dropped. Keep it alive for the whole process.
pub type LogFlusher = WorkerGuard;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to redirect `log` records into tracing: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global JSON subscriber for `service_name`.
pub fn init_tracing(service_name: &str) -> Result<LogFlusher, TracingError> {
    tracing_log::LogTracer::init()?;

    let (writer, flusher) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let format_layer = subscriber_fmt::layer()
        .fmt_fields(JsonFields::new())
        .event_format(CloudLoggingFormat::new(service_name))
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer)
        .try_init()?;

    Ok(flusher)
}

/// Installs a human readable subscriber for tests when `ENABLE_TRACING` is set.
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TEST_TRACING_ENV_NAME).is_err() {
            return;
        }

        let _ = subscriber_fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Maps a tracing level onto a Cloud Logging severity name.
pub fn severity(level: &Level) -> &'static str {
    match *level {
        Level::TRACE | Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// Event formatter producing one Cloud Logging compatible JSON object per event.
#[derive(Debug, Clone)]
pub struct CloudLoggingFormat {
    service: String,
}

impl CloudLoggingFormat {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn render<S, N>(&self, ctx: &FmtContext<'_, S, N>, event: &Event<'_>) -> Map<String, Value>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let metadata = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut entry = Map::new();
        entry.insert(
            "timestamp".to_owned(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        entry.insert(
            "severity".to_owned(),
            Value::String(severity(metadata.level()).to_owned()),
        );
        entry.insert("service".to_owned(), Value::String(self.service.clone()));
        entry.insert(
            "target".to_owned(),
            Value::String(metadata.target().to_owned()),
        );

        if let Some(message) = visitor.fields.remove("message") {
            entry.insert("message".to_owned(), message);
        }
        if !visitor.fields.is_empty() {
            entry.insert("fields".to_owned(), Value::Object(visitor.fields));
        }

        if let Some(scope) = ctx.event_scope() {
            let mut spans = Vec::new();
            for span in scope.from_root() {
                let mut rendered = Map::new();
                rendered.insert("name".to_owned(), Value::String(span.name().to_owned()));

                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>()
                    && let Ok(Value::Object(fields)) = serde_json::from_str(fields.as_str())
                {
                    rendered.extend(fields);
                }

                spans.push(Value::Object(rendered));
            }

            if !spans.is_empty() {
                entry.insert("spans".to_owned(), Value::Array(spans));
            }
        }

        entry
    }
}

impl<S, N> FormatEvent<S, N> for CloudLoggingFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let entry = self.render(ctx, event);
        let line = serde_json::to_string(&entry).map_err(|_| fmt::Error)?;

        writeln!(writer, "{line}")
    }
}

/// Collects event fields into a JSON object.
#[derive(Debug, Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_owned(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_owned(), Value::String(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_names() {
        assert_eq!(severity(&Level::TRACE), "DEBUG");
        assert_eq!(severity(&Level::INFO), "INFO");
        assert_eq!(severity(&Level::WARN), "WARNING");
        assert_eq!(severity(&Level::ERROR), "ERROR");
    }
}
