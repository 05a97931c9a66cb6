use actix_web::{
    HttpRequest, HttpResponse, ResponseError,
    http::{StatusCode, header::ContentType},
    web::{Bytes, Data},
};
use exporter::concurrency::shutdown::ShutdownRx;
use exporter::destination::{Publisher, Warehouse};
use exporter::error::ExportError;
use exporter::router::{ChangeEventRouter, DispatchTarget, DropReason, ExportOutcome};
use exporter::types::DocumentEventData;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::routes::ErrorMessage;

/// Upper bound of an event body. Firestore documents are limited to 1 MiB each and an update
/// carries two snapshots.
pub const MAX_EVENT_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum EventError {
    /// The export failed in a way a redelivery may fix.
    #[error("{0}")]
    Retryable(ExportError),
}

impl EventError {
    pub fn to_message(&self) -> String {
        match self {
            // The full error carries a backtrace and source locations.
            EventError::Retryable(err) => format!("{:?}: {}", err.kind(), err.description()),
        }
    }
}

impl ResponseError for EventError {
    fn status_code(&self) -> StatusCode {
        match self {
            EventError::Retryable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

/// Body of an acknowledged event.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventResponse {
    Dispatched { target: String },
    Dropped { reason: String },
    /// The event can never be exported and is acknowledged so it is not redelivered.
    Rejected { error: String },
}

impl From<&ExportOutcome> for EventResponse {
    fn from(outcome: &ExportOutcome) -> Self {
        match outcome {
            ExportOutcome::Dispatched { target, .. } => EventResponse::Dispatched {
                target: match target {
                    DispatchTarget::Topic(topic) => topic.clone(),
                    DispatchTarget::Table(table) => table.to_string(),
                },
            },
            ExportOutcome::Dropped(reason) => EventResponse::Dropped {
                reason: match reason {
                    DropReason::UnknownCollection => "unknown_collection",
                    DropReason::IrrelevantUpdate => "irrelevant_update",
                }
                .to_owned(),
            },
        }
    }
}

/// CloudEvents binary mode attributes of the request.
#[derive(Debug, Default)]
struct CloudEventAttributes {
    id: Option<String>,
    event_type: Option<String>,
    source: Option<String>,
    subject: Option<String>,
}

impl CloudEventAttributes {
    fn from_request(req: &HttpRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(ToOwned::to_owned)
        };

        Self {
            id: header("ce-id"),
            event_type: header("ce-type"),
            source: header("ce-source"),
            subject: header("ce-subject"),
        }
    }
}

/// Receives one Firestore document event and exports it.
///
/// Successful and dropped events answer `200`. Retryable failures answer `500` so the trigger
/// redelivers the event; every other failure is logged and acknowledged.
pub async fn receive_event<P, W>(
    req: HttpRequest,
    body: Bytes,
    router: Data<ChangeEventRouter<P, W>>,
    shutdown_rx: Data<ShutdownRx>,
) -> Result<HttpResponse, EventError>
where
    P: Publisher + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
{
    let attributes = CloudEventAttributes::from_request(&req);
    info!(
        ce_id = attributes.id.as_deref(),
        ce_type = attributes.event_type.as_deref(),
        ce_source = attributes.source.as_deref(),
        ce_subject = attributes.subject.as_deref(),
        bytes = body.len(),
        "received document event"
    );

    let data = match DocumentEventData::decode_event(&body) {
        Ok(data) => data,
        Err(err) => return Ok(reject(&attributes, err)),
    };

    match router
        .export_with_shutdown(&data, shutdown_rx.get_ref().clone())
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(EventResponse::from(&outcome))),
        Err(err) if err.is_retryable() => {
            warn!(
                ce_id = attributes.id.as_deref(),
                kind = ?err.kind(),
                error = %err,
                "export failed, requesting redelivery"
            );
            Err(EventError::Retryable(err))
        }
        Err(err) => Ok(reject(&attributes, err)),
    }
}

fn reject(attributes: &CloudEventAttributes, err: ExportError) -> HttpResponse {
    error!(
        ce_id = attributes.id.as_deref(),
        ce_subject = attributes.subject.as_deref(),
        kind = ?err.kind(),
        error = %err,
        "event cannot be exported, acknowledging without redelivery"
    );

    HttpResponse::Ok().json(EventResponse::Rejected {
        error: format!("{:?}: {}", err.kind(), err.description()),
    })
}
