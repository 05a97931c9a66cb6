//! HTTP receiver for Firestore change events.
//!
//! Events arrive as binary mode CloudEvents and are handed to an
//! [`exporter::router::ChangeEventRouter`]. The status code tells the trigger whether to
//! redeliver: only retryable failures answer with a server error.

pub mod publisher;
pub mod routes;
pub mod startup;
