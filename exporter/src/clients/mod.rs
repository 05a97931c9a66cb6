//! Clients for the Google Cloud services rows are dispatched to.

#[cfg(feature = "bigquery")]
pub mod bigquery;
#[cfg(feature = "pubsub")]
pub mod pubsub;
