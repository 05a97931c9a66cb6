//! Exports Firestore document changes to BigQuery.
//!
//! A [`router::ChangeEventRouter`] receives decoded change events, selects the export rule of the
//! event's collection and turns the changed document into a tagged row. Rows are either published
//! as JSON through a [`destination::Publisher`], or encoded against a descriptor derived from
//! the destination table and appended through a [`destination::Warehouse`].
//!
//! Clients for BigQuery and Pub/Sub are available behind the `bigquery` and `pubsub` features.

pub mod clients;
pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod encoding;
pub mod error;
mod macros;
pub mod router;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
