//! Destinations receiving tagged rows.
//!
//! Rows leave the exporter either through a [`Publisher`] as JSON, or through a [`Warehouse`]
//! as protobuf rows appended to a write stream.

mod base;
pub mod memory;

pub use base::{Publisher, Warehouse, WriteStream, WriteStreamKind};
