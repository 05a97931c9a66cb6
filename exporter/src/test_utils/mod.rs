//! Builders for change events, rules and tables used by unit and integration tests.
//!
//! - [`event`] - document change events for creates, updates and deletes
//! - [`config`] - export rules from JSON documents and resolved table names

pub mod config;
pub mod event;
