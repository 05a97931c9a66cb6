//! Concurrency primitives shared by the exporter and the service binary.

pub mod shutdown;
