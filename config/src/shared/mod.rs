mod bigquery;
mod export;
mod server;
mod service;

pub use bigquery::*;
pub use export::*;
pub use server::*;
pub use service::*;
