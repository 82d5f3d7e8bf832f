//! Alcaldía ETL
//!
//! Bulk loader for the municipal procurement datasets: the catalog of
//! selection modalities, the DACP annual acquisitions plan (PAA) and the
//! entity's SECOP II contracts.
//!
//! # Overview
//!
//! - **Configuration**: [`config::Config`] resolved once from the environment
//! - **Registry**: the closed set of loadable data types ([`registry::DataType`])
//! - **Schema**: idempotent table creation ([`schema::ensure_schema`])
//! - **Loading**: sequential, failure-isolated tasks ([`loader::BulkLoader`])
//!
//! The `alcaldia-load` binary wires these together; see [`app`].

pub mod app;
pub mod cli;
pub mod config;
pub mod datasets;
pub mod db;
pub mod error;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod source;

pub use config::Config;
pub use error::{EtlError, EtlResult, LoadTaskError, SchemaError, UnknownDataTypeError};
pub use registry::{DataType, Selection};
