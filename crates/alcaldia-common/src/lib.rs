//! Alcaldía Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by every process that talks to the Alcaldía database: the
//! bulk loader and the read API deployed next to it.
//!
//! - **Connection**: `DATABASE_URL` resolution into an immutable [`ConnectionConfig`]
//! - **Logging**: tracing subscriber setup driven by `LOG_*` variables
//!
//! # Example
//!
//! ```no_run
//! use alcaldia_common::{ConnectionConfig, logging::{init_logging, LogConfig}};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let connection = ConnectionConfig::from_env()?;
//!     tracing::info!(database = %connection.redacted_url(), "Resolved database");
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod logging;

pub use connection::{ConfigurationError, ConnectionConfig, DATABASE_URL_VAR};
