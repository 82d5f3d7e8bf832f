//! Error types for the loader
//!
//! Fatal errors ([`EtlError`]) stop the process before or instead of
//! loading. [`LoadTaskError`] belongs to a single task: the bulk loader
//! records it in the run summary and moves on to the next task.

use thiserror::Error;

pub use alcaldia_common::ConfigurationError;

/// Creating a table (or one of its indexes) failed for a reason other than
/// "already exists".
#[derive(Error, Debug)]
#[error("Schema initialization failed for table '{table}': {source}. Check that the database user may CREATE in the current schema.")]
pub struct SchemaError {
    pub table: &'static str,
    #[source]
    pub source: sqlx::Error,
}

/// The requested data type is not registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown data type '{requested}'. Valid values: {}", valid.join(", "))]
pub struct UnknownDataTypeError {
    pub requested: String,
    pub valid: Vec<String>,
}

/// A single load task failed.
#[derive(Error, Debug)]
pub enum LoadTaskError {
    #[error("Source '{location}' could not be read: {source}")]
    SourceIo {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Request to '{location}' failed: {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid data in '{location}': {message}")]
    Parse { location: String, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task exceeded the {secs}s timeout")]
    Timeout { secs: u64 },
}

impl LoadTaskError {
    pub fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Errors that abort the whole invocation
#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    UnknownDataType(#[from] UnknownDataTypeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Could not connect to the database at {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Data type registry is inconsistent: {0}")]
    Registry(String),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

pub type EtlResult<T> = Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_data_type_lists_valid_values() {
        let err = UnknownDataTypeError {
            requested: "nonexistent".to_string(),
            valid: vec!["modalidades".to_string(), "paa_dacp".to_string(), "all".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown data type 'nonexistent'. Valid values: modalidades, paa_dacp, all"
        );
    }

    #[test]
    fn test_configuration_error_passes_through() {
        let err: EtlError = ConfigurationError::missing("DATABASE_URL").into();
        assert_eq!(err.to_string(), "Required environment variable DATABASE_URL is not set");
    }

    #[test]
    fn test_timeout_message() {
        let err = LoadTaskError::Timeout { secs: 30 };
        assert_eq!(err.to_string(), "Task exceeded the 30s timeout");
    }
}
