//! Runtime configuration
//!
//! Everything is read from the environment once, in [`Config::load`], and
//! passed down explicitly. Optional variables fall back to the defaults
//! below, but a variable that is *present* and unparsable is a
//! [`ConfigurationError`] rather than a silent default.

use std::str::FromStr;
use std::time::Duration;

use alcaldia_common::{ConfigurationError, ConnectionConfig};
use serde::Serialize;

use crate::registry::DataType;
use crate::source::SourceLocation;

// ============================================================================
// Defaults
// ============================================================================

/// Pool size. Tasks run one after another, so two connections are plenty.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 2;

pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Rows per multi-row INSERT
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Postgres caps a statement at 65535 binds; the widest row binds 15.
pub const MAX_BATCH_SIZE: usize = 65535 / 15;

pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 1800;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_PAA_DACP_SOURCE: &str = "data/paa_dacp.csv";

/// SECOP II - Contratos Electrónicos on datos.gov.co
pub const DEFAULT_CONTRATOS_DACP_SOURCE: &str = "https://www.datos.gov.co/resource/jbjy-vk9h.json";

/// NIT of the Alcaldía de Santiago de Cali
pub const DEFAULT_CONTRATOS_DACP_NIT: &str = "890399011";

pub const DEFAULT_SOCRATA_PAGE_SIZE: usize = 1000;

/// Largest `$limit` a SODA endpoint honors. A bigger page would come back
/// short and end paging early.
pub const MAX_SOCRATA_PAGE_SIZE: usize = 50_000;

/// Loader configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub pool: PoolConfig,
    pub loader: LoaderConfig,
    pub sources: SourceConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// `None` disables the per-task timeout
    pub task_timeout_secs: Option<u64>,
}

impl LoaderConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceConfig {
    pub paa_dacp: SourceLocation,
    pub contratos_dacp: SourceLocation,
    pub contratos_dacp_nit: String,
    pub socrata_page_size: usize,
    #[serde(skip)]
    pub socrata_app_token: Option<String>,
    pub http_timeout_secs: u64,
}

impl SourceConfig {
    /// Human-readable origin of a data type's rows.
    pub fn describe(&self, data_type: DataType) -> String {
        match data_type {
            DataType::Modalidades => "catálogo embebido".to_string(),
            DataType::PaaDacp => self.paa_dacp.to_string(),
            DataType::ContratosDacp => match &self.contratos_dacp {
                SourceLocation::Remote(_) => {
                    format!("{} (nit_entidad={})", self.contratos_dacp, self.contratos_dacp_nit)
                },
                SourceLocation::Local(_) => self.contratos_dacp.to_string(),
            },
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            paa_dacp: SourceLocation::from(DEFAULT_PAA_DACP_SOURCE),
            contratos_dacp: SourceLocation::from(DEFAULT_CONTRATOS_DACP_SOURCE),
            contratos_dacp_nit: DEFAULT_CONTRATOS_DACP_NIT.to_string(),
            socrata_page_size: DEFAULT_SOCRATA_PAGE_SIZE,
            socrata_app_token: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self, ConfigurationError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// `DATABASE_URL` is resolved first so that its absence is reported
    /// before anything else is looked at.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection = ConnectionConfig::resolve(&lookup)?;

        let pool = PoolConfig {
            max_connections: parse_var(&lookup, "ETL_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            connect_timeout_secs: parse_var(
                &lookup,
                "ETL_DB_CONNECT_TIMEOUT_SECS",
                DEFAULT_DB_CONNECT_TIMEOUT_SECS,
            )?,
        };

        let task_timeout_secs = parse_var(&lookup, "ETL_TASK_TIMEOUT_SECS", DEFAULT_TASK_TIMEOUT_SECS)?;
        let loader = LoaderConfig {
            batch_size: parse_var(&lookup, "ETL_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            task_timeout_secs: (task_timeout_secs > 0).then_some(task_timeout_secs),
        };

        let defaults = SourceConfig::default();
        let sources = SourceConfig {
            paa_dacp: non_empty(&lookup, "PAA_DACP_SOURCE")
                .map(SourceLocation::from)
                .unwrap_or(defaults.paa_dacp),
            contratos_dacp: non_empty(&lookup, "CONTRATOS_DACP_SOURCE")
                .map(SourceLocation::from)
                .unwrap_or(defaults.contratos_dacp),
            contratos_dacp_nit: non_empty(&lookup, "CONTRATOS_DACP_NIT")
                .unwrap_or(defaults.contratos_dacp_nit),
            socrata_page_size: parse_var(&lookup, "SOCRATA_PAGE_SIZE", DEFAULT_SOCRATA_PAGE_SIZE)?,
            socrata_app_token: non_empty(&lookup, "SOCRATA_APP_TOKEN"),
            http_timeout_secs: parse_var(&lookup, "ETL_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        };

        let config = Self {
            connection,
            pool,
            loader,
            sources,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.pool.max_connections == 0 {
            return Err(ConfigurationError::malformed(
                "ETL_DB_MAX_CONNECTIONS",
                "must be greater than 0",
            ));
        }
        if self.loader.batch_size == 0 {
            return Err(ConfigurationError::malformed("ETL_BATCH_SIZE", "must be greater than 0"));
        }
        if self.loader.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigurationError::malformed(
                "ETL_BATCH_SIZE",
                format!("must be at most {}", MAX_BATCH_SIZE),
            ));
        }
        if self.sources.socrata_page_size == 0 {
            return Err(ConfigurationError::malformed(
                "SOCRATA_PAGE_SIZE",
                "must be greater than 0",
            ));
        }
        if self.sources.socrata_page_size > MAX_SOCRATA_PAGE_SIZE {
            return Err(ConfigurationError::malformed(
                "SOCRATA_PAGE_SIZE",
                format!("must be at most {}", MAX_SOCRATA_PAGE_SIZE),
            ));
        }
        if self.sources.contratos_dacp_nit.chars().any(|c| !c.is_ascii_digit()) {
            return Err(ConfigurationError::malformed(
                "CONTRATOS_DACP_NIT",
                "must contain digits only (no check digit or separators)",
            ));
        }
        Ok(())
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConfigurationError::malformed(name, format!("'{}' ({})", raw, e))),
        None => Ok(default),
    }
}
