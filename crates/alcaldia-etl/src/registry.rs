//! Data-type registry
//!
//! The set of loadable data types is closed: [`DataType`] is an enum, and
//! [`DataType::ALL`] lists every variant in the order `--data-type all`
//! loads them. Parents come before the tables that reference them, which
//! [`validate_declared_order`] checks at startup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownDataTypeError;

/// Selector that expands to every registered data type.
pub const ALL_SELECTOR: &str = "all";

/// A loadable data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Catalog of public-procurement selection modalities
    Modalidades,
    /// Annual acquisitions plan of the DACP
    PaaDacp,
    /// SECOP II contracts signed by the entity
    ContratosDacp,
}

impl DataType {
    /// Every registered data type, in load (dependency) order.
    pub const ALL: [DataType; 3] = [DataType::Modalidades, DataType::PaaDacp, DataType::ContratosDacp];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Modalidades => "modalidades",
            DataType::PaaDacp => "paa_dacp",
            DataType::ContratosDacp => "contratos_dacp",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DataType::Modalidades => "Modalidades de selección de contratación estatal (catálogo)",
            DataType::PaaDacp => "Plan Anual de Adquisiciones del DACP",
            DataType::ContratosDacp => "Contratos SECOP II de la entidad",
        }
    }

    /// Target table
    pub fn table(self) -> &'static str {
        match self {
            DataType::Modalidades => "modalidades_contratacion",
            DataType::PaaDacp => "paa_dacp",
            DataType::ContratosDacp => "contratos_dacp",
        }
    }

    /// Data types whose rows must exist before this one loads.
    pub fn depends_on(self) -> &'static [DataType] {
        match self {
            DataType::Modalidades => &[],
            DataType::PaaDacp | DataType::ContratosDacp => &[DataType::Modalidades],
        }
    }

    /// Accepted `--data-type` values, `all` last.
    pub fn identifiers() -> Vec<String> {
        Self::ALL
            .iter()
            .map(|dt| dt.as_str().to_string())
            .chain(std::iter::once(ALL_SELECTOR.to_string()))
            .collect()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = UnknownDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|dt| dt.as_str() == wanted)
            .ok_or_else(|| UnknownDataTypeError {
                requested: s.to_string(),
                valid: Self::identifiers(),
            })
    }
}

/// What a single invocation asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    All,
    Only(DataType),
}

impl Selection {
    /// Parse a `--data-type` value. Pure: no I/O happens here.
    pub fn parse(value: &str) -> Result<Self, UnknownDataTypeError> {
        if value.trim().eq_ignore_ascii_case(ALL_SELECTOR) {
            return Ok(Selection::All);
        }
        value.parse().map(Selection::Only)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str(ALL_SELECTOR),
            Selection::Only(dt) => write!(f, "{}", dt),
        }
    }
}

/// Check that every data type appears exactly once and after everything it
/// depends on.
pub fn validate_declared_order(order: &[DataType]) -> Result<(), String> {
    for (position, data_type) in order.iter().enumerate() {
        let earlier = &order[..position];
        if earlier.contains(data_type) {
            return Err(format!("'{}' is declared more than once", data_type));
        }
        for dependency in data_type.depends_on() {
            if !earlier.contains(dependency) {
                return Err(format!(
                    "'{}' depends on '{}', which must be declared before it",
                    data_type, dependency
                ));
            }
        }
    }
    Ok(())
}
