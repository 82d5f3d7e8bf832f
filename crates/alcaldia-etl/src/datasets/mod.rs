//! Per-data-type extract and load logic
//!
//! Each submodule owns one target table: its DDL, how its source rows are
//! parsed, and how they are written.

pub mod contratos_dacp;
pub mod modalidades;
pub mod normalize;
pub mod paa_dacp;

use crate::registry::DataType;

/// Statements that create a data type's table and indexes. All of them
/// are `IF NOT EXISTS`.
pub fn table_ddl(data_type: DataType) -> &'static [&'static str] {
    match data_type {
        DataType::Modalidades => modalidades::DDL,
        DataType::PaaDacp => paa_dacp::DDL,
        DataType::ContratosDacp => contratos_dacp::DDL,
    }
}
