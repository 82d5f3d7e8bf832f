//! Schema initialization
//!
//! Creates the tables (and indexes) of the given data types if they are
//! missing. Existing tables are never dropped or altered, so this runs on
//! every start.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::datasets::table_ddl;
use crate::error::SchemaError;
use crate::registry::DataType;

/// SQLSTATEs that mean "someone already created it".
///
/// `23505` shows up when two processes race on `CREATE TABLE IF NOT EXISTS`
/// and both insert into `pg_type`.
const ALREADY_EXISTS_CODES: &[&str] = &["42P07", "42710", "23505"];

/// Which tables were created by this call and which were already there
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub created: Vec<&'static str>,
    pub existing: Vec<&'static str>,
}

fn is_already_exists(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| ALREADY_EXISTS_CODES.iter().any(|known| *known == code))
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1)",
    )
    .bind(table)
    .fetch_one(pool)
    .await
}

/// Ensure every table of `data_types` exists, in the given order.
///
/// The order matters: parents must be created before tables whose foreign
/// keys reference them. Pass [`DataType::ALL`].
pub async fn ensure_schema(pool: &PgPool, data_types: &[DataType]) -> Result<SchemaReport, SchemaError> {
    let mut report = SchemaReport::default();

    for &data_type in data_types {
        let table = data_type.table();
        let schema_error = |source| SchemaError { table, source };

        let existed = table_exists(pool, table).await.map_err(schema_error)?;

        for statement in table_ddl(data_type) {
            match sqlx::query(statement).execute(pool).await {
                Ok(_) => {},
                Err(err) if is_already_exists(&err) => {
                    debug!(table, error = %err, "Object already exists, ignoring");
                },
                Err(err) => return Err(schema_error(err)),
            }
        }

        if existed {
            report.existing.push(table);
        } else {
            info!(table, "Created table");
            report.created.push(table);
        }
    }

    info!(
        created = report.created.len(),
        existing = report.existing.len(),
        "Schema ready"
    );
    Ok(report)
}

/// Base tables in the current schema, sorted by name.
pub async fn list_tables(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_already_exists() {
        assert!(!is_already_exists(&sqlx::Error::RowNotFound));
        assert!(!is_already_exists(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_ddl_is_idempotent_sql() {
        for data_type in DataType::ALL {
            for statement in table_ddl(data_type) {
                assert!(
                    statement.contains("IF NOT EXISTS"),
                    "{} statement is not idempotent: {}",
                    data_type,
                    statement
                );
            }
        }
    }
}
