//! SECOP II contracts of the entity
//!
//! Rows come from the "SECOP II - Contratos Electrónicos" dataset on
//! datos.gov.co, filtered by the entity's NIT. Contracts are keyed by
//! `id_contrato` and upserted, so re-running refreshes changed contracts
//! and leaves unchanged ones alone.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::types::{BigDecimal, Json};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use super::modalidades;
use super::normalize::{parse_date, parse_money, text};
use crate::config::SourceConfig;
use crate::error::LoadTaskError;
use crate::loader::LoadStats;
use crate::source::socrata::{soql_literal, SocrataQuery};
use crate::source::SourceFetcher;

pub const TABLE: &str = "contratos_dacp";

pub const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS contratos_dacp (
        id_contrato TEXT PRIMARY KEY,
        referencia_contrato TEXT,
        proceso_compra TEXT,
        descripcion TEXT,
        modalidad_codigo TEXT REFERENCES modalidades_contratacion (codigo),
        modalidad_original TEXT,
        estado TEXT,
        fecha_firma DATE,
        fecha_inicio DATE,
        fecha_fin DATE,
        valor NUMERIC(20, 2),
        proveedor TEXT,
        documento_proveedor TEXT,
        url_proceso TEXT,
        raw JSONB NOT NULL,
        loaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contratos_dacp_modalidad ON contratos_dacp (modalidad_codigo)",
    "CREATE INDEX IF NOT EXISTS idx_contratos_dacp_fecha_firma ON contratos_dacp (fecha_firma)",
];

/// Column the remote query pages by
const ORDER_BY: &str = "id_contrato";

#[derive(Debug, Clone, PartialEq)]
pub struct Contrato {
    pub id_contrato: String,
    pub referencia_contrato: Option<String>,
    pub proceso_compra: Option<String>,
    pub descripcion: Option<String>,
    pub modalidad_codigo: Option<&'static str>,
    pub modalidad_original: Option<String>,
    pub estado: Option<String>,
    pub fecha_firma: Option<NaiveDate>,
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
    pub valor: Option<BigDecimal>,
    pub proveedor: Option<String>,
    pub documento_proveedor: Option<String>,
    pub url_proceso: Option<String>,
    pub raw: Value,
}

/// The SODA query for the configured entity.
pub fn query(endpoint: url::Url, sources: &SourceConfig) -> SocrataQuery {
    SocrataQuery {
        endpoint,
        filter: Some(format!("nit_entidad = {}", soql_literal(&sources.contratos_dacp_nit))),
        order_by: ORDER_BY.to_string(),
        page_size: sources.socrata_page_size,
        app_token: sources.socrata_app_token.clone(),
    }
}

/// String field of a SODA row. Socrata serializes numbers as strings, but
/// local dumps may not.
fn field(row: &Value, name: &str) -> Option<String> {
    match row.get(name)? {
        Value::String(s) => text(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert one SODA row.
pub fn parse_row(row: &Value) -> Result<Contrato, String> {
    if !row.is_object() {
        return Err("row is not a JSON object".to_string());
    }
    let id_contrato = field(row, "id_contrato").ok_or("missing id_contrato")?;

    let date = |name: &str| -> Result<Option<NaiveDate>, String> {
        match field(row, name) {
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| format!("{} '{}' is not a date", name, raw)),
            None => Ok(None),
        }
    };

    let modalidad_original = field(row, "modalidad_de_contratacion");
    let modalidad_codigo = modalidad_original.as_deref().and_then(modalidades::classify);

    // `urlproceso` is a Socrata URL column: {"url": "..."}
    let url_proceso = row
        .get("urlproceso")
        .and_then(|u| u.get("url"))
        .and_then(Value::as_str)
        .and_then(text);

    Ok(Contrato {
        referencia_contrato: field(row, "referencia_del_contrato"),
        proceso_compra: field(row, "proceso_de_compra"),
        descripcion: field(row, "descripcion_del_proceso").or_else(|| field(row, "objeto_del_contrato")),
        modalidad_codigo,
        modalidad_original,
        estado: field(row, "estado_contrato"),
        fecha_firma: date("fecha_de_firma")?,
        fecha_inicio: date("fecha_de_inicio_del_contrato")?,
        fecha_fin: date("fecha_de_fin_del_contrato")?,
        valor: match field(row, "valor_del_contrato") {
            Some(raw) => parse_money(&raw)?,
            None => None,
        },
        proveedor: field(row, "proveedor_adjudicado"),
        documento_proveedor: field(row, "documento_proveedor"),
        url_proceso,
        raw: row.clone(),
        id_contrato,
    })
}

/// Parsed contracts, deduplicated by `id_contrato` (last occurrence wins),
/// and the number of rejected rows.
pub fn parse_rows(rows: &[Value], location: &str) -> (Vec<Contrato>, u64) {
    let mut contracts: Vec<Contrato> = Vec::with_capacity(rows.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rejected = 0;

    for (index, row) in rows.iter().enumerate() {
        match parse_row(row) {
            Ok(contract) => match positions.get(&contract.id_contrato) {
                Some(&position) => {
                    debug!(id_contrato = %contract.id_contrato, "Contract repeated in source, keeping latest");
                    contracts[position] = contract;
                },
                None => {
                    positions.insert(contract.id_contrato.clone(), contracts.len());
                    contracts.push(contract);
                },
            },
            Err(reason) => {
                rejected += 1;
                warn!(source = location, row = index, reason = %reason, "Rejected contract row");
            },
        }
    }

    (contracts, rejected)
}

/// Fetch and upsert the entity's contracts.
pub async fn load(
    pool: &PgPool,
    fetcher: &SourceFetcher,
    sources: &SourceConfig,
    batch_size: usize,
) -> Result<LoadStats, LoadTaskError> {
    let location = &sources.contratos_dacp;
    let rows = fetcher.fetch_rows(location, |endpoint| query(endpoint, sources)).await?;
    let (contracts, rejected) = parse_rows(&rows, &location.to_string());

    if !rows.is_empty() && contracts.is_empty() {
        return Err(LoadTaskError::parse(
            location.to_string(),
            format!("all {} rows were rejected", rows.len()),
        ));
    }

    let mut tx = pool.begin().await?;
    let mut written = 0;

    for chunk in contracts.chunks(batch_size) {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO contratos_dacp (id_contrato, referencia_contrato, proceso_compra, \
             descripcion, modalidad_codigo, modalidad_original, estado, fecha_firma, fecha_inicio, \
             fecha_fin, valor, proveedor, documento_proveedor, url_proceso, raw) ",
        );
        query.push_values(chunk, |mut row, contract| {
            row.push_bind(&contract.id_contrato)
                .push_bind(&contract.referencia_contrato)
                .push_bind(&contract.proceso_compra)
                .push_bind(&contract.descripcion)
                .push_bind(contract.modalidad_codigo)
                .push_bind(&contract.modalidad_original)
                .push_bind(&contract.estado)
                .push_bind(contract.fecha_firma)
                .push_bind(contract.fecha_inicio)
                .push_bind(contract.fecha_fin)
                .push_bind(&contract.valor)
                .push_bind(&contract.proveedor)
                .push_bind(&contract.documento_proveedor)
                .push_bind(&contract.url_proceso)
                .push_bind(Json(&contract.raw));
        });
        query.push(
            " ON CONFLICT (id_contrato) DO UPDATE SET \
               referencia_contrato = EXCLUDED.referencia_contrato, \
               proceso_compra = EXCLUDED.proceso_compra, \
               descripcion = EXCLUDED.descripcion, \
               modalidad_codigo = EXCLUDED.modalidad_codigo, \
               modalidad_original = EXCLUDED.modalidad_original, \
               estado = EXCLUDED.estado, \
               fecha_firma = EXCLUDED.fecha_firma, \
               fecha_inicio = EXCLUDED.fecha_inicio, \
               fecha_fin = EXCLUDED.fecha_fin, \
               valor = EXCLUDED.valor, \
               proveedor = EXCLUDED.proveedor, \
               documento_proveedor = EXCLUDED.documento_proveedor, \
               url_proceso = EXCLUDED.url_proceso, \
               raw = EXCLUDED.raw, \
               loaded_at = NOW() \
             WHERE contratos_dacp.raw IS DISTINCT FROM EXCLUDED.raw",
        );

        written += query.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;

    let stats = LoadStats {
        rows_read: rows.len() as u64,
        rows_written: written,
        rows_skipped: rejected,
    };
    info!(
        table = TABLE,
        read = stats.rows_read,
        written = stats.rows_written,
        skipped = stats.rows_skipped,
        "Contracts loaded"
    );
    Ok(stats)
}
