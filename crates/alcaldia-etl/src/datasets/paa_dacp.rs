//! Plan Anual de Adquisiciones (PAA) of the DACP
//!
//! The PAA is published as a spreadsheet export whose header wording
//! drifts between years, so columns are matched by folded aliases rather
//! than exact names. Rows have no stable identifier; each is keyed by a
//! hash of its content, which makes re-loading the same file a no-op.

use std::collections::{HashMap, HashSet};

use csv::{ReaderBuilder, StringRecord, Trim};
use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use super::modalidades;
use super::normalize::{self, content_hash, header_key, text};
use crate::error::LoadTaskError;
use crate::loader::LoadStats;
use crate::source::{SourceFetcher, SourceLocation};

pub const TABLE: &str = "paa_dacp";

pub const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS paa_dacp (
        id BIGSERIAL PRIMARY KEY,
        content_hash TEXT NOT NULL UNIQUE,
        vigencia INTEGER,
        codigos_unspsc TEXT[] NOT NULL DEFAULT '{}',
        descripcion TEXT NOT NULL,
        fecha_estimada_inicio TEXT,
        duracion_estimada TEXT,
        modalidad_codigo TEXT REFERENCES modalidades_contratacion (codigo),
        modalidad_original TEXT,
        fuente_recursos TEXT,
        valor_total_estimado NUMERIC(20, 2),
        valor_vigencia_actual NUMERIC(20, 2),
        requiere_vigencias_futuras BOOLEAN,
        estado_vigencias_futuras TEXT,
        responsable TEXT,
        loaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_paa_dacp_modalidad ON paa_dacp (modalidad_codigo)",
    "CREATE INDEX IF NOT EXISTS idx_paa_dacp_vigencia ON paa_dacp (vigencia)",
];

/// Columns the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Vigencia,
    CodigosUnspsc,
    Descripcion,
    FechaEstimadaInicio,
    DuracionEstimada,
    Modalidad,
    FuenteRecursos,
    ValorTotal,
    ValorVigenciaActual,
    RequiereVigenciasFuturas,
    EstadoVigenciasFuturas,
    Responsable,
}

impl Column {
    /// Folded header keys (see [`header_key`]) that identify the column. A
    /// header matches when its key is the alias or starts with `alias_`.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Vigencia => &["vigencia", "ano", "anio"],
            Column::CodigosUnspsc => &["codigos_unspsc", "codigo_unspsc", "unspsc"],
            Column::Descripcion => &["descripcion", "objeto"],
            Column::FechaEstimadaInicio => &["fecha_estimada_de_inicio", "fecha_estimada_inicio", "mes_estimado"],
            Column::DuracionEstimada => &["duracion_estimada", "duracion"],
            Column::Modalidad => &["modalidad_de_seleccion", "modalidad"],
            Column::FuenteRecursos => &["fuente_de_los_recursos", "fuente_recursos", "fuente"],
            Column::ValorTotal => &["valor_total_estimado", "valor_total"],
            Column::ValorVigenciaActual => &["valor_estimado_en_la_vigencia_actual", "valor_vigencia_actual"],
            Column::RequiereVigenciasFuturas => &[
                "se_requieren_vigencias_futuras",
                "requiere_vigencias_futuras",
                "vigencias_futuras",
            ],
            Column::EstadoVigenciasFuturas => &["estado_de_solicitud_de_vigencias_futuras", "estado_vigencias_futuras"],
            Column::Responsable => &["datos_de_contacto_del_responsable", "responsable", "unidad_de_contratacion"],
        }
    }

    const ALL: [Column; 12] = [
        Column::Vigencia,
        Column::CodigosUnspsc,
        Column::Descripcion,
        Column::FechaEstimadaInicio,
        Column::DuracionEstimada,
        Column::Modalidad,
        Column::FuenteRecursos,
        Column::ValorTotal,
        Column::ValorVigenciaActual,
        Column::RequiereVigenciasFuturas,
        Column::EstadoVigenciasFuturas,
        Column::Responsable,
    ];
}

/// `alias` names the whole key or its leading words; `vigencia` matches
/// `vigencia_fiscal` but not `vigencias_futuras`.
fn alias_matches(key: &str, alias: &str) -> bool {
    key.strip_prefix(alias)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
}

/// Resolve header positions. The first matching header wins.
fn map_headers(headers: &StringRecord) -> HashMap<Column, usize> {
    let keys: Vec<String> = headers.iter().map(header_key).collect();
    let mut mapping = HashMap::new();

    // Longer aliases are tried across all headers before short ones, so a
    // specific alias claims its header before a generic one can.
    let mut candidates: Vec<(Column, &str)> = Column::ALL
        .iter()
        .flat_map(|col| col.aliases().iter().map(move |alias| (*col, *alias)))
        .collect();
    candidates.sort_by_key(|(_, alias)| std::cmp::Reverse(alias.len()));

    let mut taken = HashSet::new();
    for (column, alias) in candidates {
        if mapping.contains_key(&column) {
            continue;
        }
        if let Some(index) = keys
            .iter()
            .enumerate()
            .position(|(i, key)| !taken.contains(&i) && alias_matches(key, alias))
        {
            mapping.insert(column, index);
            taken.insert(index);
        }
    }
    mapping
}

/// One PAA line ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct PaaLine {
    pub content_hash: String,
    pub vigencia: Option<i32>,
    pub codigos_unspsc: Vec<String>,
    pub descripcion: String,
    pub fecha_estimada_inicio: Option<String>,
    pub duracion_estimada: Option<String>,
    pub modalidad_codigo: Option<&'static str>,
    pub modalidad_original: Option<String>,
    pub fuente_recursos: Option<String>,
    pub valor_total_estimado: Option<BigDecimal>,
    pub valor_vigencia_actual: Option<BigDecimal>,
    pub requiere_vigencias_futuras: Option<bool>,
    pub estado_vigencias_futuras: Option<String>,
    pub responsable: Option<String>,
}

/// Result of parsing a PAA export
#[derive(Debug, Default)]
pub struct ParsedPaa {
    pub lines: Vec<PaaLine>,
    /// Data rows seen, including rejected and duplicate ones
    pub rows_read: u64,
    pub rows_rejected: u64,
}

/// `;` wins when the header line has more semicolons than commas.
fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

/// Parse a PAA CSV export.
///
/// Fails only when the file as a whole is unusable (unreadable CSV or no
/// description column). Individual bad rows are rejected with a warning.
pub fn parse(content: &str, location: &str) -> Result<ParsedPaa, LoadTaskError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = map_headers(&headers);
    if !columns.contains_key(&Column::Descripcion) {
        return Err(LoadTaskError::parse(
            location,
            format!(
                "no description column found (headers: {})",
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
        ));
    }
    debug!(?columns, "Mapped PAA columns");

    let mut parsed = ParsedPaa::default();
    let mut seen = HashSet::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line_number = index + 2;

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        parsed.rows_read += 1;

        match parse_line(&record, &columns) {
            Ok(line) => {
                if seen.insert(line.content_hash.clone()) {
                    parsed.lines.push(line);
                } else {
                    debug!(line_number, "Duplicate PAA line in source, keeping first");
                }
            },
            Err(reason) => {
                parsed.rows_rejected += 1;
                warn!(source = location, line_number, reason = %reason, "Rejected PAA line");
            },
        }
    }

    Ok(parsed)
}

fn cell<'r>(record: &'r StringRecord, columns: &HashMap<Column, usize>, column: Column) -> &'r str {
    columns
        .get(&column)
        .and_then(|&i| record.get(i))
        .unwrap_or_default()
}

fn parse_line(record: &StringRecord, columns: &HashMap<Column, usize>) -> Result<PaaLine, String> {
    let field = |column| cell(record, columns, column);

    let descripcion = text(field(Column::Descripcion)).ok_or("empty description")?;

    let vigencia = match text(field(Column::Vigencia)) {
        Some(raw) => Some(
            raw.parse::<i32>()
                .ok()
                .filter(|year| (2000..=2100).contains(year))
                .ok_or_else(|| format!("'{}' is not a valid vigencia", raw))?,
        ),
        None => None,
    };

    let modalidad_original = text(field(Column::Modalidad));
    let modalidad_codigo = modalidad_original.as_deref().and_then(modalidades::classify);

    let hash = content_hash(Column::ALL.iter().map(|&column| field(column)));

    Ok(PaaLine {
        content_hash: hash,
        vigencia,
        codigos_unspsc: normalize::parse_unspsc_codes(field(Column::CodigosUnspsc)),
        descripcion,
        fecha_estimada_inicio: text(field(Column::FechaEstimadaInicio)),
        duracion_estimada: text(field(Column::DuracionEstimada)),
        modalidad_codigo,
        modalidad_original,
        fuente_recursos: text(field(Column::FuenteRecursos)),
        valor_total_estimado: normalize::parse_money(field(Column::ValorTotal))?,
        valor_vigencia_actual: normalize::parse_money(field(Column::ValorVigenciaActual))?,
        requiere_vigencias_futuras: normalize::parse_bool(field(Column::RequiereVigenciasFuturas)),
        estado_vigencias_futuras: text(field(Column::EstadoVigenciasFuturas)),
        responsable: text(field(Column::Responsable)),
    })
}

/// Fetch, parse and insert the PAA.
pub async fn load(
    pool: &PgPool,
    fetcher: &SourceFetcher,
    location: &SourceLocation,
    batch_size: usize,
) -> Result<LoadStats, LoadTaskError> {
    let content = fetcher.fetch_text(location).await?;
    let parsed = parse(&content, &location.to_string())?;

    if parsed.rows_read > 0 && parsed.lines.is_empty() {
        return Err(LoadTaskError::parse(
            location.to_string(),
            format!("all {} rows were rejected", parsed.rows_read),
        ));
    }

    let unclassified = parsed
        .lines
        .iter()
        .filter(|l| l.modalidad_original.is_some() && l.modalidad_codigo.is_none())
        .count();
    if unclassified > 0 {
        warn!(table = TABLE, unclassified, "PAA lines with an unrecognized modality");
    }

    let mut tx = pool.begin().await?;
    let mut written = 0;

    for chunk in parsed.lines.chunks(batch_size) {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO paa_dacp (content_hash, vigencia, codigos_unspsc, descripcion, \
             fecha_estimada_inicio, duracion_estimada, modalidad_codigo, modalidad_original, \
             fuente_recursos, valor_total_estimado, valor_vigencia_actual, \
             requiere_vigencias_futuras, estado_vigencias_futuras, responsable) ",
        );
        query.push_values(chunk, |mut row, line| {
            row.push_bind(&line.content_hash)
                .push_bind(line.vigencia)
                .push_bind(&line.codigos_unspsc)
                .push_bind(&line.descripcion)
                .push_bind(&line.fecha_estimada_inicio)
                .push_bind(&line.duracion_estimada)
                .push_bind(line.modalidad_codigo)
                .push_bind(&line.modalidad_original)
                .push_bind(&line.fuente_recursos)
                .push_bind(&line.valor_total_estimado)
                .push_bind(&line.valor_vigencia_actual)
                .push_bind(line.requiere_vigencias_futuras)
                .push_bind(&line.estado_vigencias_futuras)
                .push_bind(&line.responsable);
        });
        query.push(" ON CONFLICT (content_hash) DO NOTHING");

        written += query.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;

    let stats = LoadStats {
        rows_read: parsed.rows_read,
        rows_written: written,
        rows_skipped: parsed.rows_rejected,
    };
    info!(
        table = TABLE,
        read = stats.rows_read,
        written = stats.rows_written,
        skipped = stats.rows_skipped,
        "PAA loaded"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEMICOLON_EXPORT: &str = "\
Códigos UNSPSC;Descripción;Fecha estimada de inicio de proceso de selección;Duración estimada del contrato;Modalidad de selección;Fuente de los recursos;Valor total estimado;Valor estimado en la vigencia actual;¿Se requieren vigencias futuras?;Estado de solicitud de vigencias futuras;Datos de contacto del responsable
80111600;Prestación de servicios profesionales de apoyo jurídico;Enero;11 meses;Contratación directa;Recursos propios;$ 55.000.000;$ 55.000.000;No;NA;Subdirección de Contratación
43211500 44121600;Adquisición de equipos de cómputo;Abril;2 meses;Selección abreviada subasta inversa;SGP;$ 120.500.000,50;$ 120.500.000,50;No;NA;Subdirección de Recursos Físicos
";

    #[test]
    fn test_parse_semicolon_export() {
        let parsed = parse(SEMICOLON_EXPORT, "paa.csv").unwrap();
        assert_eq!(parsed.rows_read, 2);
        assert_eq!(parsed.rows_rejected, 0);

        let first = &parsed.lines[0];
        assert_eq!(first.descripcion, "Prestación de servicios profesionales de apoyo jurídico");
        assert_eq!(first.codigos_unspsc, vec!["80111600"]);
        assert_eq!(first.modalidad_codigo, Some("contratacion_directa"));
        assert_eq!(first.valor_total_estimado.as_ref().unwrap().to_string(), "55000000");
        assert_eq!(first.requiere_vigencias_futuras, Some(false));
        assert_eq!(first.responsable.as_deref(), Some("Subdirección de Contratación"));

        let second = &parsed.lines[1];
        assert_eq!(second.codigos_unspsc, vec!["43211500", "44121600"]);
        assert_eq!(second.modalidad_codigo, Some("seleccion_abreviada"));
        assert_eq!(second.valor_vigencia_actual.as_ref().unwrap().to_string(), "120500000.50");
    }

    #[test]
    fn test_vigencia_actual_not_mistaken_for_vigencia() {
        let columns = map_headers(&StringRecord::from(vec![
            "Descripción",
            "Valor estimado en la vigencia actual",
            "Vigencia",
        ]));
        assert_eq!(columns.get(&Column::ValorVigenciaActual), Some(&1));
        assert_eq!(columns.get(&Column::Vigencia), Some(&2));
    }

    #[test]
    fn test_aliases_match_whole_words() {
        assert!(alias_matches("vigencia", "vigencia"));
        assert!(alias_matches("vigencia_fiscal", "vigencia"));
        assert!(!alias_matches("vigencias_futuras", "vigencia"));
        assert!(!alias_matches("anotaciones", "ano"));
        assert!(!alias_matches("fuentes_alternas", "fuente"));
    }

    #[test]
    fn test_vigencias_futuras_header_is_not_vigencia() {
        let content = "Descripción;Vigencias futuras\nServicio de aseo;No\n";
        let parsed = parse(content, "paa.csv").unwrap();
        assert_eq!(parsed.rows_rejected, 0);
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.lines[0].vigencia, None);
        assert_eq!(parsed.lines[0].requiere_vigencias_futuras, Some(false));
    }

    #[test]
    fn test_accounting_dash_amount_keeps_line() {
        let content = "Descripción;Valor total estimado;Valor estimado en la vigencia actual\n\
                       Servicio de aseo;$ 10.000.000;$ -\n";
        let parsed = parse(content, "paa.csv").unwrap();
        assert_eq!(parsed.rows_rejected, 0);
        let line = &parsed.lines[0];
        assert_eq!(line.valor_total_estimado.as_ref().unwrap().to_string(), "10000000");
        assert_eq!(line.valor_vigencia_actual, None);
    }

    #[test]
    fn test_parse_comma_export_with_vigencia() {
        let content = "Vigencia,Descripción,Modalidad,Valor total\n\
                       2024,Mantenimiento de sede,Mínima cuantía,\"12,500,000\"\n";
        let parsed = parse(content, "paa.csv").unwrap();
        let line = &parsed.lines[0];
        assert_eq!(line.vigencia, Some(2024));
        assert_eq!(line.modalidad_codigo, Some("minima_cuantia"));
        assert_eq!(line.valor_total_estimado.as_ref().unwrap().to_string(), "12500000");
    }

    #[test]
    fn test_bad_rows_rejected_good_rows_kept() {
        let content = "Descripción;Valor total estimado;Vigencia\n\
                       ;1000;2024\n\
                       Servicio de aseo;1-2;2024\n\
                       Servicio de vigilancia;1000;19\n\
                       Servicio de cafetería;2000;2024\n";
        let parsed = parse(content, "paa.csv").unwrap();
        assert_eq!(parsed.rows_read, 4);
        assert_eq!(parsed.rows_rejected, 3);
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.lines[0].descripcion, "Servicio de cafetería");
    }

    #[test]
    fn test_duplicate_lines_collapse() {
        let content = "Descripción;Valor total estimado\nAseo;1000\nAseo;1000\nAseo;2000\n";
        let parsed = parse(content, "paa.csv").unwrap();
        assert_eq!(parsed.rows_read, 3);
        assert_eq!(parsed.lines.len(), 2);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let content = "Descripción;Valor total estimado\nAseo;1000\n;\n";
        let parsed = parse(content, "paa.csv").unwrap();
        assert_eq!(parsed.rows_read, 1);
    }

    #[test]
    fn test_missing_description_column_fails() {
        let err = parse("Codigo;Valor\n1;2\n", "paa.csv").unwrap_err();
        assert!(matches!(err, LoadTaskError::Parse { .. }));
        assert!(err.to_string().contains("no description column"));
    }

    #[test]
    fn test_hash_is_stable_across_parses() {
        let a = parse(SEMICOLON_EXPORT, "a.csv").unwrap();
        let b = parse(SEMICOLON_EXPORT, "b.csv").unwrap();
        assert_eq!(a.lines[0].content_hash, b.lines[0].content_hash);
        assert_ne!(a.lines[0].content_hash, a.lines[1].content_hash);
    }
}
