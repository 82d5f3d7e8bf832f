//! Selection modalities of Colombian public procurement
//!
//! A small embedded catalog (Ley 80 de 1993, Ley 1150 de 2007 and later
//! reforms). PAA lines and contracts reference it through
//! `modalidad_codigo`, so it loads first.

use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::normalize::fold;
use crate::error::LoadTaskError;
use crate::loader::LoadStats;

pub const TABLE: &str = "modalidades_contratacion";

pub const DDL: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS modalidades_contratacion (
        codigo TEXT PRIMARY KEY,
        nombre TEXT NOT NULL,
        marco_normativo TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#];

/// One catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modalidad {
    pub codigo: &'static str,
    pub nombre: &'static str,
    pub marco_normativo: &'static str,
}

pub const CATALOG: &[Modalidad] = &[
    Modalidad {
        codigo: "licitacion_publica",
        nombre: "Licitación pública",
        marco_normativo: "Ley 1150 de 2007, art. 2 num. 1",
    },
    Modalidad {
        codigo: "seleccion_abreviada",
        nombre: "Selección abreviada",
        marco_normativo: "Ley 1150 de 2007, art. 2 num. 2",
    },
    Modalidad {
        codigo: "concurso_meritos",
        nombre: "Concurso de méritos",
        marco_normativo: "Ley 1150 de 2007, art. 2 num. 3",
    },
    Modalidad {
        codigo: "contratacion_directa",
        nombre: "Contratación directa",
        marco_normativo: "Ley 1150 de 2007, art. 2 num. 4",
    },
    Modalidad {
        codigo: "minima_cuantia",
        nombre: "Mínima cuantía",
        marco_normativo: "Ley 1474 de 2011, art. 94",
    },
    Modalidad {
        codigo: "regimen_especial",
        nombre: "Régimen especial",
        marco_normativo: "Ley 80 de 1993 y regímenes especiales",
    },
    Modalidad {
        codigo: "asociacion_publico_privada",
        nombre: "Asociación público privada",
        marco_normativo: "Ley 1508 de 2012",
    },
];

/// Map a free-text modality (as written in PAA or SECOP exports) to a
/// catalog code.
///
/// Checked most specific first: "Contratación régimen especial" must not
/// fall through to the generic "contratación" match.
pub fn classify(raw: &str) -> Option<&'static str> {
    let folded = fold(raw);
    if folded.is_empty() {
        return None;
    }

    let has = |needle: &str| folded.contains(needle);
    let codigo = if has("minima cuantia") {
        "minima_cuantia"
    } else if has("especial") {
        "regimen_especial"
    } else if has("asociacion publico privada") || folded == "app" {
        "asociacion_publico_privada"
    } else if has("concurso") {
        "concurso_meritos"
    } else if has("licitacion") {
        "licitacion_publica"
    } else if has("seleccion abreviada")
        || has("subasta")
        || has("acuerdo marco")
        || has("menor cuantia")
        || has("grandes superficies")
    {
        "seleccion_abreviada"
    } else if has("directa") {
        "contratacion_directa"
    } else {
        return None;
    };
    Some(codigo)
}

/// Upsert the catalog. Unchanged rows are not rewritten.
pub async fn load(pool: &PgPool) -> Result<LoadStats, LoadTaskError> {
    let mut tx = pool.begin().await?;

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO modalidades_contratacion (codigo, nombre, marco_normativo) ");
    query.push_values(CATALOG, |mut row, modalidad| {
        row.push_bind(modalidad.codigo)
            .push_bind(modalidad.nombre)
            .push_bind(modalidad.marco_normativo);
    });
    query.push(
        " ON CONFLICT (codigo) DO UPDATE SET \
           nombre = EXCLUDED.nombre, \
           marco_normativo = EXCLUDED.marco_normativo, \
           updated_at = NOW() \
         WHERE modalidades_contratacion.nombre IS DISTINCT FROM EXCLUDED.nombre \
            OR modalidades_contratacion.marco_normativo IS DISTINCT FROM EXCLUDED.marco_normativo",
    );

    let written = query.build().execute(&mut *tx).await?.rows_affected();
    tx.commit().await?;

    info!(table = TABLE, rows = CATALOG.len(), written, "Modalidades catalog loaded");

    Ok(LoadStats {
        rows_read: CATALOG.len() as u64,
        rows_written: written,
        rows_skipped: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_secop_labels() {
        assert_eq!(classify("Contratación directa"), Some("contratacion_directa"));
        assert_eq!(classify("Contratación Directa (con ofertas)"), Some("contratacion_directa"));
        assert_eq!(classify("Contratación régimen especial"), Some("regimen_especial"));
        assert_eq!(classify("Contratación régimen especial (con ofertas)"), Some("regimen_especial"));
        assert_eq!(classify("Mínima cuantía"), Some("minima_cuantia"));
        assert_eq!(classify("Licitación pública Obra Publica"), Some("licitacion_publica"));
        assert_eq!(classify("Concurso de méritos abierto"), Some("concurso_meritos"));
        assert_eq!(classify("Seleccion Abreviada de Menor Cuantia"), Some("seleccion_abreviada"));
        assert_eq!(classify("Selección abreviada subasta inversa"), Some("seleccion_abreviada"));
        assert_eq!(classify("Solicitud de información a los Proveedores"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_every_classification_targets_the_catalog() {
        let codes: Vec<_> = CATALOG.iter().map(|m| m.codigo).collect();
        for label in [
            "minima cuantia",
            "regimen especial",
            "asociacion publico privada",
            "concurso",
            "licitacion",
            "subasta",
            "directa",
        ] {
            let code = classify(label).unwrap();
            assert!(codes.contains(&code), "{} is not in the catalog", code);
        }
    }

    #[test]
    fn test_catalog_codes_unique() {
        let mut codes: Vec<_> = CATALOG.iter().map(|m| m.codigo).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), CATALOG.len());
    }
}
