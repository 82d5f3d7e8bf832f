//! Value normalization shared by the dataset loaders
//!
//! Colombian open-data exports mix conventions: `$ 1.234.567,89` next to
//! `1234567.89`, `Sí`/`No` booleans, `dd/mm/yyyy` next to ISO timestamps.

use std::str::FromStr;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use sqlx::types::BigDecimal;

/// Lowercase and strip Spanish diacritics.
pub fn fold(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Header comparison key: folded, runs of non-alphanumerics collapsed to `_`.
///
/// `"¿Se requieren vigencias futuras?"` becomes `se_requieren_vigencias_futuras`.
pub fn header_key(header: &str) -> String {
    let folded = fold(header);
    let mut key = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c);
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// Trimmed value, `None` when blank.
pub fn text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse a money amount written in either es-CO or plain decimal notation.
///
/// Returns `Ok(None)` when the value holds no digit at all: blank cells,
/// `N/A`, or the `$ -` an accounting-formatted sheet shows for an empty amount.
pub fn parse_money(value: &str) -> Result<Option<BigDecimal>, String> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Ok(None);
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        // Both present: whichever comes last is the decimal separator
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => {
            if is_decimal_separator(&cleaned, ',') {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        },
        (Some(_), None) => {
            if is_decimal_separator(&cleaned, '.') {
                cleaned
            } else {
                cleaned.replace('.', "")
            }
        },
        (None, None) => cleaned,
    };

    BigDecimal::from_str(&normalized)
        .map(Some)
        .map_err(|_| format!("'{}' is not a valid amount", value.trim()))
}

/// A lone separator followed by one or two digits is a decimal point;
/// repeated separators, or a lone one followed by exactly three digits,
/// group thousands.
fn is_decimal_separator(value: &str, separator: char) -> bool {
    if value.matches(separator).count() != 1 {
        return false;
    }
    match value.rsplit_once(separator) {
        Some((_, fraction)) => fraction.len() != 3,
        None => false,
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match fold(value).as_str() {
        "si" | "s" | "yes" | "true" | "1" | "x" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// ISO dates and timestamps (`2024-03-01`, `2024-03-01T00:00:00.000`) and
/// `dd/mm/yyyy`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Some(iso) = value.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(value, "%d/%m/%Y").ok()
}

/// UNSPSC codes as a list of 8-digit strings.
///
/// PAA exports separate codes with `;`, `,`, `|` or whitespace and
/// sometimes prefix them with `V1.`.
pub fn parse_unspsc_codes(value: &str) -> Vec<String> {
    value
        .split(|c: char| matches!(c, ';' | ',' | '|') || c.is_whitespace())
        .map(|code| code.trim().trim_start_matches("V1.").trim_start_matches("v1."))
        .filter(|code| code.len() == 8 && code.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// SHA-256 over the given fields, unit-separator joined, hex encoded.
pub fn content_hash<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(value: &str) -> String {
        parse_money(value).unwrap().unwrap().to_string()
    }

    #[test]
    fn test_header_key() {
        assert_eq!(header_key("¿Se requieren vigencias futuras?"), "se_requieren_vigencias_futuras");
        assert_eq!(header_key("Códigos UNSPSC"), "codigos_unspsc");
        assert_eq!(header_key("  Valor total estimado "), "valor_total_estimado");
    }

    #[test]
    fn test_money_es_co_notation() {
        assert_eq!(money("$ 1.234.567,89"), "1234567.89");
        assert_eq!(money("$1.500.000"), "1500000");
        assert_eq!(money("2.500"), "2500");
    }

    #[test]
    fn test_money_plain_and_us_notation() {
        assert_eq!(money("1234567.5"), "1234567.5");
        assert_eq!(money("1,234,567.89"), "1234567.89");
        assert_eq!(money("98000000"), "98000000");
        assert_eq!(money("45,5"), "45.5");
    }

    #[test]
    fn test_money_blank_and_invalid() {
        assert_eq!(parse_money("  ").unwrap(), None);
        assert_eq!(parse_money("N/A").unwrap(), None);
        assert!(parse_money("1-2").is_err());
    }

    #[test]
    fn test_money_accounting_dash_is_no_amount() {
        assert_eq!(parse_money("$ -").unwrap(), None);
        assert_eq!(parse_money("-").unwrap(), None);
        assert_eq!(parse_money(" $  -   ").unwrap(), None);
        assert_eq!(money("-1.500"), "-1500");
    }

    #[test]
    fn test_bool() {
        assert_eq!(parse_bool("Sí"), Some(true));
        assert_eq!(parse_bool("NO"), Some(false));
        assert_eq!(parse_bool("pendiente"), None);
    }

    #[test]
    fn test_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024-03-01T00:00:00.000"), expected);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("01/03/2024"), expected);
        assert_eq!(parse_date("marzo"), None);
    }

    #[test]
    fn test_unspsc_codes() {
        assert_eq!(
            parse_unspsc_codes("V1.80111600; 80111601,811115 | 43211500"),
            vec!["80111600", "80111601", "43211500"]
        );
    }

    #[test]
    fn test_content_hash_separates_fields() {
        assert_ne!(content_hash(["ab", "c"]), content_hash(["a", "bc"]));
        assert_eq!(content_hash(["a", "b"]), content_hash(["a", "b"]));
        assert_eq!(content_hash(["a"]).len(), 64);
    }
}
