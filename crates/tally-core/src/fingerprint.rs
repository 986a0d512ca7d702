//! Record normalization and fingerprinting
//!
//! A fingerprint is the ledger's identity for a transaction. Rows carrying a
//! bank identifier use it directly; everything else is identified by a
//! SHA-256 over the normalized date, description and amount, so the same
//! logical transaction always lands on the same key regardless of how the
//! bank formatted it on a given export.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Candidate, CandidateRow};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", // 2024-01-15
    "%d/%m/%Y", // 15/01/2024 (European)
    "%d-%m-%Y", // 15-01-2024
    "%d.%m.%Y", // 15.01.2024
    "%Y/%m/%d", // 2024/01/15
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Normalize a row and compute its fingerprint
///
/// Date and amount are always parsed, even when a bank identifier supplies the
/// fingerprint, because the record must be storable.
pub fn normalize(row: &CandidateRow) -> Result<Candidate> {
    let date = parse_date(&row.date)?;
    let amount = parse_amount(&row.amount)?;
    let description = row.description.trim().to_string();

    let external_id = row
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from);

    let category = row
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);

    let fingerprint = match &external_id {
        Some(id) => id.clone(),
        None => content_fingerprint(&date, &description, amount),
    };

    Ok(Candidate {
        fingerprint,
        date,
        description,
        amount: round_amount(amount),
        category,
        external_id,
    })
}

/// Fingerprint of a row without keeping the normalized fields
pub fn fingerprint(row: &CandidateRow) -> Result<String> {
    normalize(row).map(|c| c.fingerprint)
}

/// SHA-256 over `date|description|amount` after normalization, hex encoded
pub fn content_fingerprint(date: &NaiveDate, description: &str, amount: Decimal) -> String {
    let key = format!(
        "{}|{}|{}",
        date.format("%Y-%m-%d"),
        normalize_description(description),
        format_amount(amount)
    );

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercase, collapse whitespace runs to a single space, trim
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Round to 2 decimal places, midpoint away from zero, with `-0.00` folded to `0.00`
pub fn round_amount(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// Fixed 2-decimal rendering used inside fingerprints
pub fn format_amount(amount: Decimal) -> String {
    round_amount(amount).to_string()
}

/// Parse a date in any of the accepted bank export formats
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    // Spreadsheet cells often come through as full timestamps
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    Err(Error::InvalidRecord(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols, thousands separators,
/// European decimal commas and accounting negatives
pub fn parse_amount(s: &str) -> Result<Decimal> {
    let invalid = || Error::InvalidRecord(format!("Unable to parse amount: {}", s));

    let mut cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£' | ' ' | '\u{a0}'))
        .collect();

    let mut negate = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') {
        negate = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let cleaned = normalize_separators(&cleaned);
    if cleaned.is_empty() {
        return Err(invalid());
    }

    let amount: Decimal = cleaned.parse().map_err(|_| invalid())?;
    if amount_to_cents(amount).is_none() {
        return Err(Error::InvalidRecord(format!("Amount out of range: {}", s)));
    }
    Ok(if negate { -amount } else { amount })
}

/// The amount in integer cents, or `None` when it does not fit the ledger
pub fn amount_to_cents(amount: Decimal) -> Option<i64> {
    round_amount(amount)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .to_i64()
}

/// Rewrite thousands/decimal separators into a plain `1234.56` form
fn normalize_separators(s: &str) -> String {
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    match (last_comma, last_dot) {
        // Both present: whichever comes last is the decimal separator
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(comma), None) => {
            let decimals = s.len() - comma - 1;
            if s.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15").unwrap(), expected);
        assert_eq!(parse_date("15/01/2024").unwrap(), expected);
        assert_eq!(parse_date("15-01-2024").unwrap(), expected);
        assert_eq!(parse_date("15.01.2024").unwrap(), expected);
        assert_eq!(parse_date("2024/01/15").unwrap(), expected);
        assert_eq!(parse_date(" 2024-01-15 00:00:00 ").unwrap(), expected);
        assert_eq!(parse_date("2024-01-15T08:30:00").unwrap(), expected);
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.50").unwrap(), dec("12.50"));
        assert_eq!(parse_amount("-12.5").unwrap(), dec("-12.5"));
        assert_eq!(parse_amount("$1,234.56").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("1.234,56 €").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("-45,30").unwrap(), dec("-45.30"));
        assert_eq!(parse_amount("1,000").unwrap(), dec("1000"));
        assert_eq!(parse_amount("(12.50)").unwrap(), dec("-12.50"));
        assert_eq!(parse_amount("1.000.000").unwrap(), dec("1000000"));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_parse_amount_out_of_range() {
        let err = parse_amount("1000000000000000000000000000").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(parse_amount("-99999999999999999999").is_err());

        assert_eq!(amount_to_cents(dec("-3.50")), Some(-350));
        assert_eq!(amount_to_cents(dec("92233720368547758.07")), Some(i64::MAX));
        assert_eq!(amount_to_cents(dec("92233720368547758.08")), None);
    }

    #[test]
    fn test_round_amount() {
        assert_eq!(format_amount(dec("12.5")), "12.50");
        assert_eq!(format_amount(dec("12.345")), "12.35");
        assert_eq!(format_amount(dec("-12.345")), "-12.35");
        assert_eq!(format_amount(dec("12.344")), "12.34");
        assert_eq!(format_amount(dec("-0.001")), "0.00");
        assert_eq!(format_amount(dec("7")), "7.00");
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(
            normalize_description("  Coffee\tShop   MADRID \n"),
            "coffee shop madrid"
        );
        assert_eq!(normalize_description(""), "");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let row = CandidateRow::new("2024-03-01", "Coffee Shop", "-3.50");
        let a = fingerprint(&row).unwrap();
        let b = fingerprint(&row).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_case_whitespace_and_formatting() {
        let a = fingerprint(&CandidateRow::new("2024-03-01", "Coffee Shop", "-3.5")).unwrap();
        let b = fingerprint(&CandidateRow::new("01/03/2024", "  coffee   SHOP ", "-3,50"))
            .unwrap();
        let c = fingerprint(&CandidateRow::new("2024-03-01", "COFFEE SHOP", "-3.499")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        let other = fingerprint(&CandidateRow::new("2024-03-02", "Coffee Shop", "-3.50")).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_fingerprint_uses_external_id() {
        let row = CandidateRow::new("2024-03-01", "Coffee", "-3.50").with_external_id("  TX-991 ");
        let candidate = normalize(&row).unwrap();
        assert_eq!(candidate.fingerprint, "TX-991");
        assert_eq!(candidate.external_id.as_deref(), Some("TX-991"));

        // Blank ids fall back to content hashing
        let row = CandidateRow::new("2024-03-01", "Coffee", "-3.50").with_external_id("   ");
        let candidate = normalize(&row).unwrap();
        assert_eq!(candidate.fingerprint.len(), 64);
        assert!(candidate.external_id.is_none());
    }

    #[test]
    fn test_external_id_row_still_needs_valid_fields() {
        let row = CandidateRow::new("not a date", "Coffee", "-3.50").with_external_id("TX-1");
        assert!(matches!(normalize(&row), Err(Error::InvalidRecord(_))));

        let row = CandidateRow::new("2024-03-01", "Coffee", "n/a").with_external_id("TX-1");
        assert!(matches!(normalize(&row), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_normalize_keeps_description_as_supplied() {
        let row = CandidateRow::new("2024-03-01", "  Coffee  Shop ", "-3.5").with_category(" ");
        let candidate = normalize(&row).unwrap();
        assert_eq!(candidate.description, "Coffee  Shop");
        assert_eq!(candidate.amount.to_string(), "-3.50");
        assert!(candidate.category.is_none());
    }
}
