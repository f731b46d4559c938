// Utility helpers for parsing and basic statistics.
//
// Parsing here is strict: a cell either converts cleanly or the record is
// rejected. The `de_*` functions plug these parsers into the serde rows so
// a bad number fails the load instead of becoming a null.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use serde::de::{self, Deserialize, Deserializer};

/// Date layouts seen in the source exports: ISO and the Brazilian
/// day-first form used by the yearly fire sheets.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// Tolerance used when comparing areas carried by different tables.
#[cfg(test)]
pub const AREA_TOLERANCE: f64 = 1e-6;

/// Parse a decimal number. Anything with letters in it (`NaN`, `inf`,
/// stray text) is rejected even though `f64::from_str` would accept some of
/// those spellings.
pub fn parse_f64_strict(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    s.parse::<f64>().ok()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= AREA_TOLERANCE
}

/// Non-empty text cell. Whitespace inside the value is kept as is.
pub fn de_required<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    if s.trim().is_empty() {
        return Err(de::Error::custom("required value is empty"));
    }
    Ok(s)
}

/// Optional decimal cell: empty is `None`, anything unparseable is an error.
pub fn de_opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_f64_strict(s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid number `{}`", s))),
    }
}

pub fn de_opt_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date `{}`", s))),
    }
}

pub fn average(v: &[f64]) -> f64 {
    // Arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed number of decimals with locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_float_rejects_words() {
        assert_eq!(parse_f64_strict("292599.9242"), Some(292599.9242));
        assert_eq!(parse_f64_strict(" 12 "), Some(12.0));
        assert_eq!(parse_f64_strict("NaN"), None);
        assert_eq!(parse_f64_strict("inf"), None);
        assert_eq!(parse_f64_strict(""), None);
    }

    #[test]
    fn dates_accept_both_layouts() {
        let expected = NaiveDate::from_ymd_opt(2021, 10, 15);
        assert_eq!(parse_date("2021-10-15"), expected);
        assert_eq!(parse_date("15/10/2021"), expected);
        assert_eq!(parse_date("10-15-2021"), None);
    }

    #[test]
    fn formats_with_separators() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-12.5, 1), "-12.5");
        assert_eq!(format_number(0.0, 0), "0");
        assert_eq!(format_int(9855_i64), "9,855");
    }

    #[test]
    fn approx_eq_tolerates_rounding() {
        assert!(approx_eq(292599.9242, 292599.92420000001));
        assert!(!approx_eq(292599.9242, 292599.93));
        assert_eq!(average(&[]), 0.0);
        assert_eq!(average(&[1.0, 2.0, 3.0]), 2.0);
    }
}
