pub mod csv;
pub mod ofx;

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers shared by the CSV and OFX parsers
// ---------------------------------------------------------------------------

/// Tolerant amount parsing: thousands separators, currency symbols,
/// `(500.00)` and `500.00-` negatives, `CR`/`DR` suffixes. A decimal comma
/// (`12,50`, `1.234,56`) is accepted; separators that are neither valid
/// grouping nor a decimal mark make the amount invalid.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '$' | '£' | '€' | '¥' | ' ' | '\u{a0}'))
        .collect();
    let mut s = cleaned.as_str();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner;
    }
    if let Some(inner) = s.strip_suffix('-') {
        negative = !negative;
        s = inner;
    }
    if let Some(inner) = s.strip_suffix("DR").or_else(|| s.strip_suffix("dr")) {
        negative = true;
        s = inner;
    } else if let Some(inner) = s.strip_suffix("CR").or_else(|| s.strip_suffix("cr")) {
        s = inner;
    }
    if s.is_empty() {
        return None;
    }

    let value = Decimal::from_str(&normalize_separators(s)?).ok()?;
    Some(if negative { -value } else { value })
}

/// Rewrites `1,234.56`, `1.234,56` and `12,50` to plain `1234.56` / `12.50`.
/// Whichever of `,` and `.` comes last is the decimal mark; a lone comma
/// followed by one or two digits is a decimal comma. Everything before the
/// decimal mark must be grouped in threes.
fn normalize_separators(s: &str) -> Option<String> {
    let (sign, body) = match s.strip_prefix(['-', '+']) {
        Some(rest) => (&s[..1], rest),
        None => ("", s),
    };
    let last_comma = body.rfind(',');
    let last_dot = body.rfind('.');

    let (int_part, frac, group_sep) = match (last_comma, last_dot) {
        (None, _) => return Some(s.to_string()),
        (Some(c), Some(d)) if d > c => (&body[..d], Some(&body[d + 1..]), ','),
        (Some(c), Some(_)) => (&body[..c], Some(&body[c + 1..]), '.'),
        (Some(c), None) => {
            let decimals = body.len() - c - 1;
            if body.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                (&body[..c], Some(&body[c + 1..]), ',')
            } else {
                (body, None, ',')
            }
        }
    };

    if int_part.is_empty() || frac.is_some_and(|f| f.contains([',', '.'])) {
        return None;
    }
    if int_part.contains(group_sep) {
        let mut groups = int_part.split(group_sep);
        let first = groups.next()?;
        if first.is_empty() || first.len() > 3 || groups.any(|g| g.len() != 3) {
            return None;
        }
    }
    let digits: String = int_part.chars().filter(|c| *c != group_sep).collect();
    if digits.contains([',', '.']) {
        return None;
    }
    Some(match frac {
        Some(f) => format!("{sign}{digits}.{f}"),
        None => format!("{sign}{digits}"),
    })
}

/// Tries each chrono format in order, then falls back to the date part of a
/// timestamp. Four-digit-year formats must yield a plausible year so that
/// `01/05/24` is not read as year 24.
pub fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(date) = parse_date_exact(raw, formats) {
        return Some(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    let (date_part, _) = raw.split_once(['T', ' '])?;
    parse_date_exact(date_part, formats)
}

fn parse_date_exact(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    formats.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .filter(|d| d.year() >= 1900)
    })
}

/// Statement files are expected in UTF-8; anything else is decoded lossily
/// so that a stray Latin-1 byte in a memo does not reject the whole file.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            log::warn!("Statement is not valid UTF-8, replacing undecodable bytes");
            String::from_utf8_lossy(bytes).into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}
