//! Converts raw columnar data to canonical, immutable normalized rows.
//!
//! Never raises on cell-level bad data: a cell that fails to parse becomes
//! `None` in the normalized row and is counted in a [`ParseWarnings`]. The
//! caller decides what (if anything) to do with a high failure rate.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::ColumnMapping;
use crate::model::{CellValue, NormalizedRow, ParseWarnings, RawRow, Side};

/// Cell values treated as a blank reference after trim + uppercase.
const BLANK_MARKERS: [&str; 4] = ["NAN", "NONE", "NULL", "0"];

/// Date formats tried by the per-cell lenient parser, in order. Also the
/// candidate set considered for whole-column format detection.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
];

const CURRENCY_SYMBOLS: [char; 6] = ['$', '€', '£', 'R', '¥', '₹'];

pub struct NormalizeOutput {
    pub rows: Vec<NormalizedRow>,
    pub warnings: ParseWarnings,
}

/// Normalize ledger rows (debit/credit columns).
pub fn normalize_ledger_rows(raw: &[RawRow], columns: &ColumnMapping) -> NormalizeOutput {
    normalize_rows(raw, columns, Side::Ledger)
}

/// Normalize statement rows (signed amount column).
pub fn normalize_statement_rows(raw: &[RawRow], columns: &ColumnMapping) -> NormalizeOutput {
    normalize_rows(raw, columns, Side::Statement)
}

fn normalize_rows(raw: &[RawRow], columns: &ColumnMapping, side: Side) -> NormalizeOutput {
    let mut warnings = ParseWarnings::default();

    // Whole-column date format detection: if >70% of non-blank date cells
    // agree on one format, use it for every cell; otherwise fall back to a
    // lenient per-cell parser that tries each format in turn.
    let date_texts: Vec<Option<&str>> = raw
        .iter()
        .map(|r| {
            columns
                .date
                .as_deref()
                .and_then(|col| r.get(col))
                .and_then(|v| v.as_text())
        })
        .collect();
    let column_format = pick_column_date_format(&date_texts);

    let mut rows = Vec::with_capacity(raw.len());

    for r in raw {
        let date_cell = columns.date.as_deref().and_then(|col| r.get(col));
        let (date_norm, date_failed) = parse_date_cell(date_cell, column_format);
        if date_failed {
            warnings.bad_dates += 1;
        }

        let ref_cell = columns.reference.as_deref().and_then(|col| r.get(col));
        let ref_text = ref_cell.and_then(CellValue::as_text);
        let (ref_norm, ref_was_blank) = normalize_reference(ref_text, r.row_id);
        if ref_was_blank {
            warnings.blank_references += 1;
        }

        let description = columns
            .description
            .as_deref()
            .and_then(|col| r.get(col))
            .and_then(CellValue::as_text)
            .map(str::to_string);

        let (debit_cents, credit_cents, amount_cents) = match side {
            Side::Ledger => {
                let (d, d_failed) = columns
                    .debit
                    .as_deref()
                    .and_then(|col| r.get(col))
                    .map(parse_amount_cell)
                    .unwrap_or((None, false));
                let (c, c_failed) = columns
                    .credit
                    .as_deref()
                    .and_then(|col| r.get(col))
                    .map(parse_amount_cell)
                    .unwrap_or((None, false));
                if d_failed || c_failed {
                    warnings.bad_amounts += 1;
                }
                (d, c, None)
            }
            Side::Statement => {
                let (a, a_failed) = columns
                    .amount
                    .as_deref()
                    .and_then(|col| r.get(col))
                    .map(parse_amount_cell)
                    .unwrap_or((None, false));
                if a_failed {
                    warnings.bad_amounts += 1;
                }
                (None, None, a)
            }
        };

        rows.push(NormalizedRow {
            row_id: r.row_id,
            side,
            date_norm,
            ref_norm,
            ref_was_blank,
            debit_cents,
            credit_cents,
            amount_cents,
            description,
        });
    }

    NormalizeOutput { rows, warnings }
}

// ---------------------------------------------------------------------------
// Reference normalization
// ---------------------------------------------------------------------------

pub(crate) fn normalize_reference(raw: Option<&str>, row_id: u64) -> (String, bool) {
    let collapsed: String = raw
        .unwrap_or("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();

    let is_blank = collapsed.is_empty() || BLANK_MARKERS.contains(&collapsed.as_str());
    if is_blank {
        (format!("__BLANK_{row_id}__"), true)
    } else {
        (collapsed, false)
    }
}

// ---------------------------------------------------------------------------
// Date normalization
// ---------------------------------------------------------------------------

/// Picks the single date format that parses the highest fraction of
/// non-empty cells in the column, if that fraction exceeds 70%.
fn pick_column_date_format(cells: &[Option<&str>]) -> Option<&'static str> {
    let non_empty: Vec<&str> = cells.iter().filter_map(|c| *c).filter(|s| !s.trim().is_empty()).collect();
    if non_empty.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for fmt in DATE_FORMATS {
        let hits = non_empty
            .iter()
            .filter(|s| NaiveDate::parse_from_str(s.trim(), fmt).is_ok())
            .count();
        if best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((fmt, hits));
        }
    }

    best.and_then(|(fmt, hits)| {
        let rate = hits as f64 / non_empty.len() as f64;
        if rate > 0.70 {
            Some(fmt)
        } else {
            None
        }
    })
}

/// Returns `(parsed_date, failed)`. `failed` is true only when the cell had
/// content that could not be parsed by any known format; an absent cell is
/// not a failure.
fn parse_date_cell(cell: Option<&CellValue>, column_format: Option<&'static str>) -> (Option<NaiveDate>, bool) {
    match cell {
        None | Some(CellValue::Empty) => (None, false),
        Some(CellValue::Date(d)) => (Some(*d), false),
        Some(CellValue::Number(_)) => (None, true),
        Some(CellValue::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return (None, false);
            }
            if let Some(fmt) = column_format {
                if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
                    return (Some(d), false);
                }
            }
            // Lenient per-cell fallback: try every known format.
            for fmt in DATE_FORMATS {
                if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
                    return (Some(d), false);
                }
            }
            (None, true)
        }
    }
}

// ---------------------------------------------------------------------------
// Amount normalization
// ---------------------------------------------------------------------------

/// Returns `(cents, failed)`. A blank cell yields `(None, false)` — absent
/// amounts must be distinguishable from legitimate zeros.
fn parse_amount_cell(cell: &CellValue) -> (Option<i64>, bool) {
    match cell {
        CellValue::Empty => (None, false),
        CellValue::Date(_) => (None, true),
        CellValue::Number(d) => match decimal_to_cents(*d) {
            Some(c) => (Some(c), false),
            None => (None, true),
        },
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return (None, false);
            }
            match parse_amount_text(trimmed) {
                Some(c) => (Some(c), false),
                None => (None, true),
            }
        }
    }
}

pub(crate) fn parse_amount_text(s: &str) -> Option<i64> {
    let mut t = s.trim();

    // Optional leading apostrophe from spreadsheet text formatting.
    t = t.strip_prefix('\'').unwrap_or(t);
    t = t.trim();

    let mut negative = false;
    if let Some(inner) = t.strip_prefix('(').and_then(|x| x.strip_suffix(')')) {
        negative = true;
        t = inner.trim();
    }

    for sym in CURRENCY_SYMBOLS {
        if let Some(stripped) = t.strip_prefix(sym) {
            t = stripped.trim_start();
            break;
        }
    }

    let chars: Vec<char> = t.chars().collect();
    let mut cleaned = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            continue;
        }
        if c == '\'' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
            if prev_digit && next_digit {
                continue; // thousands separator
            }
        }
        cleaned.push(c);
    }

    if cleaned.is_empty() {
        return None;
    }

    let value: Decimal = cleaned.parse().ok()?;
    let cents = decimal_to_cents(value)?;
    Some(if negative { -cents } else { cents })
}

fn decimal_to_cents(d: Decimal) -> Option<i64> {
    (d * Decimal::from(100)).round().to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, fields: &[(&str, CellValue)]) -> RawRow {
        RawRow {
            row_id: id,
            fields: fields.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn ledger_columns() -> ColumnMapping {
        ColumnMapping {
            date: Some("date".into()),
            reference: Some("ref".into()),
            debit: Some("debit".into()),
            credit: Some("credit".into()),
            amount: None,
            description: None,
        }
    }

    fn statement_columns() -> ColumnMapping {
        ColumnMapping {
            date: Some("date".into()),
            reference: Some("ref".into()),
            debit: None,
            credit: None,
            amount: Some("amount".into()),
            description: None,
        }
    }

    #[test]
    fn reference_blank_gets_synthetic_marker() {
        for raw in ["", "nan", "NONE", "Null", "0", "   "] {
            let (norm, blank) = normalize_reference(Some(raw), 42);
            assert!(blank, "{raw:?} should be blank");
            assert_eq!(norm, "__BLANK_42__");
        }
    }

    #[test]
    fn reference_non_blank_is_trimmed_collapsed_uppercased() {
        let (norm, blank) = normalize_reference(Some("  inv   001  "), 1);
        assert!(!blank);
        assert_eq!(norm, "INV 001");
    }

    #[test]
    fn two_blank_refs_get_distinct_markers() {
        let (a, _) = normalize_reference(Some(""), 1);
        let (b, _) = normalize_reference(Some(""), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn amount_parses_currency_and_thousands() {
        assert_eq!(parse_amount_text("R 1,234.56"), Some(123456));
        assert_eq!(parse_amount_text("$1,000.00"), Some(100000));
        assert_eq!(parse_amount_text("€50"), Some(5000));
    }

    #[test]
    fn amount_parses_parens_as_negative() {
        assert_eq!(parse_amount_text("(1,234.56)"), Some(-123456));
    }

    #[test]
    fn amount_parses_leading_apostrophe() {
        assert_eq!(parse_amount_text("'1234.56"), Some(123456));
    }

    #[test]
    fn amount_bad_text_fails() {
        assert_eq!(parse_amount_text("not a number"), None);
    }

    #[test]
    fn amount_cell_blank_is_none_not_zero() {
        let (cents, failed) = parse_amount_cell(&CellValue::Empty);
        assert_eq!(cents, None);
        assert!(!failed);
    }

    #[test]
    fn date_already_typed_passes_through() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let (parsed, failed) = parse_date_cell(Some(&CellValue::Date(d)), None);
        assert_eq!(parsed, Some(d));
        assert!(!failed);
    }

    #[test]
    fn date_lenient_fallback_tries_all_formats() {
        let (parsed, failed) = parse_date_cell(Some(&text("05.01.2026")), None);
        assert_eq!(parsed, Some(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()));
        assert!(!failed);
    }

    #[test]
    fn date_unparseable_is_null_and_counted() {
        let (parsed, failed) = parse_date_cell(Some(&text("not a date")), None);
        assert_eq!(parsed, None);
        assert!(failed);
    }

    #[test]
    fn column_format_detection_picks_dominant_format() {
        let cells = vec![Some("2026-01-05"), Some("2026-01-06"), Some("2026-01-07"), Some("garbage")];
        let fmt = pick_column_date_format(&cells);
        assert_eq!(fmt, Some("%Y-%m-%d"));
    }

    #[test]
    fn column_format_detection_requires_majority() {
        // Only 1/3 parseable under any single format -> no dominant format.
        let cells = vec![Some("2026-01-05"), Some("garbage"), Some("also garbage")];
        assert_eq!(pick_column_date_format(&cells), None);
    }

    #[test]
    fn normalize_ledger_row_scenario_1() {
        let rows = vec![row(
            1,
            &[
                ("date", text("2025-01-05")),
                ("ref", text("INV-001")),
                ("debit", CellValue::Number(Decimal::new(123456, 2))),
                ("credit", CellValue::Number(Decimal::ZERO)),
            ],
        )];
        let out = normalize_ledger_rows(&rows, &ledger_columns());
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].ref_norm, "INV-001");
        assert_eq!(out.rows[0].debit_cents, Some(123456));
        assert_eq!(out.rows[0].credit_cents, Some(0));
        assert_eq!(out.warnings.bad_dates, 0);
    }

    #[test]
    fn normalize_statement_row_formatted_amount() {
        let rows = vec![row(
            1,
            &[
                ("date", text("2025-01-05")),
                ("ref", text("INV-001")),
                ("amount", text("R 1,234.56")),
            ],
        )];
        let out = normalize_statement_rows(&rows, &statement_columns());
        assert_eq!(out.rows[0].amount_cents, Some(123456));
    }
}
