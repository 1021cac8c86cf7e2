//! Corporate batch classifier: partitions a single table of rows, each
//! carrying a foreign-debit and foreign-credit amount plus a reference,
//! into six disjoint batches. Independent of the FNB matching pipeline —
//! it consumes one table, not two.

use std::collections::{HashMap, HashSet};

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::config::{CorporateColumns, CorporateSettings};
use crate::model::{BatchRecord, CellValue, CorporateIntegrityReport, CorporateResult, RawRow};
use crate::normalize::{normalize_reference, parse_amount_text};

const WHOLE_UNIT_CENTS: i64 = 100;
const CORRECTING_TOKEN: &str = "CORRECTING";

struct CorpRow {
    row_id: u64,
    ref_norm: String,
    ref_was_blank: bool,
    fd_cents: i64,
    fc_cents: i64,
    journal: Option<String>,
}

fn amount_cents_of(cell: Option<&CellValue>) -> i64 {
    match cell {
        Some(CellValue::Number(d)) => {
            use rust_decimal::prelude::ToPrimitive;
            (*d * Decimal::from(100)).round().to_i64().unwrap_or(0)
        }
        Some(CellValue::Text(s)) => parse_amount_text(s.trim()).unwrap_or(0),
        _ => 0,
    }
}

fn normalize_rows(raw: &[RawRow], columns: &CorporateColumns) -> Vec<CorpRow> {
    raw.iter()
        .map(|r| {
            let ref_text = r.get(&columns.reference).and_then(CellValue::as_text);
            let (ref_norm, ref_was_blank) = normalize_reference(ref_text, r.row_id);
            let fd_cents = amount_cents_of(r.get(&columns.foreign_debit));
            let fc_cents = amount_cents_of(r.get(&columns.foreign_credit));
            let journal = columns
                .journal_number
                .as_deref()
                .and_then(|col| r.get(col))
                .and_then(CellValue::as_text)
                .map(str::to_string);
            CorpRow { row_id: r.row_id, ref_norm, ref_was_blank, fd_cents, fc_cents, journal }
        })
        .collect()
}

fn variance_pct(fd_cents: i64, fc_cents: i64) -> Decimal {
    let denom = fd_cents.max(fc_cents) as f64;
    if denom <= 0.0 {
        return Decimal::ZERO;
    }
    let pct = (fd_cents - fc_cents).unsigned_abs() as f64 / denom * 100.0;
    Decimal::from_f64(pct).unwrap_or(Decimal::ZERO).round_dp(2)
}

pub fn classify_corporate(raw: &[RawRow], columns: &CorporateColumns, settings: &CorporateSettings) -> CorporateResult {
    let rows = normalize_rows(raw, columns);

    let mut journal_index: HashMap<&str, usize> = HashMap::new();
    for row in &rows {
        if let Some(j) = row.journal.as_deref() {
            *journal_index.entry(j).or_insert(0) += 1;
        }
    }

    let mut batch_1 = Vec::new();
    let mut batch_2 = Vec::new();
    let mut batch_3 = Vec::new();
    let mut batch_4 = Vec::new();
    let mut batch_5 = Vec::new();
    let mut batch_6 = Vec::new();

    for row in &rows {
        if row.ref_was_blank {
            batch_6.push(BatchRecord { row_id: row.row_id, batch: 6, variance_pct: None });
            continue;
        }

        let is_correcting = row.ref_norm.contains(CORRECTING_TOKEN);
        let has_journal_partner = row.journal.as_deref().map(|j| journal_index.get(j).copied().unwrap_or(0) >= 2).unwrap_or(false);
        if is_correcting && has_journal_partner {
            batch_1.push(BatchRecord { row_id: row.row_id, batch: 1, variance_pct: None });
            continue;
        }

        let diff = row.fd_cents - row.fc_cents;
        let tolerance = settings.tolerance_cents.max(0);

        if diff.abs() < tolerance {
            batch_2.push(BatchRecord { row_id: row.row_id, batch: 2, variance_pct: None });
        } else if diff >= WHOLE_UNIT_CENTS {
            let pct = variance_pct(row.fd_cents, row.fc_cents);
            if pct <= Decimal::from_f64(settings.percent_threshold).unwrap_or(Decimal::MAX) {
                batch_3.push(BatchRecord { row_id: row.row_id, batch: 3, variance_pct: Some(pct) });
            } else {
                batch_6.push(BatchRecord { row_id: row.row_id, batch: 6, variance_pct: Some(pct) });
            }
        } else if diff <= -WHOLE_UNIT_CENTS {
            let pct = variance_pct(row.fd_cents, row.fc_cents);
            if pct <= Decimal::from_f64(settings.percent_threshold).unwrap_or(Decimal::MAX) {
                batch_4.push(BatchRecord { row_id: row.row_id, batch: 4, variance_pct: Some(pct) });
            } else {
                batch_6.push(BatchRecord { row_id: row.row_id, batch: 6, variance_pct: Some(pct) });
            }
        } else {
            let pct = variance_pct(row.fd_cents, row.fc_cents);
            batch_5.push(BatchRecord { row_id: row.row_id, batch: 5, variance_pct: Some(pct) });
        }
    }

    let out_row_ids: HashSet<u64> = batch_1
        .iter()
        .chain(&batch_2)
        .chain(&batch_3)
        .chain(&batch_4)
        .chain(&batch_5)
        .chain(&batch_6)
        .map(|b| b.row_id)
        .collect();
    let row_count_delta = rows.len() as i64 - out_row_ids.len() as i64;

    let row_by_id: HashMap<u64, &CorpRow> = rows.iter().map(|r| (r.row_id, r)).collect();

    let in_fd_sum: i64 = rows.iter().map(|r| r.fd_cents).sum();
    let in_fc_sum: i64 = rows.iter().map(|r| r.fc_cents).sum();
    let out_fd_sum: i64 = out_row_ids.iter().filter_map(|id| row_by_id.get(id)).map(|r| r.fd_cents).sum();
    let out_fc_sum: i64 = out_row_ids.iter().filter_map(|id| row_by_id.get(id)).map(|r| r.fc_cents).sum();

    let integrity_report = CorporateIntegrityReport {
        row_count_delta,
        debit_sum_delta_cents: in_fd_sum - out_fd_sum,
        credit_sum_delta_cents: in_fc_sum - out_fc_sum,
        ok: row_count_delta == 0 && in_fd_sum == out_fd_sum && in_fc_sum == out_fc_sum,
    };

    CorporateResult { batch_1, batch_2, batch_3, batch_4, batch_5, batch_6, integrity_report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn columns() -> CorporateColumns {
        CorporateColumns { reference: "ref".into(), foreign_debit: "fd".into(), foreign_credit: "fc".into(), journal_number: None }
    }

    fn row(id: u64, ref_: &str, fd: &str, fc: &str) -> RawRow {
        let mut fields = Map::new();
        fields.insert("ref".to_string(), CellValue::Text(ref_.to_string()));
        fields.insert("fd".to_string(), CellValue::Text(fd.to_string()));
        fields.insert("fc".to_string(), CellValue::Text(fc.to_string()));
        RawRow { row_id: id, fields }
    }

    #[test]
    fn scenario_5_corporate_batches() {
        let raw = vec![
            row(1, "R1", "100", "100"),
            row(2, "R1", "105", "100"),
            row(3, "R1", "100", "105"),
            row(4, "R1", "100.50", "100"),
            row(5, "", "50", "0"),
            row(6, "R2", "10", "10"),
        ];
        let settings = CorporateSettings { percent_threshold: 7.0, tolerance_cents: 1 };
        let result = classify_corporate(&raw, &columns(), &settings);

        let batch2_ids: Vec<u64> = result.batch_2.iter().map(|b| b.row_id).collect();
        assert_eq!(batch2_ids, vec![1, 6]);

        assert_eq!(result.batch_3.len(), 1);
        assert_eq!(result.batch_3[0].row_id, 2);
        assert_eq!(result.batch_3[0].variance_pct, Some(Decimal::new(476, 2)));

        assert_eq!(result.batch_4.len(), 1);
        assert_eq!(result.batch_4[0].row_id, 3);

        assert_eq!(result.batch_5.len(), 1);
        assert_eq!(result.batch_5[0].row_id, 4);

        assert_eq!(result.batch_6.len(), 1);
        assert_eq!(result.batch_6[0].row_id, 5);

        assert!(result.integrity_report.ok);
    }

    #[test]
    fn blank_references_never_group_and_land_in_batch_6() {
        let raw = vec![row(1, "", "75", "0"), row(2, "", "75", "0")];
        let settings = CorporateSettings::default();
        let result = classify_corporate(&raw, &columns(), &settings);
        assert_eq!(result.batch_6.len(), 2);
        assert!(result.batch_1.is_empty() && result.batch_2.is_empty());
    }
}
