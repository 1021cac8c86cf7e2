//! FNB phase 1a: perfect match (exact date, exact reference, exact amount).

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{date_window, intersect, sort_by_row_id, MatchState};
use crate::config::ReconcileSettings;
use crate::index::RowIndex;
use crate::model::{MatchRecord, MatchType, NormalizedRow};

pub fn run(
    statement: &[NormalizedRow],
    ledger_by_id: &HashMap<u64, &NormalizedRow>,
    ledger_index: &RowIndex,
    settings: &ReconcileSettings,
    state: &mut MatchState,
) -> Vec<MatchRecord> {
    let mut matches = Vec::new();

    for stmt in statement {
        if state.is_statement_matched(stmt.row_id) {
            continue;
        }

        let mut candidates: Option<HashSet<u64>> = None;

        if settings.match_references {
            match ledger_index.by_exact_ref.get(&stmt.ref_norm) {
                Some(ids) => intersect(&mut candidates, ids.iter().copied().collect()),
                None => candidates = Some(HashSet::new()),
            }
        }

        if settings.match_dates {
            match stmt.date_norm {
                Some(date) => {
                    let mut ids = HashSet::new();
                    for d in date_window(date, settings.date_tolerance_days) {
                        if let Some(found) = ledger_index.by_date.get(&d) {
                            ids.extend(found.iter().copied());
                        }
                    }
                    intersect(&mut candidates, ids);
                }
                None => candidates = Some(HashSet::new()),
            }
        }

        if settings.match_amounts {
            match stmt.amount_cents {
                Some(cents) => match ledger_index.by_amount_exact.get(&cents) {
                    Some(ids) => intersect(&mut candidates, ids.iter().copied().collect()),
                    None => candidates = Some(HashSet::new()),
                },
                None => candidates = Some(HashSet::new()),
            }
        }

        let Some(candidates) = candidates else { continue };

        for ledger_id in sort_by_row_id(candidates) {
            if state.is_ledger_matched(ledger_id) {
                continue;
            }
            let Some(_ledger_row) = ledger_by_id.get(&ledger_id) else { continue };

            let mut ledger_ids = BTreeSet::new();
            ledger_ids.insert(ledger_id);
            let mut statement_ids = BTreeSet::new();
            statement_ids.insert(stmt.row_id);

            state.mark([ledger_id], [stmt.row_id]);

            matches.push(MatchRecord {
                ledger_row_ids: ledger_ids,
                statement_row_ids: statement_ids,
                match_type: MatchType::Perfect,
                similarity: 100,
                amount_variance_cents: 0,
            });
            break;
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileColumns;
    use crate::index::IndexOptions;
    use crate::model::{CellValue, RawRow};
    use crate::normalize::{normalize_ledger_rows, normalize_statement_rows};
    use std::collections::HashMap as Map;

    fn columns() -> ReconcileColumns {
        ReconcileColumns {
            ledger: crate::config::ColumnMapping {
                date: Some("date".into()),
                reference: Some("ref".into()),
                debit: Some("debit".into()),
                credit: Some("credit".into()),
                amount: None,
                description: None,
            },
            statement: crate::config::ColumnMapping {
                date: Some("date".into()),
                reference: Some("ref".into()),
                debit: None,
                credit: None,
                amount: Some("amount".into()),
                description: None,
            },
        }
    }

    fn raw_row(id: u64, date: &str, ref_: &str, debit: &str, credit: &str) -> RawRow {
        let mut fields = Map::new();
        fields.insert("date".to_string(), CellValue::Text(date.to_string()));
        fields.insert("ref".to_string(), CellValue::Text(ref_.to_string()));
        fields.insert("debit".to_string(), CellValue::Text(debit.to_string()));
        fields.insert("credit".to_string(), CellValue::Text(credit.to_string()));
        RawRow { row_id: id, fields }
    }

    fn raw_stmt_row(id: u64, date: &str, ref_: &str, amount: &str) -> RawRow {
        let mut fields = Map::new();
        fields.insert("date".to_string(), CellValue::Text(date.to_string()));
        fields.insert("ref".to_string(), CellValue::Text(ref_.to_string()));
        fields.insert("amount".to_string(), CellValue::Text(amount.to_string()));
        RawRow { row_id: id, fields }
    }

    #[test]
    fn scenario_1_perfect_match_over_formatted_amounts() {
        let cols = columns();
        let ledger_raw = vec![raw_row(1, "2025-01-05", "INV-001", "1234.56", "0")];
        let stmt_raw = vec![raw_stmt_row(2, "2025-01-05", "INV-001", "R 1,234.56")];

        let ledger = normalize_ledger_rows(&ledger_raw, &cols.ledger).rows;
        let stmt = normalize_statement_rows(&stmt_raw, &cols.statement).rows;

        assert_eq!(stmt[0].amount_cents, Some(123_456));

        let settings = ReconcileSettings::default();
        let ledger_by_id: Map<u64, &NormalizedRow> = ledger.iter().map(|r| (r.row_id, r)).collect();
        let opts = IndexOptions { match_references: true, match_dates: true, match_amounts: true };
        let index = RowIndex::build(&ledger, &opts, |r| r.comparable_amounts(settings.amount_mode));

        let mut state = MatchState::default();
        let matches = run(&stmt, &ledger_by_id, &index, &settings, &mut state);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, MatchType::Perfect);
        assert_eq!(matches[0].similarity, 100);
        assert!(state.is_ledger_matched(1));
        assert!(state.is_statement_matched(2));
    }

    #[test]
    fn blank_reference_never_perfect_matches() {
        let cols = columns();
        let ledger_raw = vec![raw_row(1, "2025-03-01", "", "0", "25000.00")];
        let stmt_raw = vec![raw_stmt_row(2, "2025-03-01", "SWIFT TRN XYZ", "25000.00")];

        let ledger = normalize_ledger_rows(&ledger_raw, &cols.ledger).rows;
        let stmt = normalize_statement_rows(&stmt_raw, &cols.statement).rows;

        let settings = ReconcileSettings::default();
        let ledger_by_id: Map<u64, &NormalizedRow> = ledger.iter().map(|r| (r.row_id, r)).collect();
        let opts = IndexOptions { match_references: true, match_dates: true, match_amounts: true };
        let index = RowIndex::build(&ledger, &opts, |r| r.comparable_amounts(settings.amount_mode));

        let mut state = MatchState::default();
        let matches = run(&stmt, &ledger_by_id, &index, &settings, &mut state);
        assert!(matches.is_empty());
    }
}
