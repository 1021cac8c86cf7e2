//! FNB phase 1b: fuzzy match (date ∧ fuzzy(reference) ≥ θ ∧ exact amount),
//! with a fast reference-only path when date and amount filtering are off.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{amount_variance_cents, date_window, intersect, sort_by_row_id, MatchState, FUZZY_CANDIDATE_CAP};
use crate::config::ReconcileSettings;
use crate::index::RowIndex;
use crate::model::{MatchRecord, MatchType, NormalizedRow};
use crate::similarity::SimilarityCache;

pub fn run(
    statement: &[NormalizedRow],
    ledger_by_id: &HashMap<u64, &NormalizedRow>,
    ledger_index: &RowIndex,
    cache: &SimilarityCache,
    settings: &ReconcileSettings,
    state: &mut MatchState,
) -> Vec<MatchRecord> {
    let mut matches = Vec::new();

    if !settings.fuzzy_enabled || !settings.match_references {
        return matches;
    }

    for stmt in statement {
        if state.is_statement_matched(stmt.row_id) || stmt.ref_was_blank {
            continue;
        }

        let candidates = gather_candidates(stmt, ledger_index, settings);
        if candidates.is_empty() {
            continue;
        }

        let mut best: Option<(u8, i64, u64)> = None; // (score, |variance|, row_id)

        for ledger_id in candidates {
            if state.is_ledger_matched(ledger_id) {
                continue;
            }
            let Some(ledger_row) = ledger_by_id.get(&ledger_id) else { continue };
            if ledger_row.ref_was_blank {
                continue;
            }

            let score = cache.score(&stmt.ref_norm, &ledger_row.ref_norm);
            if score < settings.fuzzy_threshold {
                continue;
            }

            let variance = amount_variance_cents(ledger_row, stmt.amount_cents, settings.amount_mode);
            let candidate = (score, variance.abs(), ledger_id);
            // Tie-break: highest score, then smallest amount variance, then
            // stable input order (smallest row_id wins).
            let better = match best {
                None => true,
                Some((best_score, best_var, best_id)) => {
                    score > best_score || (score == best_score && variance.abs() < best_var)
                        || (score == best_score && variance.abs() == best_var && ledger_id < best_id)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        if let Some((score, _, ledger_id)) = best {
            let ledger_row = ledger_by_id[&ledger_id];
            let variance = amount_variance_cents(ledger_row, stmt.amount_cents, settings.amount_mode);

            let mut ledger_ids = BTreeSet::new();
            ledger_ids.insert(ledger_id);
            let mut statement_ids = BTreeSet::new();
            statement_ids.insert(stmt.row_id);

            state.mark([ledger_id], [stmt.row_id]);

            matches.push(MatchRecord {
                ledger_row_ids: ledger_ids,
                statement_row_ids: statement_ids,
                match_type: MatchType::Fuzzy,
                similarity: score,
                amount_variance_cents: variance,
            });
        }
    }

    matches
}

fn gather_candidates(stmt: &NormalizedRow, ledger_index: &RowIndex, settings: &ReconcileSettings) -> Vec<u64> {
    let reference_only = !settings.match_dates && !settings.match_amounts;

    let mut word_ids = HashSet::new();
    for word in stmt.ref_norm.split_whitespace() {
        if word.len() >= 3 {
            if let Some(ids) = ledger_index.by_ref_word.get(word) {
                word_ids.extend(ids.iter().copied());
            }
        }
    }
    if let Some(ids) = ledger_index.by_exact_ref.get(&stmt.ref_norm) {
        word_ids.extend(ids.iter().copied());
    }

    if reference_only {
        let mut sorted = sort_by_row_id(word_ids);
        sorted.truncate(FUZZY_CANDIDATE_CAP);
        return sorted;
    }

    let mut candidates: Option<HashSet<u64>> = Some(word_ids);

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

    let mut sorted = sort_by_row_id(candidates.unwrap_or_default());
    sorted.truncate(FUZZY_CANDIDATE_CAP);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnMapping, ReconcileColumns};
    use crate::index::IndexOptions;
    use crate::model::{CellValue, RawRow};
    use crate::normalize::{normalize_ledger_rows, normalize_statement_rows};
    use std::collections::HashMap;

    fn columns() -> ReconcileColumns {
        ReconcileColumns {
            ledger: ColumnMapping {
                date: Some("date".into()),
                reference: Some("ref".into()),
                debit: Some("debit".into()),
                credit: Some("credit".into()),
                amount: None,
                description: None,
            },
            statement: ColumnMapping {
                date: Some("date".into()),
                reference: Some("ref".into()),
                debit: None,
                credit: None,
                amount: Some("amount".into()),
                description: None,
            },
        }
    }

    fn ledger_row(id: u64, date: &str, ref_: &str, debit: &str) -> RawRow {
        let mut fields = HashMap::new();
        fields.insert("date".to_string(), CellValue::Text(date.to_string()));
        fields.insert("ref".to_string(), CellValue::Text(ref_.to_string()));
        fields.insert("debit".to_string(), CellValue::Text(debit.to_string()));
        fields.insert("credit".to_string(), CellValue::Text("0".to_string()));
        RawRow { row_id: id, fields }
    }

    fn stmt_row(id: u64, date: &str, ref_: &str, amount: &str) -> RawRow {
        let mut fields = HashMap::new();
        fields.insert("date".to_string(), CellValue::Text(date.to_string()));
        fields.insert("ref".to_string(), CellValue::Text(ref_.to_string()));
        fields.insert("amount".to_string(), CellValue::Text(amount.to_string()));
        RawRow { row_id: id, fields }
    }

    #[test]
    fn scenario_2_fuzzy_threshold_boundary() {
        let cols = columns();
        let ledger_raw = vec![ledger_row(1, "2025-02-10", "ACME PAYMENT", "500.00")];
        let stmt_raw = vec![stmt_row(2, "2025-02-10", "ACMI PAYMENT", "500.00")];

        let ledger = normalize_ledger_rows(&ledger_raw, &cols.ledger).rows;
        let stmt = normalize_statement_rows(&stmt_raw, &cols.statement).rows;
        let ledger_by_id: HashMap<u64, &NormalizedRow> = ledger.iter().map(|r| (r.row_id, r)).collect();

        let opts = IndexOptions { match_references: true, match_dates: true, match_amounts: true };
        let mut settings = ReconcileSettings::default();

        // Threshold 85 -> matched.
        settings.fuzzy_threshold = 85;
        let index = RowIndex::build(&ledger, &opts, |r| r.comparable_amounts(settings.amount_mode));
        let cache = SimilarityCache::new();
        let mut state = MatchState::default();
        let matches = run(&stmt, &ledger_by_id, &index, &cache, &settings, &mut state);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, MatchType::Fuzzy);
        assert!(matches[0].similarity >= 85);

        // Threshold 95 -> unmatched.
        settings.fuzzy_threshold = 95;
        let cache2 = SimilarityCache::new();
        let mut state2 = MatchState::default();
        let matches2 = run(&stmt, &ledger_by_id, &index, &cache2, &settings, &mut state2);
        assert!(matches2.is_empty());
    }
}
