//! FNB phase 2: foreign-credit match. Large cross-border credits frequently
//! arrive with degraded or missing reference strings, so this phase matches
//! on amount (and optionally date) alone, ignoring reference entirely.

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
    let threshold = settings.foreign_credit_threshold_cents;

    for stmt in statement {
        if state.is_statement_matched(stmt.row_id) {
            continue;
        }
        let Some(stmt_cents) = stmt.amount_cents else { continue };
        if stmt_cents.abs() <= threshold {
            continue;
        }

        let Some(ids) = ledger_index.by_amount_exact.get(&stmt_cents) else { continue };
        let mut candidates: Option<HashSet<u64>> = Some(ids.iter().copied().collect());

        if settings.match_dates {
            match stmt.date_norm {
                Some(date) => {
                    let mut date_ids = HashSet::new();
                    for d in date_window(date, settings.date_tolerance_days) {
                        if let Some(found) = ledger_index.by_date.get(&d) {
                            date_ids.extend(found.iter().copied());
                        }
                    }
                    intersect(&mut candidates, date_ids);
                }
                None => candidates = Some(HashSet::new()),
            }
        }

        for ledger_id in sort_by_row_id(candidates.unwrap_or_default()) {
            if state.is_ledger_matched(ledger_id) {
                continue;
            }
            if !ledger_by_id.contains_key(&ledger_id) {
                continue;
            }

            let mut ledger_ids = BTreeSet::new();
            ledger_ids.insert(ledger_id);
            let mut statement_ids = BTreeSet::new();
            statement_ids.insert(stmt.row_id);

            state.mark([ledger_id], [stmt.row_id]);

            matches.push(MatchRecord {
                ledger_row_ids: ledger_ids,
                statement_row_ids: statement_ids,
                match_type: MatchType::ForeignCredit,
                similarity: 100,
                amount_variance_cents: 0,
            });
            break;
        }
    }

    matches
}
