//! FNB phase 3: split-transaction detection. Two sub-phases run in fixed
//! order — many-ledger-rows-to-one-statement-row, then the symmetric
//! one-ledger-to-many-statement — each consuming rows from the shared pool
//! before the next sub-phase starts, so neither double-consumes a row.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{date_window, MatchState};
use crate::config::ReconcileSettings;
use crate::index::RowIndex;
use crate::model::{MatchRecord, MatchType, NormalizedRow};
use crate::similarity::SimilarityCache;
use crate::subset_sum;

/// Candidate pool cap per target row, per §4.7.
const MAX_SPLIT_CANDIDATES: usize = 20;

pub struct SplitPhaseOutput {
    pub matches: Vec<MatchRecord>,
    pub overrun_notes: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    ledger: &[NormalizedRow],
    statement: &[NormalizedRow],
    ledger_by_id: &HashMap<u64, &NormalizedRow>,
    statement_by_id: &HashMap<u64, &NormalizedRow>,
    ledger_index: &RowIndex,
    statement_index: &RowIndex,
    cache: &SimilarityCache,
    settings: &ReconcileSettings,
    state: &mut MatchState,
) -> SplitPhaseOutput {
    let mut matches = Vec::new();
    let mut overrun_notes = Vec::new();

    if !settings.split_enabled {
        return SplitPhaseOutput { matches, overrun_notes };
    }

    let total_rows = ledger.len() + statement.len();
    let matched_rows = (ledger.len() - state.unmatched_ledger(ledger).len()) + (statement.len() - state.unmatched_statement(statement).len());
    let match_rate = if total_rows == 0 { 1.0 } else { matched_rows as f64 / total_rows as f64 };

    if match_rate > settings.split_skip_match_rate {
        overrun_notes.push(format!("split phase skipped: match rate {:.1}% exceeds skip threshold", match_rate * 100.0));
        return SplitPhaseOutput { matches, overrun_notes };
    }

    let unmatched_ledger_count = state.unmatched_ledger(ledger).len();
    let unmatched_statement_count = state.unmatched_statement(statement).len();
    if unmatched_ledger_count > settings.split_skip_unmatched_count || unmatched_statement_count > settings.split_skip_unmatched_count {
        overrun_notes.push("split phase skipped: unmatched pool exceeds configured cap".to_string());
        return SplitPhaseOutput { matches, overrun_notes };
    }

    // Sub-phase A: many ledger rows -> one statement row.
    let mut sub_a_count = 0usize;
    for stmt in statement {
        if state.is_statement_matched(stmt.row_id) {
            continue;
        }
        if sub_a_count >= settings.split_max_records_per_subphase {
            overrun_notes.push("split sub-phase A stopped: record cap reached".to_string());
            break;
        }
        let Some(target_cents) = stmt.amount_cents else { continue };
        if target_cents == 0 {
            continue;
        }

        let candidate_ids = gather_candidates(&stmt.ref_norm, stmt.ref_was_blank, stmt.date_norm, ledger_index, ledger_by_id, |id| state.is_ledger_matched(id), cache, settings);

        let items: Vec<(u64, i64)> = candidate_ids
            .iter()
            .filter_map(|&id| {
                let row = ledger_by_id.get(&id)?;
                matching_sign_amount(row, target_cents, settings.amount_mode).map(|amt| (id, amt))
            })
            .collect();

        if let Some((row_ids, sum)) = subset_sum::find_subset(&items, target_cents.abs(), settings.split_tolerance, settings.split_max_components) {
            let mut ledger_ids = BTreeSet::new();
            ledger_ids.extend(row_ids.iter().copied());
            let mut statement_ids = BTreeSet::new();
            statement_ids.insert(stmt.row_id);

            state.mark(row_ids, [stmt.row_id]);

            matches.push(MatchRecord {
                ledger_row_ids: ledger_ids,
                statement_row_ids: statement_ids,
                match_type: MatchType::SplitManyLedgerOneStatement,
                similarity: 100,
                amount_variance_cents: sum - target_cents.abs(),
            });
            sub_a_count += 1;
        }
    }

    // Sub-phase B: one ledger row -> many statement rows.
    let mut sub_b_count = 0usize;
    for ledger_row in ledger {
        if state.is_ledger_matched(ledger_row.row_id) {
            continue;
        }
        if sub_b_count >= settings.split_max_records_per_subphase {
            overrun_notes.push("split sub-phase B stopped: record cap reached".to_string());
            break;
        }

        let targets = ledger_row.comparable_amounts(settings.amount_mode);
        let Some(target_cents) = targets.into_iter().find(|&v| v != 0) else { continue };

        let candidate_ids = gather_candidates(&ledger_row.ref_norm, ledger_row.ref_was_blank, ledger_row.date_norm, statement_index, statement_by_id, |id| state.is_statement_matched(id), cache, settings);

        let items: Vec<(u64, i64)> = candidate_ids
            .iter()
            .filter_map(|&id| {
                let row = statement_by_id.get(&id)?;
                let amt = row.amount_cents?;
                if amt.signum() == target_cents.signum() {
                    Some((id, amt.abs()))
                } else {
                    None
                }
            })
            .collect();

        if let Some((row_ids, sum)) = subset_sum::find_subset(&items, target_cents.abs(), settings.split_tolerance, settings.split_max_components) {
            let mut statement_ids = BTreeSet::new();
            statement_ids.extend(row_ids.iter().copied());
            let mut ledger_ids = BTreeSet::new();
            ledger_ids.insert(ledger_row.row_id);

            state.mark([ledger_row.row_id], row_ids);

            matches.push(MatchRecord {
                ledger_row_ids: ledger_ids,
                statement_row_ids: statement_ids,
                match_type: MatchType::SplitOneLedgerManyStatement,
                similarity: 100,
                amount_variance_cents: target_cents.abs() - sum,
            });
            sub_b_count += 1;
        }
    }

    SplitPhaseOutput { matches, overrun_notes }
}

/// Picks the ledger comparable amount whose sign matches `target_sign`, so a
/// ledger row is only offered as a subset-sum item on the side (debit vs
/// credit) consistent with the statement row it might help cover.
fn matching_sign_amount(row: &NormalizedRow, target_cents: i64, mode: crate::config::AmountMode) -> Option<i64> {
    row.comparable_amounts(mode).into_iter().find(|amt| amt.signum() == target_cents.signum()).map(i64::abs)
}

#[allow(clippy::too_many_arguments)]
fn gather_candidates(
    target_ref: &str,
    target_ref_blank: bool,
    target_date: Option<chrono::NaiveDate>,
    index: &RowIndex,
    by_id: &HashMap<u64, &NormalizedRow>,
    is_matched: impl Fn(u64) -> bool,
    cache: &SimilarityCache,
    settings: &ReconcileSettings,
) -> Vec<u64> {
    let mut pool: HashSet<u64> = HashSet::new();

    if settings.match_references && !target_ref_blank {
        for word in target_ref.split_whitespace() {
            if word.len() >= 3 {
                if let Some(ids) = index.by_ref_word.get(word) {
                    pool.extend(ids.iter().copied());
                }
            }
        }
        if let Some(ids) = index.by_exact_ref.get(target_ref) {
            pool.extend(ids.iter().copied());
        }
    } else {
        pool.extend(by_id.keys().copied());
    }

    if settings.match_dates {
        if let Some(date) = target_date {
            let allowed: HashSet<chrono::NaiveDate> = date_window(date, settings.date_tolerance_days).into_iter().collect();
            pool.retain(|id| by_id.get(id).and_then(|r| r.date_norm).map(|d| allowed.contains(&d)).unwrap_or(false));
        } else {
            pool.clear();
        }
    }

    pool.retain(|&id| !is_matched(id));

    let mut scored: Vec<(u8, u64)> = pool
        .into_iter()
        .filter_map(|id| {
            let row = by_id.get(&id)?;
            if row.ref_was_blank {
                return None;
            }
            let score = if settings.match_references && !target_ref_blank {
                let s = cache.score(target_ref, &row.ref_norm);
                if s < settings.fuzzy_threshold {
                    return None;
                }
                s
            } else {
                0
            };
            Some((score, id))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(MAX_SPLIT_CANDIDATES);
    scored.into_iter().map(|(_, id)| id).collect()
}
