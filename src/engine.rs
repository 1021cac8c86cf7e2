//! Top-level orchestration: wires the normalizer, indexer, similarity
//! cache, and the four FNB phases into the single public `reconcile` call.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::assemble::assemble;
use crate::config::{ReconcileColumns, ReconcileSettings};
use crate::error::ReconcileError;
use crate::index::{IndexOptions, RowIndex};
use crate::model::{Diagnostics, IntegrityCheck, MatchRecord, RawRow, ReconciliationResult, RunStatus};
use crate::normalize::{normalize_ledger_rows, normalize_statement_rows};
use crate::phases::{foreign_credit, fuzzy, perfect, split, MatchState};
use crate::similarity::SimilarityCache;

const PHASE_NAMES: [&str; 4] = ["perfect", "fuzzy", "foreign_credit", "split"];

/// Runs the full FNB matching pipeline once.
///
/// `progress_cb`, if supplied, is invoked once per completed phase with
/// `(phase_name, phases_completed, phases_total)`. `cancel_flag`, if
/// supplied, is polled at each phase boundary; a `true` result aborts the
/// run and returns a partial, `status = Cancelled` result containing only
/// matches already committed.
pub fn reconcile<F, C>(
    ledger_rows: &[RawRow],
    statement_rows: &[RawRow],
    columns: &ReconcileColumns,
    settings: &ReconcileSettings,
    mut progress_cb: Option<F>,
    cancel_flag: Option<C>,
) -> Result<ReconciliationResult, ReconcileError>
where
    F: FnMut(&str, usize, usize),
    C: Fn() -> bool,
{
    settings.validate()?;

    if ledger_rows.is_empty() {
        return Err(ReconcileError::EmptyInput { side: "ledger" });
    }
    if statement_rows.is_empty() {
        return Err(ReconcileError::EmptyInput { side: "statement" });
    }
    validate_columns(columns, settings)?;

    let ledger_norm_out = normalize_ledger_rows(ledger_rows, &columns.ledger);
    let statement_norm_out = normalize_statement_rows(statement_rows, &columns.statement);
    let ledger_norm = ledger_norm_out.rows;
    let statement_norm = statement_norm_out.rows;

    let opts = IndexOptions { match_references: settings.match_references, match_dates: settings.match_dates, match_amounts: settings.match_amounts };
    let ledger_index = RowIndex::build(&ledger_norm, &opts, |r| r.comparable_amounts(settings.amount_mode));
    let statement_index = RowIndex::build(&statement_norm, &opts, |r| r.amount_cents.into_iter().collect());

    let ledger_by_id: HashMap<u64, &_> = ledger_norm.iter().map(|r| (r.row_id, r)).collect();
    let statement_by_id: HashMap<u64, &_> = statement_norm.iter().map(|r| (r.row_id, r)).collect();

    let mut state = MatchState::default();
    let cache = SimilarityCache::new();
    let mut phase_timings_ms = HashMap::new();
    let mut overrun_notes = Vec::new();

    let mut matched: Vec<MatchRecord> = Vec::new();
    let mut foreign_credits: Vec<MatchRecord> = Vec::new();
    let mut splits: Vec<MatchRecord> = Vec::new();

    let cancelled = |cancel_flag: &Option<C>| cancel_flag.as_ref().map(|f| f()).unwrap_or(false);

    macro_rules! report_progress {
        ($phase_index:expr) => {
            if let Some(cb) = progress_cb.as_mut() {
                cb(PHASE_NAMES[$phase_index], $phase_index + 1, PHASE_NAMES.len());
            }
        };
    }

    macro_rules! return_if_cancelled {
        () => {
            if cancelled(&cancel_flag) {
                return Ok(build_result(
                    RunStatus::Cancelled,
                    matched,
                    splits,
                    foreign_credits,
                    &ledger_norm,
                    &statement_norm,
                    &mut state,
                    &cache,
                    &ledger_norm_out.warnings,
                    &statement_norm_out.warnings,
                    phase_timings_ms,
                    overrun_notes,
                ));
            }
        };
    }

    return_if_cancelled!();

    let t0 = Instant::now();
    matched.extend(perfect::run(&statement_norm, &ledger_by_id, &ledger_index, settings, &mut state));
    phase_timings_ms.insert(PHASE_NAMES[0].to_string(), t0.elapsed().as_millis() as u64);
    report_progress!(0);
    return_if_cancelled!();

    let t1 = Instant::now();
    matched.extend(fuzzy::run(&statement_norm, &ledger_by_id, &ledger_index, &cache, settings, &mut state));
    phase_timings_ms.insert(PHASE_NAMES[1].to_string(), t1.elapsed().as_millis() as u64);
    report_progress!(1);
    return_if_cancelled!();

    let t2 = Instant::now();
    foreign_credits.extend(foreign_credit::run(&statement_norm, &ledger_by_id, &ledger_index, settings, &mut state));
    phase_timings_ms.insert(PHASE_NAMES[2].to_string(), t2.elapsed().as_millis() as u64);
    report_progress!(2);
    return_if_cancelled!();

    let t3 = Instant::now();
    let split_output = split::run(&ledger_norm, &statement_norm, &ledger_by_id, &statement_by_id, &ledger_index, &statement_index, &cache, settings, &mut state);
    splits.extend(split_output.matches);
    overrun_notes.extend(split_output.overrun_notes);
    phase_timings_ms.insert(PHASE_NAMES[3].to_string(), t3.elapsed().as_millis() as u64);
    report_progress!(3);

    Ok(build_result(
        RunStatus::Completed,
        matched,
        splits,
        foreign_credits,
        &ledger_norm,
        &statement_norm,
        &mut state,
        &cache,
        &ledger_norm_out.warnings,
        &statement_norm_out.warnings,
        phase_timings_ms,
        overrun_notes,
    ))
}

fn validate_columns(columns: &ReconcileColumns, settings: &ReconcileSettings) -> Result<(), ReconcileError> {
    if settings.match_references {
        if columns.ledger.reference.is_none() {
            return Err(ReconcileError::MissingColumn { side: "ledger", field: "reference" });
        }
        if columns.statement.reference.is_none() {
            return Err(ReconcileError::MissingColumn { side: "statement", field: "reference" });
        }
    }
    if settings.match_dates {
        if columns.ledger.date.is_none() {
            return Err(ReconcileError::MissingColumn { side: "ledger", field: "date" });
        }
        if columns.statement.date.is_none() {
            return Err(ReconcileError::MissingColumn { side: "statement", field: "date" });
        }
    }
    if settings.match_amounts {
        if columns.ledger.debit.is_none() && columns.ledger.credit.is_none() {
            return Err(ReconcileError::MissingColumn { side: "ledger", field: "debit/credit" });
        }
        if columns.statement.amount.is_none() {
            return Err(ReconcileError::MissingColumn { side: "statement", field: "amount" });
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    status: RunStatus,
    matched: Vec<MatchRecord>,
    splits: Vec<MatchRecord>,
    foreign_credits: Vec<MatchRecord>,
    ledger_norm: &[crate::model::NormalizedRow],
    statement_norm: &[crate::model::NormalizedRow],
    state: &mut MatchState,
    cache: &SimilarityCache,
    ledger_warnings: &crate::model::ParseWarnings,
    statement_warnings: &crate::model::ParseWarnings,
    phase_timings_ms: HashMap<String, u64>,
    overrun_notes: Vec<String>,
) -> ReconciliationResult {
    let unmatched_ledger = state.unmatched_ledger(ledger_norm);
    let unmatched_statement = state.unmatched_statement(statement_norm);

    let integrity_check = compute_integrity_check(ledger_norm, statement_norm, &matched, &splits, &foreign_credits, &unmatched_ledger, &unmatched_statement);

    let diagnostics = Diagnostics {
        phase_timings_ms,
        cache_stats: cache.stats(),
        parse_warnings_ledger: ledger_warnings.clone(),
        parse_warnings_statement: statement_warnings.clone(),
        integrity_check,
        overrun_notes,
    };

    cache.clear();

    assemble(status, matched, splits, foreign_credits, unmatched_ledger, unmatched_statement, diagnostics)
}

fn compute_integrity_check(
    ledger_norm: &[crate::model::NormalizedRow],
    statement_norm: &[crate::model::NormalizedRow],
    matched: &[MatchRecord],
    splits: &[MatchRecord],
    foreign_credits: &[MatchRecord],
    unmatched_ledger: &[u64],
    unmatched_statement: &[u64],
) -> IntegrityCheck {
    let mut ledger_out_ids: HashSet<u64> = unmatched_ledger.iter().copied().collect();
    let mut statement_out_ids: HashSet<u64> = unmatched_statement.iter().copied().collect();

    for record in matched.iter().chain(splits.iter()).chain(foreign_credits.iter()) {
        ledger_out_ids.extend(record.ledger_row_ids.iter().copied());
        statement_out_ids.extend(record.statement_row_ids.iter().copied());
    }

    let row_count_delta = (ledger_norm.len() as i64 - ledger_out_ids.len() as i64) + (statement_norm.len() as i64 - statement_out_ids.len() as i64);

    let ledger_by_id: HashMap<u64, &crate::model::NormalizedRow> = ledger_norm.iter().map(|r| (r.row_id, r)).collect();
    let statement_by_id: HashMap<u64, &crate::model::NormalizedRow> = statement_norm.iter().map(|r| (r.row_id, r)).collect();

    let net_ledger = |r: &crate::model::NormalizedRow| r.debit_cents.unwrap_or(0) - r.credit_cents.unwrap_or(0);

    let input_ledger_sum: i64 = ledger_norm.iter().map(net_ledger).sum();
    let output_ledger_sum: i64 = ledger_out_ids.iter().filter_map(|id| ledger_by_id.get(id)).map(|r| net_ledger(r)).sum();

    let input_statement_sum: i64 = statement_norm.iter().map(|r| r.amount_cents.unwrap_or(0)).sum();
    let output_statement_sum: i64 = statement_out_ids.iter().filter_map(|id| statement_by_id.get(id)).map(|r| r.amount_cents.unwrap_or(0)).sum();

    let ledger_sum_delta_cents = input_ledger_sum - output_ledger_sum;
    let statement_sum_delta_cents = input_statement_sum - output_statement_sum;

    IntegrityCheck { row_count_delta, ledger_sum_delta_cents, statement_sum_delta_cents, ok: row_count_delta == 0 && ledger_sum_delta_cents == 0 && statement_sum_delta_cents == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMapping;
    use crate::model::CellValue;

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

    fn ledger_row(id: u64, date: &str, ref_: &str, debit: &str, credit: &str) -> RawRow {
        let mut fields = HashMap::new();
        fields.insert("date".to_string(), CellValue::Text(date.to_string()));
        fields.insert("ref".to_string(), CellValue::Text(ref_.to_string()));
        fields.insert("debit".to_string(), CellValue::Text(debit.to_string()));
        fields.insert("credit".to_string(), CellValue::Text(credit.to_string()));
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
    fn reconcile_scenario_1_end_to_end() {
        let cols = columns();
        let ledger = vec![ledger_row(1, "2025-01-05", "INV-001", "1234.56", "0")];
        let statement = vec![stmt_row(2, "2025-01-05", "INV-001", "R 1,234.56")];
        let settings = ReconcileSettings { amount_mode: crate::config::AmountMode::Debits, ..ReconcileSettings::default() };

        let result = reconcile::<fn(&str, usize, usize), fn() -> bool>(&ledger, &statement, &cols, &settings, None, None).unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.matched.len(), 1);
        assert!(result.unmatched_ledger.is_empty());
        assert!(result.unmatched_statement.is_empty());
        assert!(result.diagnostics.integrity_check.ok);
    }

    #[test]
    fn reconcile_rejects_empty_input() {
        let cols = columns();
        let settings = ReconcileSettings::default();
        let err = reconcile::<fn(&str, usize, usize), fn() -> bool>(&[], &[stmt_row(1, "2025-01-01", "X", "1")], &cols, &settings, None, None).unwrap_err();
        assert!(matches!(err, ReconcileError::EmptyInput { side: "ledger" }));
    }

    #[test]
    fn reconcile_is_deterministic_across_runs() {
        let cols = columns();
        let ledger = vec![ledger_row(1, "2025-02-10", "ACME PAYMENT", "500.00", "0")];
        let statement = vec![stmt_row(2, "2025-02-10", "ACMI PAYMENT", "500.00")];
        let settings = ReconcileSettings::default();

        let first = reconcile::<fn(&str, usize, usize), fn() -> bool>(&ledger, &statement, &cols, &settings, None, None).unwrap();
        let second = reconcile::<fn(&str, usize, usize), fn() -> bool>(&ledger, &statement, &cols, &settings, None, None).unwrap();

        assert_eq!(first.matched.len(), second.matched.len());
        assert_eq!(first.matched[0].similarity, second.matched[0].similarity);
    }

    #[test]
    fn reconcile_cancels_before_any_phase_runs() {
        let cols = columns();
        let ledger = vec![ledger_row(1, "2025-01-05", "INV-001", "1234.56", "0")];
        let statement = vec![stmt_row(2, "2025-01-05", "INV-001", "1234.56")];
        let settings = ReconcileSettings::default();

        let result = reconcile::<fn(&str, usize, usize), _>(&ledger, &statement, &cols, &settings, None, Some(|| true)).unwrap();
        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(result.matched.is_empty());
    }
}
