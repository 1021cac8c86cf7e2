//! Result Assembler: packages matches, splits, foreign credits, and the
//! complementary unmatched sets into the output partition, with a final
//! deterministic sort so that a category's ordering follows stable input
//! order rather than whichever phase emitted it.

use crate::model::{Diagnostics, MatchRecord, ReconciliationResult, RunStatus};

fn primary_row_id(record: &MatchRecord) -> u64 {
    record
        .ledger_row_ids
        .iter()
        .chain(record.statement_row_ids.iter())
        .min()
        .copied()
        .unwrap_or(u64::MAX)
}

fn sorted_by_primary_row(mut records: Vec<MatchRecord>) -> Vec<MatchRecord> {
    records.sort_by_key(primary_row_id);
    records
}

#[allow(clippy::too_many_arguments)]
pub fn assemble(
    status: RunStatus,
    matched: Vec<MatchRecord>,
    splits: Vec<MatchRecord>,
    foreign_credits: Vec<MatchRecord>,
    unmatched_ledger: Vec<u64>,
    unmatched_statement: Vec<u64>,
    diagnostics: Diagnostics,
) -> ReconciliationResult {
    ReconciliationResult {
        status,
        matched: sorted_by_primary_row(matched),
        splits: sorted_by_primary_row(splits),
        foreign_credits: sorted_by_primary_row(foreign_credits),
        unmatched_ledger,
        unmatched_statement,
        diagnostics,
    }
}
