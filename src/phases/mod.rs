//! The four sequential FNB matching phases. Each phase only considers rows
//! not yet marked matched by an earlier phase; marking is the last step of
//! emitting a match, so no row is ever left half-committed.

pub mod foreign_credit;
pub mod fuzzy;
pub mod perfect;
pub mod split;

use std::collections::HashSet;

use crate::config::AmountMode;
use crate::model::NormalizedRow;

/// Bounded scan size for the fuzzy phase's candidate evaluation per
/// statement row, guaranteeing linear-in-statement-size behaviour.
pub const FUZZY_CANDIDATE_CAP: usize = 1000;

/// Disjoint-set bookkeeping: a row id is "used" the moment it appears in a
/// committed match record, and never reconsidered afterwards.
#[derive(Debug, Default)]
pub struct MatchState {
    ledger_matched: HashSet<u64>,
    statement_matched: HashSet<u64>,
}

impl MatchState {
    pub fn is_ledger_matched(&self, row_id: u64) -> bool {
        self.ledger_matched.contains(&row_id)
    }

    pub fn is_statement_matched(&self, row_id: u64) -> bool {
        self.statement_matched.contains(&row_id)
    }

    pub fn mark(&mut self, ledger_ids: impl IntoIterator<Item = u64>, statement_ids: impl IntoIterator<Item = u64>) {
        self.ledger_matched.extend(ledger_ids);
        self.statement_matched.extend(statement_ids);
    }

    pub fn unmatched_ledger(&self, all: &[NormalizedRow]) -> Vec<u64> {
        let ids: HashSet<u64> = all.iter().map(|r| r.row_id).filter(|id| !self.ledger_matched.contains(id)).collect();
        sort_by_row_id(ids)
    }

    pub fn unmatched_statement(&self, all: &[NormalizedRow]) -> Vec<u64> {
        let ids: HashSet<u64> = all.iter().map(|r| r.row_id).filter(|id| !self.statement_matched.contains(id)).collect();
        sort_by_row_id(ids)
    }
}

/// Drains a candidate set into ascending row-id order. Every phase funnels
/// its candidate scan through this before picking a winner, so "stable input
/// order" is enforced in one place rather than re-sorted per phase.
pub(crate) fn sort_by_row_id(ids: HashSet<u64>) -> Vec<u64> {
    let mut sorted: Vec<u64> = ids.into_iter().collect();
    sorted.sort_unstable();
    sorted
}

/// Intersects `current` with `next`, treating `None` as "no filter applied
/// yet" so the first active criterion seeds the candidate set instead of
/// intersecting against the empty set.
pub(crate) fn intersect(current: &mut Option<HashSet<u64>>, next: HashSet<u64>) {
    *current = Some(match current.take() {
        None => next,
        Some(existing) => existing.intersection(&next).copied().collect(),
    });
}

/// Signed cents difference between the ledger side of a prospective match
/// and the statement side, picking whichever of the ledger's comparable
/// amounts (debit/credit, per `mode`) is closest to the statement amount.
pub(crate) fn amount_variance_cents(ledger: &NormalizedRow, statement_cents: Option<i64>, mode: AmountMode) -> i64 {
    let Some(stmt) = statement_cents else { return 0 };
    ledger
        .comparable_amounts(mode)
        .into_iter()
        .map(|c| c - stmt)
        .min_by_key(|d| d.abs())
        .unwrap_or(0)
}

/// Expands `date` to the set of dates a candidate's date may fall on, given
/// `tolerance_days` (0 or 1, per the settings contract).
pub(crate) fn date_window(date: chrono::NaiveDate, tolerance_days: u8) -> Vec<chrono::NaiveDate> {
    if tolerance_days == 0 {
        vec![date]
    } else {
        vec![date - chrono::Duration::days(1), date, date + chrono::Duration::days(1)]
    }
}
