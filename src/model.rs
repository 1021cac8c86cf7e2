use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A single raw cell value as handed to the engine by the caller's row
/// source. Most cells arrive as free text (CSV-style); a loader that already
/// has typed columns (a spreadsheet, a database cursor) may hand over a
/// `Number` or `Date` directly and skip re-parsing it.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Empty,
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A single ledger or statement row, keyed by the caller's column names.
/// `row_id` is the row's stable identity into the input ordering; it is
/// never reassigned or reused by the engine.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub row_id: u64,
    pub fields: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn get<'a>(&'a self, column: &str) -> Option<&'a CellValue> {
        self.fields.get(column)
    }
}

// ---------------------------------------------------------------------------
// Normalized row
// ---------------------------------------------------------------------------

/// Which table a normalized row came from. Ledger rows carry debit/credit;
/// statement rows carry a single signed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Ledger,
    Statement,
}

/// Immutable, canonical form of a row after normalization. Never mutated
/// after the indexer consumes it.
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub row_id: u64,
    pub side: Side,
    pub date_norm: Option<NaiveDate>,
    /// Upper-cased, whitespace-collapsed reference, or a unique
    /// `__BLANK_<row_id>__` marker if the original was blank.
    pub ref_norm: String,
    pub ref_was_blank: bool,
    /// Ledger-only: debit amount in cents (non-negative), if present.
    pub debit_cents: Option<i64>,
    /// Ledger-only: credit amount in cents (non-negative), if present.
    pub credit_cents: Option<i64>,
    /// Statement-only: signed amount in cents, if present.
    pub amount_cents: Option<i64>,
    pub description: Option<String>,
}

impl NormalizedRow {
    /// The ledger amount(s) to compare against a statement's signed amount,
    /// under the given amount mode. Debit and credit are both carried as
    /// non-negative decimals (per the input contract) and compared directly
    /// against the statement's amount in cents — neither side is negated.
    pub fn comparable_amounts(&self, mode: crate::config::AmountMode) -> Vec<i64> {
        use crate::config::AmountMode;
        debug_assert_eq!(self.side, Side::Ledger);
        let mut out = Vec::with_capacity(2);
        if matches!(mode, AmountMode::Both | AmountMode::Debits) {
            if let Some(d) = self.debit_cents {
                out.push(d);
            }
        }
        if matches!(mode, AmountMode::Both | AmountMode::Credits) {
            if let Some(c) = self.credit_cents {
                out.push(c);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Match records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Perfect,
    Fuzzy,
    ForeignCredit,
    SplitManyLedgerOneStatement,
    SplitOneLedgerManyStatement,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Perfect => write!(f, "perfect"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::ForeignCredit => write!(f, "foreign_credit"),
            Self::SplitManyLedgerOneStatement => write!(f, "split_many_ledger_one_statement"),
            Self::SplitOneLedgerManyStatement => write!(f, "split_one_ledger_many_statement"),
        }
    }
}

/// A committed match between one or more ledger rows and one or more
/// statement rows. Cardinalities: perfect/fuzzy/foreign_credit have exactly
/// one row per side; splits have exactly one side of size 1 and the other
/// side of size >= 2.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub ledger_row_ids: BTreeSet<u64>,
    pub statement_row_ids: BTreeSet<u64>,
    pub match_type: MatchType,
    /// Similarity score in [0, 100]. 100 for perfect/foreign_credit matches.
    pub similarity: u8,
    /// Signed variance in cents: ledger total minus statement total.
    pub amount_variance_cents: i64,
}

// ---------------------------------------------------------------------------
// Corporate batch classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchRecord {
    pub row_id: u64,
    pub batch: u8,
    /// Variance percentage, present for batches 3/4/5.
    pub variance_pct: Option<rust_decimal::Decimal>,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseWarnings {
    pub bad_dates: usize,
    pub bad_amounts: usize,
    pub blank_references: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityCheck {
    /// Expected row count minus observed row count across all output categories.
    pub row_count_delta: i64,
    pub ledger_sum_delta_cents: i64,
    pub statement_sum_delta_cents: i64,
    pub ok: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub phase_timings_ms: HashMap<String, u64>,
    pub cache_stats: CacheStats,
    pub parse_warnings_ledger: ParseWarnings,
    pub parse_warnings_statement: ParseWarnings,
    pub integrity_check: IntegrityCheck,
    /// Human-readable notes when a configured cap was hit (split caps, fuzzy
    /// candidate cap, etc.) — informational, never a failure.
    pub overrun_notes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub status: RunStatus,
    pub matched: Vec<MatchRecord>,
    pub splits: Vec<MatchRecord>,
    pub foreign_credits: Vec<MatchRecord>,
    pub unmatched_ledger: Vec<u64>,
    pub unmatched_statement: Vec<u64>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorporateIntegrityReport {
    pub row_count_delta: i64,
    pub debit_sum_delta_cents: i64,
    pub credit_sum_delta_cents: i64,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorporateResult {
    pub batch_1: Vec<BatchRecord>,
    pub batch_2: Vec<BatchRecord>,
    pub batch_3: Vec<BatchRecord>,
    pub batch_4: Vec<BatchRecord>,
    pub batch_5: Vec<BatchRecord>,
    pub batch_6: Vec<BatchRecord>,
    pub integrity_report: CorporateIntegrityReport,
}
