//! Hash-indexed candidate lookup over a set of normalized rows.
//!
//! Each index is built lazily: if the criterion it serves is disabled in
//! [`crate::config::ReconcileSettings`], the index is left empty rather than
//! built and discarded, so a run with e.g. `match_amounts = false` does no
//! amount bucketing work at all.

use std::collections::HashMap;

use crate::model::NormalizedRow;

/// Amount bucket width in cents used for coarse candidate pre-filtering
/// before a fuzzy comparison. Tuned to keep per-row candidate counts small
/// without excluding genuine near-matches.
const AMOUNT_BUCKET_CENTS: i64 = 1_000;

fn amount_bucket(cents: i64) -> i64 {
    cents.div_euclid(AMOUNT_BUCKET_CENTS)
}

/// Candidate indices over one side's normalized rows (ledger or statement).
#[derive(Debug, Default)]
pub struct RowIndex {
    pub by_exact_ref: HashMap<String, Vec<u64>>,
    pub by_ref_word: HashMap<String, Vec<u64>>,
    pub by_date: HashMap<chrono::NaiveDate, Vec<u64>>,
    pub by_amount_exact: HashMap<i64, Vec<u64>>,
    pub by_amount_bucket: HashMap<i64, Vec<u64>>,
}

pub struct IndexOptions {
    pub match_references: bool,
    pub match_dates: bool,
    pub match_amounts: bool,
}

impl RowIndex {
    /// Builds an index over `rows`, using `amounts_of` to pull the one or
    /// two comparable amounts out of each row (ledger rows may contribute a
    /// debit and a credit; statement rows contribute their single signed
    /// amount).
    pub fn build(rows: &[NormalizedRow], opts: &IndexOptions, amounts_of: impl Fn(&NormalizedRow) -> Vec<i64>) -> Self {
        let mut idx = RowIndex::default();

        for row in rows {
            if opts.match_references && !row.ref_was_blank {
                idx.by_exact_ref.entry(row.ref_norm.clone()).or_default().push(row.row_id);
                for word in row.ref_norm.split_whitespace() {
                    if word.len() >= 3 {
                        idx.by_ref_word.entry(word.to_string()).or_default().push(row.row_id);
                    }
                }
            }

            if opts.match_dates {
                if let Some(date) = row.date_norm {
                    idx.by_date.entry(date).or_default().push(row.row_id);
                }
            }

            if opts.match_amounts {
                for cents in amounts_of(row) {
                    idx.by_amount_exact.entry(cents).or_default().push(row.row_id);
                    idx.by_amount_bucket.entry(amount_bucket(cents)).or_default().push(row.row_id);
                }
            }
        }

        idx
    }

    /// Row ids whose amount bucket is adjacent to (or equal to) the bucket
    /// containing `cents`, to avoid losing candidates that straddle a
    /// bucket boundary.
    pub fn amount_bucket_neighbors(&self, cents: i64) -> Vec<u64> {
        let center = amount_bucket(cents);
        let mut out = Vec::new();
        for b in [center - 1, center, center + 1] {
            if let Some(ids) = self.by_amount_bucket.get(&b) {
                out.extend_from_slice(ids);
            }
        }
        out
    }
}
