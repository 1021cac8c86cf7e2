use serde::Deserialize;

use crate::error::ReconcileError;

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Which raw column name holds each logical field, per side. Caller-supplied;
/// the engine never guesses a column name.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMapping {
    pub date: Option<String>,
    pub reference: Option<String>,
    pub debit: Option<String>,
    pub credit: Option<String>,
    pub amount: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileColumns {
    pub ledger: ColumnMapping,
    pub statement: ColumnMapping,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountMode {
    Both,
    Debits,
    Credits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    #[serde(default = "default_true")]
    pub match_dates: bool,
    /// Only 0 or 1 is accepted; anything else is a structural error (spec
    /// pins this contract — no wider tolerance is supported).
    #[serde(default)]
    pub date_tolerance_days: u8,
    #[serde(default = "default_true")]
    pub match_references: bool,
    #[serde(default = "default_true")]
    pub fuzzy_enabled: bool,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: u8,
    #[serde(default = "default_true")]
    pub match_amounts: bool,
    #[serde(default = "default_amount_mode")]
    pub amount_mode: AmountMode,
    #[serde(default = "default_true")]
    pub split_enabled: bool,
    #[serde(default = "default_split_tolerance")]
    pub split_tolerance: f64,
    #[serde(default = "default_split_max_components")]
    pub split_max_components: usize,
    #[serde(default = "default_foreign_credit_threshold")]
    pub foreign_credit_threshold_cents: i64,
    /// Skip the split phase entirely once phases 1-2 already matched more
    /// than this fraction of rows.
    #[serde(default = "default_split_skip_match_rate")]
    pub split_skip_match_rate: f64,
    /// Skip the split phase if either unmatched pool exceeds this many rows.
    #[serde(default = "default_split_skip_unmatched_count")]
    pub split_skip_unmatched_count: usize,
    /// Stop after this many split records per sub-phase.
    #[serde(default = "default_split_max_records_per_subphase")]
    pub split_max_records_per_subphase: usize,
}

fn default_true() -> bool {
    true
}
fn default_fuzzy_threshold() -> u8 {
    85
}
fn default_amount_mode() -> AmountMode {
    AmountMode::Both
}
fn default_split_tolerance() -> f64 {
    0.02
}
fn default_split_max_components() -> usize {
    6
}
fn default_foreign_credit_threshold() -> i64 {
    10_000 * 100
}
fn default_split_skip_match_rate() -> f64 {
    0.95
}
fn default_split_skip_unmatched_count() -> usize {
    5000
}
fn default_split_max_records_per_subphase() -> usize {
    50
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            match_dates: true,
            date_tolerance_days: 0,
            match_references: true,
            fuzzy_enabled: true,
            fuzzy_threshold: default_fuzzy_threshold(),
            match_amounts: true,
            amount_mode: AmountMode::Both,
            split_enabled: true,
            split_tolerance: default_split_tolerance(),
            split_max_components: default_split_max_components(),
            foreign_credit_threshold_cents: default_foreign_credit_threshold(),
            split_skip_match_rate: default_split_skip_match_rate(),
            split_skip_unmatched_count: default_split_skip_unmatched_count(),
            split_max_records_per_subphase: default_split_max_records_per_subphase(),
        }
    }
}

impl ReconcileSettings {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.date_tolerance_days > 1 {
            return Err(ReconcileError::InvalidSetting(format!(
                "date_tolerance_days must be 0 or 1, got {}",
                self.date_tolerance_days
            )));
        }
        if self.fuzzy_threshold > 100 {
            return Err(ReconcileError::InvalidSetting(format!(
                "fuzzy_threshold must be in [0, 100], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.split_max_components < 2 {
            return Err(ReconcileError::InvalidSetting(format!(
                "split_max_components must be >= 2, got {}",
                self.split_max_components
            )));
        }
        if self.split_tolerance < 0.0 {
            return Err(ReconcileError::InvalidSetting(
                "split_tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Corporate classifier settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CorporateColumns {
    pub reference: String,
    pub foreign_debit: String,
    pub foreign_credit: String,
    pub journal_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorporateSettings {
    /// Threshold (percent) separating batch 3/4 (rate-like variance within
    /// threshold) from batch 5 (sub-unit rate-difference remainder) is fixed
    /// by the unit-vs-fractional split in spec.md; `percent_threshold` bounds
    /// how large a batch-3/4 percentage variance may be before it is instead
    /// treated as a plain amount mismatch worth flagging via `variance_pct`.
    #[serde(default = "default_percent_threshold")]
    pub percent_threshold: f64,
    #[serde(default = "default_corp_tolerance_cents")]
    pub tolerance_cents: i64,
}

fn default_percent_threshold() -> f64 {
    7.0
}
fn default_corp_tolerance_cents() -> i64 {
    1
}

impl Default for CorporateSettings {
    fn default() -> Self {
        Self {
            percent_threshold: default_percent_threshold(),
            tolerance_cents: default_corp_tolerance_cents(),
        }
    }
}
