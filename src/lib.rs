//! `ledger-recon` — ledger / bank-statement reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded records, returns classified
//! results. No CLI, file parsing, or IO dependencies — callers hand over
//! rows already read from wherever they live (CSV, a spreadsheet, a
//! database cursor) and column-name mappings, and get back a partition of
//! matches, splits, foreign credits, and remainders.

pub mod assemble;
pub mod config;
pub mod corporate;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod normalize;
pub mod phases;
pub mod similarity;
pub mod subset_sum;

pub use config::{ColumnMapping, CorporateColumns, CorporateSettings, ReconcileColumns, ReconcileSettings};
pub use corporate::classify_corporate;
pub use engine::reconcile;
pub use error::ReconcileError;
pub use model::{
    BatchRecord, CellValue, CorporateResult, Diagnostics, MatchRecord, MatchType, NormalizedRow, RawRow,
    ReconciliationResult, RunStatus,
};
