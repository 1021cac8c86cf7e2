use std::fmt;

/// Structural errors that abort a run before any matching takes place.
///
/// Per the engine's error-handling policy, only these propagate as a raised
/// `Result::Err`. Cell-level bad data, integrity drift, caps being hit, and
/// cancellation are all reported as data on the successful result instead
/// (see [`crate::model::Diagnostics`]) — a reconciliation run over millions
/// of rows must not abort because a single cell is malformed.
#[derive(Debug)]
pub enum ReconcileError {
    /// A mandatory column mapping (date/reference/amount/etc.) was not supplied.
    MissingColumn { side: &'static str, field: &'static str },
    /// One of the two input tables had zero rows.
    EmptyInput { side: &'static str },
    /// A setting was outside its documented domain (e.g. a date tolerance
    /// other than 0 or 1, or a fuzzy threshold outside [0, 100]).
    InvalidSetting(String),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { side, field } => {
                write!(f, "{side}: missing mandatory column mapping for '{field}'")
            }
            Self::EmptyInput { side } => write!(f, "{side}: input has zero rows"),
            Self::InvalidSetting(msg) => write!(f, "invalid setting: {msg}"),
        }
    }
}

impl std::error::Error for ReconcileError {}
