//! # Typed Field-Engine Errors
//!
//! All fallible operations in this crate return `eyre::Result`. Errors that
//! originate inside the field engine carry a [`FieldError`] payload so that
//! callers can discriminate the failure class without string matching:
//!
//! | Kind | Raised for |
//! |------|------------|
//! | `InvalidArgument` | bad field name, unknown type, representation not declared, wrong value shape |
//! | `SchemaMismatch` | on-disk column types match no declared representation; refused type version |
//! | `StateViolation` | operation requires a different connection state |
//! | `Unsupported` | pointer/function types, write on read-only fields |
//! | `Io` | propagated from the page sink/source |
//!
//! ## Usage
//!
//! ```ignore
//! use ntup::error::{kind_of, ErrorKind};
//!
//! let err = field.set_representative(&[ColumnType::Switch]).unwrap_err();
//! assert_eq!(kind_of(&err), Some(ErrorKind::InvalidArgument));
//! ```

use std::fmt;

/// Failure classes of the field engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    SchemaMismatch,
    StateViolation,
    Unsupported,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::SchemaMismatch => "schema mismatch",
            ErrorKind::StateViolation => "state violation",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

/// Error payload attached to `eyre::Report`s raised by this crate.
#[derive(Debug)]
pub struct FieldError {
    kind: ErrorKind,
    message: String,
}

impl FieldError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FieldError {}

/// Extracts the typed kind from a report, if it was raised by this crate.
pub fn kind_of(report: &eyre::Report) -> Option<ErrorKind> {
    report.downcast_ref::<FieldError>().map(FieldError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_survives_eyre_wrapping() {
        let report: eyre::Report = FieldError::new(ErrorKind::SchemaMismatch, "column set").into();
        assert_eq!(kind_of(&report), Some(ErrorKind::SchemaMismatch));
        assert!(report.to_string().contains("schema mismatch"));
    }

    #[test]
    fn foreign_errors_have_no_kind() {
        let report = eyre::eyre!("not ours");
        assert_eq!(kind_of(&report), None);
    }
}
