//! # Internal Macros
//!
//! Error-construction macros that pair `eyre` reports with the typed
//! [`FieldError`](crate::error::FieldError) payload. All engine errors go
//! through these so that `error::kind_of` works on every report the crate
//! produces.
//!
//! ## Usage
//!
//! ```ignore
//! field_ensure!(!name.is_empty(), InvalidArgument, "field name cannot be empty");
//! field_bail!(Unsupported, "function types have no column mapping: {}", type_name);
//! let err = field_err!(Io, "page source closed");
//! ```

/// Returns early with a typed field error.
#[macro_export]
macro_rules! field_bail {
    ($kind:ident, $($arg:tt)*) => {
        return Err($crate::field_err!($kind, $($arg)*))
    };
}

/// Builds an `eyre::Report` carrying a typed field error.
#[macro_export]
macro_rules! field_err {
    ($kind:ident, $($arg:tt)*) => {
        ::eyre::Report::new($crate::error::FieldError::new(
            $crate::error::ErrorKind::$kind,
            format!($($arg)*),
        ))
    };
}

/// Bails with a typed field error unless the condition holds.
#[macro_export]
macro_rules! field_ensure {
    ($cond:expr, $kind:ident, $($arg:tt)*) => {
        if !$cond {
            $crate::field_bail!($kind, $($arg)*);
        }
    };
}
