//! # Column Element Encoding
//!
//! Two layers sit between a value and the bytes a page holds:
//!
//! - `element`: packing of one scalar into its canonical little-endian form
//!   for a given [`ColumnType`](crate::types::ColumnType), and back. This is
//!   the form columns append and the form `read`/`read_v` return.
//! - `split`: page-level transforms applied when a cluster is committed.
//!   Bit columns get packed eight elements per byte; split column types get
//!   byte-interleaved (after zigzag or delta pre-coding where declared) so
//!   that compressors see long runs of similar bytes.
//!
//! Canonical element bytes are identical for a split type and its plain
//! counterpart; only the page encoding differs.

pub mod element;
pub mod split;
