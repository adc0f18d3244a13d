//! # ntup - Columnar Event-Data Field Engine
//!
//! ntup is the object-to-columns mapper of a columnar, self-describing
//! event-data store. Structured in-memory values (primitives, records,
//! collections, variants, optionals, bitsets) are translated into typed
//! column streams on write and reconstructed on read. This crate
//! prioritizes:
//!
//! - **Schema as a tree**: fields own their subfields and their columns
//! - **Cluster-local addressing**: collection offsets restart per cluster
//! - **Masked bulk reads**: one value array serving repeated masked reads
//!
//! ## Quick Start
//!
//! ```ignore
//! use ntup::{Field, MemoryPageStore, TypeRegistry, Value, WriteOptions};
//!
//! let resolver = TypeRegistry::new().into_shared();
//! let mut root = Field::root(vec![
//!     Field::create("pt", "f32", &resolver)?,
//!     Field::create("hits", "vec<i32>", &resolver)?,
//! ]);
//!
//! let store = MemoryPageStore::shared(WriteOptions::default());
//! let sink: ntup::SharedSink = store.clone();
//! root.connect_sink(&sink, 0)?;
//! root.append(&Value::Record(vec![
//!     Value::F32(13.6),
//!     Value::Vector(vec![Value::I32(1), Value::I32(2)]),
//! ]))?;
//! root.commit_cluster()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Field Tree (schema)           │
//! ├─────────────────────────────────────┤
//! │  Value Mapping │ Bulk Reads │ Repr   │
//! ├─────────────────────────────────────┤
//! │       Column Streams (typed)         │
//! ├─────────────────────────────────────┤
//! │   Element Packing / Split Encoding   │
//! ├─────────────────────────────────────┤
//! │     Page Sink / Source (storage)     │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`field`]: the field hierarchy, lifecycle and value/bulk I/O
//! - [`value`]: the runtime value tree fields map to columns
//! - [`column`]: typed element streams owned by fields
//! - [`encoding`]: element packing and page-level split encodings
//! - [`storage`]: page sink/source traits and the in-memory store
//! - [`descriptor`]: persisted schema metadata
//! - [`reflect`]: the type registry, proxies and evolution rules
//! - [`error`]: typed error kinds behind `eyre`

#[macro_use]
mod macros;

pub mod column;
pub mod descriptor;
pub mod encoding;
pub mod error;
pub mod field;
pub mod reflect;
pub mod storage;
pub mod types;
pub mod value;

pub use descriptor::Descriptor;
pub use error::{kind_of, ErrorKind, FieldError};
pub use field::{Bulk, CollectionWriter, Field, FieldState, SchemaIter, Traits, ALL_SET};
pub use reflect::{CollectionProxy, ReadCallback, TypeRegistry, TypeResolver};
pub use storage::memory::MemoryPageStore;
pub use storage::{PageSink, PageSource, SharedSink, SharedSource, WriteOptions};
pub use types::{ClusterIndex, ColumnType, EntryIndex, FieldId};
pub use value::{Bitset, Value};
