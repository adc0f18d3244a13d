//! # Type Reflection Boundary
//!
//! Rust has no runtime reflection, so structural type information enters the
//! engine through a registry the caller fills: named record types (with base
//! types and members), enums with their underlying width, proxied collection
//! types with an iteration proxy, aliases, and schema-evolution rules keyed
//! by `(type name, on-disk version)`.
//!
//! The resolver is consulted read-only while expanding type names at field
//! creation and once more at connect-to-source time to fetch evolution
//! rules. It is shared (`Arc`) and internally immutable after setup.

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;

use crate::value::Value;
use crate::{field_bail, field_err};

/// Structural description of a registered type.
#[derive(Debug, Clone)]
pub enum TypeInfoKind {
    /// Record type: base types first, then `(name, type name)` members.
    Class {
        bases: Vec<String>,
        members: Vec<(String, String)>,
    },
    /// Enum delegating to an integer of the underlying width.
    Enum { underlying: String },
    /// Collection iterated through a [`CollectionProxy`].
    ProxiedCollection { element: String },
    /// Alternate name for another type.
    Alias { target: String },
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub version: u32,
    pub kind: TypeInfoKind,
}

/// Runtime iteration protocol for collection types without a dedicated
/// field kind. The in-memory representation stays opaque to the engine;
/// the proxy mediates all element access.
pub trait CollectionProxy: Send + Sync {
    /// A fresh, empty collection value.
    fn new_value(&self) -> Value;

    fn len(&self, collection: &Value) -> Result<usize>;

    fn clear(&self, collection: &mut Value) -> Result<()>;

    fn items<'a>(&self, collection: &'a Value) -> Result<Box<dyn Iterator<Item = &'a Value> + 'a>>;

    fn push(&self, collection: &mut Value, item: Value) -> Result<()>;

    /// Non-zero when elements are densely packed and the engine may walk
    /// them by stride instead of through the iterator.
    fn stride(&self) -> usize {
        0
    }
}

/// Post-read transformation installed by schema evolution.
pub type ReadCallback = Arc<dyn Fn(&mut Value) + Send + Sync>;

/// The reflection interface the field engine consumes.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<TypeInfo>;

    fn proxy(&self, name: &str) -> Option<Arc<dyn CollectionProxy>>;

    /// Read transformations for a type whose on-disk version differs from
    /// the in-memory one. Empty means the version is refused.
    fn evolution_rules(&self, name: &str, on_disk_version: u32) -> Vec<ReadCallback>;
}

pub type SharedResolver = Arc<dyn TypeResolver>;

/// Map-backed [`TypeResolver`] built up by the caller before creating
/// fields.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeInfo>,
    proxies: HashMap<String, Arc<dyn CollectionProxy>>,
    rules: HashMap<(String, u32), Vec<ReadCallback>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(
        &mut self,
        name: &str,
        version: u32,
        bases: Vec<String>,
        members: Vec<(String, String)>,
    ) {
        self.types.insert(
            name.to_owned(),
            TypeInfo {
                version,
                kind: TypeInfoKind::Class { bases, members },
            },
        );
    }

    pub fn register_enum(&mut self, name: &str, underlying: &str) {
        self.types.insert(
            name.to_owned(),
            TypeInfo {
                version: 0,
                kind: TypeInfoKind::Enum {
                    underlying: underlying.to_owned(),
                },
            },
        );
    }

    pub fn register_alias(&mut self, name: &str, target: &str) {
        self.types.insert(
            name.to_owned(),
            TypeInfo {
                version: 0,
                kind: TypeInfoKind::Alias {
                    target: target.to_owned(),
                },
            },
        );
    }

    pub fn register_proxied_collection(
        &mut self,
        name: &str,
        element: &str,
        proxy: Arc<dyn CollectionProxy>,
    ) {
        self.types.insert(
            name.to_owned(),
            TypeInfo {
                version: 0,
                kind: TypeInfoKind::ProxiedCollection {
                    element: element.to_owned(),
                },
            },
        );
        self.proxies.insert(name.to_owned(), proxy);
    }

    pub fn register_evolution_rule(&mut self, name: &str, on_disk_version: u32, rule: ReadCallback) {
        self.rules
            .entry((name.to_owned(), on_disk_version))
            .or_default()
            .push(rule);
    }

    pub fn into_shared(self) -> SharedResolver {
        Arc::new(self)
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve(&self, name: &str) -> Option<TypeInfo> {
        self.types.get(name).cloned()
    }

    fn proxy(&self, name: &str) -> Option<Arc<dyn CollectionProxy>> {
        self.proxies.get(name).cloned()
    }

    fn evolution_rules(&self, name: &str, on_disk_version: u32) -> Vec<ReadCallback> {
        self.rules
            .get(&(name.to_owned(), on_disk_version))
            .cloned()
            .unwrap_or_default()
    }
}

/// Proxy over `Value::Vector` contents; the stock implementation used by
/// tests and by callers whose proxied type materializes as a plain sequence.
pub struct VecBackedProxy;

impl CollectionProxy for VecBackedProxy {
    fn new_value(&self) -> Value {
        Value::Vector(Vec::new())
    }

    fn len(&self, collection: &Value) -> Result<usize> {
        match collection {
            Value::Vector(items) => Ok(items.len()),
            other => field_bail!(
                InvalidArgument,
                "proxied collection expects a vector value, got {}",
                other.kind_name()
            ),
        }
    }

    fn clear(&self, collection: &mut Value) -> Result<()> {
        match collection {
            Value::Vector(items) => {
                items.clear();
                Ok(())
            }
            other => field_bail!(
                InvalidArgument,
                "proxied collection expects a vector value, got {}",
                other.kind_name()
            ),
        }
    }

    fn items<'a>(&self, collection: &'a Value) -> Result<Box<dyn Iterator<Item = &'a Value> + 'a>> {
        match collection {
            Value::Vector(items) => Ok(Box::new(items.iter())),
            other => Err(field_err!(
                InvalidArgument,
                "proxied collection expects a vector value, got {}",
                other.kind_name()
            )),
        }
    }

    fn push(&self, collection: &mut Value, item: Value) -> Result<()> {
        match collection {
            Value::Vector(items) => {
                items.push(item);
                Ok(())
            }
            other => field_bail!(
                InvalidArgument,
                "proxied collection expects a vector value, got {}",
                other.kind_name()
            ),
        }
    }

    fn stride(&self) -> usize {
        1
    }
}
