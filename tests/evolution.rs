//! # Schema Evolution Tests
//!
//! A reader whose registered record type is newer than the on-disk version
//! installs the registry's read-transformation rules at connect time; a
//! version difference with no rules refuses the stream. Members with no
//! on-disk counterpart stay at their default until a rule fills them.

use std::sync::Arc;

use ntup::{
    kind_of, ErrorKind, Field, MemoryPageStore, PageSource, SharedSink, SharedSource,
    TypeRegistry, Value, WriteOptions,
};
use parking_lot::Mutex;

type Store = Arc<Mutex<MemoryPageStore>>;

fn write_points_v1(store: &Store, xs: &[i32]) {
    let mut registry = TypeRegistry::new();
    registry.register_class("point", 1, vec![], vec![("x".into(), "i32".into())]);
    let resolver = registry.into_shared();

    let sink: SharedSink = store.clone();
    let mut writer = Field::root(vec![Field::create("p", "point", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    for &x in xs {
        writer
            .append(&Value::Record(vec![Value::Record(vec![Value::I32(x)])]))
            .unwrap();
    }
    writer.commit_cluster().unwrap();
}

fn v2_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register_class(
        "point",
        2,
        vec![],
        vec![("x".into(), "i32".into()), ("y".into(), "i32".into())],
    );
    registry
}

#[test]
fn version_rules_fill_members_without_on_disk_data() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    write_points_v1(&store, &[1, -4, 100]);

    let mut registry = v2_registry();
    registry.register_evolution_rule(
        "point",
        1,
        Arc::new(|value: &mut Value| {
            if let Value::Record(members) = value {
                if let Value::I32(x) = members[0] {
                    members[1] = Value::I32(2 * x);
                }
            }
        }),
    );
    let resolver = registry.into_shared();

    let mut reader = Field::root(vec![Field::create("p", "point", &resolver).unwrap()]);
    let descriptor = store.lock().descriptor();
    reader.bind_on_disk_ids(&descriptor);
    let source: SharedSource = store.clone();
    reader.connect_source(&source).unwrap();

    let point = &reader.children()[0];
    assert_eq!(point.on_disk_type_version(), Some(1));
    assert!(point.has_read_callbacks());

    let mut value = reader.generate_value();
    for (i, &x) in [1i32, -4, 100].iter().enumerate() {
        reader.read(i as u64, &mut value).unwrap();
        assert_eq!(
            value,
            Value::Record(vec![Value::Record(vec![
                Value::I32(x),
                Value::I32(2 * x),
            ])]),
            "entry {i}"
        );
    }
}

#[test]
fn version_difference_without_rules_is_a_schema_mismatch() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    write_points_v1(&store, &[1]);

    let resolver = v2_registry().into_shared();
    let mut reader = Field::root(vec![Field::create("p", "point", &resolver).unwrap()]);
    let descriptor = store.lock().descriptor();
    reader.bind_on_disk_ids(&descriptor);
    let source: SharedSource = store.clone();

    let err = reader.connect_source(&source).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::SchemaMismatch));
}

#[test]
fn matching_versions_install_no_callbacks() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    write_points_v1(&store, &[5]);

    let mut registry = TypeRegistry::new();
    registry.register_class("point", 1, vec![], vec![("x".into(), "i32".into())]);
    let resolver = registry.into_shared();

    let mut reader = Field::root(vec![Field::create("p", "point", &resolver).unwrap()]);
    let descriptor = store.lock().descriptor();
    reader.bind_on_disk_ids(&descriptor);
    let source: SharedSource = store.clone();
    reader.connect_source(&source).unwrap();

    assert!(!reader.children()[0].has_read_callbacks());
    let mut value = reader.generate_value();
    reader.read(0, &mut value).unwrap();
    assert_eq!(
        value,
        Value::Record(vec![Value::Record(vec![Value::I32(5)])])
    );
}

#[test]
fn mismatched_column_types_are_a_schema_mismatch() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    let registry = TypeRegistry::new();
    let resolver = registry.into_shared();

    let sink: SharedSink = store.clone();
    let mut writer = Field::root(vec![Field::create("x", "str", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer
        .append(&Value::Record(vec![Value::Str("abc".into())]))
        .unwrap();
    writer.commit_cluster().unwrap();

    // an i32 field cannot bind a string's offset+payload columns
    let mut reader = Field::root(vec![Field::create("x", "i32", &resolver).unwrap()]);
    let descriptor = store.lock().descriptor();
    reader.bind_on_disk_ids(&descriptor);
    let source: SharedSource = store.clone();
    let err = reader.connect_source(&source).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::SchemaMismatch));
}
