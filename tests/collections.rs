//! # Collection Field Tests
//!
//! Offset-column semantics (cluster-local, monotone, reset at boundaries),
//! nested and proxied collections, ordered sets, the write-only untyped
//! collection, strings across clusters, and the cardinality projection.

use std::sync::Arc;

use ntup::{
    ClusterIndex, CollectionWriter, Field, MemoryPageStore, PageSource, SharedSink, SharedSource,
    TypeRegistry, Value, WriteOptions,
};
use parking_lot::Mutex;

type Store = Arc<Mutex<MemoryPageStore>>;

fn resolver() -> ntup::reflect::SharedResolver {
    TypeRegistry::new().into_shared()
}

fn connect_reader(root: &mut Field, store: &Store) {
    let descriptor = store.lock().descriptor();
    root.bind_on_disk_ids(&descriptor);
    let source: SharedSource = store.clone();
    root.connect_source(&source).unwrap();
}

fn vec_i32(items: &[i32]) -> Value {
    Value::Record(vec![Value::Vector(
        items.iter().map(|&v| Value::I32(v)).collect(),
    )])
}

#[test]
fn vector_offsets_are_cluster_local_and_monotone() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let mut writer = Field::root(vec![Field::create("v", "vec<i32>", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    for entry in [&[1, 2, 3][..], &[], &[4], &[5, 6]] {
        writer.append(&vec_i32(entry)).unwrap();
    }
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("v", "vec<i32>", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);
    let field = &reader.children()[0];

    // offsets 3, 3, 4, 6 expressed as (first item, size) per entry
    let mut spans = Vec::new();
    for entry in 0..4 {
        let (start, size) = field.collection_info(entry).unwrap();
        assert_eq!(start.cluster_id, 0);
        spans.push((start.index, size));
    }
    assert_eq!(spans, [(0, 3), (3, 0), (3, 1), (4, 2)]);

    // item index 4 of the cluster holds the 5
    let mut item = Value::I32(0);
    field.children()[0]
        .read_cluster(ClusterIndex::new(0, 4), &mut item)
        .unwrap();
    assert_eq!(item, Value::I32(5));

    let mut value = reader.generate_value();
    reader.read(3, &mut value).unwrap();
    assert_eq!(value, vec_i32(&[5, 6]));
}

#[test]
fn offsets_reset_at_cluster_boundaries() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let mut writer = Field::root(vec![Field::create("v", "vec<i32>", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer.append(&vec_i32(&[1, 2])).unwrap();
    writer.commit_cluster().unwrap();
    writer.append(&vec_i32(&[7, 8, 9])).unwrap();
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("v", "vec<i32>", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);

    let (start, size) = reader.children()[0].collection_info(1).unwrap();
    assert_eq!(start, ClusterIndex::new(1, 0));
    assert_eq!(size, 3);

    let mut value = reader.generate_value();
    reader.read(1, &mut value).unwrap();
    assert_eq!(value, vec_i32(&[7, 8, 9]));
}

#[test]
fn nested_vectors_round_trip() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let entry = Value::Record(vec![Value::Vector(vec![
        Value::Vector(vec![Value::Str("a".into()), Value::Str("bb".into())]),
        Value::Vector(vec![]),
        Value::Vector(vec![Value::Str("ccc".into())]),
    ])]);

    let mut writer = Field::root(vec![Field::create("vv", "vec<vec<str>>", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer.append(&entry).unwrap();
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("vv", "vec<vec<str>>", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);
    let mut value = reader.generate_value();
    reader.read(0, &mut value).unwrap();
    assert_eq!(value, entry);
}

#[test]
fn sets_materialize_sorted() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let mut writer = Field::root(vec![Field::create("s", "set<i16>", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer
        .append(&Value::Record(vec![Value::Set(vec![
            Value::I16(5),
            Value::I16(-1),
            Value::I16(3),
        ])]))
        .unwrap();
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("s", "set<i16>", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);
    let mut value = reader.generate_value();
    reader.read(0, &mut value).unwrap();
    assert_eq!(
        value,
        Value::Record(vec![Value::Set(vec![
            Value::I16(-1),
            Value::I16(3),
            Value::I16(5),
        ])])
    );
}

#[test]
fn sets_collapse_duplicates_like_an_ordered_set_insert() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    // duplicates pass through the offset column untouched ...
    let mut writer = Field::root(vec![Field::create("s", "set<i16>", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer
        .append(&Value::Record(vec![Value::Set(vec![
            Value::I16(5),
            Value::I16(-1),
            Value::I16(5),
            Value::I16(3),
            Value::I16(3),
        ])]))
        .unwrap();
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("s", "set<i16>", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);
    let (_, size) = reader.children()[0].collection_info(0).unwrap();
    assert_eq!(size, 5);

    // ... and collapse when the set materializes
    let mut value = reader.generate_value();
    reader.read(0, &mut value).unwrap();
    assert_eq!(
        value,
        Value::Record(vec![Value::Set(vec![
            Value::I16(-1),
            Value::I16(3),
            Value::I16(5),
        ])])
    );
}

#[test]
fn proxied_collections_iterate_through_the_registry_proxy() {
    let mut registry = TypeRegistry::new();
    registry.register_proxied_collection(
        "adc_block",
        "u8",
        Arc::new(ntup::reflect::VecBackedProxy),
    );
    let resolver = registry.into_shared();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let entry = Value::Record(vec![Value::Vector(vec![Value::U8(10), Value::U8(20)])]);
    let mut writer = Field::root(vec![Field::create("blk", "adc_block", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer.append(&entry).unwrap();
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("blk", "adc_block", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);
    let mut value = reader.generate_value();
    reader.read(0, &mut value).unwrap();
    assert_eq!(value, entry);
}

#[test]
fn strings_span_clusters_independently() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let mut writer = Field::root(vec![Field::create("s", "str", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    writer
        .append(&Value::Record(vec![Value::Str("first".into())]))
        .unwrap();
    writer.commit_cluster().unwrap();
    writer
        .append(&Value::Record(vec![Value::Str("second".into())]))
        .unwrap();
    writer
        .append(&Value::Record(vec![Value::Str(String::new())]))
        .unwrap();
    writer.commit_cluster().unwrap();

    let mut reader = Field::root(vec![Field::create("s", "str", &resolver).unwrap()]);
    connect_reader(&mut reader, &store);
    let mut value = reader.generate_value();
    for (i, expected) in ["first", "second", ""].iter().enumerate() {
        reader.read(i as u64, &mut value).unwrap();
        assert_eq!(value, Value::Record(vec![Value::Str((*expected).into())]));
    }
}

#[test]
fn untyped_collections_write_the_secondary_writer_offset() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let writer_counter = Arc::new(CollectionWriter::new());
    let mut root = Field::root(vec![
        Field::untyped_collection("aux", writer_counter.clone()).unwrap()
    ]);
    root.connect_sink(&sink, 0).unwrap();

    writer_counter.advance(2);
    root.append(&Value::Record(vec![Value::Index(0)])).unwrap();
    writer_counter.advance(1);
    root.append(&Value::Record(vec![Value::Index(0)])).unwrap();
    root.commit_cluster().unwrap();
    // cluster commit resets the running offset
    assert_eq!(writer_counter.count(), 0);

    // the offsets landed as 2 then 3
    let descriptor = store.lock().descriptor();
    let id = descriptor.field_id_for_path("aux").unwrap();
    let mut probe = Field::create("n", "card64", &resolver).unwrap();
    probe.set_on_disk_id(id).unwrap();
    let source: SharedSource = store.clone();
    probe.connect_source(&source).unwrap();
    let mut n = Value::U64(0);
    probe.read(0, &mut n).unwrap();
    assert_eq!(n, Value::U64(2));
    probe.read(1, &mut n).unwrap();
    assert_eq!(n, Value::U64(1));
}

#[test]
fn cardinality_projects_collection_sizes() {
    let resolver = resolver();
    let store = MemoryPageStore::shared(WriteOptions::default());
    let sink: SharedSink = store.clone();

    let mut writer = Field::root(vec![Field::create("jets", "vec<f32>", &resolver).unwrap()]);
    writer.connect_sink(&sink, 0).unwrap();
    for n in [3usize, 0, 5] {
        writer
            .append(&Value::Record(vec![Value::Vector(
                (0..n).map(|i| Value::F32(i as f32)).collect(),
            )]))
            .unwrap();
    }
    writer.commit_cluster().unwrap();

    let descriptor = store.lock().descriptor();
    let id = descriptor.field_id_for_path("jets").unwrap();
    let source: SharedSource = store.clone();

    let mut n32 = Field::create("n", "card32", &resolver).unwrap();
    n32.set_on_disk_id(id).unwrap();
    n32.connect_source(&source).unwrap();
    let mut value = n32.generate_value();
    for (i, expected) in [3u32, 0, 5].iter().enumerate() {
        n32.read(i as u64, &mut value).unwrap();
        assert_eq!(value, Value::U32(*expected));
    }

    let mut n64 = Field::create("n", "card64", &resolver).unwrap();
    n64.set_on_disk_id(id).unwrap();
    n64.connect_source(&source).unwrap();
    let mut value = n64.generate_value();
    n64.read(2, &mut value).unwrap();
    assert_eq!(value, Value::U64(5));
}
