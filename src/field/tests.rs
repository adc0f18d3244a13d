//! Tests for the field module

use super::*;
use crate::error::{kind_of, ErrorKind};
use crate::reflect::{SharedResolver, TypeRegistry};
use crate::storage::memory::MemoryPageStore;
use crate::storage::{SharedSink, SharedSource, WriteOptions};
use crate::types::ColumnType;

fn plain_resolver() -> SharedResolver {
    TypeRegistry::new().into_shared()
}

fn sink(store: &std::sync::Arc<parking_lot::Mutex<MemoryPageStore>>) -> SharedSink {
    store.clone()
}

fn source(store: &std::sync::Arc<parking_lot::Mutex<MemoryPageStore>>) -> SharedSource {
    store.clone()
}

fn hit_resolver() -> SharedResolver {
    let mut registry = TypeRegistry::new();
    registry.register_class(
        "hit",
        1,
        vec![],
        vec![
            ("t".into(), "i8".into()),
            ("x".into(), "f64".into()),
            ("adc".into(), "i32".into()),
        ],
    );
    registry.register_class("track", 1, vec!["hit".into()], vec![("chi2".into(), "f32".into())]);
    registry.into_shared()
}

#[test]
fn primitive_leaves_are_simple_trivial_and_mappable() {
    let resolver = plain_resolver();
    for (ty, size) in [("bool", 1), ("i16", 2), ("u32", 4), ("f64", 8), ("index", 8)] {
        let field = Field::create("v", ty, &resolver).unwrap();
        assert!(field.traits().contains(Traits::TRIVIAL_TYPE), "{ty}");
        assert!(field.traits().is_mappable(), "{ty}");
        assert!(field.is_simple(), "{ty}");
        assert_eq!(field.value_size(), size, "{ty}");
        assert_eq!(field.alignment(), size, "{ty}");
        assert!(field.children().is_empty(), "{ty}");
    }
}

#[test]
fn string_fields_are_not_mappable() {
    let field = Field::create("s", "str", &plain_resolver()).unwrap();
    assert!(!field.traits().is_mappable());
    assert!(!field.is_simple());
    let reps = field.column_representations();
    assert_eq!(
        reps.serialization_default(),
        &[ColumnType::SplitIndex64, ColumnType::UInt8]
    );
}

#[test]
fn record_layout_pads_like_a_c_struct() {
    let field = Field::create("h", "hit", &hit_resolver()).unwrap();
    // i8 at 0, f64 padded to 8, i32 at 16; size rounds to 24
    assert_eq!(field.member_offsets().unwrap(), &[0, 8, 16]);
    assert_eq!(field.value_size(), 24);
    assert_eq!(field.alignment(), 8);
    assert!(field.traits().contains(Traits::TRIVIAL_TYPE));
    assert!(!field.traits().is_mappable());
}

#[test]
fn base_subfields_use_the_reserved_prefix() {
    let field = Field::create("t", "track", &hit_resolver()).unwrap();
    assert_eq!(field.children()[0].name(), ":hit");
    assert!(field.is_base_subfield(0));
    assert!(!field.is_base_subfield(1));
    assert_eq!(field.children()[1].name(), "chi2");
}

#[test]
fn created_fields_are_equivalent_to_their_reparse() {
    let resolver = hit_resolver();
    for ty in [
        "i32",
        "vec<f32>",
        "array<vec<str>,4>",
        "variant<i32,str,vec<i32>>",
        "opt<f64>",
        "pair<i32,f64>",
        "bitset<66>",
        "set<i16>",
        "track",
    ] {
        let field = Field::create("a", ty, &resolver).unwrap();
        let reparsed = Field::create("b", field.type_name(), &resolver).unwrap();
        assert!(field.equivalent(&reparsed), "{ty}");
        assert!(field.equivalent(&field.clone_as("c").unwrap()), "{ty}");
    }
}

#[test]
fn clone_keeps_the_on_disk_id_and_resets_state() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    let mut field = Field::create("v", "vec<i32>", &plain_resolver()).unwrap();
    field.set_description("jet momenta");
    field.connect_sink(&sink(&store), 0).unwrap();
    assert_eq!(field.state(), FieldState::ConnectedToSink);

    let copy = field.clone_as("w").unwrap();
    assert_eq!(copy.name(), "w");
    assert_eq!(copy.state(), FieldState::Unconnected);
    assert_eq!(copy.on_disk_id(), field.on_disk_id());
    assert_eq!(copy.description(), "jet momenta");
    assert_eq!(copy.n_elements(), 0);
}

#[test]
fn schema_iteration_is_depth_first_preorder() {
    let resolver = plain_resolver();
    let root = Field::root(vec![
        Field::create("a", "vec<pair<i32,str>>", &resolver).unwrap(),
        Field::create("b", "f32", &resolver).unwrap(),
    ]);
    let names: Vec<&str> = root.iter_schema().map(Field::name).collect();
    assert_eq!(names, ["a", "_0", "_0", "_1", "b"]);
    assert_eq!(root.iter_schema().count(), 5);
}

#[test]
fn representative_must_be_declared() {
    let mut field = Field::create("x", "f64", &plain_resolver()).unwrap();
    assert!(field.has_default_representative());
    field.set_representative(&[ColumnType::Real64]).unwrap();
    assert_eq!(field.representative(), vec![ColumnType::Real64]);

    let err = field.set_representative(&[ColumnType::Switch]).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::InvalidArgument));
    // deserialization-only extras are not writable
    let err = field.set_representative(&[ColumnType::Real32]).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::InvalidArgument));
}

#[test]
fn representative_is_frozen_after_connecting() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    let mut field = Field::create("x", "f64", &plain_resolver()).unwrap();
    field.connect_sink(&sink(&store), 0).unwrap();
    let err = field.set_representative(&[ColumnType::Real64]).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::StateViolation));
}

#[test]
fn split_columns_fall_back_when_compression_is_off() {
    let store = MemoryPageStore::shared(WriteOptions {
        compression_enabled: false,
        use_split_encoding: true,
    });
    let mut field = Field::create("x", "f64", &plain_resolver()).unwrap();
    field.connect_sink(&sink(&store), 0).unwrap();
    assert_eq!(field.columns[0].column_type(), ColumnType::Real64);
}

#[test]
fn connecting_twice_is_a_state_violation() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    let mut field = Field::create("x", "i32", &plain_resolver()).unwrap();
    field.connect_sink(&sink(&store), 0).unwrap();
    let err = field.connect_sink(&sink(&store), 0).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::StateViolation));
    let err = field.connect_source(&source(&store)).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::StateViolation));
}

#[test]
fn read_callbacks_demote_and_restore_simple() {
    let mut field = Field::create("x", "i32", &plain_resolver()).unwrap();
    assert!(field.is_simple());

    let id = field.add_read_callback(std::sync::Arc::new(|_v| {}));
    assert!(!field.is_simple());
    assert!(field.has_read_callbacks());

    field.remove_read_callback(id).unwrap();
    assert!(field.is_simple());
    assert!(!field.has_read_callbacks());

    let err = field.remove_read_callback(id).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::InvalidArgument));
}

#[test]
fn cardinality_fields_refuse_sinks() {
    let store = MemoryPageStore::shared(WriteOptions::default());
    let mut field = Field::create("n", "card32", &plain_resolver()).unwrap();
    let err = field.connect_sink(&sink(&store), 0).unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::Unsupported));
}

#[test]
fn enum_fields_mirror_their_underlying_width() {
    let mut registry = TypeRegistry::new();
    registry.register_enum("flavor", "u16");
    let resolver = registry.into_shared();
    let field = Field::create("f", "flavor", &resolver).unwrap();
    assert_eq!(field.value_size(), 2);
    assert_eq!(field.alignment(), 2);
    assert_eq!(field.children()[0].type_name(), "u16");
    assert_eq!(field.generate_value(), crate::value::Value::U16(0));
}

#[test]
fn variant_and_bitset_sizes() {
    let resolver = plain_resolver();
    let variant = Field::create("v", "variant<i32,f64>", &resolver).unwrap();
    // 8-byte alternative + tag byte, padded to alignment 8
    assert_eq!(variant.value_size(), 16);
    assert_eq!(variant.alignment(), 8);

    let bits = Field::create("b", "bitset<66>", &resolver).unwrap();
    assert_eq!(bits.value_size(), 16);
    assert_eq!(bits.alignment(), 8);

    let arr = Field::create("a", "array<array<f32,4>,2>", &resolver).unwrap();
    assert_eq!(arr.value_size(), 32);
    assert_eq!(arr.alignment(), 4);
}

#[test]
fn split_value_covers_the_composite_kinds() {
    use crate::value::Value;
    let resolver = plain_resolver();

    let pair = Field::create("p", "pair<i32,f64>", &resolver).unwrap();
    let value = Value::Record(vec![Value::I32(1), Value::F64(2.0)]);
    let parts = pair.split_value(&value).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0.name(), "_0");
    assert_eq!(parts[1].1, &Value::F64(2.0));

    let variant = Field::create("v", "variant<i32,str>", &resolver).unwrap();
    let active = Value::Variant(Some((0, Box::new(Value::I32(42)))));
    let parts = variant.split_value(&active).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].0.type_name(), "i32");
    assert_eq!(parts[0].1, &Value::I32(42));
    assert!(variant.split_value(&Value::Variant(None)).unwrap().is_empty());

    let leaf = Field::create("x", "i32", &resolver).unwrap();
    assert!(leaf.split_value(&Value::I32(3)).unwrap().is_empty());

    let nullable = Field::create("o", "opt<i32>", &resolver).unwrap();
    assert!(nullable.split_value(&Value::Nullable(None)).unwrap().is_empty());
    let present = Value::Nullable(Some(Box::new(Value::I32(9))));
    assert_eq!(nullable.split_value(&present).unwrap().len(), 1);
}

#[test]
fn generate_value_matches_the_field_shape() {
    use crate::value::Value;
    let resolver = hit_resolver();

    let hit = Field::create("h", "hit", &resolver).unwrap();
    assert_eq!(
        hit.generate_value(),
        Value::Record(vec![Value::I8(0), Value::F64(0.0), Value::I32(0)])
    );

    let arr = Field::create("a", "array<i16,3>", &resolver).unwrap();
    assert_eq!(
        arr.generate_value(),
        Value::Array(vec![Value::I16(0), Value::I16(0), Value::I16(0)])
    );

    let variant = Field::create("v", "variant<str,i32>", &resolver).unwrap();
    assert_eq!(
        variant.generate_value(),
        Value::Variant(Some((0, Box::new(Value::Str(String::new())))))
    );
}
