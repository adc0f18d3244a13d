//! # Field Factory
//!
//! Parses self-describing type names and manufactures the matching concrete
//! fields. The grammar:
//!
//! | Form | Field |
//! |------|-------|
//! | `bool`, `char`, `byte`, `i8`..`u64`, `f32`, `f64`, `index` | primitive leaf |
//! | `str` | string leaf |
//! | `vec<T>` | variable-length collection |
//! | `array<T,N>` | fixed array |
//! | `set<T>` | ordered set |
//! | `variant<T1,...,Tk>` | variant |
//! | `opt<T>` / `box<T>` | nullable (optional / unique-owning) |
//! | `bitset<N>` | fixed-width bitset |
//! | `pair<T1,T2>` / `tuple<T1,...>` | record with generated member names |
//! | `atomic<T>` | transparent wrapper |
//! | `card32` / `card64` | read-only cardinality projection |
//! | anything else | registry lookup: class, enum, proxied collection, alias |
//!
//! Normalization strips whitespace; the canonical form is what the field
//! reports as its type name. Reference, pointer and function types are
//! unsupported; so are self-referential classes, detected through the
//! expansion stack.

use eyre::Result;

use super::record::compute_record_layout;
use super::{Field, FieldKind, Primitive, SubFieldRole, Traits};
use crate::reflect::{SharedResolver, TypeInfoKind};
use crate::types::{ColumnType, FieldStructure};
use crate::{field_bail, field_ensure, field_err};

/// Checks the field-name grammar: non-empty, no `.`, no ASCII control
/// characters, no leading digit.
pub(crate) fn ensure_valid_name(name: &str) -> Result<()> {
    field_ensure!(!name.is_empty(), InvalidArgument, "field name cannot be empty");
    field_ensure!(
        !name.contains('.'),
        InvalidArgument,
        "field name '{name}' cannot contain a dot"
    );
    field_ensure!(
        !name.chars().any(|c| c.is_ascii_control()),
        InvalidArgument,
        "field name contains control characters"
    );
    field_ensure!(
        !name.starts_with(|c: char| c.is_ascii_digit()),
        InvalidArgument,
        "field name '{name}' cannot start with a digit"
    );
    Ok(())
}

fn normalize(type_name: &str) -> Result<String> {
    let canonical: String = type_name.chars().filter(|c| !c.is_whitespace()).collect();
    field_ensure!(
        !canonical.is_empty(),
        InvalidArgument,
        "type name cannot be empty"
    );
    Ok(canonical)
}

/// `template("vec<i32>", "vec")` -> `Some("i32")`.
fn template<'a>(ty: &'a str, head: &str) -> Option<&'a str> {
    let rest = ty.strip_prefix(head)?;
    rest.strip_prefix('<')?;
    rest.strip_suffix('>').map(|inner| &inner[1..])
}

/// Splits template arguments at commas outside nested angle brackets.
fn split_arguments(inner: &str) -> Result<Vec<&str>> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| field_err!(InvalidArgument, "unbalanced '>' in '{inner}'"))?;
            }
            ',' if depth == 0 => {
                args.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    field_ensure!(depth == 0, InvalidArgument, "unbalanced '<' in '{inner}'");
    args.push(&inner[start..]);
    field_ensure!(
        args.iter().all(|a| !a.is_empty()),
        InvalidArgument,
        "empty template argument in '{inner}'"
    );
    Ok(args)
}

pub(crate) fn create_field(name: &str, type_name: &str, resolver: &SharedResolver) -> Result<Field> {
    ensure_valid_name(name)?;
    let canonical = normalize(type_name)?;
    build_field(name, &canonical, resolver, &mut Vec::new())
}

fn build_field(
    name: &str,
    ty: &str,
    resolver: &SharedResolver,
    expanding: &mut Vec<String>,
) -> Result<Field> {
    if ty.contains('&') || ty.contains('*') {
        field_bail!(Unsupported, "reference and pointer types have no column mapping: '{ty}'");
    }
    if ty == "fn" || ty.contains("fn(") {
        field_bail!(Unsupported, "function types have no column mapping: '{ty}'");
    }

    if let Some(prim) = Primitive::from_type_name(ty) {
        return Ok(leaf_field(name, ty, prim));
    }
    if ty == "str" {
        return Ok(Field::build(
            name,
            ty,
            FieldStructure::Leaf,
            FieldKind::String { n_written: 0 },
            Traits::NONE,
            Vec::new(),
        ));
    }
    if ty == "card32" || ty == "card64" {
        let bits = if ty == "card32" { 32 } else { 64 };
        return Ok(Field::build(
            name,
            ty,
            FieldStructure::Leaf,
            FieldKind::Cardinality { bits },
            Traits::NONE,
            Vec::new(),
        ));
    }

    if let Some(inner) = template(ty, "vec") {
        let item = build_field("_0", inner, resolver, expanding)?;
        return Ok(collection_field(name, ty, FieldKind::Vector { n_written: 0 }, item));
    }
    if let Some(inner) = template(ty, "set") {
        let item = build_field("_0", inner, resolver, expanding)?;
        return Ok(collection_field(name, ty, FieldKind::Set { n_written: 0 }, item));
    }
    if let Some(inner) = template(ty, "array") {
        let args = split_arguments(inner)?;
        field_ensure!(
            args.len() == 2,
            InvalidArgument,
            "array takes an element type and a length: '{ty}'"
        );
        let len: usize = args[1]
            .parse()
            .map_err(|_| field_err!(InvalidArgument, "bad array length '{}'", args[1]))?;
        field_ensure!(len > 0, InvalidArgument, "array length must be positive: '{ty}'");
        let item = build_field("_0", args[0], resolver, expanding)?;
        return Ok(array_field(name, ty, item, len));
    }
    if let Some(inner) = template(ty, "bitset") {
        let n_bits: usize = inner
            .parse()
            .map_err(|_| field_err!(InvalidArgument, "bad bitset width '{inner}'"))?;
        field_ensure!(n_bits > 0, InvalidArgument, "bitset width must be positive: '{ty}'");
        return Ok(Field::build(
            name,
            ty,
            FieldStructure::Leaf,
            FieldKind::Bitset { n_bits },
            Traits::TRIVIAL_TYPE,
            Vec::new(),
        ));
    }
    if let Some(inner) = template(ty, "variant") {
        let args = split_arguments(inner)?;
        let alternatives = args
            .iter()
            .enumerate()
            .map(|(i, arg)| build_field(&format!("_{i}"), arg, resolver, expanding))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Field::build(
            name,
            ty,
            FieldStructure::Variant,
            FieldKind::Variant {
                n_written: vec![0; alternatives.len()],
            },
            Traits::NONE,
            alternatives,
        ));
    }
    if let Some(inner) = template(ty, "opt") {
        let item = build_field("_0", inner, resolver, expanding)?;
        return Ok(nullable_field(name, ty, item, false));
    }
    if let Some(inner) = template(ty, "box") {
        let item = build_field("_0", inner, resolver, expanding)?;
        return Ok(nullable_field(name, ty, item, true));
    }
    if let Some(inner) = template(ty, "atomic") {
        let item = build_field("_0", inner, resolver, expanding)?;
        let traits = item.traits() & Traits::TRIVIAL_TYPE;
        return Ok(Field::build(
            name,
            ty,
            FieldStructure::Leaf,
            FieldKind::Atomic,
            traits,
            vec![item],
        ));
    }
    if let Some(inner) = template(ty, "pair") {
        let args = split_arguments(inner)?;
        field_ensure!(args.len() == 2, InvalidArgument, "pair takes two types: '{ty}'");
        return record_from_args(name, ty, &args, resolver, expanding);
    }
    if let Some(inner) = template(ty, "tuple") {
        let args = split_arguments(inner)?;
        return record_from_args(name, ty, &args, resolver, expanding);
    }

    resolve_registered(name, ty, resolver, expanding)
}

fn resolve_registered(
    name: &str,
    ty: &str,
    resolver: &SharedResolver,
    expanding: &mut Vec<String>,
) -> Result<Field> {
    let Some(info) = resolver.resolve(ty) else {
        field_bail!(InvalidArgument, "unknown type '{ty}'");
    };
    match info.kind {
        TypeInfoKind::Alias { target } => {
            let mut field = build_field(name, &normalize(&target)?, resolver, expanding)?;
            field.set_type_alias(ty);
            Ok(field)
        }
        TypeInfoKind::Enum { underlying } => {
            let prim = Primitive::from_type_name(&underlying).ok_or_else(|| {
                field_err!(
                    InvalidArgument,
                    "enum '{ty}' has non-integer underlying type '{underlying}'"
                )
            })?;
            field_ensure!(
                !matches!(prim, Primitive::F32 | Primitive::F64 | Primitive::Bool),
                InvalidArgument,
                "enum '{ty}' has non-integer underlying type '{underlying}'"
            );
            let inner = leaf_field("_0", &underlying, prim);
            Ok(Field::build(
                name,
                ty,
                FieldStructure::Leaf,
                FieldKind::Enum,
                Traits::TRIVIAL_TYPE,
                vec![inner],
            ))
        }
        TypeInfoKind::ProxiedCollection { element } => {
            let proxy = resolver.proxy(ty).ok_or_else(|| {
                field_err!(InvalidArgument, "proxied collection '{ty}' has no registered proxy")
            })?;
            let item = build_field("_0", &normalize(&element)?, resolver, expanding)?;
            Ok(collection_field(
                name,
                ty,
                FieldKind::Proxied { proxy, n_written: 0 },
                item,
            ))
        }
        TypeInfoKind::Class { bases, members } => {
            if expanding.iter().any(|t| t == ty) {
                field_bail!(Unsupported, "self-referential type '{ty}'");
            }
            expanding.push(ty.to_owned());
            let mut children = Vec::with_capacity(bases.len() + members.len());
            let mut roles = Vec::with_capacity(bases.len() + members.len());
            for base in &bases {
                let base_ty = normalize(base)?;
                children.push(build_field(
                    &format!(":{base_ty}"),
                    &base_ty,
                    resolver,
                    expanding,
                )?);
                roles.push(SubFieldRole::BaseClass);
            }
            for (member_name, member_ty) in &members {
                ensure_valid_name(member_name)?;
                children.push(build_field(
                    member_name,
                    &normalize(member_ty)?,
                    resolver,
                    expanding,
                )?);
                roles.push(SubFieldRole::DataMember);
            }
            expanding.pop();
            Ok(record_field(
                name,
                ty,
                children,
                roles,
                info.version,
                Some(resolver.clone()),
            ))
        }
    }
}

fn record_from_args(
    name: &str,
    ty: &str,
    args: &[&str],
    resolver: &SharedResolver,
    expanding: &mut Vec<String>,
) -> Result<Field> {
    let children = args
        .iter()
        .enumerate()
        .map(|(i, arg)| build_field(&format!("_{i}"), arg, resolver, expanding))
        .collect::<Result<Vec<_>>>()?;
    let roles = vec![SubFieldRole::DataMember; children.len()];
    Ok(record_field(name, ty, children, roles, 0, None))
}

fn leaf_field(name: &str, ty: &str, prim: Primitive) -> Field {
    Field::build(
        name,
        ty,
        FieldStructure::Leaf,
        FieldKind::Leaf(prim),
        Traits::TRIVIAL_TYPE | Traits::MAPPABLE,
        Vec::new(),
    )
}

fn collection_field(name: &str, ty: &str, kind: FieldKind, item: Field) -> Field {
    Field::build(
        name,
        ty,
        FieldStructure::Collection,
        kind,
        Traits::NONE,
        vec![item],
    )
}

fn array_field(name: &str, ty: &str, item: Field, len: usize) -> Field {
    let traits = item.traits() & Traits::TRIVIAL_TYPE;
    let mut field = Field::build(
        name,
        ty,
        FieldStructure::Leaf,
        FieldKind::Array,
        traits,
        vec![item],
    );
    field.set_n_repetitions(len);
    field
}

fn nullable_field(name: &str, ty: &str, item: Field, is_box: bool) -> Field {
    let default_item = Box::new(item.generate_value());
    // sparse pays one index entry per outer entry; dense pays one item
    let item_disk_size = item
        .column_representations()
        .serialization_types()
        .first()
        .map(|r| r[0].packed_size())
        .unwrap_or_else(|| item.value_size());
    let mut field = Field::build(
        name,
        ty,
        FieldStructure::Collection,
        FieldKind::Nullable {
            is_box,
            n_written: 0,
            default_item,
        },
        Traits::NONE,
        vec![item],
    );
    if item_disk_size > ColumnType::SplitIndex32.packed_size() {
        field.representative = Some(vec![ColumnType::SplitIndex32]);
    }
    field
}

fn record_field(
    name: &str,
    ty: &str,
    children: Vec<Field>,
    roles: Vec<SubFieldRole>,
    version: u32,
    resolver: Option<SharedResolver>,
) -> Field {
    let layout = compute_record_layout(&children, roles, version, resolver);
    let mut traits = Traits::TRIVIAL_TYPE;
    for child in &children {
        traits &= child.traits();
    }
    Field::build(
        name,
        ty,
        FieldStructure::Record,
        FieldKind::Record(layout),
        traits,
        children,
    )
}

impl Field {
    /// An untyped record over caller-supplied subfields.
    pub fn record(name: &str, children: Vec<Field>) -> Result<Field> {
        ensure_valid_name(name)?;
        let roles = vec![SubFieldRole::DataMember; children.len()];
        Ok(record_field(name, "", children, roles, 0, None))
    }

    /// The write-only collection field driven by a secondary writer; the
    /// offset counter is shared with the writer and reset at every cluster
    /// commit. Reading untyped collections goes through an ordinary
    /// collection field instead.
    pub fn untyped_collection(
        name: &str,
        writer: std::sync::Arc<super::CollectionWriter>,
    ) -> Result<Field> {
        ensure_valid_name(name)?;
        Ok(Field::build(
            name,
            "",
            FieldStructure::UnsplitCollection,
            FieldKind::UntypedCollection { writer },
            Traits::NONE,
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::TypeRegistry;

    fn empty_resolver() -> SharedResolver {
        TypeRegistry::new().into_shared()
    }

    #[test]
    fn names_follow_the_grammar() {
        assert!(ensure_valid_name("pt").is_ok());
        assert!(ensure_valid_name("_0").is_ok());
        assert!(ensure_valid_name("").is_err());
        assert!(ensure_valid_name("a.b").is_err());
        assert!(ensure_valid_name("7up").is_err());
        assert!(ensure_valid_name("a\tb").is_err());
    }

    #[test]
    fn whitespace_normalizes_to_canonical_form() {
        let resolver = empty_resolver();
        let field = Field::create("v", "vec < array< i32 , 3 > >", &resolver).unwrap();
        assert_eq!(field.type_name(), "vec<array<i32,3>>");
        assert_eq!(field.children()[0].n_repetitions(), 3);
    }

    #[test]
    fn pointer_and_function_types_are_unsupported() {
        let resolver = empty_resolver();
        for ty in ["&i32", "*i32", "fn(i32)", "vec<&f32>"] {
            let err = Field::create("f", ty, &resolver).unwrap_err();
            assert_eq!(
                crate::error::kind_of(&err),
                Some(crate::error::ErrorKind::Unsupported),
                "{ty}"
            );
        }
    }

    #[test]
    fn unknown_types_are_invalid_arguments() {
        let resolver = empty_resolver();
        let err = Field::create("f", "no_such_type", &resolver).unwrap_err();
        assert_eq!(
            crate::error::kind_of(&err),
            Some(crate::error::ErrorKind::InvalidArgument)
        );
    }

    #[test]
    fn self_referential_classes_are_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register_class("node", 1, vec![], vec![("next".into(), "node".into())]);
        let resolver = registry.into_shared();
        let err = Field::create("n", "node", &resolver).unwrap_err();
        assert_eq!(
            crate::error::kind_of(&err),
            Some(crate::error::ErrorKind::Unsupported)
        );
    }

    #[test]
    fn aliases_resolve_but_keep_their_name() {
        let mut registry = TypeRegistry::new();
        registry.register_alias("float_v", "vec<f32>");
        let resolver = registry.into_shared();
        let field = Field::create("xs", "float_v", &resolver).unwrap();
        assert_eq!(field.type_name(), "vec<f32>");
        assert_eq!(field.type_alias(), Some("float_v"));
    }

    #[test]
    fn nullable_of_small_items_defaults_dense() {
        let resolver = empty_resolver();
        let small = Field::create("o", "opt<i32>", &resolver).unwrap();
        assert!(small.is_dense());
        let large = Field::create("o", "opt<f64>", &resolver).unwrap();
        assert!(large.is_sparse());
    }
}
