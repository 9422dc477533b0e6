use std::borrow::Cow;

use bytes::{Bytes, BytesMut};
use column_types::{Column, DataTypeFactory, Error, Field, FormatSettings, RowFormat};
use low_cardinality::{
    data_type_factory, recursive_low_cardinality_conversion, recursive_remove_low_cardinality,
    recursive_remove_low_cardinality_column, remove_low_cardinality,
};
use pretty_assertions::assert_eq;

fn factory() -> DataTypeFactory {
    data_type_factory()
}

#[test]
fn unwrapping_by_name() {
    let factory = factory();
    let wrapped = factory.get("LowCardinality(String)").unwrap();
    let plain = factory.get("String").unwrap();
    assert!(remove_low_cardinality(&wrapped).equals(plain.as_ref()));
    assert!(!wrapped.equals(plain.as_ref()));
    assert!(wrapped.equals(factory.get("LowCardinality(String)").unwrap().as_ref()));
    assert!(!wrapped.equals(factory.get("LowCardinality(UInt8)").unwrap().as_ref()));

    for (name, stripped) in [
        ("Array(LowCardinality(String))", "Array(String)"),
        (
            "Map(LowCardinality(String), Array(LowCardinality(Nullable(UInt64))))",
            "Map(String, Array(Nullable(UInt64)))",
        ),
        ("Tuple(LowCardinality(Int8), Float32)", "Tuple(Int8, Float32)"),
    ] {
        let data_type = factory.get(name).unwrap();
        let once = recursive_remove_low_cardinality(&data_type);
        assert_eq!(once.name(), stripped);
        assert!(std::sync::Arc::ptr_eq(
            &recursive_remove_low_cardinality(&once),
            &once
        ));
    }
}

#[test]
fn binary_field_round_trip() {
    let data_type = factory().get("LowCardinality(String)").unwrap();
    let mut buf = BytesMut::new();
    data_type
        .serialize_binary_field(&Field::from("abc"), &mut buf)
        .unwrap();
    let mut istr: Bytes = buf.freeze();
    assert_eq!(
        data_type.deserialize_binary_field(&mut istr).unwrap(),
        Field::from("abc")
    );
}

#[test]
fn text_formats_render_values() {
    let factory = factory();
    let data_type = factory.get("LowCardinality(Nullable(String))").unwrap();
    let mut column = data_type.create_column();
    for field in [Field::from("it's"), Field::Null] {
        column.push_field(&field).unwrap();
    }
    let settings = FormatSettings::default();
    let render = |format: RowFormat, row: usize| {
        let mut buf = Vec::new();
        format
            .serialize(data_type.as_ref(), &column, row, &mut buf, &settings)
            .unwrap();
        String::from_utf8(buf).unwrap()
    };
    assert_eq!(render(RowFormat::Quoted, 0), "'it\\'s'");
    assert_eq!(render(RowFormat::Quoted, 1), "NULL");
    assert_eq!(render(RowFormat::Json, 0), "\"it's\"");
    assert_eq!(render(RowFormat::Json, 1), "null");
}

#[test]
fn column_conversion_by_name() {
    let factory = factory();
    let from_type = factory
        .get("Tuple(LowCardinality(String), Array(UInt8))")
        .unwrap();
    let to_type = factory
        .get("Tuple(String, LowCardinality(Array(UInt8)))")
        .unwrap();
    let fields = vec![
        Field::Tuple(vec!["a".into(), Field::Array(vec![Field::UInt64(1)])]),
        Field::Tuple(vec!["a".into(), Field::Array(vec![Field::UInt64(1)])]),
        Field::Tuple(vec!["b".into(), Field::Array(vec![])]),
    ];
    let mut column = from_type.create_column();
    for field in &fields {
        column.push_field(field).unwrap();
    }

    let converted = recursive_low_cardinality_conversion(&column, &from_type, &to_type).unwrap();
    let Column::Tuple(elements) = converted.as_ref() else {
        panic!("expected a tuple column");
    };
    assert!(matches!(elements[0], Column::String(_)));
    assert_eq!(elements[1].as_low_cardinality().unwrap().dictionary().len(), 2);
    assert_eq!(converted.to_fields(), fields);

    let plain = recursive_remove_low_cardinality_column(&converted).unwrap();
    assert!(matches!(plain, Cow::Owned(_)));
    assert_eq!(plain.to_fields(), fields);

    let other = factory.get("Tuple(String, Array(UInt16))").unwrap();
    assert!(matches!(
        recursive_low_cardinality_conversion(&column, &from_type, &other),
        Err(Error::TypeMismatch { .. })
    ));
}
