use std::sync::Arc;

use column_types::bulk::{
    BulkReader, BulkWriter, DeserializeBulkSettings, MemoryStreams, SerializeBulkSettings,
};
use column_types::{Column, DataTypeFactory, DataTypeRef, Field};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn column_of(data_type: &DataTypeRef, fields: &[Field]) -> Column {
    let mut column = data_type.create_column();
    for field in fields {
        column.push_field(field).unwrap();
    }
    column
}

fn write_in_chunks(data_type: &DataTypeRef, column: &Column, chunk: usize) -> MemoryStreams {
    let mut streams = MemoryStreams::for_type(data_type.as_ref(), "col");
    let mut settings = SerializeBulkSettings::new(&mut streams);
    let mut writer = BulkWriter::start(Arc::clone(data_type), &mut settings).unwrap();
    let mut offset = 0;
    while offset < column.len() {
        writer.write(column, offset, chunk, &mut settings).unwrap();
        offset += chunk;
    }
    assert_eq!(writer.rows(), column.len());
    writer.finish(&mut settings).unwrap();
    streams
}

fn read_all(data_type: &DataTypeRef, streams: MemoryStreams) -> Column {
    let mut input = streams.into_input();
    let mut settings = DeserializeBulkSettings::new(&mut input);
    BulkReader::start(Arc::clone(data_type), &mut settings)
        .unwrap()
        .read_to_end(&mut settings)
        .unwrap()
}

#[test_log::test]
fn nested_streams() {
    let data_type = DataTypeFactory::default()
        .get("Map(String, Array(Nullable(Int32)))")
        .unwrap();
    let streams = MemoryStreams::for_type(data_type.as_ref(), "col");
    assert_eq!(
        streams.stream_names().collect::<Vec<_>>(),
        vec![
            "col.keys",
            "col.size0",
            "col.values",
            "col.values.null",
            "col.values.size1",
        ]
    );

    let fields = vec![
        Field::Map(vec![(
            "a".into(),
            Field::Array(vec![Field::Int64(1), Field::Null]),
        )]),
        Field::Map(vec![]),
        Field::Map(vec![
            ("b".into(), Field::Array(vec![])),
            ("c".into(), Field::Array(vec![Field::Int64(-3)])),
        ]),
    ];
    let column = column_of(&data_type, &fields);
    let streams = write_in_chunks(&data_type, &column, 2);
    assert_eq!(read_all(&data_type, streams).to_fields(), fields);
}

#[test]
fn numbers_are_little_endian() {
    let data_type = DataTypeFactory::default().get("UInt16").unwrap();
    let column = column_of(&data_type, &[Field::UInt64(1), Field::UInt64(0x0203)]);
    let streams = write_in_chunks(&data_type, &column, 2);
    assert_eq!(streams.get("col").unwrap(), &[1, 0, 3, 2]);
}

fn strings() -> impl Strategy<Value = Vec<Option<String>>> {
    prop::collection::vec(prop::option::of("[a-c]{0,3}"), 1..40)
}

proptest! {
    #[test]
    fn chunk_size_does_not_matter(values in strings(), chunk in 1_usize..10) {
        let data_type = DataTypeFactory::default()
            .get("Array(Nullable(String))")
            .unwrap();
        let fields: Vec<Field> = values
            .chunks(3)
            .map(|row| Field::Array(row.iter().cloned().map(Field::from).collect()))
            .collect();
        let column = column_of(&data_type, &fields);
        let streams = write_in_chunks(&data_type, &column, chunk);
        prop_assert_eq!(read_all(&data_type, streams).to_fields(), fields);
    }
}
